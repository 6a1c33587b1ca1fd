use crate::error::ModelResult;
use nalgebra::DMatrix;

/// Constraint values and Jacobian at the most recent iterate.
#[derive(Debug, Clone, Default)]
pub struct EvalCache {
    x: Vec<f64>,
    g: Option<Vec<f64>>,
    jacobian: Option<DMatrix<f64>>,
}

impl EvalCache {
    /// Drops stored results unless `x` is the cached iterate and the host says it is unchanged.
    pub fn sync(&mut self, x: &[f64], new_x: bool) {
        if new_x || self.x.as_slice() != x {
            self.x.clear();
            self.x.extend_from_slice(x);
            self.g = None;
            self.jacobian = None;
        }
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn constraints(&self) -> Option<&[f64]> {
        self.g.as_deref()
    }

    pub fn constraints_with<F>(&mut self, compute: F) -> ModelResult<&[f64]>
    where
        F: FnOnce() -> ModelResult<Vec<f64>>,
    {
        if self.g.is_none() {
            self.g = Some(compute()?);
        }
        Ok(self.g.as_deref().unwrap_or_default())
    }

    pub fn jacobian_with<F>(&mut self, compute: F) -> ModelResult<&DMatrix<f64>>
    where
        F: FnOnce() -> ModelResult<DMatrix<f64>>,
    {
        let jacobian = match self.jacobian.take() {
            Some(jacobian) => jacobian,
            None => compute()?,
        };
        Ok(self.jacobian.insert(jacobian))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::cell::Cell;

    #[test]
    fn reuses_results_for_unchanged_iterate() {
        let mut cache = EvalCache::default();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![0.5, 0.25])
        };

        cache.sync(&[1.0, 2.0], true);
        assert_eq!(cache.constraints_with(compute).expect("values"), &[0.5, 0.25]);
        cache.sync(&[1.0, 2.0], false);
        assert_eq!(cache.constraints_with(compute).expect("values"), &[0.5, 0.25]);
        assert_eq!(calls.get(), 1);

        // Same point, but the host flags it as new.
        cache.sync(&[1.0, 2.0], true);
        assert!(cache.constraints().is_none());

        // Different point without the flag.
        cache.constraints_with(compute).expect("values");
        cache.sync(&[1.0, 2.5], false);
        assert!(cache.constraints().is_none());
        assert_eq!(cache.x(), &[1.0, 2.5]);
    }

    #[test]
    fn failed_evaluations_are_not_stored() {
        let mut cache = EvalCache::default();
        cache.sync(&[0.0], true);
        let err = cache
            .jacobian_with(|| Err(ModelError::NonFinite { what: "jacobian entry", index: 0 }))
            .expect_err("non-finite");
        assert!(matches!(err, ModelError::NonFinite { .. }));
        let jacobian = cache
            .jacobian_with(|| Ok(DMatrix::from_element(1, 1, 2.0)))
            .expect("jacobian");
        assert_eq!(jacobian[(0, 0)], 2.0);
    }
}
