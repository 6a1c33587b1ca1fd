//! Degree/parity descriptor: which factorization branch a stage count selects.

use crate::constraints::Factorization;
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Layout of the decision vector for a scheme with `degree` stages.
///
/// `P(z) = 1 + z Q(z)` with `deg Q = degree - 1`. Conjugate pairs cover two
/// degrees each; when `deg Q` is odd one extra real seed root closes the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeLayout {
    pub degree: usize,
    pub cons_order: usize,
    pub num_roots: usize,
    /// Base polynomial has odd degree, hence `Q` has even degree and no seed.
    pub odd_degree: bool,
    pub i_min: Option<usize>,
}

impl DegreeLayout {
    /// Derives the layout. `seed_index` overrides the default seed position
    /// (the last root, nearest to the origin in the ascending starting layout).
    pub fn derive(
        num_stages: usize,
        cons_order: usize,
        seed_index: Option<usize>,
    ) -> ModelResult<Self> {
        if num_stages < 2 {
            return Err(ModelError::Config(format!(
                "need at least two stages to have a free root, got {num_stages}"
            )));
        }
        if cons_order == 0 || cons_order > num_stages {
            return Err(ModelError::Config(format!(
                "consistency order must lie in 1..={num_stages}, got {cons_order}"
            )));
        }

        let degree = num_stages;
        let lower_degree = degree - 1;
        let odd_degree = degree % 2 == 1;

        if odd_degree {
            if let Some(index) = seed_index {
                return Err(ModelError::Parity(format!(
                    "degree {degree} factors into {} conjugate pairs only; seed index {index} is undefined",
                    lower_degree / 2
                )));
            }
            return Ok(Self {
                degree,
                cons_order,
                num_roots: lower_degree / 2,
                odd_degree,
                i_min: None,
            });
        }

        let num_roots = lower_degree / 2 + 1;
        let i_min = seed_index.unwrap_or(num_roots - 1);
        if i_min >= num_roots {
            return Err(ModelError::Parity(format!(
                "seed index {i_min} out of range for {num_roots} roots"
            )));
        }

        Ok(Self {
            degree,
            cons_order,
            num_roots,
            odd_degree,
            i_min: Some(i_min),
        })
    }

    pub fn factorization(&self) -> Factorization {
        match self.i_min {
            Some(i_min) => Factorization::Seeded { i_min },
            None => Factorization::Paired,
        }
    }

    /// Variables: roots plus the scale.
    pub fn num_variables(&self) -> usize {
        self.num_roots + 1
    }
}
