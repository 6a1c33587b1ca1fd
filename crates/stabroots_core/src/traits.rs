use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the stability constraints.
/// Must support basic arithmetic (including compound assignment, which
/// `num_complex::Complex` relies on), debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + NumAssign + Debug + 'static {
    /// Lifts a passive `f64` constant (spectrum data, step sizes) into the scalar type.
    /// Unrepresentable values become NaN so they surface in the constraint values.
    fn lift(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }

    /// Value part, used wherever control flow has to look at a number
    /// (segment search) without touching its derivative information.
    fn value(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T: Float + FromPrimitive + NumAssign + Debug + 'static> Scalar for T {}

/// A vector-valued constraint function `g: R^n -> R^m`.
///
/// Implemented once, generically, so that the same code runs on `f64`
/// (values) and on dual numbers (derivatives).
pub trait ConstraintSystem<T: Scalar> {
    /// Number of decision variables.
    fn num_variables(&self) -> usize;

    /// Number of constraint entries.
    fn num_constraints(&self) -> usize;

    /// Evaluates every constraint entry.
    /// x: decision vector
    /// out: buffer to write the result (length `num_constraints`)
    fn apply(&self, x: &[T], out: &mut [T]) {
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = self.apply_single(x, index);
        }
    }

    /// Evaluates the single entry `index`; identical to `apply(x)[index]`.
    fn apply_single(&self, x: &[T], index: usize) -> T;
}
