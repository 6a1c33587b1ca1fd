pub mod autodiff;
pub mod config;
pub mod constraints;
pub mod degree;
pub mod error;
pub mod interpolation;
pub mod nlp;
pub mod polynomial;
pub mod problem;
pub mod spectrum;
/// The `stabroots_core` crate models the search for stability-polynomial roots that
/// maximize the admissible time step of an explicit multistage scheme over a spectrum.
/// It is consumed by an external nonlinear-programming solver through callbacks and
/// evaluates every constraint generically, for `f64` and for dual numbers alike.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `ConstraintSystem` (vector constraints).
/// - **Interpolation**: Piecewise-linear imaginary profile over a sorted spectrum or hull.
/// - **Constraints**: `|P(z_i)|` in factored form, paired or seeded, in two step scalings.
/// - **Autodiff**: `Dual`/`HyperDual` numbers and exact Jacobians and Hessians.
/// - **Problem**: `RootsProblem`, the `NlpProblem` implementation with best-iterate tracking.
pub mod traits;

pub use config::{ModelSettings, ProblemConfig, ScalingMode};
pub use error::{ModelError, ModelResult};
pub use nlp::NlpProblem;
pub use problem::{RootsProblem, Solution};
pub use spectrum::Spectrum;
