use thiserror::Error;

/// Failures raised while building or evaluating the root optimization model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Spectrum or hull data violates its invariants.
    #[error("invalid spectrum: {0}")]
    Spectrum(String),

    /// Interpolation sequence cannot define a piecewise-linear curve.
    #[error("invalid interpolation sequence: {0}")]
    Interpolation(String),

    /// Stage count, order or step parameters are out of range.
    #[error("config error: {0}")]
    Config(String),

    /// The configured degree does not admit the requested seed root.
    #[error("degree parity mismatch: {0}")]
    Parity(String),

    /// A buffer handed over by the host has the wrong length.
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    Dimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Evaluation produced NaN/Inf (typically a root sitting on the origin).
    #[error("non-finite {what} at index {index}")]
    NonFinite { what: &'static str, index: usize },
}

pub type ModelResult<T> = Result<T, ModelError>;

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> ModelResult<()> {
    if expected != got {
        return Err(ModelError::Dimension {
            what,
            expected,
            got,
        });
    }
    Ok(())
}
