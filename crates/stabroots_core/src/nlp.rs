//! Callback contract between an external NLP solver (the host) and a problem model.
//!
//! The host owns every buffer and calls in with `new_x` flags; a model only
//! fills the slices it is handed. All sparsity indices are zero-based.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Problem sizes announced before the first evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlpInfo {
    pub num_variables: usize,
    pub num_constraints: usize,
    pub jacobian_nonzeros: usize,
    pub hessian_nonzeros: usize,
}

/// Which phase of the host algorithm produced an iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmMode {
    Regular,
    Restoration,
}

/// Termination status reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Success,
    MaxIterationsExceeded,
    CpuTimeExceeded,
    StopAtTinyStep,
    StopAtAcceptablePoint,
    LocalInfeasibility,
    UserRequestedStop,
    FeasiblePointFound,
    DivergingIterates,
    RestorationFailure,
    ErrorInStepComputation,
    InvalidNumberDetected,
    TooFewDegreesOfFreedom,
    InternalError,
}

impl SolverStatus {
    /// Statuses whose final iterate is taken as the answer.
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            SolverStatus::Success
                | SolverStatus::StopAtAcceptablePoint
                | SolverStatus::FeasiblePointFound
        )
    }
}

/// Host-owned buffers for the initial point; `None` means "not requested".
#[derive(Debug)]
pub struct StartingPoint<'a> {
    pub x: Option<&'a mut [f64]>,
    pub z_lower: Option<&'a mut [f64]>,
    pub z_upper: Option<&'a mut [f64]>,
    pub lambda: Option<&'a mut [f64]>,
}

impl<'a> StartingPoint<'a> {
    /// Requests the primal point only.
    pub fn primal(x: &'a mut [f64]) -> Self {
        Self {
            x: Some(x),
            z_lower: None,
            z_upper: None,
            lambda: None,
        }
    }
}

/// Per-iteration statistics handed to the monitor.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport<'a> {
    pub mode: AlgorithmMode,
    pub iteration: usize,
    pub obj_value: f64,
    pub inf_pr: f64,
    pub inf_du: f64,
    pub mu: f64,
    pub d_norm: f64,
    pub regularization_size: f64,
    pub alpha_du: f64,
    pub alpha_pr: f64,
    pub ls_trials: usize,
    /// Current primal iterate, when the host exposes it.
    pub x: Option<&'a [f64]>,
}

/// Final iterate and dual information handed over at termination.
#[derive(Debug, Clone, Copy)]
pub struct FinalIterate<'a> {
    pub status: SolverStatus,
    pub x: &'a [f64],
    pub z_lower: &'a [f64],
    pub z_upper: &'a [f64],
    pub g: &'a [f64],
    pub lambda: &'a [f64],
    pub obj_value: f64,
}

/// Capability set a problem model exposes to the host.
pub trait NlpProblem {
    fn nlp_info(&self) -> NlpInfo;

    /// Fill variable and constraint bounds.
    fn bounds(
        &self,
        x_lower: &mut [f64],
        x_upper: &mut [f64],
        g_lower: &mut [f64],
        g_upper: &mut [f64],
    ) -> Result<()>;

    fn starting_point(&self, init: StartingPoint<'_>) -> Result<()>;

    fn eval_f(&mut self, x: &[f64], new_x: bool) -> Result<f64>;

    fn eval_grad_f(&mut self, x: &[f64], new_x: bool, grad: &mut [f64]) -> Result<()>;

    fn eval_g(&mut self, x: &[f64], new_x: bool, g: &mut [f64]) -> Result<()>;

    /// Sparsity pattern of the constraint Jacobian as `(rows, cols)` pairs.
    fn jacobian_structure(&self, rows: &mut [usize], cols: &mut [usize]) -> Result<()>;

    /// Jacobian values in the order of [`NlpProblem::jacobian_structure`].
    fn eval_jac_g(&mut self, x: &[f64], new_x: bool, values: &mut [f64]) -> Result<()>;

    /// Sparsity pattern of the Lagrangian Hessian (lower triangle).
    fn hessian_structure(&self, rows: &mut [usize], cols: &mut [usize]) -> Result<()>;

    /// `obj_factor * ∇²f + Σ_i lambda_i ∇²g_i`, in the order of [`NlpProblem::hessian_structure`].
    fn eval_h(
        &mut self,
        x: &[f64],
        new_x: bool,
        obj_factor: f64,
        lambda: &[f64],
        new_lambda: bool,
        values: &mut [f64],
    ) -> Result<()>;

    /// Called once per iteration; returning `false` asks the host to stop.
    fn intermediate_callback(&mut self, _report: &IterationReport<'_>) -> bool {
        true
    }

    fn finalize_solution(&mut self, result: FinalIterate<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converged_statuses() {
        assert!(SolverStatus::Success.is_converged());
        assert!(SolverStatus::StopAtAcceptablePoint.is_converged());
        assert!(SolverStatus::FeasiblePointFound.is_converged());
        assert!(!SolverStatus::MaxIterationsExceeded.is_converged());
        assert!(!SolverStatus::RestorationFailure.is_converged());
        assert!(!SolverStatus::InvalidNumberDetected.is_converged());
    }

    #[test]
    fn primal_request_leaves_duals_unset() {
        let mut x = [0.0; 3];
        let init = StartingPoint::primal(&mut x);
        assert!(init.x.is_some());
        assert!(init.z_lower.is_none() && init.z_upper.is_none() && init.lambda.is_none());
    }
}
