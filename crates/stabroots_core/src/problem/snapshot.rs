//! Best feasible iterate seen while the host iterates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub x: Vec<f64>,
    pub dt: f64,
    pub inf_pr: f64,
    pub iteration: usize,
}

/// Keeps the feasible iterate with the largest time step.
#[derive(Debug, Clone)]
pub struct BestIterate {
    tolerance: f64,
    best: Option<Snapshot>,
}

impl BestIterate {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            best: None,
        }
    }

    /// Records the iterate if it is feasible and strictly improves `dt`.
    /// Returns whether the snapshot changed; on ties the earlier iterate stays.
    pub fn offer(&mut self, x: &[f64], dt: f64, inf_pr: f64, iteration: usize) -> bool {
        if !(inf_pr <= self.tolerance) || !dt.is_finite() {
            return false;
        }
        if let Some(best) = &self.best {
            if dt <= best.dt {
                return false;
            }
        }
        self.best = Some(Snapshot {
            x: x.to_vec(),
            dt,
            inf_pr,
            iteration,
        });
        true
    }

    pub fn best(&self) -> Option<&Snapshot> {
        self.best.as_ref()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}
