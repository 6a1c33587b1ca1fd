//! Problem configuration handed over by the external loader.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Which of the two scale embeddings the model uses.
///
/// `ReferenceStep`: the spectrum is pre-multiplied by the expected step
/// `dt_exp` and the scale variable is the time step itself.
/// `RootScaled`: the spectrum is pre-multiplied by `dt_ref` and the scale
/// variable is the step in units of `dt_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalingMode {
    #[default]
    ReferenceStep,
    RootScaled,
}

/// Tunables of the problem model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Gap kept between the largest admissible root and the right end of the spectrum.
    pub real_margin: f64,
    /// Smallest admissible time step.
    pub min_step: f64,
    /// Largest admissible time step; unbounded when `None`.
    pub max_step: Option<f64>,
    /// Primal infeasibility up to which an iterate counts as feasible.
    pub feasibility_tolerance: f64,
    /// Position of the real seed root for even degrees.
    pub seed_index: Option<usize>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            real_margin: 1e-3,
            min_step: 1e-9,
            max_step: None,
            feasibility_tolerance: 1e-8,
            seed_index: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemConfig {
    pub num_stages: usize,
    pub cons_order: usize,
    pub num_stages_ref: usize,
    /// Admissible step of the reference scheme with `num_stages_ref` stages.
    pub dt_ref: f64,
    #[serde(default)]
    pub scaling: ScalingMode,
    #[serde(default)]
    pub settings: ModelSettings,
}

impl ProblemConfig {
    pub fn new(num_stages: usize, cons_order: usize, num_stages_ref: usize, dt_ref: f64) -> Self {
        Self {
            num_stages,
            cons_order,
            num_stages_ref,
            dt_ref,
            scaling: ScalingMode::default(),
            settings: ModelSettings::default(),
        }
    }

    pub fn with_scaling(mut self, scaling: ScalingMode) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Expected step: admissible steps grow linearly with the stage count.
    pub fn dt_exp(&self) -> f64 {
        self.dt_ref * self.num_stages as f64 / self.num_stages_ref as f64
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.num_stages_ref == 0 {
            return Err(ModelError::Config(
                "reference stage count must be positive".to_string(),
            ));
        }
        if !(self.dt_ref.is_finite() && self.dt_ref > 0.0) {
            return Err(ModelError::Config(format!(
                "reference step must be positive and finite, got {}",
                self.dt_ref
            )));
        }

        let settings = &self.settings;
        if !(settings.real_margin.is_finite() && settings.real_margin >= 0.0) {
            return Err(ModelError::Config(format!(
                "real margin must be non-negative, got {}",
                settings.real_margin
            )));
        }
        if !(settings.min_step.is_finite() && settings.min_step > 0.0) {
            return Err(ModelError::Config(format!(
                "minimum step must be positive, got {}",
                settings.min_step
            )));
        }
        if let Some(max_step) = settings.max_step {
            if max_step.is_nan() || max_step <= settings.min_step {
                return Err(ModelError::Config(format!(
                    "maximum step {max_step} must exceed minimum step {}",
                    settings.min_step
                )));
            }
        }
        if !(settings.feasibility_tolerance >= 0.0) {
            return Err(ModelError::Config(format!(
                "feasibility tolerance must be non-negative, got {}",
                settings.feasibility_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_exp_scales_with_stage_ratio() {
        let config = ProblemConfig::new(12, 1, 4, 0.01);
        assert!((config.dt_exp() - 0.03).abs() < 1e-15);
    }

    #[test]
    fn defaults_validate() {
        let config = ProblemConfig::new(6, 1, 2, 0.1);
        assert!(config.validate().is_ok());
        assert_eq!(config.scaling, ScalingMode::ReferenceStep);
    }

    #[test]
    fn rejects_bad_steps() {
        assert!(ProblemConfig::new(6, 1, 0, 0.1).validate().is_err());
        assert!(ProblemConfig::new(6, 1, 2, 0.0).validate().is_err());
        assert!(ProblemConfig::new(6, 1, 2, f64::NAN).validate().is_err());

        let settings = ModelSettings {
            max_step: Some(1e-12),
            ..ModelSettings::default()
        };
        let err = ProblemConfig::new(6, 1, 2, 0.1)
            .with_settings(settings)
            .validate()
            .expect_err("max below min");
        assert!(format!("{err}").contains("must exceed minimum step"));

        let settings = ModelSettings {
            real_margin: -1.0,
            ..ModelSettings::default()
        };
        assert!(ProblemConfig::new(6, 1, 2, 0.1)
            .with_settings(settings)
            .validate()
            .is_err());
    }
}
