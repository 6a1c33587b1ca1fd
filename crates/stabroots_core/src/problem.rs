//! Root optimization model exposed to the host through [`NlpProblem`].
//!
//! Decision vector: `x[0..num_roots]` are the real root coordinates,
//! `x[num_roots]` is the scale variable. The model maximizes the scale subject
//! to `|P(z_i)| <= 1` at every spectrum point. A hull, when given, only
//! replaces the curve the pair roots take their imaginary parts from.

pub mod cache;
pub mod snapshot;

pub use cache::EvalCache;
pub use snapshot::{BestIterate, Snapshot};

use crate::autodiff::{self, ConstraintDerivatives};
use crate::config::{ProblemConfig, ScalingMode};
use crate::constraints::{StabilityConstraints, StepScaling};
use crate::degree::DegreeLayout;
use crate::error::{check_len, ModelError, ModelResult};
use crate::interpolation::Interpolant;
use crate::nlp::{
    AlgorithmMode, FinalIterate, IterationReport, NlpInfo, NlpProblem,
    SolverStatus, StartingPoint,
};
use crate::polynomial::StabilityPolynomial;
use crate::spectrum::Spectrum;
use crate::traits::Scalar;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Reported result of a solve, possibly taken from the best-iterate snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolverStatus,
    pub x: Vec<f64>,
    pub z_lower: Vec<f64>,
    pub z_upper: Vec<f64>,
    pub lambda: Vec<f64>,
    /// Constraint values recomputed at `x`.
    pub g: Vec<f64>,
    pub objective: f64,
    pub dt: f64,
    /// Largest `|P(z_i)|` over the spectrum.
    pub max_modulus: f64,
    pub polynomial: StabilityPolynomial,
    /// Iteration of the snapshot when it replaced the host's final iterate.
    pub snapshot_iteration: Option<usize>,
}

impl Solution {
    pub fn from_snapshot(&self) -> bool {
        self.snapshot_iteration.is_some()
    }
}

#[derive(Debug)]
pub struct RootsProblem {
    config: ProblemConfig,
    layout: DegreeLayout,
    scaling: StepScaling,
    /// Scaled spectrum.
    spectrum: Spectrum,
    use_hull: bool,
    /// Interpolant through the scaled hull, or the spectrum without one.
    profile: Interpolant,
    /// `dt = x[num_roots] * step_unit`.
    step_unit: f64,
    root_bounds: (f64, f64),
    scale_bounds: (f64, f64),
    cache: EvalCache,
    best: BestIterate,
    solution: Option<Solution>,
}

fn constraint_system<'a>(
    points: &'a Spectrum,
    profile: &'a Interpolant,
    scaling: StepScaling,
    layout: &DegreeLayout,
) -> StabilityConstraints<'a, Interpolant> {
    StabilityConstraints::new(
        points,
        profile,
        scaling,
        layout.factorization(),
        layout.num_roots,
    )
}

fn objective<T: Scalar>(x: &[T], scale_index: usize) -> T {
    -x[scale_index]
}

fn ensure_finite(what: &'static str, values: &[f64]) -> ModelResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => {
            warn!("non-finite {what} at index {index}: {}", values[index]);
            Err(ModelError::NonFinite { what, index })
        }
        None => Ok(()),
    }
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

impl RootsProblem {
    pub fn new(
        config: ProblemConfig,
        spectrum: Spectrum,
        hull: Option<Spectrum>,
    ) -> ModelResult<Self> {
        config.validate()?;
        let layout = DegreeLayout::derive(
            config.num_stages,
            config.cons_order,
            config.settings.seed_index,
        )?;
        if layout.cons_order > 1 {
            warn!(
                "consistency order {} requested; the factored form enforces first order only",
                layout.cons_order
            );
        }

        let (scaling, table_factor, step_unit) = match config.scaling {
            ScalingMode::ReferenceStep => {
                let dt_exp = config.dt_exp();
                (StepScaling::ReferenceStep { dt_exp }, dt_exp, 1.0)
            }
            ScalingMode::RootScaled => (StepScaling::RootScaled, config.dt_ref, config.dt_ref),
        };

        let spectrum = spectrum.scaled(table_factor)?;
        let use_hull = hull.is_some();
        let profile = match hull {
            Some(hull) => Interpolant::from_spectrum(&hull.scaled(table_factor)?)?,
            None => Interpolant::from_spectrum(&spectrum)?,
        }
        .with_slope_cache();

        let margin = config.settings.real_margin;
        let root_bounds = (profile.real_min(), profile.real_max() - margin);
        if !(root_bounds.1 > root_bounds.0) {
            return Err(ModelError::Config(format!(
                "empty root interval [{}, {}] after margin {margin}",
                root_bounds.0, root_bounds.1
            )));
        }
        if root_bounds.1 >= 0.0 {
            warn!(
                "root interval reaches {} >= 0; roots may cross the origin",
                root_bounds.1
            );
        }

        let scale_bounds = (
            config.settings.min_step / step_unit,
            config
                .settings
                .max_step
                .map_or(f64::INFINITY, |max_step| max_step / step_unit),
        );

        let problem = Self {
            best: BestIterate::new(config.settings.feasibility_tolerance),
            config,
            layout,
            scaling,
            spectrum,
            use_hull,
            profile,
            step_unit,
            root_bounds,
            scale_bounds,
            cache: EvalCache::default(),
            solution: None,
        };

        info!(
            "root model: {} stages, {} roots (seed {:?}), {} constraints, {} profile, {:?} scaling, \
             feasibility tolerance {:e}",
            problem.layout.degree,
            problem.layout.num_roots,
            problem.layout.i_min,
            problem.num_constraints(),
            if problem.use_hull() { "hull" } else { "spectrum" },
            problem.config.scaling,
            problem.best.tolerance(),
        );
        Ok(problem)
    }

    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    pub fn layout(&self) -> &DegreeLayout {
        &self.layout
    }

    pub fn use_hull(&self) -> bool {
        self.use_hull
    }

    /// Scaled spectrum; one constraint per point.
    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    pub fn num_variables(&self) -> usize {
        self.layout.num_variables()
    }

    pub fn num_constraints(&self) -> usize {
        self.spectrum.len()
    }

    pub fn root_bounds(&self) -> (f64, f64) {
        self.root_bounds
    }

    pub fn scale_bounds(&self) -> (f64, f64) {
        self.scale_bounds
    }

    /// Time step encoded by a decision vector.
    pub fn dt(&self, x: &[f64]) -> f64 {
        x[self.layout.num_roots] * self.step_unit
    }

    pub fn best_iterate(&self) -> Option<&Snapshot> {
        self.best.best()
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    pub fn take_solution(&mut self) -> Option<Solution> {
        self.solution.take()
    }

    pub fn system(&self) -> StabilityConstraints<'_, Interpolant> {
        constraint_system(
            &self.spectrum,
            &self.profile,
            self.scaling,
            &self.layout,
        )
    }

    fn check_x(&self, x: &[f64]) -> ModelResult<()> {
        check_len("x", self.num_variables(), x.len())
    }

    fn constraint_values(&mut self, x: &[f64], new_x: bool) -> ModelResult<&[f64]> {
        self.cache.sync(x, new_x);
        let system = constraint_system(&self.spectrum, &self.profile, self.scaling, &self.layout);
        self.cache.constraints_with(|| {
            let values = ConstraintDerivatives::new(&system).values(x);
            ensure_finite("constraint", &values)?;
            Ok(values)
        })
    }

    fn build_solution(&self, result: &FinalIterate<'_>) -> ModelResult<Solution> {
        self.check_x(result.x)?;

        let snapshot = match self.best.best() {
            Some(snapshot) if !result.status.is_converged() => Some(snapshot),
            _ => None,
        };
        let x = match snapshot {
            Some(snapshot) => {
                warn!(
                    "solver stopped with {:?}; reporting best feasible iterate {} (dt = {:e})",
                    result.status, snapshot.iteration, snapshot.dt
                );
                snapshot.x.clone()
            }
            None => {
                if !result.status.is_converged() {
                    warn!(
                        "solver stopped with {:?} and no feasible iterate was recorded",
                        result.status
                    );
                }
                result.x.to_vec()
            }
        };

        let system = self.system();
        let g = ConstraintDerivatives::new(&system).values(&x);
        let max_modulus = max_of(&g);
        if !max_modulus.is_finite() {
            warn!("reported iterate has non-finite stability modulus");
        }

        Ok(Solution {
            status: result.status,
            objective: match snapshot {
                Some(_) => objective(&x, self.layout.num_roots),
                None => result.obj_value,
            },
            dt: self.dt(&x),
            polynomial: StabilityPolynomial::from_roots(&system, &x),
            z_lower: result.z_lower.to_vec(),
            z_upper: result.z_upper.to_vec(),
            lambda: result.lambda.to_vec(),
            g,
            max_modulus,
            snapshot_iteration: snapshot.map(|s| s.iteration),
            x,
        })
    }
}

impl NlpProblem for RootsProblem {
    fn nlp_info(&self) -> NlpInfo {
        let n = self.num_variables();
        let m = self.num_constraints();
        NlpInfo {
            num_variables: n,
            num_constraints: m,
            jacobian_nonzeros: m * n,
            hessian_nonzeros: n * (n + 1) / 2,
        }
    }

    fn bounds(
        &self,
        x_lower: &mut [f64],
        x_upper: &mut [f64],
        g_lower: &mut [f64],
        g_upper: &mut [f64],
    ) -> Result<()> {
        let n = self.num_variables();
        let m = self.num_constraints();
        check_len("x_lower", n, x_lower.len())?;
        check_len("x_upper", n, x_upper.len())?;
        check_len("g_lower", m, g_lower.len())?;
        check_len("g_upper", m, g_upper.len())?;

        let roots = self.layout.num_roots;
        x_lower[..roots].fill(self.root_bounds.0);
        x_upper[..roots].fill(self.root_bounds.1);
        x_lower[roots] = self.scale_bounds.0;
        x_upper[roots] = self.scale_bounds.1;

        g_lower.fill(f64::NEG_INFINITY);
        g_upper.fill(1.0);
        Ok(())
    }

    fn starting_point(&self, init: StartingPoint<'_>) -> Result<()> {
        let n = self.num_variables();
        let m = self.num_constraints();

        if let Some(x) = init.x {
            check_len("x", n, x.len())?;
            let roots = self.layout.num_roots;
            let (lo, hi) = self.root_bounds;
            let spacing = (hi - lo) / (roots + 1) as f64;
            for (j, slot) in x[..roots].iter_mut().enumerate() {
                *slot = lo + (j + 1) as f64 * spacing;
            }
            let scale = self.config.dt_ref / self.step_unit;
            x[roots] = scale.clamp(self.scale_bounds.0, self.scale_bounds.1);
        }
        if let Some(z_lower) = init.z_lower {
            check_len("z_lower", n, z_lower.len())?;
            z_lower.fill(0.0);
        }
        if let Some(z_upper) = init.z_upper {
            check_len("z_upper", n, z_upper.len())?;
            z_upper.fill(0.0);
        }
        if let Some(lambda) = init.lambda {
            check_len("lambda", m, lambda.len())?;
            lambda.fill(0.0);
        }
        Ok(())
    }

    fn eval_f(&mut self, x: &[f64], _new_x: bool) -> Result<f64> {
        self.check_x(x)?;
        Ok(objective(x, self.layout.num_roots))
    }

    fn eval_grad_f(&mut self, x: &[f64], _new_x: bool, grad: &mut [f64]) -> Result<()> {
        self.check_x(x)?;
        check_len("grad_f", x.len(), grad.len())?;
        let scale_index = self.layout.num_roots;
        grad.copy_from_slice(&autodiff::gradient(x, |v| objective(v, scale_index)));
        Ok(())
    }

    fn eval_g(&mut self, x: &[f64], new_x: bool, g: &mut [f64]) -> Result<()> {
        self.check_x(x)?;
        check_len("g", self.num_constraints(), g.len())?;
        let values = self
            .constraint_values(x, new_x)
            .context("evaluating stability constraints")?;
        g.copy_from_slice(values);
        Ok(())
    }

    fn jacobian_structure(&self, rows: &mut [usize], cols: &mut [usize]) -> Result<()> {
        let n = self.num_variables();
        let m = self.num_constraints();
        check_len("jacobian rows", m * n, rows.len())?;
        check_len("jacobian cols", m * n, cols.len())?;
        for i in 0..m {
            for j in 0..n {
                rows[i * n + j] = i;
                cols[i * n + j] = j;
            }
        }
        Ok(())
    }

    fn eval_jac_g(&mut self, x: &[f64], new_x: bool, values: &mut [f64]) -> Result<()> {
        self.check_x(x)?;
        let n = self.num_variables();
        let m = self.num_constraints();
        check_len("jacobian values", m * n, values.len())?;

        self.cache.sync(x, new_x);
        let system = constraint_system(&self.spectrum, &self.profile, self.scaling, &self.layout);
        let jacobian = self
            .cache
            .jacobian_with(|| {
                let jacobian = ConstraintDerivatives::new(&system).jacobian(x);
                ensure_finite("jacobian entry", jacobian.transpose().as_slice())?;
                Ok(jacobian)
            })
            .context("differentiating stability constraints")?;

        for i in 0..m {
            for j in 0..n {
                values[i * n + j] = jacobian[(i, j)];
            }
        }
        Ok(())
    }

    fn hessian_structure(&self, rows: &mut [usize], cols: &mut [usize]) -> Result<()> {
        let n = self.num_variables();
        check_len("hessian rows", n * (n + 1) / 2, rows.len())?;
        check_len("hessian cols", n * (n + 1) / 2, cols.len())?;
        let mut k = 0;
        for row in 0..n {
            for col in 0..=row {
                rows[k] = row;
                cols[k] = col;
                k += 1;
            }
        }
        Ok(())
    }

    fn eval_h(
        &mut self,
        x: &[f64],
        _new_x: bool,
        obj_factor: f64,
        lambda: &[f64],
        _new_lambda: bool,
        values: &mut [f64],
    ) -> Result<()> {
        self.check_x(x)?;
        let n = self.num_variables();
        check_len("lambda", self.num_constraints(), lambda.len())?;
        check_len("hessian values", n * (n + 1) / 2, values.len())?;

        let scale_index = self.layout.num_roots;
        let objective_hessian = autodiff::hessian(x, |v| objective(v, scale_index));
        let system = self.system();
        let constraint_hessian = ConstraintDerivatives::new(&system).weighted_hessian(x, lambda);

        let mut k = 0;
        for row in 0..n {
            for col in 0..=row {
                values[k] =
                    obj_factor * objective_hessian[(row, col)] + constraint_hessian[(row, col)];
                k += 1;
            }
        }
        ensure_finite("hessian entry", values).context("second derivatives of the Lagrangian")?;
        Ok(())
    }

    fn intermediate_callback(&mut self, report: &IterationReport<'_>) -> bool {
        debug!(
            "iter {:>4} {:?}: obj {:+.6e} inf_pr {:.2e} inf_du {:.2e} mu {:.2e} |d| {:.2e} \
             reg {:.1e} alpha_du {:.2e} alpha_pr {:.2e} ls {}",
            report.iteration,
            report.mode,
            report.obj_value,
            report.inf_pr,
            report.inf_du,
            report.mu,
            report.d_norm,
            report.regularization_size,
            report.alpha_du,
            report.alpha_pr,
            report.ls_trials,
        );

        if report.mode != AlgorithmMode::Regular {
            return true;
        }

        let scale_index = self.layout.num_roots;
        // Without a host iterate, the last evaluated point is used when it carries this objective.
        let x = match report.x {
            Some(x) => x.to_vec(),
            None if self.cache.x().len() == self.num_variables()
                && objective(self.cache.x(), scale_index) == report.obj_value =>
            {
                self.cache.x().to_vec()
            }
            None => return true,
        };
        if let Err(err) = self.check_x(&x) {
            warn!("ignoring iterate {}: {err}", report.iteration);
            return true;
        }

        let dt = self.dt(&x);
        if self.best.offer(&x, dt, report.inf_pr, report.iteration) {
            info!(
                "best feasible iterate {}: dt = {:e} (inf_pr {:.2e})",
                report.iteration, dt, report.inf_pr
            );
        }
        true
    }

    fn finalize_solution(&mut self, result: FinalIterate<'_>) {
        match self.build_solution(&result) {
            Ok(solution) => {
                info!(
                    "finished with {:?}: dt = {:e}, max |P| = {:.6}{}",
                    solution.status,
                    solution.dt,
                    solution.max_modulus,
                    if solution.from_snapshot() { " (snapshot)" } else { "" }
                );
                self.solution = Some(solution);
            }
            Err(err) => warn!("discarding final iterate: {err}"),
        }
    }
}
