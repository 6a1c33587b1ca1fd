//! Stability-polynomial constraint evaluators.
//!
//! For every evaluation point `λ_i` the constraint value is `|P(z_i)|` with
//! `z_i` the scaled eigenvalue and
//!
//! ```text
//! P(z) = 1 + z * Q(z),   Q(z) = [1 - z / d] * Π_j (1 - z / r_j)(1 - z / conj(r_j))
//! ```
//!
//! where each pair root `r_j = a_j + i b_j` has its real part taken from the
//! decision vector and its imaginary part from an [`ImagProfile`] (the spectrum
//! itself or its hull). The bracketed real seed root `d` exists only when `Q`
//! has odd degree.
//!
//! Everything here is generic over [`Scalar`] so the same code yields values
//! (`f64`) and exact derivatives (`Dual`, `HyperDual`).

use crate::interpolation::ImagProfile;
use crate::spectrum::Spectrum;
use crate::traits::{ConstraintSystem, Scalar};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// How the scale variable enters the eigenvalues and roots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepScaling {
    /// Points are pre-scaled by `dt_exp`; `z = λ̃ / dt_exp * s` and the roots
    /// live directly in the `z`-plane.
    ReferenceStep { dt_exp: f64 },
    /// `z = λ * s`; the roots are scaled by `s` as well.
    RootScaled,
}

impl StepScaling {
    fn eigenvalue<T: Scalar>(&self, re: f64, im: f64, scale: T) -> (T, T) {
        match *self {
            StepScaling::ReferenceStep { dt_exp } => {
                (T::lift(re / dt_exp) * scale, T::lift(im / dt_exp) * scale)
            }
            StepScaling::RootScaled => (T::lift(re) * scale, T::lift(im) * scale),
        }
    }

    /// Maps a root coordinate and its profile value to `(a, b)` in the `z`-plane.
    fn root<T: Scalar>(&self, root: T, imag: T, scale: T) -> (T, T) {
        match *self {
            StepScaling::ReferenceStep { .. } => (root, imag),
            StepScaling::RootScaled => (root * scale, scale * imag),
        }
    }

    fn seed<T: Scalar>(&self, root: T, scale: T) -> T {
        match *self {
            StepScaling::ReferenceStep { .. } => root,
            StepScaling::RootScaled => root * scale,
        }
    }
}

/// Entry point of the product over root factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Factorization {
    /// Even-degree `Q`: every root contributes a conjugate pair.
    Paired,
    /// Odd-degree `Q`: root `i_min` is a real seed root, the rest are pairs.
    Seeded { i_min: usize },
}

impl Factorization {
    pub fn seed_index(&self) -> Option<usize> {
        match *self {
            Factorization::Paired => None,
            Factorization::Seeded { i_min } => Some(i_min),
        }
    }
}

/// Evaluates `|P(z_i)|` for every point of `points`.
#[derive(Debug, Clone)]
pub struct StabilityConstraints<'a, P> {
    points: &'a Spectrum,
    profile: &'a P,
    scaling: StepScaling,
    factorization: Factorization,
    num_roots: usize,
}

impl<'a, P: ImagProfile> StabilityConstraints<'a, P> {
    pub fn new(
        points: &'a Spectrum,
        profile: &'a P,
        scaling: StepScaling,
        factorization: Factorization,
        num_roots: usize,
    ) -> Self {
        Self {
            points,
            profile,
            scaling,
            factorization,
            num_roots,
        }
    }

    pub fn num_roots(&self) -> usize {
        self.num_roots
    }

    pub fn scaling(&self) -> StepScaling {
        self.scaling
    }

    pub fn factorization(&self) -> Factorization {
        self.factorization
    }

    /// Scaled eigenvalue `z_i` as a complex number.
    pub fn scaled_point<T: Scalar>(&self, x: &[T], index: usize) -> Complex<T> {
        let (re, im) = self.scaling.eigenvalue(
            self.points.real()[index],
            self.points.imag()[index],
            x[self.num_roots],
        );
        Complex::new(re, im)
    }

    /// Pair root `a + ib` of decision variable `j` in the `z`-plane.
    pub fn pair_root<T: Scalar>(&self, x: &[T], j: usize) -> Complex<T> {
        let scale = x[self.num_roots];
        let (a, b) = self.scaling.root(x[j], self.profile.imag_at(x[j]), scale);
        Complex::new(a, b)
    }

    /// Real seed root in the `z`-plane, if the factorization has one.
    pub fn seed_root<T: Scalar>(&self, x: &[T]) -> Option<T> {
        self.factorization
            .seed_index()
            .map(|i_min| self.scaling.seed(x[i_min], x[self.num_roots]))
    }

    /// Factors `(1 - z/r)` and `(1 - z/conj(r))` for `r = a + ib`, normalised by `|r|²`.
    fn pair_factors<T: Scalar>(
        &self,
        root: Complex<T>,
        ev: Complex<T>,
    ) -> (Complex<T>, Complex<T>) {
        let (a, b) = (root.re, root.im);
        let (real_ev, imag_ev) = (ev.re, ev.im);
        let two = T::lift(2.0);

        let radius = a * a + b * b;
        let real = (a * (a - real_ev) + b * (b - imag_ev)) / radius;
        let imag = (b * real_ev - a * imag_ev) / radius;

        (
            Complex::new(real, imag),
            Complex::new(
                real + two * b * imag_ev / radius,
                imag - two * b * real_ev / radius,
            ),
        )
    }

    fn entry<T: Scalar>(&self, x: &[T], index: usize) -> T {
        let ev = self.scaled_point(x, index);
        let seed = self.factorization.seed_index();
        let mut roots = (0..self.num_roots).filter(|&j| Some(j) != seed);

        let mut prod = match self.seed_root(x) {
            Some(d) => Complex::new(T::one() - ev.re / d, -ev.im / d),
            None => match roots.next() {
                Some(first) => {
                    let (lower, upper) = self.pair_factors(self.pair_root(x, first), ev);
                    lower * upper
                }
                None => Complex::new(T::one(), T::zero()),
            },
        };

        for j in roots {
            let (lower, upper) = self.pair_factors(self.pair_root(x, j), ev);
            prod *= lower;
            prod *= upper;
        }

        // From the auxiliary polynomial Q to P = 1 + z Q.
        prod *= ev;
        prod = prod + T::one();

        prod.norm()
    }
}

impl<'a, P: ImagProfile, T: Scalar> ConstraintSystem<T> for StabilityConstraints<'a, P> {
    fn num_variables(&self) -> usize {
        self.num_roots + 1
    }

    fn num_constraints(&self) -> usize {
        self.points.len()
    }

    fn apply_single(&self, x: &[T], index: usize) -> T {
        self.entry(x, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::{ConstraintDerivatives, Dual, HyperDual};
    use crate::interpolation::Interpolant;
    use std::f64::consts::PI;

    /// Upper half of the ellipse centred at -1 with semi-axes 1 and 0.5.
    fn ellipse(n: usize) -> Spectrum {
        let (real, imag): (Vec<f64>, Vec<f64>) = (0..n)
            .map(|k| {
                let theta = PI * (1.0 - k as f64 / (n - 1) as f64);
                (-1.0 + theta.cos(), 0.5 * theta.sin())
            })
            .unzip();
        Spectrum::new(real, imag).expect("sorted ellipse")
    }

    /// Hull: the same ellipse inflated by 20 %, sampled coarser.
    fn hull() -> Spectrum {
        let spectrum = ellipse(7);
        Spectrum::new(
            spectrum.real().iter().map(|re| 1.2 * (re + 1.0) - 1.0).collect(),
            spectrum.imag().iter().map(|im| 1.2 * im).collect(),
        )
        .expect("sorted hull")
    }

    const SCALINGS: [StepScaling; 2] = [
        StepScaling::ReferenceStep { dt_exp: 1.7 },
        StepScaling::RootScaled,
    ];

    fn x_paired() -> Vec<f64> {
        vec![-1.55, -0.85, -0.3, 0.45]
    }

    fn x_seeded() -> Vec<f64> {
        vec![-1.75, -1.15, -0.45, 0.55]
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs())),
            "{a} vs {b} (tol {tol})"
        );
    }

    #[test]
    fn single_index_matches_vector_in_all_modes() {
        let spectrum = ellipse(21);
        let hull = hull();
        let direct = Interpolant::from_spectrum(&spectrum).expect("profile");
        let relaxed = Interpolant::from_spectrum(&hull)
            .expect("profile")
            .with_slope_cache();

        for scaling in SCALINGS {
            for (factorization, x) in [
                (Factorization::Paired, x_paired()),
                (Factorization::Seeded { i_min: 2 }, x_seeded()),
            ] {
                let by_spectrum =
                    StabilityConstraints::new(&spectrum, &direct, scaling, factorization, 3);
                let by_hull =
                    StabilityConstraints::new(&spectrum, &relaxed, scaling, factorization, 3);
                for system in [by_spectrum, by_hull] {
                    let mut g = vec![0.0; spectrum.len()];
                    system.apply(&x, &mut g);
                    for (i, &value) in g.iter().enumerate() {
                        assert_eq!(value, system.apply_single(&x, i));
                        assert!(value.is_finite());
                    }
                }
            }
        }
    }

    #[test]
    fn single_seed_root_matches_closed_form() {
        // One real eigenvalue, Q(z) = 1 - z / x0, so P(z) = 1 + z (1 - z / x0).
        let spectrum = Spectrum::new(vec![-1.5], vec![0.0]).expect("single point");
        let profile = Interpolant::new(vec![-2.0, 0.0], vec![0.0, 0.0]).expect("profile");
        let x: [f64; 2] = [-3.0, 0.8];

        let reference = StabilityConstraints::new(
            &spectrum,
            &profile,
            StepScaling::ReferenceStep { dt_exp: 2.0 },
            Factorization::Seeded { i_min: 0 },
            1,
        );
        let z = -1.5 / 2.0 * 0.8;
        let expected = (1.0 + (1.0 - z / x[0]) * z).abs();
        assert_eq!(reference.apply_single(&x, 0), expected);

        let root_scaled = StabilityConstraints::new(
            &spectrum,
            &profile,
            StepScaling::RootScaled,
            Factorization::Seeded { i_min: 0 },
            1,
        );
        let z = -1.5 * 0.8;
        let expected = (1.0 + (1.0 - z / (x[0] * 0.8)) * z).abs();
        assert_eq!(root_scaled.apply_single(&x, 0), expected);
    }

    /// A finite seed root keeps the `-z² / d` term, so this only approaches
    /// forward Euler; the infinite case below is exact.
    #[test]
    fn far_seed_root_reduces_to_forward_euler() {
        let spectrum = Spectrum::new(vec![-1.5], vec![0.0]).expect("single point");
        let profile = Interpolant::new(vec![-2.0, 0.0], vec![0.0, 0.0]).expect("profile");
        let system = StabilityConstraints::new(
            &spectrum,
            &profile,
            StepScaling::RootScaled,
            Factorization::Seeded { i_min: 0 },
            1,
        );
        let value = system.apply_single(&[-1e12_f64, 0.6], 0);
        assert_close(value, (1.0f64 - 1.5 * 0.6).abs(), 1e-10);
    }

    #[test]
    fn infinite_seed_root_is_exactly_forward_euler() {
        // 1 - z / -inf is exactly 1 and the imaginary part is a signed zero.
        let spectrum = Spectrum::new(vec![-1.5], vec![0.0]).expect("single point");
        let profile = Interpolant::new(vec![-2.0, 0.0], vec![0.0, 0.0]).expect("profile");
        let x: [f64; 2] = [f64::NEG_INFINITY, 0.8];
        let seeded = Factorization::Seeded { i_min: 0 };

        let reference = StabilityConstraints::new(
            &spectrum,
            &profile,
            StepScaling::ReferenceStep { dt_exp: 2.0 },
            seeded,
            1,
        );
        assert_eq!(reference.apply_single(&x, 0), (1.0 + (-1.5 / 2.0) * 0.8_f64).abs());

        let root_scaled =
            StabilityConstraints::new(&spectrum, &profile, StepScaling::RootScaled, seeded, 1);
        assert_eq!(root_scaled.apply_single(&x, 0), (1.0 + -1.5 * 0.8_f64).abs());
    }

    #[test]
    fn pair_factors_are_the_conjugate_root_factors() {
        let spectrum = ellipse(9);
        let profile = Interpolant::from_spectrum(&spectrum).expect("profile");
        let x = x_paired();
        for scaling in SCALINGS {
            let system =
                StabilityConstraints::new(&spectrum, &profile, scaling, Factorization::Paired, 3);
            let r = system.pair_root(&x, 1);
            let z = system.scaled_point(&x, 4);
            let (lower, upper) = system.pair_factors(r, z);
            let one = Complex::new(1.0, 0.0);
            let expected_lower = one - z / r;
            let expected_upper = one - z / r.conj();
            assert!((lower - expected_lower).norm() < 1e-13);
            assert!((upper - expected_upper).norm() < 1e-13);
        }
    }

    #[test]
    fn hull_profile_leaves_a_lone_seed_root_unchanged() {
        // Q(z) = 1 + z / 2 puts the stability region around the disk |z + 1| <= 1.
        let circle = |radius: f64, n: usize| {
            let (real, imag): (Vec<f64>, Vec<f64>) = (0..n)
                .map(|k| {
                    let theta = PI * (1.0 - k as f64 / (n - 1) as f64);
                    (-1.0 + radius * theta.cos(), radius * theta.sin())
                })
                .unzip();
            Spectrum::new(real, imag).expect("sorted circle")
        };
        let hull = circle(0.9, 64);
        let spectrum = circle(0.3, 15);
        let hull_profile = Interpolant::from_spectrum(&hull).expect("profile");
        let spectrum_profile = Interpolant::from_spectrum(&spectrum).expect("profile");
        let scaling = StepScaling::RootScaled;
        let seeded = Factorization::Seeded { i_min: 0 };
        let relaxed = StabilityConstraints::new(&spectrum, &hull_profile, scaling, seeded, 1);
        let direct = StabilityConstraints::new(&spectrum, &spectrum_profile, scaling, seeded, 1);
        assert_eq!(ConstraintSystem::<f64>::num_constraints(&relaxed), spectrum.len());

        let mut feasible = 0;
        for k in 1..=60 {
            let s = 0.05 * k as f64;
            // Seed -2 / s keeps the polynomial fixed at 1 + z + z² / 2.
            let x = [-2.0 / s, s];
            let mut g_relaxed = vec![0.0; spectrum.len()];
            let mut g_direct = vec![0.0; spectrum.len()];
            relaxed.apply(&x, &mut g_relaxed);
            direct.apply(&x, &mut g_direct);

            assert_eq!(g_relaxed, g_direct, "s = {s}");
            if g_relaxed.iter().all(|&g| g <= 1.0) {
                feasible += 1;
            }
        }
        assert!(feasible > 0 && feasible < 60);
    }

    #[test]
    fn hull_profile_only_moves_pair_root_imaginary_parts() {
        let spectrum = ellipse(21);
        let hull = hull();
        let hull_profile = Interpolant::from_spectrum(&hull).expect("profile");
        let spectrum_profile = Interpolant::from_spectrum(&spectrum).expect("profile");
        let x = x_paired();
        let scale = x[3];

        for scaling in SCALINGS {
            let relaxed = StabilityConstraints::new(
                &spectrum,
                &hull_profile,
                scaling,
                Factorization::Paired,
                3,
            );
            let direct = StabilityConstraints::new(
                &spectrum,
                &spectrum_profile,
                scaling,
                Factorization::Paired,
                3,
            );
            for j in 0..3 {
                let hull_root = relaxed.pair_root(&x, j);
                let spectrum_root = direct.pair_root(&x, j);
                assert_eq!(hull_root.re, spectrum_root.re);
                let expected_im = match scaling {
                    StepScaling::ReferenceStep { .. } => hull_profile.value(x[j]),
                    StepScaling::RootScaled => scale * hull_profile.value(x[j]),
                };
                assert_eq!(hull_root.im, expected_im);
                assert!((hull_root.im - spectrum_root.im).abs() > 1e-6);
            }
            for i in 0..spectrum.len() {
                assert_eq!(relaxed.scaled_point(&x, i), direct.scaled_point(&x, i));
            }

            let mut g_relaxed = vec![0.0; spectrum.len()];
            let mut g_direct = vec![0.0; spectrum.len()];
            relaxed.apply(&x, &mut g_relaxed);
            direct.apply(&x, &mut g_direct);
            assert!(g_relaxed
                .iter()
                .zip(&g_direct)
                .any(|(a, b)| (a - b).abs() > 1e-8));
        }
    }

    #[test]
    fn dual_jacobian_matches_central_differences() {
        let spectrum = ellipse(15);
        let hull = hull();
        let profile = Interpolant::from_spectrum(&hull)
            .expect("profile")
            .with_slope_cache();
        let h = 1e-6;

        for scaling in SCALINGS {
            for (factorization, x) in [
                (Factorization::Paired, x_paired()),
                (Factorization::Seeded { i_min: 2 }, x_seeded()),
            ] {
                let system =
                    StabilityConstraints::new(&spectrum, &profile, scaling, factorization, 3);
                let jacobian = ConstraintDerivatives::new(&system).jacobian(&x);
                for j in 0..x.len() {
                    let mut plus = x.clone();
                    let mut minus = x.clone();
                    plus[j] += h;
                    minus[j] -= h;
                    for i in 0..spectrum.len() {
                        let fd = (system.apply_single(&plus, i) - system.apply_single(&minus, i))
                            / (2.0 * h);
                        assert_close(jacobian[(i, j)], fd, 1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn hyper_dual_hessian_matches_differences_of_jacobian() {
        let spectrum = ellipse(11);
        let profile = Interpolant::from_spectrum(&spectrum).expect("profile");
        let h = 1e-5;
        let weights: Vec<f64> = (0..spectrum.len()).map(|i| 0.1 + 0.05 * i as f64).collect();

        for scaling in SCALINGS {
            let x = x_seeded();
            let system = StabilityConstraints::new(
                &spectrum,
                &profile,
                scaling,
                Factorization::Seeded { i_min: 2 },
                3,
            );
            let derivatives = ConstraintDerivatives::new(&system);
            let hess = derivatives.weighted_hessian(&x, &weights);
            let weighted_gradient = |point: &[f64]| {
                let jac = derivatives.jacobian(point);
                (0..x.len())
                    .map(|j| (0..spectrum.len()).map(|i| weights[i] * jac[(i, j)]).sum::<f64>())
                    .collect::<Vec<f64>>()
            };
            for k in 0..x.len() {
                let mut plus = x.clone();
                let mut minus = x.clone();
                plus[k] += h;
                minus[k] -= h;
                let gp = weighted_gradient(&plus);
                let gm = weighted_gradient(&minus);
                for j in 0..x.len() {
                    let fd = (gp[j] - gm[j]) / (2.0 * h);
                    assert_close(hess[(j, k)], fd, 1e-5);
                }
            }
        }
    }

    #[test]
    fn instantiations_agree_on_values() {
        let spectrum = ellipse(9);
        let profile = Interpolant::from_spectrum(&spectrum).expect("profile");
        let x = x_paired();
        let system = StabilityConstraints::new(
            &spectrum,
            &profile,
            StepScaling::ReferenceStep { dt_exp: 1.7 },
            Factorization::Paired,
            3,
        );
        let dual_x: Vec<Dual> = x.iter().map(|&v| Dual::new(v, 0.0)).collect();
        let hyper_x: Vec<HyperDual> = x.iter().map(|&v| HyperDual::constant(v)).collect();
        for i in 0..spectrum.len() {
            let plain = system.apply_single(&x, i);
            assert_close(system.apply_single(&dual_x, i).val, plain, 1e-15);
            assert_close(system.apply_single(&hyper_x, i).val, plain, 1e-15);
        }
    }

    #[test]
    fn zero_radius_surfaces_as_non_finite() {
        let spectrum = ellipse(9);
        // Profile passing through the origin, queried at the origin.
        let profile = Interpolant::new(vec![-1.0, 0.0], vec![1.0, 0.0]).expect("profile");
        let system = StabilityConstraints::new(
            &spectrum,
            &profile,
            StepScaling::RootScaled,
            Factorization::Paired,
            1,
        );
        let value = system.apply_single(&[0.0_f64, 0.5], 3);
        assert!(!value.is_finite());
    }
}
