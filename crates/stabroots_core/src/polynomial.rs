//! Monomial form of the stability polynomial at a fixed decision vector.

use crate::constraints::StabilityConstraints;
use crate::interpolation::ImagProfile;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// `P(z) = Σ_k c_k z^k` in the scaled variable `z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityPolynomial {
    coefficients: Vec<f64>,
}

impl StabilityPolynomial {
    /// Expands `1 + z Q(z)` from the roots `system` places at `x`.
    pub fn from_roots<P: ImagProfile>(system: &StabilityConstraints<'_, P>, x: &[f64]) -> Self {
        let seed = system.factorization().seed_index();

        let mut q = vec![1.0];
        if let Some(d) = system.seed_root(x) {
            q = multiply(&q, &[1.0, -1.0 / d]);
        }
        for j in (0..system.num_roots()).filter(|&j| Some(j) != seed) {
            let root = system.pair_root(x, j);
            let radius = root.norm_sqr();
            // (1 - z/r)(1 - z/conj(r)) = 1 - 2a/|r|² z + z²/|r|²
            q = multiply(&q, &[1.0, -2.0 * root.re / radius, 1.0 / radius]);
        }

        let mut coefficients = Vec::with_capacity(q.len() + 1);
        coefficients.push(1.0);
        coefficients.extend(q);
        Self { coefficients }
    }

    pub fn from_coefficients(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    /// Ascending coefficients, `c_0` first.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Horner evaluation at a complex point.
    pub fn eval(&self, z: Complex<f64>) -> Complex<f64> {
        self.coefficients
            .iter()
            .rev()
            .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z + c)
    }

    pub fn modulus(&self, z: Complex<f64>) -> f64 {
        self.eval(z).norm()
    }

    /// Highest `p` such that `c_k = 1/k!` for all `k <= p` (within `tol`).
    pub fn consistency_order(&self, tol: f64) -> usize {
        let mut factorial = 1.0;
        let mut order = 0;
        for (k, &c) in self.coefficients.iter().enumerate().skip(1) {
            factorial *= k as f64;
            if (c - 1.0 / factorial).abs() > tol {
                break;
            }
            order = k;
        }
        order
    }
}

fn multiply(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; lhs.len() + rhs.len() - 1];
    for (i, &a) in lhs.iter().enumerate() {
        for (j, &b) in rhs.iter().enumerate() {
            out[i + j] += a * b;
        }
    }
    out
}
