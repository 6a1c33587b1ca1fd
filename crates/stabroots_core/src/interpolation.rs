//! Piecewise-linear imaginary response along a sorted spectrum or hull.

use crate::error::{ModelError, ModelResult};
use crate::spectrum::Spectrum;
use crate::traits::Scalar;

/// Maps a real coordinate to the imaginary coordinate of a curve through the spectrum.
///
/// The constraint evaluators only need this capability, so the direct and
/// hull-relaxed variants differ solely in which profile they are handed.
pub trait ImagProfile {
    fn imag_at<T: Scalar>(&self, real: T) -> T;
}

/// Linear interpolant through `(real_k, imag_k)` with linear extrapolation.
#[derive(Debug, Clone)]
pub struct Interpolant {
    real: Vec<f64>,
    imag: Vec<f64>,
    slopes: Option<Vec<f64>>,
    /// Outermost segments with non-zero width, used for extrapolation.
    first: usize,
    last: usize,
}

impl Interpolant {
    pub fn new(real: Vec<f64>, imag: Vec<f64>) -> ModelResult<Self> {
        if real.len() != imag.len() {
            return Err(ModelError::Interpolation(format!(
                "{} real parts but {} imaginary parts",
                real.len(),
                imag.len()
            )));
        }
        if real.len() < 2 {
            return Err(ModelError::Interpolation(format!(
                "need at least two points, got {}",
                real.len()
            )));
        }
        if real.windows(2).any(|w| w[1] < w[0]) {
            return Err(ModelError::Interpolation(
                "real parts must be sorted ascending".to_string(),
            ));
        }
        let segments = real.len() - 1;
        let first = (0..segments).find(|&k| real[k + 1] > real[k]);
        let last = (0..segments).rev().find(|&k| real[k + 1] > real[k]);
        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(ModelError::Interpolation(
                    "all points share the same real part".to_string(),
                ))
            }
        };

        Ok(Self {
            real,
            imag,
            slopes: None,
            first,
            last,
        })
    }

    pub fn from_spectrum(spectrum: &Spectrum) -> ModelResult<Self> {
        Self::new(spectrum.real().to_vec(), spectrum.imag().to_vec())
    }

    /// Precomputes the per-segment slopes.
    pub fn with_slope_cache(mut self) -> Self {
        self.slopes = Some(self.compute_slopes());
        self
    }

    /// Replaces the sequence, keeping the slope cache (if any) consistent.
    pub fn set_points(&mut self, real: Vec<f64>, imag: Vec<f64>) -> ModelResult<()> {
        let cached = self.slopes.is_some();
        let mut next = Self::new(real, imag)?;
        if cached {
            next = next.with_slope_cache();
        }
        *self = next;
        Ok(())
    }

    pub fn slope_cache(&self) -> Option<&[f64]> {
        self.slopes.as_deref()
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub fn real_min(&self) -> f64 {
        self.real[0]
    }

    pub fn real_max(&self) -> f64 {
        self.real[self.real.len() - 1]
    }

    fn compute_slopes(&self) -> Vec<f64> {
        (0..self.real.len() - 1)
            .map(|k| self.segment_slope(k))
            .collect()
    }

    fn segment_slope(&self, k: usize) -> f64 {
        (self.imag[k + 1] - self.imag[k]) / (self.real[k + 1] - self.real[k])
    }

    fn slope(&self, k: usize) -> f64 {
        match &self.slopes {
            Some(slopes) => slopes[k],
            None => self.segment_slope(k),
        }
    }

    /// Imaginary coordinate at `r`.
    pub fn value<T: Scalar>(&self, r: T) -> T {
        let position = r.value();
        // Number of nodes with real part <= r; lands on the last of repeated nodes.
        let upper = self.real.partition_point(|&re| re <= position);

        let (segment, anchor) = if upper == 0 {
            (self.first, self.first)
        } else if upper >= self.real.len() {
            (self.last, self.real.len() - 1)
        } else {
            (upper - 1, upper - 1)
        };

        let offset = r - T::lift(self.real[anchor]);
        T::lift(self.imag[anchor]) + T::lift(self.slope(segment)) * offset
    }
}

impl ImagProfile for Interpolant {
    fn imag_at<T: Scalar>(&self, real: T) -> T {
        self.value(real)
    }
}
