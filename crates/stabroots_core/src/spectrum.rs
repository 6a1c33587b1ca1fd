//! Operator spectra and their boundary hulls.
//!
//! A [`Spectrum`] is a pair of equal-length real/imaginary sequences sorted
//! ascending on the real part. It never changes after construction; scaling by
//! a reference step produces a new spectrum.

use crate::error::{ModelError, ModelResult};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpectrumData")]
pub struct Spectrum {
    real: Vec<f64>,
    imag: Vec<f64>,
}

/// Unvalidated wire form of a [`Spectrum`].
#[derive(Debug, Clone, Deserialize)]
struct SpectrumData {
    real: Vec<f64>,
    imag: Vec<f64>,
}

impl TryFrom<SpectrumData> for Spectrum {
    type Error = ModelError;

    fn try_from(data: SpectrumData) -> ModelResult<Self> {
        Spectrum::new(data.real, data.imag)
    }
}

impl Spectrum {
    /// Builds a spectrum from already sorted parts.
    pub fn new(real: Vec<f64>, imag: Vec<f64>) -> ModelResult<Self> {
        if real.len() != imag.len() {
            return Err(ModelError::Spectrum(format!(
                "real and imaginary parts differ in length ({} vs {})",
                real.len(),
                imag.len()
            )));
        }
        if real.is_empty() {
            return Err(ModelError::Spectrum("no eigenvalues given".to_string()));
        }
        if let Some(index) = real
            .iter()
            .zip(&imag)
            .position(|(re, im)| !re.is_finite() || !im.is_finite())
        {
            return Err(ModelError::Spectrum(format!(
                "eigenvalue {index} is not finite"
            )));
        }
        if let Some(index) = real.windows(2).position(|w| w[1] < w[0]) {
            return Err(ModelError::Spectrum(format!(
                "real parts must be sorted ascending (entry {} > entry {})",
                index,
                index + 1
            )));
        }
        Ok(Self { real, imag })
    }

    /// Builds a spectrum from points in any order.
    pub fn from_points(points: &[Complex<f64>]) -> ModelResult<Self> {
        let mut sorted = points.to_vec();
        if sorted.iter().any(|p| p.re.is_nan()) {
            return Err(ModelError::Spectrum(
                "eigenvalue with NaN real part".to_string(),
            ));
        }
        sorted.sort_by(|a, b| a.re.total_cmp(&b.re));
        Self::new(
            sorted.iter().map(|p| p.re).collect(),
            sorted.iter().map(|p| p.im).collect(),
        )
    }

    /// Returns a copy with every eigenvalue multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> ModelResult<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ModelError::Spectrum(format!(
                "scale factor must be positive and finite, got {factor}"
            )));
        }
        Ok(Self {
            real: self.real.iter().map(|re| re * factor).collect(),
            imag: self.imag.iter().map(|im| im * factor).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub fn real(&self) -> &[f64] {
        &self.real
    }

    pub fn imag(&self) -> &[f64] {
        &self.imag
    }

    /// Smallest (most negative) real part.
    pub fn real_min(&self) -> f64 {
        self.real[0]
    }

    /// Largest real part.
    pub fn real_max(&self) -> f64 {
        self.real[self.real.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsorted_real_parts() {
        let err = Spectrum::new(vec![-1.0, -2.0], vec![0.0, 0.0]).expect_err("unsorted");
        assert!(format!("{err}").contains("sorted ascending"));
    }

    #[test]
    fn rejects_empty_and_mismatched() {
        assert!(Spectrum::new(Vec::new(), Vec::new()).is_err());
        assert!(Spectrum::new(vec![-1.0], vec![0.0, 1.0]).is_err());
        assert!(Spectrum::new(vec![f64::NAN], vec![0.0]).is_err());
    }

    #[test]
    fn from_points_sorts_by_real_part() {
        let spectrum = Spectrum::from_points(&[
            Complex::new(-0.5, 1.0),
            Complex::new(-2.0, 0.0),
            Complex::new(-1.0, 0.5),
        ])
        .expect("valid points");
        assert_eq!(spectrum.real(), &[-2.0, -1.0, -0.5]);
        assert_eq!(spectrum.imag(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn scaled_multiplies_both_parts() {
        let spectrum = Spectrum::new(vec![-2.0, 0.0], vec![0.0, 1.0]).expect("valid");
        let scaled = spectrum.scaled(0.5).expect("positive factor");
        assert_eq!(scaled.real(), &[-1.0, 0.0]);
        assert_eq!(scaled.imag(), &[0.0, 0.5]);
        assert_eq!(scaled.real_min(), -1.0);
        assert_eq!(scaled.real_max(), 0.0);
        assert!(spectrum.scaled(-1.0).is_err());
    }

    #[test]
    fn deserialization_runs_validation() {
        let data = SpectrumData {
            real: vec![0.0, -1.0],
            imag: vec![0.0, 0.0],
        };
        assert!(Spectrum::try_from(data).is_err());
    }
}
