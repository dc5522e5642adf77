//! 1D FFT helpers around rustfft.
//!
//! Convention matches numpy:
//! - Forward transform: unnormalized, kernel e^{-2πi kn/N}
//! - Inverse transform: unnormalized here, callers apply 1/N

use std::fmt;
use std::sync::Arc;

use gle_types::error::{GleError, GleResult};
use ndarray::{Array1, ArrayView1};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Smallest power of two that holds a linear correlation of two length-`n` series.
pub fn padded_len(n: usize) -> usize {
    (2 * n).saturating_sub(1).max(1).next_power_of_two()
}

/// Forward and inverse plans of one fixed length, reused across many series.
#[derive(Clone)]
pub struct FftPair {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for FftPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftPair").field("len", &self.len).finish()
    }
}

impl FftPair {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        FftPair {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero-pad `x` to the plan length and transform. A series longer than
    /// the plan is an error.
    pub fn forward_real(&self, x: ArrayView1<f64>) -> GleResult<Array1<Complex64>> {
        if x.len() > self.len {
            return Err(GleError::LinAlg(format!(
                "series of length {} exceeds FFT length {}",
                x.len(),
                self.len
            )));
        }
        let mut data = vec![Complex64::new(0.0, 0.0); self.len];
        for (dst, &v) in data.iter_mut().zip(x.iter()) {
            *dst = Complex64::new(v, 0.0);
        }
        self.forward_in_place(&mut data);
        Ok(Array1::from(data))
    }

    pub fn forward_in_place(&self, data: &mut [Complex64]) {
        self.forward.process(data);
    }

    /// Unnormalized inverse transform.
    pub fn inverse_in_place(&self, data: &mut [Complex64]) {
        self.inverse.process(data);
    }
}

/// Linear convolution of two real sequences, length `a.len() + b.len() - 1`.
pub fn convolve(a: ArrayView1<f64>, b: ArrayView1<f64>) -> GleResult<Array1<f64>> {
    if a.is_empty() || b.is_empty() {
        return Ok(Array1::zeros(0));
    }
    let out_len = a.len() + b.len() - 1;
    let plan = FftPair::new(out_len.next_power_of_two());
    let fa = plan.forward_real(a)?;
    let fb = plan.forward_real(b)?;
    let mut prod: Vec<Complex64> = fa.iter().zip(fb.iter()).map(|(x, y)| x * y).collect();
    plan.inverse_in_place(&mut prod);
    let norm = 1.0 / plan.len() as f64;
    Ok(Array1::from_iter(prod.iter().take(out_len).map(|z| z.re * norm)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(1), 1);
        assert_eq!(padded_len(3), 8);
        assert_eq!(padded_len(4), 8);
        assert_eq!(padded_len(5), 16);
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let x = array![1.0, -2.0, 0.5, 3.0, 0.25];
        let plan = FftPair::new(8);
        let mut spec = plan.forward_real(x.view()).unwrap();
        plan.inverse_in_place(spec.as_slice_mut().unwrap());
        for k in 0..8 {
            let expected = if k < x.len() { x[k] } else { 0.0 };
            assert!((spec[k].re / 8.0 - expected).abs() < 1e-12);
            assert!(spec[k].im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_dc_bin_is_sum() {
        let x = array![1.0, 2.0, 3.0];
        let spec = FftPair::new(4).forward_real(x.view()).unwrap();
        assert!((spec[0].re - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_convolve_matches_direct() {
        let a = array![1.0, 2.0, -1.0, 0.5];
        let b = array![0.25, 0.5, 0.25];
        let c = convolve(a.view(), b.view()).unwrap();
        assert_eq!(c.len(), 6);
        for n in 0..6 {
            let mut direct = 0.0;
            for k in 0..b.len() {
                if n >= k && n - k < a.len() {
                    direct += a[n - k] * b[k];
                }
            }
            assert!((c[n] - direct).abs() < 1e-12, "n={n}: {} vs {direct}", c[n]);
        }
    }

    #[test]
    fn test_series_longer_than_plan_is_error() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let err = FftPair::new(4).forward_real(x.view()).unwrap_err();
        assert!(matches!(err, GleError::LinAlg(_)));
        assert!(FftPair::new(5).forward_real(x.view()).is_ok());
    }

    #[test]
    fn test_convolve_empty_input() {
        let a = Array1::<f64>::zeros(0);
        let b = array![1.0, 2.0];
        assert_eq!(convolve(a.view(), b.view()).unwrap().len(), 0);
    }
}
