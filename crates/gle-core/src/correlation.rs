// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Correlation Estimator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Ensemble estimates of the two-time correlation C(t,i,s,j) = E[A_i(t) A_j(s)].
//!
//! Non-stationary: one Gram product of the flattened ensemble.
//! Stationary: lag averages, either summed directly or through zero-padded
//! cross spectra (O(N d² M log M) with M the padded length).

use gle_math::fft::{padded_len, FftPair};
use gle_types::config::{CorrelationMethod, Mode};
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::{ensure_finite, Correlation, TrajectoryEnsemble};
use ndarray::{Array2, Array3, Array4, Axis};
use num_complex::Complex64;
use tracing::debug;

/// Minimum number of samples per trajectory for differencing with
/// one-sided boundaries and a central interior.
pub const MIN_STEPS: usize = 3;

fn ensemble_dims(values: &Array3<f64>, stage: Stage) -> GleResult<(usize, usize, usize)> {
    let (n, t, d) = values.dim();
    if n == 0 {
        return Err(GleError::insufficient(stage, "ensemble has no realizations"));
    }
    if t < MIN_STEPS {
        return Err(GleError::insufficient(
            stage,
            format!("need at least {MIN_STEPS} time samples, got {t}"),
        ));
    }
    if d == 0 {
        return Err(GleError::shape(stage, "trajectories have zero observables"));
    }
    Ok((n, t, d))
}

/// C(t,i,s,j) = (1/N) Σ_n A_n(t,i) A_n(s,j), shape [T, d, T, d].
pub fn two_time_correlation(values: &Array3<f64>) -> GleResult<Array4<f64>> {
    let (n, t, d) = ensemble_dims(values, Stage::Correlation)?;
    let flat = Array2::from_shape_fn((n, t * d), |(k, c)| values[[k, c / d, c % d]]);
    let gram = flat.t().dot(&flat) / n as f64;
    gram.into_shape((t, d, t, d))
        .map_err(|e| GleError::shape(Stage::Correlation, e.to_string()))
}

/// Lag correlation by direct summation, shape [2T-1, d, d].
///
/// C(τ,i,j) = 1/(N (T-|τ|)) Σ_n Σ_s A_n(s+τ,i) A_n(s,j).
pub fn lag_correlation_direct(values: &Array3<f64>) -> GleResult<Array3<f64>> {
    let (n, t, d) = ensemble_dims(values, Stage::Correlation)?;
    let center = t - 1;
    let mut c = Array3::<f64>::zeros((2 * t - 1, d, d));
    for lag in -(center as isize)..=(center as isize) {
        let abs = lag.unsigned_abs();
        let s_lo = if lag < 0 { abs } else { 0 };
        let s_hi = if lag > 0 { t - abs } else { t };
        let norm = 1.0 / (n as f64 * (t - abs) as f64);
        let slot = (center as isize + lag) as usize;
        for i in 0..d {
            for j in 0..d {
                let mut acc = 0.0;
                for k in 0..n {
                    for s in s_lo..s_hi {
                        let shifted = (s as isize + lag) as usize;
                        acc += values[[k, shifted, i]] * values[[k, s, j]];
                    }
                }
                c[[slot, i, j]] = acc * norm;
            }
        }
    }
    Ok(c)
}

/// Lag correlation through zero-padded cross spectra, shape [2T-1, d, d].
///
/// Agrees with [`lag_correlation_direct`] to round-off.
pub fn lag_correlation_spectral(values: &Array3<f64>) -> GleResult<Array3<f64>> {
    let (n, t, d) = ensemble_dims(values, Stage::Correlation)?;
    let m = padded_len(t);
    let plan = FftPair::new(m);

    let mut cross = vec![Complex64::new(0.0, 0.0); d * d * m];
    for k in 0..n {
        let realization = values.index_axis(Axis(0), k);
        let spectra = (0..d)
            .map(|i| plan.forward_real(realization.column(i)))
            .collect::<GleResult<Vec<_>>>()
            .map_err(|e| e.in_stage(Stage::Correlation))?;
        for i in 0..d {
            for j in 0..d {
                let dst = &mut cross[(i * d + j) * m..(i * d + j + 1) * m];
                for (w, acc) in dst.iter_mut().enumerate() {
                    *acc += spectra[i][w] * spectra[j][w].conj();
                }
            }
        }
    }

    let center = t - 1;
    let mut c = Array3::<f64>::zeros((2 * t - 1, d, d));
    for i in 0..d {
        for j in 0..d {
            let buf = &mut cross[(i * d + j) * m..(i * d + j + 1) * m];
            plan.inverse_in_place(buf);
            for lag in -(center as isize)..=(center as isize) {
                let abs = lag.unsigned_abs();
                let idx = if lag >= 0 { abs } else { m - abs };
                let norm = 1.0 / (m as f64 * n as f64 * (t - abs) as f64);
                c[[(center as isize + lag) as usize, i, j]] = buf[idx].re * norm;
            }
        }
    }
    Ok(c)
}

/// Correlation stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationEstimator {
    pub mode: Mode,
    pub method: CorrelationMethod,
}

impl CorrelationEstimator {
    pub fn new(mode: Mode, method: CorrelationMethod) -> Self {
        Self { mode, method }
    }

    pub fn estimate(&self, ensemble: &TrajectoryEnsemble) -> GleResult<Correlation> {
        let values = &ensemble.values;
        debug!(
            realizations = ensemble.num_realizations(),
            steps = ensemble.num_steps(),
            observables = ensemble.num_obs(),
            mode = ?self.mode,
            "estimating correlation"
        );
        let corr = match self.mode {
            Mode::NonStationary => Correlation::NonStationary(two_time_correlation(values)?),
            Mode::Stationary => Correlation::Stationary(match self.method {
                CorrelationMethod::Direct => lag_correlation_direct(values)?,
                CorrelationMethod::Spectral => lag_correlation_spectral(values)?,
            }),
        };
        match &corr {
            Correlation::NonStationary(c) => ensure_finite(c, Stage::Correlation, "correlation")?,
            Correlation::Stationary(c) => ensure_finite(c, Stage::Correlation, "correlation")?,
        }
        Ok(corr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_values(n: usize, t: usize, d: usize, seed: u64) -> Array3<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_fn((n, t, d), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn test_two_time_symmetry() {
        let values = random_values(7, 5, 2, 11);
        let c = two_time_correlation(&values).unwrap();
        for t in 0..5 {
            for i in 0..2 {
                for s in 0..5 {
                    for j in 0..2 {
                        assert!((c[[t, i, s, j]] - c[[s, j, t, i]]).abs() < 1e-14);
                    }
                }
            }
        }
    }

    #[test]
    fn test_two_time_single_realization() {
        let values = Array3::from_shape_fn((1, 3, 1), |(_, t, _)| (t + 1) as f64);
        let c = two_time_correlation(&values).unwrap();
        assert!((c[[1, 0, 2, 0]] - 6.0).abs() < 1e-14);
        assert!((c[[2, 0, 2, 0]] - 9.0).abs() < 1e-14);
    }

    #[test]
    fn test_spectral_matches_direct() {
        let values = random_values(4, 9, 3, 5);
        let direct = lag_correlation_direct(&values).unwrap();
        let spectral = lag_correlation_spectral(&values).unwrap();
        for (a, b) in direct.iter().zip(spectral.iter()) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn test_lag_symmetry() {
        let values = random_values(3, 6, 2, 8);
        let c = lag_correlation_spectral(&values).unwrap();
        let center = 5;
        for lag in 0..6 {
            for i in 0..2 {
                for j in 0..2 {
                    let pos = c[[center + lag, i, j]];
                    let neg = c[[center - lag, j, i]];
                    assert!((pos - neg).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_constant_signal_lag_average() {
        let values = Array3::from_elem((2, 4, 1), 2.0);
        let c = lag_correlation_direct(&values).unwrap();
        assert!(c.iter().all(|&v| (v - 4.0).abs() < 1e-14));
    }

    #[test]
    fn test_too_few_steps() {
        let values = Array3::<f64>::zeros((4, 2, 1));
        let err = two_time_correlation(&values).unwrap_err();
        assert!(matches!(
            err,
            GleError::InsufficientData {
                stage: Stage::Correlation,
                ..
            }
        ));
    }

    #[test]
    fn test_estimator_dispatch() {
        let ens = TrajectoryEnsemble::new(Array1::linspace(0.0, 0.4, 5), random_values(3, 5, 1, 2))
            .unwrap();
        let corr = CorrelationEstimator::new(Mode::Stationary, CorrelationMethod::Spectral)
            .estimate(&ens)
            .unwrap();
        assert_eq!(corr.mode(), Mode::Stationary);
        assert_eq!(corr.num_steps(), 5);
        let corr = CorrelationEstimator::default().estimate(&ens).unwrap();
        assert_eq!(corr.mode(), Mode::NonStationary);
    }
}
