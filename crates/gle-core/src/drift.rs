// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Drift Estimator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Instantaneous drift Ω(t) = ⟨Ȧ(t) A(t)ᵀ⟩ ⟨A(t) A(t)ᵀ⟩⁻¹.
//!
//! ⟨Ȧ(t) A(t)ᵀ⟩ is the derivative of C(u, t) in its leading time at u = t,
//! taken as a central difference of the near-diagonal samples and one-sided
//! at the first and last step.

use gle_math::linalg::inverse;
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::{ensure_finite, Correlation, Drift};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use tracing::debug;

use crate::correlation::MIN_STEPS;

fn project(rate: Array2<f64>, equal_time: ArrayView2<f64>, t: usize) -> GleResult<Array2<f64>> {
    let inv = inverse(equal_time).map_err(|e| match e {
        GleError::LinAlg(msg) => {
            GleError::unstable(Stage::Drift, format!("equal-time correlation block {t}: {msg}"))
        }
        other => other,
    })?;
    Ok(rate.dot(&inv))
}

#[derive(Debug, Clone, Copy)]
pub struct DriftEstimator {
    dt: f64,
}

impl DriftEstimator {
    pub fn new(dt: f64) -> GleResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(GleError::ConfigError(format!(
                "drift estimator requires finite dt > 0, got {dt}"
            )));
        }
        Ok(Self { dt })
    }

    pub fn estimate(&self, correlation: &Correlation) -> GleResult<Drift> {
        correlation.validate(Stage::Drift)?;
        let steps = correlation.num_steps();
        if steps < MIN_STEPS {
            return Err(GleError::insufficient(
                Stage::Drift,
                format!("need at least {MIN_STEPS} time steps, got {steps}"),
            ));
        }
        let dt = self.dt;
        let drift = match correlation {
            Correlation::NonStationary(_) => {
                let d = correlation.num_obs();
                let mut omega = Array3::<f64>::zeros((steps, d, d));
                for t in 0..steps {
                    let (hi, lo, h) = if t == 0 {
                        (1, 0, dt)
                    } else if t == steps - 1 {
                        (t, t - 1, dt)
                    } else {
                        (t + 1, t - 1, 2.0 * dt)
                    };
                    let rate = (&correlation.block(hi, t) - &correlation.block(lo, t)) / h;
                    let w = project(rate, correlation.block(t, t), t)?;
                    omega.index_axis_mut(Axis(0), t).assign(&w);
                }
                ensure_finite(&omega, Stage::Drift, "drift")?;
                Drift::NonStationary(omega)
            }
            Correlation::Stationary(_) => {
                let rate = (&correlation.block(1, 0) - &correlation.block(0, 1)) / (2.0 * dt);
                let w = project(rate, correlation.block(0, 0), 0)?;
                ensure_finite(&w, Stage::Drift, "drift")?;
                Drift::Stationary(w)
            }
        };
        debug!(mode = ?drift.mode(), "drift estimated");
        Ok(drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn rotation(angle: f64) -> [[f64; 2]; 2] {
        [[angle.cos(), -angle.sin()], [angle.sin(), angle.cos()]]
    }

    #[test]
    fn test_rotating_signal_recovers_generator() {
        // A(t) = R(ω t) A0 with isotropic A0: C(u, t) = R(ω (u - t)).
        let (t_len, dt, omega) = (6, 0.1, 2.0);
        let c = Array4::from_shape_fn((t_len, 2, t_len, 2), |(u, i, t, j)| {
            rotation(omega * (u as f64 - t as f64) * dt)[i][j]
        });
        let drift = DriftEstimator::new(dt)
            .unwrap()
            .estimate(&Correlation::NonStationary(c))
            .unwrap();
        let rate = (omega * dt).sin() / dt;
        for t in 1..t_len - 1 {
            let w = drift.at(t);
            assert!(w[[0, 0]].abs() < 1e-12);
            assert!((w[[0, 1]] + rate).abs() < 1e-12);
            assert!((w[[1, 0]] - rate).abs() < 1e-12);
        }
        // One-sided boundary: (R(ω dt) - I) / dt
        let w0 = drift.at(0);
        assert!((w0[[0, 0]] - ((omega * dt).cos() - 1.0) / dt).abs() < 1e-12);
    }

    #[test]
    fn test_exponential_growth() {
        let (t_len, dt, lambda) = (5, 0.2, 0.7);
        let c = Array4::from_shape_fn((t_len, 1, t_len, 1), |(u, _, t, _)| {
            (lambda * (u + t) as f64 * dt).exp()
        });
        let drift = DriftEstimator::new(dt)
            .unwrap()
            .estimate(&Correlation::NonStationary(c))
            .unwrap();
        for t in 1..t_len - 1 {
            assert!((drift.at(t)[[0, 0]] - (lambda * dt).sinh() / dt).abs() < 1e-12);
        }
    }

    #[test]
    fn test_relaxing_signal_recovers_decay_rate() {
        // A(t) = exp(-t) A0 on five samples: C(u, t) = exp(-(u + t)).
        let relaxation = |dt: f64| {
            let c = Array4::from_shape_fn((5, 1, 5, 1), |(u, _, t, _)| (-((u + t) as f64) * dt).exp());
            DriftEstimator::new(dt)
                .unwrap()
                .estimate(&Correlation::NonStationary(c))
                .unwrap()
        };

        let coarse = relaxation(1.0);
        for t in 1..4 {
            let w = coarse.at(t)[[0, 0]];
            assert!((w + 1f64.sinh()).abs() < 1e-12, "t={t}: {w}");
            assert!((w + 1.0).abs() < 0.2);
        }
        assert!((coarse.at(0)[[0, 0]] - ((-1f64).exp() - 1.0)).abs() < 1e-12);
        assert!((coarse.at(4)[[0, 0]] - (1.0 - 1f64.exp())).abs() < 1e-12);

        let fine = relaxation(0.01);
        for t in 1..4 {
            assert!((fine.at(t)[[0, 0]] + 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_stationary_exponential_has_no_drift() {
        let c = Array3::from_shape_fn((9, 1, 1), |(k, _, _)| (-(k as f64 - 4.0).abs()).exp());
        let drift = DriftEstimator::new(1.0)
            .unwrap()
            .estimate(&Correlation::Stationary(c))
            .unwrap();
        assert!(matches!(drift, Drift::Stationary(_)));
        assert!(drift.at(3)[[0, 0]].abs() < 1e-15);
    }

    #[test]
    fn test_stationary_rotation() {
        let (t_len, dt, omega) = (5, 0.05, 3.0);
        let c = Array3::from_shape_fn((2 * t_len - 1, 2, 2), |(k, i, j)| {
            rotation(omega * (k as f64 - (t_len - 1) as f64) * dt)[i][j]
        });
        let drift = DriftEstimator::new(dt)
            .unwrap()
            .estimate(&Correlation::Stationary(c))
            .unwrap();
        let w = drift.at(0);
        assert!((w[[1, 0]] - (omega * dt).sin() / dt).abs() < 1e-12);
    }

    #[test]
    fn test_singular_block_names_time() {
        let mut c = Array4::from_elem((3, 1, 3, 1), 1.0);
        c[[1, 0, 1, 0]] = 0.0;
        let err = DriftEstimator::new(1.0)
            .unwrap()
            .estimate(&Correlation::NonStationary(c))
            .unwrap_err();
        assert!(matches!(err, GleError::NumericalInstability { stage: Stage::Drift, .. }));
    }
}
