// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Fluctuating Force
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Residual forces f_n(t) = Ȧ_n(t) - Ω(t) A_n(t) - ∫₀ᵗ K(t,s) A_n(s) ds and
//! their ensemble statistics.

use gle_math::diff::derivative;
use gle_types::config::Discretization;
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::{ensure_finite, Drift, MemoryKernel};
use ndarray::{s, Array1, Array2, Array3, Array4, Axis};
use tracing::{debug, info};

use crate::memory::MemoryOperator;

/// Stack an ensemble [N, T, d] into history columns [T·d, N].
pub(crate) fn history_columns(values: &Array3<f64>) -> Array2<f64> {
    let (n, t, d) = values.dim();
    Array2::from_shape_fn((t * d, n), |(r, k)| values[[k, r / d, r % d]])
}

#[derive(Debug, Clone, Copy)]
pub struct FluctuatingForceExtractor {
    dt: f64,
    rule: Discretization,
}

impl FluctuatingForceExtractor {
    pub fn new(dt: f64, rule: Discretization) -> GleResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(GleError::ConfigError(format!(
                "force extraction requires finite dt > 0, got {dt}"
            )));
        }
        Ok(Self { dt, rule })
    }

    /// Forces for every realization, shape [N, T, d].
    pub fn extract(
        &self,
        values: &Array3<f64>,
        drift: &Drift,
        kernel: &MemoryKernel,
    ) -> GleResult<Array3<f64>> {
        let (n, t, d) = values.dim();
        check_model(t, d, drift, kernel, Stage::FluctuatingForce)?;
        if n == 0 {
            return Err(GleError::insufficient(Stage::FluctuatingForce, "ensemble has no realizations"));
        }
        info!(realizations = n, steps = t, rule = ?self.rule, "extracting fluctuating forces");

        let rates = derivative(values, Axis(1), self.dt, self.rule)
            .map_err(|e| e.in_stage(Stage::FluctuatingForce))?;
        let history = history_columns(values);
        let memory = MemoryOperator::new(kernel, self.rule, self.dt);

        let mut forces = Array3::<f64>::zeros((n, t, d));
        for step in 0..t {
            let current = history.slice(s![step * d..(step + 1) * d, ..]);
            let mut explained = drift.at(step).dot(&current);
            explained += &memory.apply(step, history.view());
            // [d, N] -> [N, d]
            let residual = &rates.index_axis(Axis(1), step) - &explained.t();
            forces.index_axis_mut(Axis(1), step).assign(&residual);
        }
        ensure_finite(&forces, Stage::FluctuatingForce, "fluctuating forces")?;
        Ok(forces)
    }
}

/// Check that drift and kernel cover `steps` samples of `num_obs` observables.
pub(crate) fn check_model(
    steps: usize,
    num_obs: usize,
    drift: &Drift,
    kernel: &MemoryKernel,
    stage: Stage,
) -> GleResult<()> {
    if kernel.num_steps() != steps || kernel.num_obs() != num_obs {
        return Err(GleError::shape(
            stage,
            format!(
                "kernel covers {} steps of {} observables, trajectories have {steps} steps of {num_obs}",
                kernel.num_steps(),
                kernel.num_obs()
            ),
        ));
    }
    if drift.num_obs() != num_obs || drift.num_steps().is_some_and(|k| k != steps) {
        return Err(GleError::shape(
            stage,
            format!(
                "drift has {} observables over {:?} steps, expected {num_obs} over {steps}",
                drift.num_obs(),
                drift.num_steps()
            ),
        ));
    }
    Ok(())
}

/// Ensemble mean and unbiased covariance of a force ensemble.
#[derive(Debug, Clone)]
pub struct ForceStatistics {
    /// Shape [T, d].
    pub mean: Array2<f64>,
    /// Shape [T, d, T, d], normalised by 1/(N-1).
    pub covariance: Array4<f64>,
}

impl ForceStatistics {
    pub fn from_forces(forces: &Array3<f64>) -> GleResult<Self> {
        let (n, t, d) = forces.dim();
        if n < 2 {
            return Err(GleError::insufficient(
                Stage::FluctuatingForce,
                format!("covariance needs at least 2 realizations, got {n}"),
            ));
        }
        let mean = forces
            .mean_axis(Axis(0))
            .ok_or_else(|| GleError::insufficient(Stage::FluctuatingForce, "empty force ensemble"))?;
        let centered = Array2::from_shape_fn((n, t * d), |(k, c)| {
            forces[[k, c / d, c % d]] - mean[[c / d, c % d]]
        });
        let cov = centered.t().dot(&centered) / (n - 1) as f64;
        let covariance = cov
            .into_shape((t, d, t, d))
            .map_err(|e| GleError::shape(Stage::FluctuatingForce, e.to_string()))?;
        debug!(realizations = n, steps = t, "force statistics computed");
        Ok(Self { mean, covariance })
    }

    /// Joint statistics of (A(0), f(0), …, f(T-1)) over T+1 slots, so initial
    /// values can be drawn together with the forces.
    pub fn extended(initial: &Array2<f64>, forces: &Array3<f64>) -> GleResult<Self> {
        let (n, t, d) = forces.dim();
        if initial.dim() != (n, d) {
            return Err(GleError::shape(
                Stage::FluctuatingForce,
                format!("initial values {:?} do not match forces [{n}, {t}, {d}]", initial.dim()),
            ));
        }
        let mut stacked = Array3::<f64>::zeros((n, t + 1, d));
        stacked.index_axis_mut(Axis(1), 0).assign(initial);
        stacked.slice_mut(s![.., 1.., ..]).assign(forces);
        Self::from_forces(&stacked)
    }

    pub fn num_steps(&self) -> usize {
        self.mean.nrows()
    }

    pub fn num_obs(&self) -> usize {
        self.mean.ncols()
    }

    /// Covariance as a (T·d) × (T·d) matrix.
    pub fn flat_covariance(&self) -> Array2<f64> {
        let (t, d) = self.mean.dim();
        Array2::from_shape_fn((t * d, t * d), |(r, c)| {
            self.covariance[[r / d, r % d, c / d, c % d]]
        })
    }

    /// Lag covariance Σ(τ, i, j) averaged along time diagonals, shape [2T-1, d, d].
    pub fn lag_covariance(&self) -> Array3<f64> {
        let (t, d) = self.mean.dim();
        let center = t - 1;
        let mut out = Array3::<f64>::zeros((2 * t - 1, d, d));
        for lag in -(center as isize)..=(center as isize) {
            let abs = lag.unsigned_abs();
            let s_lo = if lag < 0 { abs } else { 0 };
            let s_hi = if lag > 0 { t - abs } else { t };
            let slot = (center as isize + lag) as usize;
            for s_idx in s_lo..s_hi {
                let u = (s_idx as isize + lag) as usize;
                let mut dst = out.index_axis_mut(Axis(0), slot);
                dst += &self.covariance.slice(s![u, .., s_idx, ..]);
            }
            out.index_axis_mut(Axis(0), slot)
                .mapv_inplace(|v| v / (t - abs) as f64);
        }
        out
    }

    /// Time-averaged mean, shape [d].
    pub fn stationary_mean(&self) -> Array1<f64> {
        self.mean.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(self.num_obs()))
    }
}
