// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Noise Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Gaussian samplers for correlated fluctuating forces.
//!
//! Dense: Σ = U D Uᵀ, M = U D^{1/2}, draw = mean + M z.
//! Spectral (stationary Σ only): circulant embedding of the lag covariance on
//! a power-of-two grid, per-frequency Hermitian square roots, one inverse FFT
//! per observable and draw.

use std::f64::consts::FRAC_1_SQRT_2;

use gle_math::fft::{padded_len, FftPair};
use gle_math::linalg::{hermitian_psd_sqrt, psd_factor, Clipping};
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::ensure_finite;
use ndarray::{Array1, Array2, Array3, Axis};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::{debug, warn};

use crate::force::ForceStatistics;

fn report_clipping(clipping: Clipping, what: &str) {
    if clipping.count > 0 {
        warn!(
            clipped = clipping.count,
            most_negative = clipping.most_negative,
            "negative eigenvalues of the {what} set to zero"
        );
    }
}

/// Sampler from a full (T·d) × (T·d) covariance.
#[derive(Debug, Clone)]
pub struct DenseNoise {
    mean: Array1<f64>,
    factor: Array2<f64>,
    num_steps: usize,
    num_obs: usize,
}

impl DenseNoise {
    pub fn from_statistics(stats: &ForceStatistics) -> GleResult<Self> {
        let cov = stats.flat_covariance();
        ensure_finite(&cov, Stage::Noise, "force covariance")?;
        let (factor, clipping) = psd_factor(cov.view()).map_err(|e| e.in_stage(Stage::Noise))?;
        report_clipping(clipping, "force covariance");
        Self::from_factor(stats.mean.clone(), factor)
    }

    /// Rebuild from a previously computed factor M (Σ = M Mᵀ).
    pub fn from_factor(mean: Array2<f64>, factor: Array2<f64>) -> GleResult<Self> {
        let (num_steps, num_obs) = mean.dim();
        let n = num_steps * num_obs;
        if factor.dim() != (n, n) {
            return Err(GleError::shape(
                Stage::Noise,
                format!("factor is {:?}, expected ({n}, {n}) for mean {:?}", factor.dim(), mean.dim()),
            ));
        }
        ensure_finite(&factor, Stage::Noise, "covariance factor")?;
        let mean = Array1::from_iter(mean.iter().copied());
        Ok(Self {
            mean,
            factor,
            num_steps,
            num_obs,
        })
    }

    pub fn factor(&self) -> &Array2<f64> {
        &self.factor
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn num_obs(&self) -> usize {
        self.num_obs
    }

    /// One realization, shape [T, d].
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f64> {
        let z = Array1::from_shape_fn(self.mean.len(), |_| rng.sample::<f64, _>(StandardNormal));
        let x = self.factor.dot(&z) + &self.mean;
        Array2::from_shape_fn((self.num_steps, self.num_obs), |(t, i)| x[t * self.num_obs + i])
    }

    /// Covariance realised by the sampler, M Mᵀ.
    pub fn implied_covariance(&self) -> Array2<f64> {
        self.factor.dot(&self.factor.t())
    }
}

/// FFT sampler for a time-translation invariant covariance Σ(t - s).
#[derive(Debug, Clone)]
pub struct SpectralNoise {
    mean: Array2<f64>,
    /// Hermitian square roots for ω = 0..=M/2.
    roots: Vec<Array2<Complex64>>,
    plan: FftPair,
}

impl SpectralNoise {
    /// `mean` is [T, d]; `lag_covariance` is [2T-1, d, d] with lag τ at T-1+τ.
    pub fn from_lag_covariance(mean: Array2<f64>, lag_covariance: &Array3<f64>) -> GleResult<Self> {
        let (num_steps, d) = mean.dim();
        if num_steps == 0 || lag_covariance.dim() != (2 * num_steps - 1, d, d) {
            return Err(GleError::shape(
                Stage::Noise,
                format!(
                    "lag covariance {:?} does not match mean {:?}",
                    lag_covariance.dim(),
                    mean.dim()
                ),
            ));
        }
        ensure_finite(lag_covariance, Stage::Noise, "lag covariance")?;
        let center = num_steps - 1;
        let m = padded_len(num_steps);
        let plan = FftPair::new(m);

        // Circulant embedding: c(k) = Σ(k), c(M-k) = Σ(-k), zero in between.
        let mut spectra = Array3::<Complex64>::zeros((d, d, m));
        for i in 0..d {
            for j in 0..d {
                let mut lane = vec![Complex64::new(0.0, 0.0); m];
                lane[0] = Complex64::new(lag_covariance[[center, i, j]], 0.0);
                for k in 1..num_steps {
                    lane[k] = Complex64::new(lag_covariance[[center + k, i, j]], 0.0);
                    lane[m - k] = Complex64::new(lag_covariance[[center - k, i, j]], 0.0);
                }
                plan.forward_in_place(&mut lane);
                for (w, v) in lane.into_iter().enumerate() {
                    spectra[[i, j, w]] = v;
                }
            }
        }

        let half = m / 2;
        let mut roots = Vec::with_capacity(half + 1);
        let mut total = Clipping::default();
        for w in 0..=half {
            let block = spectra.index_axis(Axis(2), w);
            let hermitian = Array2::from_shape_fn((d, d), |(i, j)| 0.5 * (block[[i, j]] + block[[j, i]].conj()));
            let (root, clipping) = hermitian_psd_sqrt(hermitian.view()).map_err(|e| e.in_stage(Stage::Noise))?;
            total.count += clipping.count;
            total.most_negative = total.most_negative.min(clipping.most_negative);
            roots.push(root);
        }
        report_clipping(total, "spectral density");
        debug!(fft_len = m, frequencies = roots.len(), "spectral sampler ready");
        Ok(Self { mean, roots, plan })
    }

    pub fn num_steps(&self) -> usize {
        self.mean.nrows()
    }

    pub fn num_obs(&self) -> usize {
        self.mean.ncols()
    }

    pub fn fft_len(&self) -> usize {
        self.plan.len()
    }

    /// One realization, shape [T, d].
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f64> {
        let m = self.plan.len();
        let half = m / 2;
        let d = self.num_obs();
        let mut lanes = vec![vec![Complex64::new(0.0, 0.0); m]; d];

        for (w, root) in self.roots.iter().enumerate() {
            let self_conjugate = w == 0 || w == half;
            let xi: Array1<Complex64> = Array1::from_shape_fn(d, |_| {
                if self_conjugate {
                    Complex64::new(rng.sample(StandardNormal), 0.0)
                } else {
                    Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal)) * FRAC_1_SQRT_2
                }
            });
            let y = root.dot(&xi);
            for (i, lane) in lanes.iter_mut().enumerate() {
                lane[w] = y[i];
                if !self_conjugate {
                    lane[m - w] = y[i].conj();
                }
            }
        }

        let scale = 1.0 / (m as f64).sqrt();
        let mut out = self.mean.clone();
        for (i, lane) in lanes.iter_mut().enumerate() {
            self.plan.inverse_in_place(lane);
            for t in 0..self.num_steps() {
                out[[t, i]] += lane[t].re * scale;
            }
        }
        out
    }

    /// Lag covariance realised by the sampler after eigenvalue clipping,
    /// shape [2T-1, d, d].
    pub fn implied_lag_covariance(&self) -> Array3<f64> {
        let m = self.plan.len();
        let half = m / 2;
        let (t, d) = self.mean.dim();
        let center = t - 1;
        let mut out = Array3::<f64>::zeros((2 * t - 1, d, d));
        for i in 0..d {
            for j in 0..d {
                let mut lane = vec![Complex64::new(0.0, 0.0); m];
                for (w, root) in self.roots.iter().enumerate() {
                    let mut lambda = Complex64::new(0.0, 0.0);
                    for k in 0..d {
                        lambda += root[[i, k]] * root[[j, k]].conj();
                    }
                    lane[w] = lambda;
                    if w != 0 && w != half {
                        lane[m - w] = lambda.conj();
                    }
                }
                self.plan.inverse_in_place(&mut lane);
                for k in 0..t {
                    out[[center + k, i, j]] = lane[k].re / m as f64;
                    if k > 0 {
                        out[[center - k, i, j]] = lane[m - k].re / m as f64;
                    }
                }
            }
        }
        out
    }
}

/// Force sampler used by the simulator.
#[derive(Debug, Clone)]
pub enum NoiseModel {
    Dense(DenseNoise),
    Spectral(SpectralNoise),
}

impl NoiseModel {
    pub fn num_steps(&self) -> usize {
        match self {
            NoiseModel::Dense(n) => n.num_steps(),
            NoiseModel::Spectral(n) => n.num_steps(),
        }
    }

    pub fn num_obs(&self) -> usize {
        match self {
            NoiseModel::Dense(n) => n.num_obs(),
            NoiseModel::Spectral(n) => n.num_obs(),
        }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f64> {
        match self {
            NoiseModel::Dense(n) => n.draw(rng),
            NoiseModel::Spectral(n) => n.draw(rng),
        }
    }
}
