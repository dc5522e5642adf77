// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::{s, Array1, Array2, Array3, Array4, ArrayBase, ArrayView2, Axis, Data, Dimension};

use crate::config::Mode;
use crate::error::{GleError, GleResult, Stage};

/// Relative tolerance on the spacing of the sample times.
const UNIFORM_SPACING_RTOL: f64 = 1e-6;

/// Fail with `NumericalInstability` if any entry is NaN or infinite.
pub fn ensure_finite<S, D>(array: &ArrayBase<S, D>, stage: Stage, name: &str) -> GleResult<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    match array.iter().position(|v| !v.is_finite()) {
        None => Ok(()),
        Some(flat) => Err(GleError::unstable(
            stage,
            format!("{name} contains a non-finite value at flat index {flat}"),
        )),
    }
}

/// Ensemble of N trajectories of d observables sampled at T uniform times.
#[derive(Debug, Clone)]
pub struct TrajectoryEnsemble {
    pub times: Array1<f64>, // [T]
    pub values: Array3<f64>, // [N, T, d]
}

impl TrajectoryEnsemble {
    pub fn new(times: Array1<f64>, values: Array3<f64>) -> GleResult<Self> {
        if values.len_of(Axis(1)) != times.len() {
            return Err(GleError::shape(
                Stage::Preprocess,
                format!(
                    "trajectories have {} samples per realization but {} times were given",
                    values.len_of(Axis(1)),
                    times.len()
                ),
            ));
        }
        ensure_finite(&values, Stage::Preprocess, "trajectories")?;
        ensure_finite(&times, Stage::Preprocess, "times")?;
        Ok(TrajectoryEnsemble { times, values })
    }

    pub fn num_realizations(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn num_steps(&self) -> usize {
        self.values.len_of(Axis(1))
    }

    pub fn num_obs(&self) -> usize {
        self.values.len_of(Axis(2))
    }

    /// Uniform time step, checked against every sample interval.
    pub fn dt(&self) -> GleResult<f64> {
        if self.times.len() < 2 {
            return Err(GleError::insufficient(
                Stage::Preprocess,
                "at least two sample times are needed to define dt",
            ));
        }
        let dt = self.times[1] - self.times[0];
        if dt <= 0.0 {
            return Err(GleError::ConfigError(format!(
                "sample times must increase, got dt = {dt}"
            )));
        }
        for (k, pair) in self.times.windows(2).into_iter().enumerate() {
            let step = pair[1] - pair[0];
            if (step - dt).abs() > UNIFORM_SPACING_RTOL * dt {
                return Err(GleError::ConfigError(format!(
                    "non-uniform sampling: interval {k} is {step}, expected {dt}"
                )));
            }
        }
        Ok(dt)
    }

    /// Initial values A_n(0), shape [N, d].
    pub fn initial_values(&self) -> Array2<f64> {
        self.values.index_axis(Axis(1), 0).to_owned()
    }

    /// Restrict to times in `[t_min, t_max)` and keep every `stride`-th sample.
    pub fn window(&self, t_min: Option<f64>, t_max: Option<f64>, stride: usize) -> GleResult<Self> {
        if stride == 0 {
            return Err(GleError::ConfigError("stride must be >= 1".into()));
        }
        let lo = t_min.unwrap_or(f64::NEG_INFINITY);
        let hi = t_max.unwrap_or(f64::INFINITY);
        let keep: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= lo && **t < hi)
            .map(|(k, _)| k)
            .step_by(stride)
            .collect();
        if keep.is_empty() {
            return Err(GleError::insufficient(
                Stage::Preprocess,
                format!("no samples fall inside [{lo}, {hi})"),
            ));
        }
        let times = self.times.select(Axis(0), &keep);
        let values = self.values.select(Axis(1), &keep);
        Ok(TrajectoryEnsemble { times, values })
    }
}

/// Two-time correlation C(t,i,s,j) = E[A_i(t) A_j(s)].
#[derive(Debug, Clone)]
pub enum Correlation {
    /// Shape [T, d, T, d].
    NonStationary(Array4<f64>),
    /// Shape [2T-1, d, d]; lag τ = t - s lives at index T-1+τ.
    Stationary(Array3<f64>),
}

impl Correlation {
    pub fn mode(&self) -> Mode {
        match self {
            Correlation::NonStationary(_) => Mode::NonStationary,
            Correlation::Stationary(_) => Mode::Stationary,
        }
    }

    pub fn num_steps(&self) -> usize {
        match self {
            Correlation::NonStationary(c) => c.len_of(Axis(0)),
            Correlation::Stationary(c) => (c.len_of(Axis(0)) + 1) / 2,
        }
    }

    pub fn num_obs(&self) -> usize {
        match self {
            Correlation::NonStationary(c) => c.len_of(Axis(1)),
            Correlation::Stationary(c) => c.len_of(Axis(1)),
        }
    }

    /// The d×d block C(t, ·, s, ·).
    pub fn block(&self, t: usize, s: usize) -> ArrayView2<'_, f64> {
        match self {
            Correlation::NonStationary(c) => c.slice(s![t, .., s, ..]),
            Correlation::Stationary(c) => {
                let center = (c.len_of(Axis(0)) - 1) / 2;
                c.index_axis(Axis(0), center + t - s)
            }
        }
    }

    /// Check the tensor layout and values.
    pub fn validate(&self, stage: Stage) -> GleResult<()> {
        match self {
            Correlation::NonStationary(c) => {
                let (t, d, t2, d2) = c.dim();
                if t != t2 || d != d2 {
                    return Err(GleError::shape(
                        stage,
                        format!("correlation must be [T, d, T, d], got {:?}", c.shape()),
                    ));
                }
                ensure_finite(c, stage, "correlation")
            }
            Correlation::Stationary(c) => {
                let (lags, d, d2) = c.dim();
                if lags % 2 == 0 || d != d2 {
                    return Err(GleError::shape(
                        stage,
                        format!("stationary correlation must be [2T-1, d, d], got {:?}", c.shape()),
                    ));
                }
                ensure_finite(c, stage, "correlation")
            }
        }
    }
}

/// Causal memory kernel K(t, s) for s ≤ t.
#[derive(Debug, Clone)]
pub enum MemoryKernel {
    /// Shape [T, T, d, d]; entries with s > t are zero.
    NonStationary(Array4<f64>),
    /// Shape [T, d, d], indexed by the lag t - s ≥ 0.
    Stationary(Array3<f64>),
}

impl MemoryKernel {
    pub fn mode(&self) -> Mode {
        match self {
            MemoryKernel::NonStationary(_) => Mode::NonStationary,
            MemoryKernel::Stationary(_) => Mode::Stationary,
        }
    }

    pub fn num_steps(&self) -> usize {
        match self {
            MemoryKernel::NonStationary(k) => k.len_of(Axis(0)),
            MemoryKernel::Stationary(k) => k.len_of(Axis(0)),
        }
    }

    pub fn num_obs(&self) -> usize {
        match self {
            MemoryKernel::NonStationary(k) => k.len_of(Axis(2)),
            MemoryKernel::Stationary(k) => k.len_of(Axis(1)),
        }
    }

    /// The d×d block K(t, s). Requires `s <= t`.
    pub fn block(&self, t: usize, s: usize) -> ArrayView2<'_, f64> {
        debug_assert!(s <= t, "kernel block ({t}, {s}) lies outside the causal region");
        match self {
            MemoryKernel::NonStationary(k) => k.slice(s![t, s, .., ..]),
            MemoryKernel::Stationary(k) => k.index_axis(Axis(0), t - s),
        }
    }

    /// A kernel that is identically zero.
    pub fn zeros(mode: Mode, num_steps: usize, num_obs: usize) -> Self {
        match mode {
            Mode::NonStationary => {
                MemoryKernel::NonStationary(Array4::zeros((num_steps, num_steps, num_obs, num_obs)))
            }
            Mode::Stationary => MemoryKernel::Stationary(Array3::zeros((num_steps, num_obs, num_obs))),
        }
    }
}

/// Instantaneous drift Ω(t).
#[derive(Debug, Clone)]
pub enum Drift {
    /// Shape [T, d, d].
    NonStationary(Array3<f64>),
    /// Shape [d, d].
    Stationary(Array2<f64>),
}

impl Drift {
    pub fn mode(&self) -> Mode {
        match self {
            Drift::NonStationary(_) => Mode::NonStationary,
            Drift::Stationary(_) => Mode::Stationary,
        }
    }

    pub fn num_obs(&self) -> usize {
        match self {
            Drift::NonStationary(w) => w.len_of(Axis(1)),
            Drift::Stationary(w) => w.nrows(),
        }
    }

    /// Number of time steps covered, `None` when constant.
    pub fn num_steps(&self) -> Option<usize> {
        match self {
            Drift::NonStationary(w) => Some(w.len_of(Axis(0))),
            Drift::Stationary(_) => None,
        }
    }

    pub fn at(&self, t: usize) -> ArrayView2<'_, f64> {
        match self {
            Drift::NonStationary(w) => w.index_axis(Axis(0), t),
            Drift::Stationary(w) => w.view(),
        }
    }
}
