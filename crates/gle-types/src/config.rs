// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GleError, GleResult};

/// Whether correlations are treated as functions of two times or of the lag only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    NonStationary,
    Stationary,
}

/// Differencing and quadrature convention shared by force extraction and integration.
///
/// `Symmetric`: central differences, Simpson memory sum with a trapezoid tail, RK4.
/// `Darboux`: forward differences, left Riemann memory sum, explicit Euler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Discretization {
    Symmetric,
    #[default]
    Darboux,
}

/// Stationary correlation estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationMethod {
    Direct,
    #[default]
    Spectral,
}

/// Top-level pipeline configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: InputConfig,
    /// Directory for cached stage outputs and simulated trajectories.
    pub output_dir: PathBuf,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub discretization: Discretization,
    #[serde(default)]
    pub correlation_method: CorrelationMethod,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// `.npy` array of shape (N, T, d).
    pub trajectories: PathBuf,
    /// `.npy` array of shape (T,).
    pub times: PathBuf,
    /// Inclusive lower bound of the time window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_min: Option<f64>,
    /// Exclusive upper bound of the time window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_max: Option<f64>,
    #[serde(default = "default_stride")]
    pub stride: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Subtract the ensemble mean of the initial values before analysis.
    #[serde(default = "default_shift")]
    pub shift_initial_value: bool,
    /// Half-width of the smoothing bump; values below 2 disable mollification.
    #[serde(default)]
    pub mollifier_width: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of trajectories to synthesise (0 skips resynthesis).
    #[serde(default = "default_num_sim")]
    pub num_sim: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Use the FFT sampler for stationary force statistics.
    #[serde(default)]
    pub accelerate_stationary_noise: bool,
    /// Draw initial values jointly with the forces instead of reusing observed ones.
    #[serde(default)]
    pub gaussian_initial_values: bool,
    /// Realizations drawn and integrated together per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_stride() -> usize {
    1
}
fn default_shift() -> bool {
    true
}
fn default_num_sim() -> usize {
    100
}
fn default_batch_size() -> usize {
    256
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            shift_initial_value: default_shift(),
            mollifier_width: 0,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_sim: default_num_sim(),
            seed: None,
            accelerate_stationary_noise: false,
            gaussian_initial_values: false,
            batch_size: default_batch_size(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> GleResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GleResult<()> {
        if self.input.stride == 0 {
            return Err(GleError::ConfigError("input.stride must be >= 1".into()));
        }
        if let (Some(lo), Some(hi)) = (self.input.t_min, self.input.t_max) {
            if !lo.is_finite() || !hi.is_finite() || hi <= lo {
                return Err(GleError::ConfigError(format!(
                    "time window [{lo}, {hi}) is empty or non-finite"
                )));
            }
        }
        if self.simulation.batch_size == 0 {
            return Err(GleError::ConfigError(
                "simulation.batch_size must be >= 1".into(),
            ));
        }
        if self.simulation.accelerate_stationary_noise && self.mode != Mode::Stationary {
            return Err(GleError::ConfigError(
                "accelerate_stationary_noise requires mode = stationary".into(),
            ));
        }
        if self.simulation.accelerate_stationary_noise && self.simulation.gaussian_initial_values {
            return Err(GleError::ConfigError(
                "gaussian_initial_values needs the dense sampler; disable accelerate_stationary_noise".into(),
            ));
        }
        Ok(())
    }
}
