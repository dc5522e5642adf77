// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Pipeline
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! End-to-end run: load, preprocess, correlate, solve for K and Ω, extract
//! forces, build the sampler and resynthesise trajectories.
//!
//! Stage outputs go through the [`ArtifactCache`] under `output_dir`. The
//! cache fingerprint covers the stage settings and a digest of the loaded
//! input, so new data under the same paths recomputes every stage.

use std::path::{Path, PathBuf};
use std::time::Instant;

use gle_types::config::{Mode, PipelineConfig};
use gle_types::error::{GleError, GleResult};
use gle_types::state::{Correlation, Drift, MemoryKernel, TrajectoryEnsemble};
use ndarray::{Array1, Array2, Array3, Array4};
use ndarray_npy::read_npy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, info_span};

use crate::cache::{Artifact, ArtifactCache};
use crate::correlation::CorrelationEstimator;
use crate::drift::DriftEstimator;
use crate::force::{FluctuatingForceExtractor, ForceStatistics};
use crate::integrator::{InitialValues, Integrator, Simulator};
use crate::kernel::KernelSolver;
use crate::noise::{DenseNoise, NoiseModel, SpectralNoise};
use crate::preprocess::preprocess;

const REPORT_FILE: &str = "report.json";

/// Summary written to `report.json` after a run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub realizations: usize,
    pub steps: usize,
    pub observables: usize,
    pub dt: f64,
    pub mode: Mode,
    pub simulated: usize,
    pub spectral_noise: bool,
    pub output_dir: PathBuf,
    pub elapsed_s: f64,
}

/// Model recovered from the observed ensemble.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub ensemble: TrajectoryEnsemble,
    pub offset: Array1<f64>,
    pub dt: f64,
    pub correlation: Correlation,
    pub kernel: MemoryKernel,
    pub drift: Drift,
    pub forces: Array3<f64>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

fn load_required<T: ndarray_npy::ReadNpyExt>(artifact: &str, path: &Path) -> GleResult<T> {
    if !path.is_file() {
        return Err(GleError::MissingArtifact {
            artifact: artifact.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(read_npy(path)?)
}

/// SHA-256 over the shape, sample times and values of an ensemble.
pub fn input_digest(ensemble: &TrajectoryEnsemble) -> String {
    let mut hasher = Sha256::new();
    let (n, t, d) = ensemble.values.dim();
    for dim in [n, t, d] {
        hasher.update((dim as u64).to_le_bytes());
    }
    for v in ensemble.times.iter().chain(ensemble.values.iter()) {
        hasher.update(v.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> GleResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_file(path: impl AsRef<Path>) -> GleResult<Self> {
        Self::new(PipelineConfig::from_file(path)?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Settings and input content that determine the cached arrays.
    /// Simulation size and seed only affect the simulated output, which is
    /// always rewritten.
    fn fingerprint(&self, input: &TrajectoryEnsemble) -> GleResult<String> {
        let c = &self.config;
        Ok(serde_json::to_string(&json!({
            "input": c.input,
            "input_sha256": input_digest(input),
            "mode": c.mode,
            "discretization": c.discretization,
            "correlation_method": c.correlation_method,
            "preprocess": c.preprocess,
            "accelerate_stationary_noise": c.simulation.accelerate_stationary_noise,
            "gaussian_initial_values": c.simulation.gaussian_initial_values,
        }))?)
    }

    pub fn open_cache(&self, input: &TrajectoryEnsemble) -> GleResult<ArtifactCache> {
        ArtifactCache::open_with_fingerprint(&self.config.output_dir, &self.fingerprint(input)?)
    }

    /// Read the input arrays and apply the configured window and stride.
    pub fn load_input(&self) -> GleResult<TrajectoryEnsemble> {
        let input = &self.config.input;
        let values: Array3<f64> = load_required("trajectories", &input.trajectories)?;
        let times: Array1<f64> = load_required("times", &input.times)?;
        let full = TrajectoryEnsemble::new(times, values)?;
        let windowed = full.window(input.t_min, input.t_max, input.stride)?;
        info!(
            realizations = windowed.num_realizations(),
            steps = windowed.num_steps(),
            observables = windowed.num_obs(),
            dropped = full.num_steps() - windowed.num_steps(),
            "input loaded"
        );
        Ok(windowed)
    }

    pub fn run(&self) -> GleResult<PipelineReport> {
        let _span = info_span!("pipeline", output = %self.config.output_dir.display()).entered();
        let started = Instant::now();
        let input = self.load_input()?;
        let cache = self.open_cache(&input)?;
        let model = self.reconstruct(&cache, &input)?;

        let sim = &self.config.simulation;
        let mut spectral = false;
        if sim.num_sim > 0 {
            let noise = self.noise_model(&cache, &model)?;
            spectral = matches!(noise, NoiseModel::Spectral(_));
            let integrator = Integrator::new(
                model.drift.clone(),
                &model.kernel,
                model.dt,
                self.config.discretization,
            )?;
            let initial = if sim.gaussian_initial_values {
                InitialValues::Gaussian
            } else {
                InitialValues::Observed(model.ensemble.initial_values())
            };
            let simulator = Simulator::new(integrator, noise, initial, model.offset.clone())?
                .with_batch_size(sim.batch_size);
            let mut rng = match sim.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let t0 = Instant::now();
            let simulated = simulator.simulate(sim.num_sim, &mut rng)?;
            cache.store(Artifact::Simulated, &simulated)?;
            info!(num_sim = sim.num_sim, elapsed_s = t0.elapsed().as_secs_f64(), "resynthesis done");
        }

        let report = PipelineReport {
            realizations: model.ensemble.num_realizations(),
            steps: model.ensemble.num_steps(),
            observables: model.ensemble.num_obs(),
            dt: model.dt,
            mode: self.config.mode,
            simulated: sim.num_sim,
            spectral_noise: spectral,
            output_dir: self.config.output_dir.clone(),
            elapsed_s: started.elapsed().as_secs_f64(),
        };
        std::fs::write(
            cache.root().join(REPORT_FILE),
            serde_json::to_string_pretty(&report)?,
        )?;
        info!(elapsed_s = report.elapsed_s, "pipeline finished");
        Ok(report)
    }

    /// Preprocess and run every analysis stage, reusing cached arrays.
    pub fn reconstruct(&self, cache: &ArtifactCache, input: &TrajectoryEnsemble) -> GleResult<Reconstruction> {
        let prepared = preprocess(input, &self.config.preprocess)?;
        let ensemble = prepared.ensemble;
        let dt = ensemble.dt()?;
        cache.store(Artifact::Trajectories, &ensemble.values)?;
        cache.store(Artifact::Times, &ensemble.times)?;
        cache.store(Artifact::InitialMean, &prepared.offset)?;

        let correlation = self.correlation(cache, &ensemble)?;
        let kernel = self.kernel(cache, &correlation, dt)?;
        let drift = self.drift(cache, &correlation, dt)?;
        let forces = self.forces(cache, &ensemble, &drift, &kernel, dt)?;
        Ok(Reconstruction {
            ensemble,
            offset: prepared.offset,
            dt,
            correlation,
            kernel,
            drift,
            forces,
        })
    }

    fn correlation(&self, cache: &ArtifactCache, ensemble: &TrajectoryEnsemble) -> GleResult<Correlation> {
        let (t, d) = (ensemble.num_steps(), ensemble.num_obs());
        let cached = match self.config.mode {
            Mode::NonStationary => cache.load(Artifact::Correlation).map(Correlation::NonStationary),
            Mode::Stationary => cache.load(Artifact::Correlation).map(Correlation::Stationary),
        };
        if let Some(c) = cached.filter(|c| c.num_steps() == t && c.num_obs() == d) {
            info!(stage = "correlation", "reusing cached correlation");
            return Ok(c);
        }
        let t0 = Instant::now();
        let c = CorrelationEstimator::new(self.config.mode, self.config.correlation_method).estimate(ensemble)?;
        match &c {
            Correlation::NonStationary(a) => cache.store(Artifact::Correlation, a)?,
            Correlation::Stationary(a) => cache.store(Artifact::Correlation, a)?,
        }
        info!(stage = "correlation", elapsed_s = t0.elapsed().as_secs_f64(), "stage done");
        Ok(c)
    }

    fn kernel(&self, cache: &ArtifactCache, correlation: &Correlation, dt: f64) -> GleResult<MemoryKernel> {
        let (t, d) = (correlation.num_steps(), correlation.num_obs());
        let cached = match self.config.mode {
            Mode::NonStationary => cache.load(Artifact::Kernel).map(MemoryKernel::NonStationary),
            Mode::Stationary => cache.load(Artifact::Kernel).map(MemoryKernel::Stationary),
        };
        if let Some(k) = cached.filter(|k| k.num_steps() == t && k.num_obs() == d) {
            info!(stage = "kernel", "reusing cached kernel");
            return Ok(k);
        }
        let t0 = Instant::now();
        let k = KernelSolver::new(dt)?.solve(correlation)?;
        match &k {
            MemoryKernel::NonStationary(a) => cache.store(Artifact::Kernel, a)?,
            MemoryKernel::Stationary(a) => cache.store(Artifact::Kernel, a)?,
        }
        info!(stage = "kernel", elapsed_s = t0.elapsed().as_secs_f64(), "stage done");
        Ok(k)
    }

    fn drift(&self, cache: &ArtifactCache, correlation: &Correlation, dt: f64) -> GleResult<Drift> {
        let (t, d) = (correlation.num_steps(), correlation.num_obs());
        let cached = match self.config.mode {
            Mode::NonStationary => cache.load(Artifact::Drift).map(Drift::NonStationary),
            Mode::Stationary => cache.load(Artifact::Drift).map(Drift::Stationary),
        };
        if let Some(w) = cached.filter(|w| w.num_obs() == d && w.num_steps().map_or(true, |k| k == t)) {
            info!(stage = "drift", "reusing cached drift");
            return Ok(w);
        }
        let w = DriftEstimator::new(dt)?.estimate(correlation)?;
        match &w {
            Drift::NonStationary(a) => cache.store(Artifact::Drift, a)?,
            Drift::Stationary(a) => cache.store(Artifact::Drift, a)?,
        }
        info!(stage = "drift", "stage done");
        Ok(w)
    }

    fn forces(
        &self,
        cache: &ArtifactCache,
        ensemble: &TrajectoryEnsemble,
        drift: &Drift,
        kernel: &MemoryKernel,
        dt: f64,
    ) -> GleResult<Array3<f64>> {
        if let Some(f) = cache
            .load::<Array3<f64>>(Artifact::Forces)
            .filter(|f| f.dim() == ensemble.values.dim())
        {
            info!(stage = "fluctuating-force", "reusing cached forces");
            return Ok(f);
        }
        let t0 = Instant::now();
        let f = FluctuatingForceExtractor::new(dt, self.config.discretization)?
            .extract(&ensemble.values, drift, kernel)?;
        cache.store(Artifact::Forces, &f)?;
        info!(stage = "fluctuating-force", elapsed_s = t0.elapsed().as_secs_f64(), "stage done");
        Ok(f)
    }

    fn force_statistics(&self, cache: &ArtifactCache, model: &Reconstruction) -> GleResult<ForceStatistics> {
        let (t, d) = (model.ensemble.num_steps(), model.ensemble.num_obs());
        let gaussian = self.config.simulation.gaussian_initial_values;
        let slots = if gaussian { t + 1 } else { t };
        let mean: Option<Array2<f64>> = cache.load(Artifact::ForceMean);
        let covariance: Option<Array4<f64>> = cache.load(Artifact::ForceCovariance);
        if let (Some(mean), Some(covariance)) = (mean, covariance) {
            if mean.dim() == (slots, d) && covariance.dim() == (slots, d, slots, d) {
                info!(stage = "fluctuating-force", "reusing cached force statistics");
                return Ok(ForceStatistics { mean, covariance });
            }
        }
        let stats = if gaussian {
            ForceStatistics::extended(&model.ensemble.initial_values(), &model.forces)?
        } else {
            ForceStatistics::from_forces(&model.forces)?
        };
        cache.store(Artifact::ForceMean, &stats.mean)?;
        cache.store(Artifact::ForceCovariance, &stats.covariance)?;
        Ok(stats)
    }

    fn noise_model(&self, cache: &ArtifactCache, model: &Reconstruction) -> GleResult<NoiseModel> {
        let stats = self.force_statistics(cache, model)?;
        let t0 = Instant::now();
        let noise = if self.config.simulation.accelerate_stationary_noise {
            let level = stats.stationary_mean();
            let mean = Array2::from_shape_fn(stats.mean.dim(), |(_, i)| level[i]);
            NoiseModel::Spectral(SpectralNoise::from_lag_covariance(mean, &stats.lag_covariance())?)
        } else {
            let n = stats.num_steps() * stats.num_obs();
            match cache.load::<Array2<f64>>(Artifact::NoiseFactor).filter(|m| m.dim() == (n, n)) {
                Some(factor) => {
                    info!(stage = "noise", "reusing cached noise factor");
                    NoiseModel::Dense(DenseNoise::from_factor(stats.mean.clone(), factor)?)
                }
                None => {
                    let dense = DenseNoise::from_statistics(&stats)?;
                    cache.store(Artifact::NoiseFactor, dense.factor())?;
                    NoiseModel::Dense(dense)
                }
            }
        };
        info!(stage = "noise", elapsed_s = t0.elapsed().as_secs_f64(), "noise model ready");
        Ok(noise)
    }
}
