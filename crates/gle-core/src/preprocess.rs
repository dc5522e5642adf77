// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Preprocessing
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Input conditioning ahead of the correlation stage.

use gle_math::fft::convolve;
use gle_types::config::PreprocessConfig;
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::TrajectoryEnsemble;
use ndarray::{s, Array1, Array3, Axis};
use tracing::{debug, info};

use crate::correlation::MIN_STEPS;

/// Normalised bump exp(1 / ((k/w - 1)² - 1)) sampled at k = 1..2w-1.
pub fn bump_kernel(width: usize) -> Array1<f64> {
    let w = width as f64;
    let raw = Array1::from_shape_fn(2 * width - 1, |k| {
        let x = (k + 1) as f64 / w - 1.0;
        (1.0 / (x * x - 1.0)).exp()
    });
    let total = raw.sum();
    raw / total
}

/// Subtract the ensemble mean of A(0) from every sample. Returns the shifted
/// ensemble and the removed mean [d].
pub fn shift_initial_value(ensemble: &TrajectoryEnsemble) -> GleResult<(TrajectoryEnsemble, Array1<f64>)> {
    let mean = ensemble
        .initial_values()
        .mean_axis(Axis(0))
        .ok_or_else(|| GleError::insufficient(Stage::Preprocess, "ensemble has no realizations"))?;
    let values = &ensemble.values - &mean;
    Ok((TrajectoryEnsemble::new(ensemble.times.clone(), values)?, mean))
}

/// Smooth every series with a bump of half-width `width` and drop `width`
/// samples at each end. Widths below 2 leave the ensemble unchanged.
pub fn mollify(ensemble: &TrajectoryEnsemble, width: usize) -> GleResult<TrajectoryEnsemble> {
    if width < 2 {
        return Ok(ensemble.clone());
    }
    let steps = ensemble.num_steps();
    if steps < 2 * width + MIN_STEPS {
        return Err(GleError::insufficient(
            Stage::Preprocess,
            format!("mollifier width {width} leaves fewer than {MIN_STEPS} of {steps} samples"),
        ));
    }
    let bump = bump_kernel(width);
    let kept = steps - 2 * width;
    let (n, _, d) = ensemble.values.dim();
    let mut values = Array3::<f64>::zeros((n, kept, d));
    for k in 0..n {
        for i in 0..d {
            let series = ensemble.values.slice(s![k, .., i]);
            let smooth =
                convolve(series, bump.view()).map_err(|e| e.in_stage(Stage::Preprocess))?;
            // centred output for sample t sits at t + width - 1
            values
                .slice_mut(s![k, .., i])
                .assign(&smooth.slice(s![2 * width - 1..2 * width - 1 + kept]));
        }
    }
    let times = ensemble.times.slice(s![width..steps - width]).to_owned();
    debug!(width, kept, "ensemble mollified");
    TrajectoryEnsemble::new(times, values)
}

/// Conditioned ensemble plus the offset to add back to synthetic trajectories.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub ensemble: TrajectoryEnsemble,
    pub offset: Array1<f64>,
}

pub fn preprocess(ensemble: &TrajectoryEnsemble, config: &PreprocessConfig) -> GleResult<Preprocessed> {
    let smoothed = mollify(ensemble, config.mollifier_width)?;
    let (ensemble, offset) = if config.shift_initial_value {
        shift_initial_value(&smoothed)?
    } else {
        let d = smoothed.num_obs();
        (smoothed, Array1::zeros(d))
    };
    info!(
        realizations = ensemble.num_realizations(),
        steps = ensemble.num_steps(),
        observables = ensemble.num_obs(),
        shifted = config.shift_initial_value,
        mollifier_width = config.mollifier_width,
        "preprocessing done"
    );
    Ok(Preprocessed { ensemble, offset })
}
