// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Finite Differences
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Time derivatives of sampled tensors along one axis.
//!
//! Central differences in the interior and one-sided differences at both
//! boundaries. The block variants treat an axis of length T·b as T groups of
//! b rows, which is how flattened (T·d)×(T·d) operators are differentiated
//! with respect to one of their two times.

use gle_types::config::Discretization;
use gle_types::error::{GleError, GleResult};
use ndarray::{Array, ArrayBase, Axis, Data, Dimension, Slice};

fn block_count(len: usize, block: usize) -> GleResult<usize> {
    if block == 0 || len % block != 0 {
        return Err(GleError::LinAlg(format!(
            "axis length {len} is not a multiple of block size {block}"
        )));
    }
    let steps = len / block;
    if steps < 2 {
        return Err(GleError::LinAlg(format!(
            "differencing needs at least 2 samples, got {steps}"
        )));
    }
    Ok(steps)
}

/// Central difference over groups of `block` consecutive entries along `axis`.
///
/// Interior: (x[t+1] - x[t-1]) / 2dt. Boundaries: (x[1] - x[0]) / dt and
/// (x[T-1] - x[T-2]) / dt.
pub fn block_central_difference<S, D>(
    values: &ArrayBase<S, D>,
    axis: Axis,
    block: usize,
    dt: f64,
) -> GleResult<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let steps = block_count(values.len_of(axis), block)?;
    let chunk = |t: usize| values.slice_axis(axis, Slice::from(t * block..(t + 1) * block));

    let mut out = Array::<f64, D>::zeros(values.raw_dim());
    for t in 0..steps {
        let (hi, lo, scale) = if t == 0 {
            (1, 0, 1.0 / dt)
        } else if t == steps - 1 {
            (steps - 1, steps - 2, 1.0 / dt)
        } else {
            (t + 1, t - 1, 0.5 / dt)
        };
        let diff = (&chunk(hi) - &chunk(lo)) * scale;
        out.slice_axis_mut(axis, Slice::from(t * block..(t + 1) * block))
            .assign(&diff);
    }
    Ok(out)
}

/// Central difference along `axis` with one-sided boundaries.
pub fn central_difference<S, D>(values: &ArrayBase<S, D>, axis: Axis, dt: f64) -> GleResult<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    block_central_difference(values, axis, 1, dt)
}

/// Forward difference (x[t+1] - x[t]) / dt, backward at the final sample.
pub fn forward_difference<S, D>(values: &ArrayBase<S, D>, axis: Axis, dt: f64) -> GleResult<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let steps = block_count(values.len_of(axis), 1)?;
    let sample = |t: usize| values.slice_axis(axis, Slice::from(t..t + 1));
    let mut out = Array::<f64, D>::zeros(values.raw_dim());
    for t in 0..steps {
        let (hi, lo) = if t + 1 < steps { (t + 1, t) } else { (t, t - 1) };
        let diff = (&sample(hi) - &sample(lo)) / dt;
        out.slice_axis_mut(axis, Slice::from(t..t + 1)).assign(&diff);
    }
    Ok(out)
}

/// Time derivative under the given convention.
pub fn derivative<S, D>(
    values: &ArrayBase<S, D>,
    axis: Axis,
    dt: f64,
    rule: Discretization,
) -> GleResult<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    match rule {
        Discretization::Symmetric => central_difference(values, axis, dt),
        Discretization::Darboux => forward_difference(values, axis, dt),
    }
}
