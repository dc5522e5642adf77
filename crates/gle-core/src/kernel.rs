// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Kernel Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Memory kernel from the discretised Volterra equation.
//!
//! Two-time correlations are handled on flattened (T·d)×(T·d) operators:
//!   S0(t,s) = ∂_s C(t,s) · C(s,s)⁻¹
//!   L = I - [strictly-lower(S0 dt) + ½ diag(S0 dt)]
//!   U = I + [strictly-upper(S0 dt) + ½ diag(S0 dt)]
//!   j(t,s) = ∂_s [C(s,s) - C(t,s)] · C(s,s)⁻¹
//!   J = j_lower · L⁻¹ + j_upper · U⁻¹,  K = ∂_t J  (s ≤ t kept)
//!
//! Lag correlations reuse the same algebra with Toeplitz operators, so both
//! inverses become lag recursions over already computed resolvent values.

use gle_math::diff::{block_central_difference, central_difference};
use gle_math::linalg::{inverse, lower_block_triangular_inverse, upper_block_triangular_inverse};
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::{ensure_finite, Correlation, MemoryKernel};
use ndarray::{s, Array2, Array3, Array4, Axis};
use tracing::{debug, info};

use crate::correlation::MIN_STEPS;

fn singular_block(err: GleError, what: &str, index: usize) -> GleError {
    match err {
        GleError::LinAlg(msg) => GleError::unstable(Stage::Kernel, format!("{what} {index}: {msg}")),
        other => other,
    }
}

/// Right-multiply each block column `s` of `m` by `factors[s]`.
fn scale_block_columns(m: &Array2<f64>, factors: &[Array2<f64>], d: usize) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros(m.raw_dim());
    for (s_blk, f) in factors.iter().enumerate() {
        let cols = s_blk * d..(s_blk + 1) * d;
        let prod = m.slice(s![.., cols.clone()]).dot(f);
        out.slice_mut(s![.., cols]).assign(&prod);
    }
    out
}

/// Strictly-lower part plus half the diagonal blocks, and the matching upper part.
fn split_halved(m: &Array2<f64>, d: usize) -> (Array2<f64>, Array2<f64>) {
    let mut lower = Array2::<f64>::zeros(m.raw_dim());
    let mut upper = Array2::<f64>::zeros(m.raw_dim());
    for ((r, c), &v) in m.indexed_iter() {
        let (t, s_blk) = (r / d, c / d);
        if t > s_blk {
            lower[[r, c]] = v;
        } else if t < s_blk {
            upper[[r, c]] = v;
        } else {
            lower[[r, c]] = 0.5 * v;
            upper[[r, c]] = 0.5 * v;
        }
    }
    (lower, upper)
}

/// Kernel stage: correlation in, causal memory kernel out.
#[derive(Debug, Clone, Copy)]
pub struct KernelSolver {
    dt: f64,
}

impl KernelSolver {
    pub fn new(dt: f64) -> GleResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(GleError::ConfigError(format!(
                "kernel solver requires finite dt > 0, got {dt}"
            )));
        }
        Ok(Self { dt })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn solve(&self, correlation: &Correlation) -> GleResult<MemoryKernel> {
        correlation.validate(Stage::Kernel)?;
        let steps = correlation.num_steps();
        if steps < MIN_STEPS {
            return Err(GleError::insufficient(
                Stage::Kernel,
                format!("need at least {MIN_STEPS} time steps, got {steps}"),
            ));
        }
        info!(steps, observables = correlation.num_obs(), mode = ?correlation.mode(), "solving memory kernel");
        let kernel = match correlation {
            Correlation::NonStationary(c) => MemoryKernel::NonStationary(self.solve_two_time(c)?),
            Correlation::Stationary(c) => MemoryKernel::Stationary(self.solve_lagged(c)?),
        };
        Ok(kernel)
    }

    fn solve_two_time(&self, c: &Array4<f64>) -> GleResult<Array4<f64>> {
        let (t, d, _, _) = c.dim();
        let n = t * d;
        let dt = self.dt;

        let mut diag_inv = Vec::with_capacity(t);
        for k in 0..t {
            let inv = inverse(c.slice(s![k, .., k, ..]))
                .map_err(|e| singular_block(e, "equal-time correlation block", k))?;
            diag_inv.push(inv);
        }

        let flat = Array2::from_shape_fn((n, n), |(r, q)| c[[r / d, r % d, q / d, q % d]]);
        let d_flat = block_central_difference(&flat, Axis(1), d, dt).map_err(|e| e.in_stage(Stage::Kernel))?;
        let s0 = scale_block_columns(&d_flat, &diag_inv, d) * dt;

        let mut lower = Array2::<f64>::eye(n);
        let mut upper = Array2::<f64>::eye(n);
        let (s0_lower, s0_upper) = split_halved(&s0, d);
        lower -= &s0_lower;
        upper += &s0_upper;

        let lower_inv = lower_block_triangular_inverse(lower.view(), d)
            .map_err(|e| e.in_stage(Stage::Kernel))?;
        let upper_inv = upper_block_triangular_inverse(upper.view(), d)
            .map_err(|e| e.in_stage(Stage::Kernel))?;

        let gap = Array2::from_shape_fn((n, n), |(r, q)| {
            let (ti, i) = (r / d, r % d);
            let (si, j) = (q / d, q % d);
            c[[si, i, si, j]] - c[[ti, i, si, j]]
        });
        let d_gap = block_central_difference(&gap, Axis(1), d, dt).map_err(|e| e.in_stage(Stage::Kernel))?;
        let j = scale_block_columns(&d_gap, &diag_inv, d);
        let (j_lower, j_upper) = split_halved(&j, d);

        let resolvent = j_lower.dot(&lower_inv) + j_upper.dot(&upper_inv);
        let k_flat = block_central_difference(&resolvent, Axis(0), d, dt).map_err(|e| e.in_stage(Stage::Kernel))?;

        let kernel = Array4::from_shape_fn((t, t, d, d), |(a, b, i, jj)| {
            if b <= a {
                k_flat[[a * d + i, b * d + jj]]
            } else {
                0.0
            }
        });
        ensure_finite(&kernel, Stage::Kernel, "memory kernel")?;
        debug!(peak = kernel.iter().fold(0.0f64, |m, v| m.max(v.abs())), "two-time kernel solved");
        Ok(kernel)
    }

    fn solve_lagged(&self, c: &Array3<f64>) -> GleResult<Array3<f64>> {
        let (lags, d, _) = c.dim();
        let steps = (lags + 1) / 2;
        let center = steps - 1;
        let dt = self.dt;

        let inv0 = inverse(c.index_axis(Axis(0), center))
            .map_err(|e| singular_block(e, "equal-time correlation block", 0))?;
        let dc = central_difference(c, Axis(0), dt).map_err(|e| e.in_stage(Stage::Kernel))?;
        let j0: Vec<Array2<f64>> = (0..lags).map(|k| dc.index_axis(Axis(0), k).dot(&inv0)).collect();

        let identity = Array2::<f64>::eye(d);
        let mut resolvent = Array3::<f64>::zeros((lags, d, d));

        // Lower pass walks positive lags, upper pass negative ones.
        for direction in [1isize, -1isize] {
            let sign = direction as f64;
            let idx = |r: usize| (center as isize + direction * r as isize) as usize;
            let mut prop: Vec<Array2<f64>> = (0..steps)
                .map(|r| j0[idx(r)].mapv(|v| sign * dt * v))
                .collect();
            prop[0] = &prop[0] * 0.5 + &identity;
            let prop0_inv = inverse(prop[0].view())
                .map_err(|e| singular_block(e, "propagator diagonal block at lag", 0))?;

            let mut partial: Vec<Array2<f64>> = Vec::with_capacity(steps);
            for tau in 0..steps {
                let mut rhs = if tau == 0 {
                    j0[idx(0)].mapv(|v| 0.5 * v)
                } else {
                    j0[idx(tau)].clone()
                };
                // Convolution with already known resolvent values.
                for r in 1..=tau {
                    rhs -= &partial[tau - r].dot(&prop[r]);
                }
                partial.push(rhs.dot(&prop0_inv));
            }
            for (tau, block) in partial.iter().enumerate() {
                let mut slot = resolvent.index_axis_mut(Axis(0), idx(tau));
                slot += block;
            }
        }

        let k_full = central_difference(&resolvent, Axis(0), dt).map_err(|e| e.in_stage(Stage::Kernel))?;
        let kernel = k_full.slice(s![center.., .., ..]).to_owned();
        ensure_finite(&kernel, Stage::Kernel, "memory kernel")?;
        debug!(peak = kernel.iter().fold(0.0f64, |m, v| m.max(v.abs())), "lag kernel solved");
        Ok(kernel)
    }
}
