// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Memory Term
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Discretised history integral ∫₀ᵗ K(t,s) A(s) ds.
//!
//! Row t of the operator is the d × (t+1)·d matrix [dt·w_t(s)·K(t,s)]_s, so the
//! memory term of every realization at step t is one matrix product with the
//! stacked history [A(0); …; A(t)].

use gle_math::quadrature::memory_weight_table;
use gle_types::config::Discretization;
use gle_types::state::MemoryKernel;
use ndarray::{s, Array2, ArrayView2};

#[derive(Debug, Clone)]
pub struct MemoryOperator {
    rows: Vec<Array2<f64>>,
    num_obs: usize,
    rule: Discretization,
}

impl MemoryOperator {
    pub fn new(kernel: &MemoryKernel, rule: Discretization, dt: f64) -> Self {
        let steps = kernel.num_steps();
        let d = kernel.num_obs();
        let rows = memory_weight_table(steps, rule)
            .into_iter()
            .enumerate()
            .map(|(t, w)| {
                let mut row = Array2::<f64>::zeros((d, (t + 1) * d));
                for (s_idx, &ws) in w.iter().enumerate() {
                    if ws == 0.0 {
                        continue;
                    }
                    let block = kernel.block(t, s_idx).mapv(|k| k * ws * dt);
                    row.slice_mut(s![.., s_idx * d..(s_idx + 1) * d]).assign(&block);
                }
                row
            })
            .collect();
        Self {
            rows,
            num_obs: d,
            rule,
        }
    }

    pub fn num_steps(&self) -> usize {
        self.rows.len()
    }

    pub fn num_obs(&self) -> usize {
        self.num_obs
    }

    pub fn rule(&self) -> Discretization {
        self.rule
    }

    /// Memory term at step `t` for a batch: `history` is [≥(t+1)·d, N], one
    /// column per realization. Returns [d, N].
    pub fn apply(&self, t: usize, history: ArrayView2<f64>) -> Array2<f64> {
        let row = &self.rows[t];
        row.dot(&history.slice(s![..row.ncols(), ..]))
    }
}
