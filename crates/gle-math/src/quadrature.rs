// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Memory Quadrature
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Quadrature weights for the history integral ∫₀ᵗ K(t,s) A(s) ds on a
//! uniform grid, in units of dt.

use gle_types::config::Discretization;

/// Weights w_n(s) for s = 0..=n such that ∫₀^{n·dt} g ≈ dt · Σ_s w_n(s) g(s).
///
/// - `Symmetric`: composite Simpson over pairs of intervals; when `n` is odd
///   the final interval is closed with the trapezoid rule.
/// - `Darboux`: left Riemann sum, weight 1 for s < n and 0 at s = n.
pub fn memory_weights(n: usize, rule: Discretization) -> Vec<f64> {
    let mut w = vec![0.0; n + 1];
    match rule {
        Discretization::Darboux => {
            for ws in w.iter_mut().take(n) {
                *ws = 1.0;
            }
        }
        Discretization::Symmetric => {
            let mut j = 0;
            while j + 2 <= n {
                w[j] += 1.0 / 3.0;
                w[j + 1] += 4.0 / 3.0;
                w[j + 2] += 1.0 / 3.0;
                j += 2;
            }
            if j + 1 == n {
                w[j] += 0.5;
                w[j + 1] += 0.5;
            }
        }
    }
    w
}

/// Weights for every row n = 0..steps. Rows of the memory operator used by
/// both force extraction and integration are built from this table.
pub fn memory_weight_table(steps: usize, rule: Discretization) -> Vec<Vec<f64>> {
    (0..steps).map(|n| memory_weights(n, rule)).collect()
}
