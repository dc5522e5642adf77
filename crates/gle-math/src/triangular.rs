// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Triangular
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Scalar triangular inversion by forward and back substitution.
//!
//! Used for single-observable propagators, where the block-triangular
//! recursion collapses to ordinary substitution.

use gle_types::error::{GleError, GleResult};
use ndarray::{Array2, ArrayView2};

fn check_diagonal(m: &ArrayView2<f64>) -> GleResult<usize> {
    let (n, c) = m.dim();
    if n != c {
        return Err(GleError::LinAlg(format!(
            "triangular inverse needs a square matrix, got {n}x{c}"
        )));
    }
    let scale = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    for i in 0..n {
        let d = m[[i, i]];
        if !d.is_finite() || d.abs() <= scale * f64::EPSILON {
            return Err(GleError::LinAlg(format!(
                "singular triangular matrix: diagonal entry {i} is {d:e}"
            )));
        }
    }
    Ok(n)
}

/// Inverse of a lower-triangular matrix. Entries above the diagonal are ignored.
///
/// Column `j` of the inverse solves L x = e_j by forward substitution,
/// starting at row `j` since x is zero above it.
pub fn lower_triangular_inverse(l: ArrayView2<f64>) -> GleResult<Array2<f64>> {
    let n = check_diagonal(&l)?;
    let mut x = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        x[[j, j]] = 1.0 / l[[j, j]];
        for i in j + 1..n {
            let mut sum = 0.0;
            for k in j..i {
                sum += l[[i, k]] * x[[k, j]];
            }
            x[[i, j]] = -sum / l[[i, i]];
        }
    }
    Ok(x)
}

/// Inverse of an upper-triangular matrix. Entries below the diagonal are ignored.
pub fn upper_triangular_inverse(u: ArrayView2<f64>) -> GleResult<Array2<f64>> {
    let n = check_diagonal(&u)?;
    let mut x = Array2::<f64>::zeros((n, n));
    for j in (0..n).rev() {
        x[[j, j]] = 1.0 / u[[j, j]];
        for i in (0..j).rev() {
            let mut sum = 0.0;
            for k in i + 1..=j {
                sum += u[[i, k]] * x[[k, j]];
            }
            x[[i, j]] = -sum / u[[i, i]];
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lower_inverse() {
        let l = array![[2.0, 0.0, 0.0], [1.0, 4.0, 0.0], [-1.0, 0.5, 1.0]];
        let x = lower_triangular_inverse(l.view()).unwrap();
        let id = l.dot(&x);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((id[[i, j]] - expected).abs() < 1e-14, "({i},{j}) = {}", id[[i, j]]);
            }
        }
        assert_eq!(x[[0, 2]], 0.0);
    }

    #[test]
    fn test_upper_inverse() {
        let u = array![[1.0, 2.0, 3.0], [0.0, 0.5, -1.0], [0.0, 0.0, 4.0]];
        let x = upper_triangular_inverse(u.view()).unwrap();
        let id = u.dot(&x);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((id[[i, j]] - expected).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn test_upper_ignores_lower_entries() {
        let u = array![[1.0, 1.0], [9.0, 1.0]];
        let x = upper_triangular_inverse(u.view()).unwrap();
        assert!((x[[0, 1]] + 1.0).abs() < 1e-15);
        assert_eq!(x[[1, 0]], 0.0);
    }

    #[test]
    fn test_zero_diagonal_rejected() {
        let l = array![[1.0, 0.0], [3.0, 0.0]];
        assert!(matches!(lower_triangular_inverse(l.view()), Err(GleError::LinAlg(_))));
    }
}
