//! Dense linear algebra utilities.
//!
//! LU inverse, cyclic Jacobi symmetric eigendecomposition, PSD square roots
//! (real and Hermitian), block lower-triangular inversion.

use gle_types::error::{GleError, GleResult};
use ndarray::{s, Array1, Array2, ArrayView2};
use num_complex::Complex64;

use crate::triangular;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOL: f64 = 1e-14;

/// Record of negative eigenvalues set to zero before taking a square root.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Clipping {
    pub count: usize,
    pub most_negative: f64,
}

impl Clipping {
    fn record(&mut self, lambda: f64) {
        self.count += 1;
        self.most_negative = self.most_negative.min(lambda);
    }
}

fn check_square(a: &ArrayView2<f64>, what: &str) -> GleResult<usize> {
    let (r, c) = a.dim();
    if r != c {
        return Err(GleError::LinAlg(format!("{what} needs a square matrix, got {r}x{c}")));
    }
    Ok(r)
}

fn check_finite(a: &ArrayView2<f64>, what: &str) -> GleResult<()> {
    if a.iter().any(|v| !v.is_finite()) {
        return Err(GleError::LinAlg(format!("{what}: input contains non-finite values")));
    }
    Ok(())
}

/// Inverse via Gauss-Jordan elimination with partial pivoting.
///
/// Fails with `LinAlg` when a pivot is zero relative to the matrix scale.
pub fn inverse(a: ArrayView2<f64>) -> GleResult<Array2<f64>> {
    let n = check_square(&a, "inverse")?;
    check_finite(&a, "inverse")?;
    let scale = a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    if scale == 0.0 {
        return Err(GleError::LinAlg("singular matrix: all entries are zero".into()));
    }
    let threshold = scale * f64::EPSILON * n as f64;

    let mut m = a.to_owned();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let mut pivot_row = col;
        let mut best = m[[col, col]].abs();
        for row in col + 1..n {
            let v = m[[row, col]].abs();
            if v > best {
                best = v;
                pivot_row = row;
            }
        }
        if best <= threshold {
            return Err(GleError::LinAlg(format!(
                "singular matrix: pivot {best:e} in column {col} below {threshold:e}"
            )));
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([col, k], [pivot_row, k]);
                inv.swap([col, k], [pivot_row, k]);
            }
        }

        let p = m[[col, col]];
        for k in 0..n {
            m[[col, k]] /= p;
            inv[[col, k]] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                m[[row, k]] -= factor * m[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }

    Ok(inv)
}

/// Symmetric eigendecomposition by cyclic Jacobi rotations.
///
/// Returns (eigenvalues ascending, eigenvectors as columns) with A = V diag(λ) Vᵀ.
/// The input is symmetrised as (A + Aᵀ)/2 first.
pub fn symmetric_eigen(a: ArrayView2<f64>) -> GleResult<(Array1<f64>, Array2<f64>)> {
    let n = check_square(&a, "symmetric_eigen")?;
    check_finite(&a, "symmetric_eigen")?;

    let mut m = Array2::from_shape_fn((n, n), |(i, j)| 0.5 * (a[[i, j]] + a[[j, i]]));
    let mut v = Array2::<f64>::eye(n);
    let frob = m.iter().map(|x| x * x).sum::<f64>().sqrt();

    let mut converged = n < 2 || frob == 0.0;
    for _sweep in 0..JACOBI_MAX_SWEEPS {
        if converged {
            break;
        }
        let mut off = 0.0;
        for p in 0..n {
            for q in p + 1..n {
                off += m[[p, q]] * m[[p, q]];
            }
        }
        if off.sqrt() <= JACOBI_TOL * frob {
            converged = true;
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = m[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }
    if !converged {
        return Err(GleError::LinAlg(format!(
            "Jacobi eigensolver did not converge in {JACOBI_MAX_SWEEPS} sweeps (n={n})"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[i, i]].total_cmp(&m[[j, j]]));
    let values = Array1::from_iter(order.iter().map(|&k| m[[k, k]]));
    let mut vectors = Array2::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    Ok((values, vectors))
}

/// Factor M = U·D^{1/2} of a symmetric PSD matrix, so that A ≈ M·Mᵀ.
///
/// Negative eigenvalues are clipped to zero and reported.
pub fn psd_factor(a: ArrayView2<f64>) -> GleResult<(Array2<f64>, Clipping)> {
    let (values, mut vectors) = symmetric_eigen(a)?;
    let mut clipping = Clipping::default();
    for (k, &lambda) in values.iter().enumerate() {
        let root = if lambda > 0.0 {
            lambda.sqrt()
        } else {
            if lambda < 0.0 {
                clipping.record(lambda);
            }
            0.0
        };
        vectors.column_mut(k).mapv_inplace(|x| x * root);
    }
    Ok((vectors, clipping))
}

/// Hermitian PSD square root R with R·Rᴴ = H, negative eigenvalues clipped.
///
/// Works on the real embedding [[Re H, -Im H], [Im H, Re H]], whose
/// eigenvalues are those of H, each repeated twice.
pub fn hermitian_psd_sqrt(h: ArrayView2<Complex64>) -> GleResult<(Array2<Complex64>, Clipping)> {
    let (d, d2) = h.dim();
    if d != d2 {
        return Err(GleError::LinAlg(format!(
            "hermitian_psd_sqrt needs a square matrix, got {d}x{d2}"
        )));
    }
    let mut embed = Array2::<f64>::zeros((2 * d, 2 * d));
    for i in 0..d {
        for j in 0..d {
            let z = h[[i, j]];
            embed[[i, j]] = z.re;
            embed[[i + d, j + d]] = z.re;
            embed[[i, j + d]] = -z.im;
            embed[[i + d, j]] = z.im;
        }
    }
    let (values, vectors) = symmetric_eigen(embed.view())?;

    let mut root = Array2::<f64>::zeros((2 * d, 2 * d));
    let mut clipping = Clipping::default();
    for (k, &lambda) in values.iter().enumerate() {
        if lambda <= 0.0 {
            if lambda < 0.0 {
                clipping.record(lambda);
            }
            continue;
        }
        let w = lambda.sqrt();
        let col = vectors.column(k);
        for i in 0..2 * d {
            for j in 0..2 * d {
                root[[i, j]] += w * col[i] * col[j];
            }
        }
    }
    clipping.count /= 2;

    let out = Array2::from_shape_fn((d, d), |(i, j)| Complex64::new(root[[i, j]], root[[i + d, j]]));
    Ok((out, clipping))
}

fn relabel(err: GleError, context: &str) -> GleError {
    match err {
        GleError::LinAlg(msg) => GleError::LinAlg(format!("{context}: {msg}")),
        other => other,
    }
}

/// Inverse of a lower block-triangular matrix with square blocks of size `block`.
///
/// Diagonal blocks are inverted directly; each off-diagonal block follows from
/// X(t,s) = -L(t,t)⁻¹ Σ_{u=s}^{t-1} L(t,u) X(u,s), evaluated as one product of
/// the block row L(t, s..t) with the block column X(s..t, s). Blocks above the
/// diagonal of the input are ignored. `block == 1` uses scalar forward
/// substitution.
///
/// There are T(T-1)/2 off-diagonal blocks and block (t,s) costs (t-s+1)
/// products of b × b matrices, so the total is O(T³b³) with a 1/6 prefactor.
pub fn lower_block_triangular_inverse(l: ArrayView2<f64>, block: usize) -> GleResult<Array2<f64>> {
    let n = check_square(&l, "lower_block_triangular_inverse")?;
    if block == 0 || n % block != 0 {
        return Err(GleError::LinAlg(format!(
            "matrix size {n} is not a multiple of block size {block}"
        )));
    }
    if block == 1 {
        return triangular::lower_triangular_inverse(l);
    }
    let steps = n / block;
    let b = block;

    let mut diag_inv = Vec::with_capacity(steps);
    for t in 0..steps {
        let inv = inverse(l.slice(s![t * b..(t + 1) * b, t * b..(t + 1) * b]))
            .map_err(|e| relabel(e, &format!("diagonal block {t}")))?;
        diag_inv.push(inv);
    }

    let mut x = Array2::<f64>::zeros((n, n));
    for s_blk in 0..steps {
        let cols = s_blk * b..(s_blk + 1) * b;
        x.slice_mut(s![s_blk * b..(s_blk + 1) * b, cols.clone()])
            .assign(&diag_inv[s_blk]);
        for t in s_blk + 1..steps {
            let l_row = l.slice(s![t * b..(t + 1) * b, s_blk * b..t * b]);
            let x_col = x.slice(s![s_blk * b..t * b, cols.clone()]);
            let acc = l_row.dot(&x_col);
            let x_ts = diag_inv[t].dot(&acc).mapv(|v| -v);
            x.slice_mut(s![t * b..(t + 1) * b, cols.clone()]).assign(&x_ts);
        }
    }
    Ok(x)
}

/// Inverse of an upper block-triangular matrix through the transpose of
/// [`lower_block_triangular_inverse`]. Blocks below the diagonal are ignored.
pub fn upper_block_triangular_inverse(u: ArrayView2<f64>, block: usize) -> GleResult<Array2<f64>> {
    if block == 1 {
        return triangular::upper_triangular_inverse(u);
    }
    let lower_inv = lower_block_triangular_inverse(u.t(), block)?;
    Ok(lower_inv.t().as_standard_layout().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        a.iter().zip(b.iter()).fold(0.0, |m, (x, y)| m.max((x - y).abs()))
    }

    #[test]
    fn test_inverse_3x3() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inv = inverse(a.view()).unwrap();
        let id = a.dot(&inv);
        assert!(max_abs_diff(&id, &Array2::eye(3)) < 1e-12);
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let inv = inverse(a.view()).unwrap();
        assert!(max_abs_diff(&inv, &a) < 1e-15);
    }

    #[test]
    fn test_inverse_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(inverse(a.view()), Err(GleError::LinAlg(_))));
    }

    #[test]
    fn test_symmetric_eigen_reconstructs() {
        let a = array![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0]];
        let (vals, vecs) = symmetric_eigen(a.view()).unwrap();
        // Known spectrum 2 - sqrt(2), 2, 2 + sqrt(2)
        let s2 = 2.0f64.sqrt();
        assert!((vals[0] - (2.0 - s2)).abs() < 1e-12);
        assert!((vals[1] - 2.0).abs() < 1e-12);
        assert!((vals[2] - (2.0 + s2)).abs() < 1e-12);

        let recon = vecs.dot(&Array2::from_diag(&vals)).dot(&vecs.t());
        assert!(max_abs_diff(&recon, &a) < 1e-12);
        let ortho = vecs.t().dot(&vecs);
        assert!(max_abs_diff(&ortho, &Array2::eye(3)) < 1e-12);
    }

    #[test]
    fn test_psd_factor_clips_negative() {
        let a = array![[1.0, 0.0], [0.0, -0.5]];
        let (m, clip) = psd_factor(a.view()).unwrap();
        assert_eq!(clip.count, 1);
        assert!((clip.most_negative + 0.5).abs() < 1e-15);
        let cov = m.dot(&m.t());
        assert!((cov[[0, 0]] - 1.0).abs() < 1e-12);
        assert!(cov[[1, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_hermitian_sqrt_squares_back() {
        let h = array![
            [Complex64::new(2.0, 0.0), Complex64::new(0.5, -0.3)],
            [Complex64::new(0.5, 0.3), Complex64::new(1.0, 0.0)]
        ];
        let (r, clip) = hermitian_psd_sqrt(h.view()).unwrap();
        assert_eq!(clip.count, 0);
        for i in 0..2 {
            for j in 0..2 {
                let mut acc = Complex64::new(0.0, 0.0);
                for k in 0..2 {
                    acc += r[[i, k]] * r[[j, k]].conj();
                }
                assert!((acc - h[[i, j]]).norm() < 1e-12, "({i},{j}) {acc} vs {}", h[[i, j]]);
            }
        }
    }

    #[test]
    fn test_block_lower_inverse() {
        let l = array![
            [2.0, 0.1, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.3, -0.2, 1.5, 0.4],
            [0.7, 0.1, 0.0, 1.0]
        ];
        let x = lower_block_triangular_inverse(l.view(), 2).unwrap();
        assert!(max_abs_diff(&l.dot(&x), &Array2::eye(4)) < 1e-12);
        // Causal structure preserved
        assert_eq!(x[[0, 2]], 0.0);
        assert_eq!(x[[1, 3]], 0.0);
    }

    #[test]
    fn test_block_lower_inverse_many_steps() {
        let (steps, b) = (6, 3);
        let n = steps * b;
        let full = Array2::from_shape_fn((n, n), |(r, c)| {
            if r == c {
                2.0 + 0.1 * (r % 4) as f64
            } else {
                0.05 * (((r * 7 + c * 3) % 11) as f64 - 5.0)
            }
        });
        // Only the causal part takes part in the inverse.
        let lower = Array2::from_shape_fn((n, n), |(r, c)| if c / b <= r / b { full[[r, c]] } else { 0.0 });
        let x = lower_block_triangular_inverse(full.view(), b).unwrap();
        assert!(max_abs_diff(&lower.dot(&x), &Array2::eye(n)) < 1e-12);
        assert!(max_abs_diff(&x.dot(&lower), &Array2::eye(n)) < 1e-12);
        for r in 0..n {
            for c in 0..n {
                if c / b > r / b {
                    assert_eq!(x[[r, c]], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_block_upper_inverse() {
        let u = array![
            [1.0, 0.2, 0.5, -0.1],
            [0.1, 1.0, 0.3, 0.2],
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.4, 1.0]
        ];
        let x = upper_block_triangular_inverse(u.view(), 2).unwrap();
        assert!(max_abs_diff(&u.dot(&x), &Array2::eye(4)) < 1e-12);
        assert!(x.is_standard_layout());
    }

    #[test]
    fn test_block_size_must_divide() {
        let l = Array2::<f64>::eye(5);
        assert!(lower_block_triangular_inverse(l.view(), 2).is_err());
    }
}
