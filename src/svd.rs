//! Two interchangeable SVD backends.
//!
//! Both decompose a `ny x nx` matrix `M = U * Sigma * V^T` and return `U`
//! zero-padded to `ny x nx`, `Sigma` zero-padded to length `nx`, and `V`
//! zero-padded to a full `nx x nx`. Only the first `min(ny, nx)` columns of
//! `U`/`V` and entries of `Sigma` can be nonzero; the remaining columns are
//! annihilated downstream by a zero entry of `Sigma^+`, so their exact
//! content never affects the pseudo-inverse or the projector update.
//!
//! Results from the two backends are equivalent up to sign convention of
//! columns: downstream formulas are sign-invariant because each `Sigma^+`
//! entry multiplies a `U` column and a `V` column symmetrically.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{HwdlsError, Result};

/// Selects which SVD backend the cascade uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvdMethod {
    /// Full dense SVD backend (delegates to `nalgebra::SVD`, itself an
    /// LAPACK-style Golub-Kahan bidiagonalization + implicit QR).
    SvdEigen,
    /// Legacy Householder-style backend: a one-sided Jacobi rotation sweep,
    /// in the spirit of KDL's `svd_eigen_HH`.
    SvdKdl,
}

/// The padded result of a single SVD call, already shaped to the per-level
/// scratch sizes (`U`: ny x nx, `Sigma`: length nx, `V`: nx x nx).
pub struct SvdResult {
    pub u: DMatrix<f64>,
    pub sigma: DVector<f64>,
    pub v: DMatrix<f64>,
}

/// Run the selected backend on a `ny x nx` matrix `m`.
pub fn compute(m: &DMatrix<f64>, nx: usize, method: SvdMethod) -> Result<SvdResult> {
    match method {
        SvdMethod::SvdEigen => Ok(svd_eigen(m, nx)),
        SvdMethod::SvdKdl => Ok(svd_kdl(m, nx)),
        // `SvdMethod` is an exhaustive enum; an out-of-range value can only
        // arrive through a foreign-language FFI boundary, which this crate
        // does not expose. Kept for parity with the original's runtime
        // dispatch, which validated the selector at call time.
        #[allow(unreachable_patterns)]
        _ => Err(HwdlsError::InvalidSvdMethod),
    }
}

fn pad(u_thin: DMatrix<f64>, sv: DVector<f64>, v_thin: DMatrix<f64>, ny: usize, nx: usize) -> SvdResult {
    let k = sv.len();
    let mut sigma = DVector::zeros(nx);
    sigma.rows_mut(0, k).copy_from(&sv);

    let mut u = DMatrix::zeros(ny, nx);
    u.view_mut((0, 0), (ny, k)).copy_from(&u_thin);

    let mut v = DMatrix::zeros(nx, nx);
    v.view_mut((0, 0), (nx, k)).copy_from(&v_thin);

    SvdResult { u, sigma, v }
}

/// Full-SVD backend: thin decomposition from `nalgebra`, then zero-padded
/// to the shapes the cascade expects. When `ny < nx` the true `V` has
/// `nx - ny` additional orthonormal columns spanning the right nullspace of
/// `m`; they are left as zero columns here since their corresponding
/// `Sigma^+` entries are always zero (see module docs), so the omission
/// never reaches the pseudo-inverse or the projector.
fn svd_eigen(m: &DMatrix<f64>, nx: usize) -> SvdResult {
    let ny = m.nrows();
    let svd = nalgebra::linalg::SVD::new(m.clone(), true, true);
    let u_thin = svd.u.expect("compute_u was requested");
    let v_t_thin = svd.v_t.expect("compute_v was requested");
    let v_thin = v_t_thin.transpose();
    pad(u_thin, svd.singular_values, v_thin, ny, nx)
}

/// Legacy Householder-style backend (one-sided Jacobi rotation sweep).
///
/// Ambiguity noted in the design review: when `ny < nx`, this backend
/// decomposes `m^T` (which is tall) and swaps `U`/`V`, so its singular
/// vectors are an orthonormal basis for the same `min(ny, nx)`-dimensional
/// range/row-space as the full-SVD backend, but not necessarily in the same
/// column order or with the same sign (see `svd_backends_agree_on_solution`
/// in `tests/scenarios.rs`).
fn svd_kdl(m: &DMatrix<f64>, nx: usize) -> SvdResult {
    let ny = m.nrows();
    if ny >= nx {
        let (u, sigma, v) = one_sided_jacobi(m);
        pad(u, sigma, v, ny, nx)
    } else {
        let (u, sigma, v) = one_sided_jacobi(&m.transpose());
        // m^T = u * sigma * v^T  =>  m = v * sigma * u^T
        pad(v, sigma, u, ny, nx)
    }
}

/// One-sided Jacobi SVD for a matrix with at least as many rows as columns.
/// Returns `(U, sigma, V)` with `U` orthonormal columns (m x n), `sigma`
/// descending (length n), `V` orthogonal (n x n), such that `A = U diag(sigma) V^T`.
fn one_sided_jacobi(a: &DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>) {
    let (rows, cols) = (a.nrows(), a.ncols());
    let mut u = a.clone();
    let mut v = DMatrix::identity(cols, cols);

    if cols == 0 {
        return (u, DVector::zeros(0), v);
    }

    const MAX_SWEEPS: usize = 60;
    const TOL: f64 = 1e-14;

    for _sweep in 0..MAX_SWEEPS {
        let mut off_diag_max: f64 = 0.0;
        for p in 0..cols {
            for q in (p + 1)..cols {
                let col_p = u.column(p);
                let col_q = u.column(q);
                let alpha = col_p.dot(&col_p);
                let beta = col_q.dot(&col_q);
                let gamma = col_p.dot(&col_q);

                let scale = (alpha * beta).sqrt().max(1e-300);
                off_diag_max = off_diag_max.max(gamma.abs() / scale);

                if gamma.abs() <= TOL * scale {
                    continue;
                }

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let t = if zeta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                for row in 0..rows {
                    let up = u[(row, p)];
                    let uq = u[(row, q)];
                    u[(row, p)] = c * up - s * uq;
                    u[(row, q)] = s * up + c * uq;
                }
                for row in 0..cols {
                    let vp = v[(row, p)];
                    let vq = v[(row, q)];
                    v[(row, p)] = c * vp - s * vq;
                    v[(row, q)] = s * vp + c * vq;
                }
            }
        }
        if off_diag_max < TOL {
            break;
        }
    }

    let mut sigma = DVector::zeros(cols);
    for j in 0..cols {
        let norm = u.column(j).norm();
        sigma[j] = norm;
        if norm > 1e-300 {
            u.column_mut(j).scale_mut(1.0 / norm);
        }
    }

    let mut order: Vec<usize> = (0..cols).collect();
    order.sort_by(|&i, &j| sigma[j].partial_cmp(&sigma[i]).unwrap());

    let mut sigma_sorted = DVector::zeros(cols);
    let mut u_sorted = DMatrix::zeros(rows, cols);
    let mut v_sorted = DMatrix::zeros(cols, cols);
    for (new_idx, &old_idx) in order.iter().enumerate() {
        sigma_sorted[new_idx] = sigma[old_idx];
        u_sorted.column_mut(new_idx).copy_from(&u.column(old_idx));
        v_sorted.column_mut(new_idx).copy_from(&v.column(old_idx));
    }

    (u_sorted, sigma_sorted, v_sorted)
}
