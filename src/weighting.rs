//! Weighting compiler.
//!
//! Converts a user-supplied symmetric positive-definite weight matrix into
//! the factor form actually multiplied into the projected task matrix each
//! solve. A diagonal weight is reduced to elementwise scaling; a dense
//! weight is factored once (Cholesky) at setter time so that every solve
//! pays only a single dense matrix product.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::diagonal::is_diagonal;
use crate::error::{HwdlsError, Result};

/// The compiled form of a weight matrix: either a diagonal scaling vector
/// or a dense factor, plus the flag that selects which path a solve takes.
#[derive(Debug, Clone)]
pub enum WeightFactor {
    Diagonal(DVector<f64>),
    Dense(DMatrix<f64>),
}

impl WeightFactor {
    pub fn is_diagonal(&self) -> bool {
        matches!(self, WeightFactor::Diagonal(_))
    }

    fn identity(n: usize) -> Self {
        WeightFactor::Diagonal(DVector::from_element(n, 1.0))
    }

    /// Writes `factor * m` into `out`, applied from the left: row-wise
    /// scaling for the diagonal case, a dense product for the dense case.
    /// `out` must not alias `m`. Allocation-free: the dense case uses
    /// `mul_to`, which writes directly into the caller-owned buffer.
    pub fn scale_rows_into(&self, m: &DMatrix<f64>, out: &mut DMatrix<f64>) {
        match self {
            WeightFactor::Diagonal(d) => {
                out.copy_from(m);
                for i in 0..out.nrows() {
                    out.row_mut(i).scale_mut(d[i]);
                }
            }
            WeightFactor::Dense(f) => f.mul_to(m, out),
        }
    }

    /// Writes `m * factor` into `out`, applied from the right: column-wise
    /// scaling for the diagonal case, a dense product for the dense case.
    /// `out` must not alias `m`. Allocation-free, as `scale_rows_into`.
    pub fn scale_cols_into(&self, m: &DMatrix<f64>, out: &mut DMatrix<f64>) {
        match self {
            WeightFactor::Diagonal(d) => {
                out.copy_from(m);
                for i in 0..out.ncols() {
                    out.column_mut(i).scale_mut(d[i]);
                }
            }
            WeightFactor::Dense(f) => m.mul_to(f, out),
        }
    }
}

/// Joint weight storage holds `W_q^{-1/2}`: `sqrt(1/W_ii)` diagonally, or
/// `(L^T)^{-1}` from the Cholesky factor `W_q = L L^T` densely.
pub fn compile_joint_weight(w: &DMatrix<f64>) -> Result<WeightFactor> {
    if is_diagonal(w) {
        let n = w.nrows();
        let mut diag = DVector::zeros(n);
        for i in 0..n {
            let wii = w[(i, i)];
            if wii == 0.0 {
                return Err(HwdlsError::ZeroJointWeight { index: i });
            }
            if wii < 0.0 {
                return Err(HwdlsError::NotPositiveDefinite);
            }
            diag[i] = (1.0 / wii).sqrt();
        }
        Ok(WeightFactor::Diagonal(diag))
    } else {
        let chol = Cholesky::new(w.clone()).ok_or(HwdlsError::NotPositiveDefinite)?;
        let l_t = chol.l().transpose();
        let l_t_inv = l_t.try_inverse().ok_or(HwdlsError::NotPositiveDefinite)?;
        Ok(WeightFactor::Dense(l_t_inv))
    }
}

/// Task weight storage holds `W_y^{1/2}`: `sqrt(W_ii)` diagonally, or `L^T`
/// from the Cholesky factor `W_y = L L^T` densely.
pub fn compile_task_weight(w: &DMatrix<f64>) -> Result<WeightFactor> {
    if is_diagonal(w) {
        let n = w.nrows();
        let mut diag = DVector::zeros(n);
        for i in 0..n {
            let wii = w[(i, i)];
            if wii < 0.0 {
                return Err(HwdlsError::NotPositiveDefinite);
            }
            diag[i] = wii.sqrt();
        }
        Ok(WeightFactor::Diagonal(diag))
    } else {
        let chol = Cholesky::new(w.clone()).ok_or(HwdlsError::NotPositiveDefinite)?;
        Ok(WeightFactor::Dense(chol.l().transpose()))
    }
}

/// The identity weight factor `configure` installs for every level.
pub fn identity_weight(n: usize) -> WeightFactor {
    WeightFactor::identity(n)
}
