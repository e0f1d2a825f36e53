//! Diagonal-detection utility.
//!
//! Exact-zero comparison only: callers that want the diagonal fast path must
//! pass structurally diagonal matrices. A matrix with a single tiny nonzero
//! off-diagonal entry routes through the dense path.

use nalgebra::DMatrix;

/// Returns true iff `m[i, j] == 0.0` for every `i != j`.
pub fn is_diagonal(m: &DMatrix<f64>) -> bool {
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            if i != j && m[(i, j)] != 0.0 {
                return false;
            }
        }
    }
    true
}
