//! # HWDLS — Hierarchical Weighted Damped Least-Squares solver
//!
//! Computes joint-space commands that realize a stack of prioritized,
//! linearized task equations `A * x = y`. Higher-priority levels are
//! satisfied as exactly as possible; lower-priority levels are solved only
//! within the remaining nullspace of all higher ones. The solver combines a
//! cascade of weighted pseudo-inverses, singular value decompositions,
//! adaptive damping for singularity robustness, and nullspace projection
//! between priority levels.
//!
//! Robot kinematic model evaluation, constraint linearization, and anything
//! that produces `A`/`y` for a level are out of scope: this crate treats
//! `A_p` as an opaque matrix and `y_p` as an opaque reference rate.
//!
//! ## Example
//!
//! ```rust
//! use hwdls::prelude::*;
//! use nalgebra::{DMatrix, DVector};
//!
//! let mut solver = HwdlsSolver::new();
//! solver.configure(&[2], 2).unwrap();
//!
//! let a = DMatrix::identity(2, 2);
//! let y = DVector::from_vec(vec![0.3, -0.7]);
//! let mut x = DVector::zeros(2);
//! solver.solve(&[a], &[y], &mut x).unwrap();
//! assert!((x[0] - 0.3).abs() < 1e-9);
//! ```

pub mod damping;
pub mod diagonal;
pub mod error;
pub mod prelude;
pub mod priority;
pub mod solver;
pub mod svd;
pub mod weighting;

pub use error::{HwdlsError, Result};
pub use priority::PriorityDebug;
pub use solver::HwdlsSolver;
pub use svd::SvdMethod;

pub use nalgebra as na;
