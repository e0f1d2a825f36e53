//! Prelude module for convenient imports

pub use crate::error::{HwdlsError, Result};
pub use crate::priority::PriorityDebug;
pub use crate::solver::HwdlsSolver;
pub use crate::svd::SvdMethod;
pub use nalgebra as na;
