//! Per-level state and telemetry.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::weighting::{identity_weight, WeightFactor};

/// Scratch and weight storage owned by a single priority level, sized once
/// by `configure` and reused on every solve.
pub(crate) struct PriorityState {
    pub ny: usize,
    pub task_weight: WeightFactor,

    pub a_proj: DMatrix<f64>,
    pub a_scratch: DMatrix<f64>,
    pub a_proj_w: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub u_t: DMatrix<f64>,
    pub a_proj_inv_wls: DMatrix<f64>,
    pub a_proj_inv_wdls: DMatrix<f64>,
    pub y_comp: DVector<f64>,
    pub ut_w: DMatrix<f64>,
}

impl PriorityState {
    pub fn new(ny: usize, nx: usize) -> Self {
        Self {
            ny,
            task_weight: identity_weight(ny),
            a_proj: DMatrix::zeros(ny, nx),
            a_scratch: DMatrix::zeros(ny, nx),
            a_proj_w: DMatrix::zeros(ny, nx),
            u: DMatrix::zeros(ny, nx),
            u_t: DMatrix::zeros(nx, ny),
            a_proj_inv_wls: DMatrix::zeros(nx, ny),
            a_proj_inv_wdls: DMatrix::zeros(nx, ny),
            y_comp: DVector::zeros(ny),
            ut_w: DMatrix::zeros(nx, ny),
        }
    }
}

/// Per-level telemetry, populated only when `compute_debug` is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityDebug {
    pub y_des: DVector<f64>,
    pub y_solution: DVector<f64>,
    pub singular_vals: DVector<f64>,
    pub manipulability: f64,
    pub sqrt_err: f64,
    pub damping: f64,
    pub proj_time: f64,
    pub weighting_time: f64,
    pub svd_time: f64,
    pub compute_inverse_time: f64,
}

impl PriorityDebug {
    pub(crate) fn new(ny: usize, nx: usize) -> Self {
        Self {
            y_des: DVector::zeros(ny),
            y_solution: DVector::zeros(ny),
            singular_vals: DVector::zeros(nx),
            manipulability: 0.0,
            sqrt_err: 0.0,
            damping: 0.0,
            proj_time: 0.0,
            weighting_time: 0.0,
            svd_time: 0.0,
            compute_inverse_time: 0.0,
        }
    }
}
