//! The priority cascade and its public façade: `HwdlsSolver`.
//!
//! For each priority level in order, the cascade compensates the desired
//! task rate for motion already committed by higher priorities, projects
//! the task matrix onto the current nullspace, weights it, runs an SVD,
//! selects a damping scalar, assembles both the undamped and damped
//! weighted pseudo-inverses, updates the accumulated solution, and
//! contracts the nullspace projector for the next level.

use std::time::Instant;

use log::{error, warn};
use nalgebra::{DMatrix, DVector};

use crate::damping::select_damping;
use crate::error::{HwdlsError, Result};
use crate::priority::{PriorityDebug, PriorityState};
use crate::svd::{self, SvdMethod};
use crate::weighting::{compile_joint_weight, compile_task_weight, identity_weight, WeightFactor};

/// Hierarchical Weighted Damped Least-Squares solver.
///
/// Single-threaded per instance; instances are cheap and own all of their
/// scratch and weight storage exclusively for their lifetime. Callers that
/// need parallel solves instantiate separate solvers.
pub struct HwdlsSolver {
    configured: bool,
    nx: usize,
    priorities: Vec<PriorityState>,
    prio_debug: Vec<PriorityDebug>,

    joint_weight: WeightFactor,

    proj_mat: DMatrix<f64>,
    v: DMatrix<f64>,
    sigma: DVector<f64>,
    sigma_inv: DMatrix<f64>,
    sigma_inv_damped: DMatrix<f64>,

    // Cascade staging buffers (§3): Wq^{-1/2}*V, and that times each Sigma^+.
    wq_v: DMatrix<f64>,
    wq_v_sigma_inv: DMatrix<f64>,
    wq_v_sigma_inv_damped: DMatrix<f64>,
    // Temporary vector (nx): holds A#_wdls * y_comp before it is added to x.
    x_delta: DVector<f64>,

    norm_max: f64,
    epsilon: f64,
    svd_method: SvdMethod,
    compute_debug: bool,
}

impl Default for HwdlsSolver {
    fn default() -> Self {
        Self {
            configured: false,
            nx: 0,
            priorities: Vec::new(),
            prio_debug: Vec::new(),
            joint_weight: identity_weight(0),
            proj_mat: DMatrix::zeros(0, 0),
            v: DMatrix::zeros(0, 0),
            sigma: DVector::zeros(0),
            sigma_inv: DMatrix::zeros(0, 0),
            sigma_inv_damped: DMatrix::zeros(0, 0),
            wq_v: DMatrix::zeros(0, 0),
            wq_v_sigma_inv: DMatrix::zeros(0, 0),
            wq_v_sigma_inv_damped: DMatrix::zeros(0, 0),
            x_delta: DVector::zeros(0),
            norm_max: 1.0,
            epsilon: 1e-9,
            svd_method: SvdMethod::SvdEigen,
            compute_debug: false,
        }
    }
}

impl HwdlsSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates all per-level and cascade storage, sets the joint weight
    /// and every task weight to identity, and clears debug buffers.
    /// Idempotent: calling `configure` again fully resets weights and
    /// storage to the new shape. `norm_max`, `epsilon`, `svd_method`, and
    /// `compute_debug` are untouched by reconfiguration.
    pub fn configure(&mut self, ny_per_priority: &[usize], nx: usize) -> Result<()> {
        if nx == 0 {
            error!("configure: number of joint variables must be > 0");
            return Err(HwdlsError::InvalidShape {
                expected: "nx >= 1".into(),
                actual: "nx = 0".into(),
            });
        }
        if ny_per_priority.is_empty() {
            error!("configure: at least one priority level is required");
            return Err(HwdlsError::InvalidShape {
                expected: "at least 1 priority level".into(),
                actual: "0 priority levels".into(),
            });
        }
        for (p, &ny) in ny_per_priority.iter().enumerate() {
            if ny == 0 {
                error!("configure: priority {p} has zero task variables");
                return Err(HwdlsError::InvalidShape {
                    expected: format!("ny[{p}] >= 1"),
                    actual: format!("ny[{p}] = 0"),
                });
            }
        }

        self.nx = nx;
        self.priorities = ny_per_priority
            .iter()
            .map(|&ny| PriorityState::new(ny, nx))
            .collect();
        self.prio_debug = ny_per_priority
            .iter()
            .map(|&ny| PriorityDebug::new(ny, nx))
            .collect();

        self.joint_weight = identity_weight(nx);
        self.proj_mat = DMatrix::identity(nx, nx);
        self.v = DMatrix::identity(nx, nx);
        self.sigma = DVector::zeros(nx);
        self.sigma_inv = DMatrix::zeros(nx, nx);
        self.sigma_inv_damped = DMatrix::zeros(nx, nx);
        self.wq_v = DMatrix::zeros(nx, nx);
        self.wq_v_sigma_inv = DMatrix::zeros(nx, nx);
        self.wq_v_sigma_inv_damped = DMatrix::zeros(nx, nx);
        self.x_delta = DVector::zeros(nx);

        self.configured = true;
        Ok(())
    }

    fn require_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(HwdlsError::Unconfigured)
        }
    }

    /// `W` must be `nx x nx` symmetric positive-definite. No diagonal entry
    /// may be zero — a zero would denote an infinitely movable joint.
    pub fn set_joint_weights(&mut self, w: &DMatrix<f64>) -> Result<()> {
        self.require_configured()?;
        if w.nrows() != self.nx || w.ncols() != self.nx {
            return Err(HwdlsError::InvalidShape {
                expected: format!("{0}x{0}", self.nx),
                actual: format!("{}x{}", w.nrows(), w.ncols()),
            });
        }
        self.joint_weight = compile_joint_weight(w)?;
        Ok(())
    }

    /// `W` must be `ny_p x ny_p` symmetric positive-definite.
    pub fn set_task_weights(&mut self, w: &DMatrix<f64>, p: usize) -> Result<()> {
        self.require_configured()?;
        if p >= self.priorities.len() {
            return Err(HwdlsError::InvalidPriority {
                index: p,
                num_priorities: self.priorities.len(),
            });
        }
        let ny = self.priorities[p].ny;
        if w.nrows() != ny || w.ncols() != ny {
            return Err(HwdlsError::InvalidShape {
                expected: format!("{0}x{0}", ny),
                actual: format!("{}x{}", w.nrows(), w.ncols()),
            });
        }
        self.priorities[p].task_weight = compile_task_weight(w)?;
        Ok(())
    }

    /// Upper bound on the norm of the damped inverse. Must be positive —
    /// `norm_max = 0` would divide by zero in the damping formula, and the
    /// original implementation does not guard it. This crate rejects
    /// non-positive values instead of propagating a silent `inf`/`NaN`.
    pub fn set_norm_max(&mut self, v: f64) -> Result<()> {
        if v <= 0.0 {
            warn!("set_norm_max: rejecting non-positive norm_max {v}");
            return Err(HwdlsError::InvalidShape {
                expected: "norm_max > 0".into(),
                actual: format!("norm_max = {v}"),
            });
        }
        self.norm_max = v;
        Ok(())
    }

    pub fn set_svd_method(&mut self, method: SvdMethod) {
        self.svd_method = method;
    }

    pub fn set_epsilon(&mut self, v: f64) -> Result<()> {
        if v <= 0.0 {
            warn!("set_epsilon: rejecting non-positive epsilon {v}");
            return Err(HwdlsError::InvalidShape {
                expected: "epsilon > 0".into(),
                actual: format!("epsilon = {v}"),
            });
        }
        self.epsilon = v;
        Ok(())
    }

    pub fn set_compute_debug(&mut self, enabled: bool) {
        self.compute_debug = enabled;
    }

    pub fn get_priority_debug(&self) -> &[PriorityDebug] {
        &self.prio_debug
    }

    /// The nullspace projector after the most recent solve. Exposed
    /// crate-internally so the numerical invariants of §8 (projector
    /// idempotence, nullspace orthogonality) can be checked directly
    /// against the accumulated state rather than only inferred from `x`.
    #[cfg(test)]
    pub(crate) fn projector(&self) -> &DMatrix<f64> {
        &self.proj_mat
    }

    /// Solves the prioritized task stack for the current weights, writing
    /// the result into `x`. Resizes and zeros `x` first if its length does
    /// not match the configured number of joint variables.
    pub fn solve(&mut self, a: &[DMatrix<f64>], y: &[DVector<f64>], x: &mut DVector<f64>) -> Result<()> {
        self.require_configured()?;

        let num_priorities = self.priorities.len();
        if a.len() != num_priorities || y.len() != num_priorities {
            return Err(HwdlsError::InvalidPriorityCount {
                expected: num_priorities,
                actual: a.len().max(y.len()),
            });
        }
        for p in 0..num_priorities {
            let ny = self.priorities[p].ny;
            if a[p].nrows() != ny || a[p].ncols() != self.nx {
                return Err(HwdlsError::InvalidShape {
                    expected: format!("{}x{}", ny, self.nx),
                    actual: format!("{}x{}", a[p].nrows(), a[p].ncols()),
                });
            }
            if y[p].len() != ny {
                return Err(HwdlsError::InvalidShape {
                    expected: format!("{ny}x1"),
                    actual: format!("{}x1", y[p].len()),
                });
            }
        }

        if x.len() != self.nx {
            *x = DVector::zeros(self.nx);
        } else {
            x.fill(0.0);
        }
        self.proj_mat.fill(0.0);
        for i in 0..self.nx {
            self.proj_mat[(i, i)] = 1.0;
        }

        let nx = self.nx;
        for p in 0..num_priorities {
            let level = &mut self.priorities[p];
            let ny = level.ny;

            // 1. Residual compensation: y_comp = y_p - A_p * x.
            level.y_comp.copy_from(&y[p]);
            level.y_comp.gemv(-1.0, &a[p], &*x, 1.0);

            let t_proj = Instant::now();
            // 2. Nullspace projection: A_proj = A_p * P.
            a[p].mul_to(&self.proj_mat, &mut level.a_proj);
            let proj_time = t_proj.elapsed().as_secs_f64();

            let t_w = Instant::now();
            // 3. Weighting: A_proj_w = Wy^{1/2} * A_proj * Wq^{-1/2}.
            level.task_weight.scale_rows_into(&level.a_proj, &mut level.a_scratch);
            self.joint_weight.scale_cols_into(&level.a_scratch, &mut level.a_proj_w);
            let weighting_time = t_w.elapsed().as_secs_f64();

            let t_svd = Instant::now();
            let svd_result = svd::compute(&level.a_proj_w, nx, self.svd_method)?;
            let svd_time = t_svd.elapsed().as_secs_f64();
            level.u.copy_from(&svd_result.u);
            self.v.copy_from(&svd_result.v);
            self.sigma.copy_from(&svd_result.sigma);

            let active = nx.min(ny);
            let s_min = (0..active).map(|i| self.sigma[i]).fold(f64::INFINITY, f64::min);
            let damping = select_damping(s_min, self.norm_max);

            self.sigma_inv_damped.fill(0.0);
            for i in 0..active {
                let s = self.sigma[i];
                self.sigma_inv_damped[(i, i)] = s / (s * s + damping * damping);
            }

            self.sigma_inv.fill(0.0);
            for i in 0..nx {
                let s = self.sigma[i];
                if s >= self.epsilon {
                    self.sigma_inv[(i, i)] = 1.0 / s;
                }
            }

            let t_inv = Instant::now();
            let level = &mut self.priorities[p];
            level.u.transpose_to(&mut level.u_t);
            level.task_weight.scale_cols_into(&level.u_t, &mut level.ut_w);

            self.joint_weight.scale_rows_into(&self.v, &mut self.wq_v);
            self.wq_v.mul_to(&self.sigma_inv, &mut self.wq_v_sigma_inv);
            self.wq_v.mul_to(&self.sigma_inv_damped, &mut self.wq_v_sigma_inv_damped);

            let level = &mut self.priorities[p];
            self.wq_v_sigma_inv.mul_to(&level.ut_w, &mut level.a_proj_inv_wls);
            self.wq_v_sigma_inv_damped.mul_to(&level.ut_w, &mut level.a_proj_inv_wdls);
            let inverse_time = t_inv.elapsed().as_secs_f64();

            // 8. Solution update: x += A#_wdls * y_comp, via the shared
            // temporary vector so no per-solve heap allocation occurs.
            level.a_proj_inv_wdls.mul_to(&level.y_comp, &mut self.x_delta);
            *x += &self.x_delta;

            // 9. Projector contraction: P -= A#_wls * A_proj, fused in place.
            self.proj_mat.gemm(-1.0, &level.a_proj_inv_wls, &level.a_proj, 1.0);

            if self.compute_debug {
                let level = &self.priorities[p];
                let debug = &mut self.prio_debug[p];
                debug.y_des.copy_from(&y[p]);
                a[p].mul_to(&*x, &mut debug.y_solution);
                let gram = &level.a_proj_w * level.a_proj_w.transpose();
                let manipulability = gram.determinant().max(0.0).sqrt();
                let sqrt_err = (&debug.y_des - &debug.y_solution).norm().sqrt();

                debug.singular_vals.copy_from(&self.sigma);
                debug.manipulability = manipulability;
                debug.sqrt_err = sqrt_err;
                debug.damping = damping;
                debug.proj_time = proj_time;
                debug.weighting_time = weighting_time;
                debug.svd_time = svd_time;
                debug.compute_inverse_time = inverse_time;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dmatrix;

    #[test]
    fn s1_identity_single_priority() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[2], 2).unwrap();
        solver.set_norm_max(1e3).unwrap();

        let a = dmatrix![1.0, 0.0; 0.0, 1.0];
        let y = DVector::from_vec(vec![0.3, -0.7]);
        let mut x = DVector::zeros(0);
        solver.solve(&[a], &[y], &mut x).unwrap();

        assert_abs_diff_eq!(x[0], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(x[1], -0.7, epsilon = 1e-9);
    }

    #[test]
    fn s2_rank_deficient_damped() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[2], 2).unwrap();
        solver.set_norm_max(1.0).unwrap();

        let a = dmatrix![1.0, 0.0; 1.0, 0.0];
        let y = DVector::from_vec(vec![1.0, 1.0]);
        let mut x = DVector::zeros(2);
        solver.solve(&[a.clone()], &[y], &mut x).unwrap();

        assert_abs_diff_eq!(x[1], 0.0, epsilon = 1e-9);
        assert!(x[0] > 0.0 && x[0] < 1.0);
        let ax = &a * &x;
        assert_abs_diff_eq!(ax[0], ax[1], epsilon = 1e-9);
    }

    #[test]
    fn s3_two_priorities_exact_on_top() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[1, 1], 3).unwrap();
        solver.set_norm_max(1e3).unwrap();

        let a0 = dmatrix![1.0, 0.0, 0.0];
        let y0 = DVector::from_vec(vec![1.0]);
        let a1 = dmatrix![0.0, 1.0, 0.0];
        let y1 = DVector::from_vec(vec![2.0]);
        let mut x = DVector::zeros(3);
        solver
            .solve(&[a0.clone(), a1], &[y0.clone(), y1], &mut x)
            .unwrap();

        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x[2], 0.0, epsilon = 1e-9);

        let residual0 = (&a0 * &x - &y0).norm();
        assert!(residual0 <= 1e-9);
    }

    #[test]
    fn s6_shape_error_leaves_x_unmodified() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[2], 3).unwrap();

        let a = DMatrix::zeros(2, 2);
        let y = DVector::zeros(2);
        let mut x = DVector::from_vec(vec![9.0, 9.0, 9.0]);
        let err = solver.solve(&[a], &[y], &mut x).unwrap_err();

        assert!(matches!(err, HwdlsError::InvalidShape { .. }));
        assert_eq!(x.as_slice(), &[9.0, 9.0, 9.0]);
    }

    #[test]
    fn priority_dominance_independent_of_lower_priority() {
        let a0 = dmatrix![1.0, 0.0; 0.0, 1.0];
        let y0 = DVector::from_vec(vec![0.5, 0.5]);

        for a1_second_row in [0.0, 5.0, -3.0] {
            let mut solver = HwdlsSolver::new();
            solver.configure(&[2, 1], 2).unwrap();
            solver.set_norm_max(1e3).unwrap();

            let a1 = dmatrix![1.0, a1_second_row];
            let y1 = DVector::from_vec(vec![100.0]);
            let mut x = DVector::zeros(2);
            solver.solve(&[a0.clone(), a1], &[y0.clone(), y1], &mut x).unwrap();

            let residual0 = (&a0 * &x - &y0).norm();
            assert!(residual0 <= 1e-9, "priority 0 residual leaked: {residual0}");
        }
    }

    #[test]
    fn projector_is_idempotent_after_each_level() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[1, 1], 3).unwrap();
        solver.set_norm_max(1e6).unwrap();

        let a0 = dmatrix![1.0, 0.0, 0.0];
        let y0 = DVector::from_vec(vec![1.0]);
        let a1 = dmatrix![0.0, 1.0, 0.0];
        let y1 = DVector::from_vec(vec![1.0]);
        let mut x = DVector::zeros(3);
        solver.solve(&[a0, a1], &[y0, y1], &mut x).unwrap();

        let p = solver.projector();
        let should_be_p = p * p;
        assert_abs_diff_eq!(should_be_p, *p, epsilon = 1e-6);
    }

    #[test]
    fn diagonal_and_dense_paths_agree() {
        let a = dmatrix![2.0, 1.0; 0.5, 3.0];
        let y = DVector::from_vec(vec![1.0, 2.0]);

        let mut diag_solver = HwdlsSolver::new();
        diag_solver.configure(&[2], 2).unwrap();
        diag_solver
            .set_joint_weights(&dmatrix![2.0, 0.0; 0.0, 5.0])
            .unwrap();
        let mut x_diag = DVector::zeros(2);
        diag_solver
            .solve(&[a.clone()], &[y.clone()], &mut x_diag)
            .unwrap();

        let mut dense_solver = HwdlsSolver::new();
        dense_solver.configure(&[2], 2).unwrap();
        dense_solver
            .set_joint_weights(&dmatrix![2.0, 0.0; 1e-300, 5.0])
            .unwrap();
        let mut x_dense = DVector::zeros(2);
        dense_solver.solve(&[a], &[y], &mut x_dense).unwrap();

        assert_abs_diff_eq!(x_diag, x_dense, epsilon = 1e-9);
    }

    #[test]
    fn weight_scaling_law_task_weight_invariant() {
        let a = dmatrix![1.0, 2.0; 3.0, 1.0];
        let y = DVector::from_vec(vec![1.0, 0.5]);

        let mut base = HwdlsSolver::new();
        base.configure(&[2], 2).unwrap();
        let mut x_base = DVector::zeros(2);
        base.solve(&[a.clone()], &[y.clone()], &mut x_base).unwrap();

        let mut scaled = HwdlsSolver::new();
        scaled.configure(&[2], 2).unwrap();
        scaled
            .set_task_weights(&dmatrix![7.0, 0.0; 0.0, 7.0], 0)
            .unwrap();
        let mut x_scaled = DVector::zeros(2);
        scaled.solve(&[a], &[y], &mut x_scaled).unwrap();

        assert_abs_diff_eq!(x_base, x_scaled, epsilon = 1e-9);
    }

    #[test]
    fn uniform_joint_weight_scaling_leaves_solution_unchanged() {
        // Minimal-norm-under-W solutions are scale-invariant under a uniform
        // joint weight: W = alpha*I picks out the same direction as W = I.
        let a = dmatrix![1.0, 0.0];
        let y = DVector::from_vec(vec![1.0]);

        let mut base = HwdlsSolver::new();
        base.configure(&[1], 2).unwrap();
        let mut x_base = DVector::zeros(2);
        base.solve(&[a.clone()], &[y.clone()], &mut x_base).unwrap();

        let mut scaled = HwdlsSolver::new();
        scaled.configure(&[1], 2).unwrap();
        scaled
            .set_joint_weights(&dmatrix![4.0, 0.0; 0.0, 4.0])
            .unwrap();
        let mut x_scaled = DVector::zeros(2);
        scaled.solve(&[a], &[y], &mut x_scaled).unwrap();

        assert_abs_diff_eq!(x_scaled, x_base, epsilon = 1e-9);
    }

    #[test]
    fn unconfigured_solver_rejects_solve() {
        let mut solver = HwdlsSolver::new();
        let mut x = DVector::zeros(0);
        let err = solver.solve(&[], &[], &mut x).unwrap_err();
        assert_eq!(err, HwdlsError::Unconfigured);
    }

    #[test]
    fn configure_rejects_zero_nx() {
        let mut solver = HwdlsSolver::new();
        assert!(matches!(
            solver.configure(&[1], 0).unwrap_err(),
            HwdlsError::InvalidShape { .. }
        ));
    }

    #[test]
    fn set_norm_max_rejects_non_positive() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[1], 1).unwrap();
        assert!(solver.set_norm_max(0.0).is_err());
        assert!(solver.set_norm_max(-1.0).is_err());
    }

    #[test]
    fn debug_telemetry_populated_when_enabled() {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[2], 2).unwrap();
        solver.set_compute_debug(true);

        let a = dmatrix![1.0, 0.0; 0.0, 1.0];
        let y = DVector::from_vec(vec![0.3, -0.7]);
        let mut x = DVector::zeros(2);
        solver.solve(&[a], &[y], &mut x).unwrap();

        let debug = solver.get_priority_debug();
        assert_eq!(debug.len(), 1);
        assert_abs_diff_eq!(debug[0].sqrt_err, 0.0, epsilon = 1e-6);
    }
}
