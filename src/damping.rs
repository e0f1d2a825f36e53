//! Damping selection, following Maciejewski & Klein (1988), "Numerical
//! Filtering for the Operation of Robotic Manipulators through Kinematically
//! Singular Configurations", Journal of Robotic Systems, Vol. 5, No. 6.

/// Selects a damping scalar from the smallest active singular value
/// `s_min` and the configured `norm_max` bound on the damped inverse's norm.
///
/// `tau = (1 / norm_max) / 2` is the maximum damping, applied once `s_min`
/// drops to or below it. `tau2 = 1 / norm_max` is the well-conditioned
/// threshold above which no damping is applied. Between the two, damping
/// ramps up smoothly so the damped inverse's norm never exceeds `norm_max`.
pub fn select_damping(s_min: f64, norm_max: f64) -> f64 {
    let tau = (1.0 / norm_max) / 2.0;
    let tau2 = 1.0 / norm_max;

    if s_min <= tau {
        tau
    } else if s_min >= tau2 {
        0.0
    } else {
        (s_min * (tau2 - s_min)).sqrt()
    }
}
