//! Angle wrapping

use std::f64::consts::{PI, TAU};

/// Wrap an angle into `(-π, π]`
///
/// Angles already in range are returned untouched, so wrapping is
/// idempotent bit-for-bit. Non-finite input is passed through.
pub fn wrap_angle(angle: f64) -> f64 {
    if (angle > -PI && angle <= PI) || !angle.is_finite() {
        return angle;
    }

    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Wrap the selected components of a slice in place
pub fn wrap_angles(values: &mut [f64], indices: &[usize]) {
    for &i in indices {
        if let Some(v) = values.get_mut(i) {
            *v = wrap_angle(*v);
        }
    }
}
