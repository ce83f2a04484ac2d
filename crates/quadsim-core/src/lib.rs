//! # Quadsim Core
//!
//! Quadrotor free-flight simulation core library
//!
//! This library implements the 6-DOF rigid-body dynamics integrator and the
//! unscented Kalman filter used to estimate the vehicle state from noisy
//! measurements, together with the thin control and simulation layers that
//! drive them.
//!
//! ## Modules
//!
//! - [`math`]: Rotation utilities (skew, quaternions, Euler X-Y-Z), angle wrapping, integrators
//! - [`dynamics`]: Rigid body, force/torque model interface, environment model
//! - [`estimation`]: Unscented and extended Kalman filters, process/measurement models
//! - [`control`]: PID utility and cascaded attitude/position controllers
//! - [`simulation`]: Configuration, sensors and the fixed-timestep driver
//!
//! ## Conventions
//!
//! The earth frame is North-West-Up (z up), quaternions are scalar-first
//! `[w, x, y, z]` and rotate body vectors into the earth frame. Linear
//! velocity is stored in the body frame.

pub mod math;
pub mod dynamics;
pub mod estimation;
pub mod control;
pub mod simulation;
pub mod error;

pub use error::QuadsimError;

// Common type aliases
use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// Standard gravity [m/s²]
pub const GRAVITY: f64 = 9.80665;

/// Gravity vector in the earth frame (North-West-Up, z up)
pub fn gravity_earth() -> Vec3 {
    Vec3::new(0.0, 0.0, -GRAVITY)
}
