//! Mathematical utilities for the quadrotor simulator
//!
//! Implements SO(3) rotation utilities, scalar-first quaternion kinematics,
//! angle wrapping and fixed-step integrators.

pub mod rotation;
pub mod quaternion;
pub mod angle;
pub mod integrator;

pub use rotation::*;
pub use quaternion::*;
pub use angle::*;
pub use integrator::*;
