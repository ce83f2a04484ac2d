//! Dynamics models
//!
//! - Rigid body with rotation-matrix or quaternion attitude
//! - Force/torque model interface mapping actuator commands to a body wrench
//! - Environment model interface for earth-frame disturbances

pub mod rigid_body;
pub mod force_torque;
pub mod environment;

pub use rigid_body::*;
pub use force_torque::*;
pub use environment::*;
