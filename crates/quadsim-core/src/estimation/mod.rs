//! State estimation
//!
//! - Unscented Kalman filter generic over a process/measurement model
//! - Quadrotor kinematics and linear models for the filters
//! - Extended Kalman filter with optional equality constraint

pub mod models;
pub mod ukf;
pub mod ekf;

pub use models::*;
pub use ukf::*;
pub use ekf::*;
