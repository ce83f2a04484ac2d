//! Control utilities
//!
//! - Discrete PID with anti-windup
//! - Attitude controller (angle → rate → torque)
//! - Position controller (position → velocity → tilt and thrust)
//! - Reference signals and predefined reference flights

pub mod pid;
pub mod attitude;
pub mod position;
pub mod reference;

pub use pid::*;
pub use attitude::*;
pub use position::*;
pub use reference::*;
