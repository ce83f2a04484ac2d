//! Simulation framework
//!
//! Configuration, sensor models and the fixed-timestep driver that ties the
//! dynamics, estimation and control layers together.

pub mod simulator;
pub mod config;
pub mod sensors;

pub use simulator::*;
pub use config::*;
pub use sensors::*;
