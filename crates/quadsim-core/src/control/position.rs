//! Position controller
//!
//! Two cascaded loops in the earth frame (North-West-Up):
//! - position loop: position error → earth velocity reference
//! - velocity loop: velocity error → roll/pitch reference and collective thrust
//!
//! The horizontal acceleration demand `[T1, T2]` maps to small-angle tilt
//! references rotated by the current yaw ψ:
//!
//! [roll, pitch] = 1/g · [[sin ψ, -cos ψ], [cos ψ, sin ψ]] · [T1, T2]

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::pid::{Pid, PidGains};
use crate::GRAVITY;

/// Position controller gains, loop periods and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionControllerConfig {
    /// Velocity loop period [s]
    pub velocity_period: f64,
    /// Position loop period [s]
    pub position_period: f64,
    /// x, y, z earth-velocity PIDs (output: acceleration [m/s²])
    pub velocity_gains: [PidGains; 3],
    /// x, y, z position PIDs (output: velocity [m/s])
    pub position_gains: [PidGains; 3],
    /// Maximum roll/pitch reference [rad]
    pub max_tilt: f64,
    /// Maximum collective thrust [N]
    pub max_thrust: f64,
    /// Minimum thrust as a fraction of the weight
    pub min_thrust_ratio: f64,
    /// Gravity magnitude [m/s²]
    pub gravity: f64,
}

impl Default for PositionControllerConfig {
    fn default() -> Self {
        Self {
            velocity_period: 0.02, // 50 Hz
            position_period: 0.02,
            velocity_gains: [
                PidGains::proportional(4.0, 20.0),
                PidGains::proportional(4.0, 20.0),
                PidGains::proportional(5.0, 20.0),
            ],
            position_gains: [
                PidGains::proportional(1.0, 20.0),
                PidGains::proportional(1.0, 20.0),
                PidGains::proportional(4.0, 10.0),
            ],
            max_tilt: 40f64.to_radians(),
            max_thrust: 0.8 * 0.638,
            min_thrust_ratio: 0.9,
            gravity: GRAVITY,
        }
    }
}

/// Output of the velocity loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltThrustReference {
    /// Roll reference [rad]
    pub roll: f64,
    /// Pitch reference [rad]
    pub pitch: f64,
    /// Collective thrust [N]
    pub thrust: f64,
}

/// Cascaded position/velocity controller
#[derive(Debug, Clone)]
pub struct PositionController {
    config: PositionControllerConfig,
    velocity_pids: [Pid; 3],
    position_pids: [Pid; 3],
}

impl PositionController {
    pub fn new(config: PositionControllerConfig) -> Self {
        Self {
            velocity_pids: config.velocity_gains.map(Pid::new),
            position_pids: config.position_gains.map(Pid::new),
            config,
        }
    }

    /// Position loop: earth velocity reference
    pub fn run_position(
        &mut self,
        pos_ref: &Vector3<f64>,
        pos_meas: &Vector3<f64>,
    ) -> Vector3<f64> {
        let ts = self.config.position_period;
        let error = pos_ref - pos_meas;
        Vector3::from_fn(|i, _| self.position_pids[i].run(error[i], ts))
    }

    /// Velocity loop: tilt references and thrust
    ///
    /// # Arguments
    /// * `vel_ref` - Desired earth velocity [m/s]
    /// * `vel_meas` - Measured earth velocity [m/s]
    /// * `yaw` - Measured yaw [rad]
    /// * `mass` - Vehicle mass [kg]
    pub fn run_velocity(
        &mut self,
        vel_ref: &Vector3<f64>,
        vel_meas: &Vector3<f64>,
        yaw: f64,
        mass: f64,
    ) -> TiltThrustReference {
        let ts = self.config.velocity_period;
        let g = self.config.gravity;
        let error = vel_ref - vel_meas;
        let t = Vector3::from_fn(|i, _| self.velocity_pids[i].run(error[i], ts));

        let (sy, cy) = yaw.sin_cos();
        let mut roll = (sy * t.x - cy * t.y) / g;
        let mut pitch = (cy * t.x + sy * t.y) / g;

        // Scale both down together to keep the tilt direction
        let largest = roll.abs().max(pitch.abs());
        if largest > self.config.max_tilt {
            let scale = self.config.max_tilt / largest;
            roll *= scale;
            pitch *= scale;
        }

        let weight = mass * g;
        let thrust = (weight + mass * t.z)
            .min(self.config.max_thrust)
            .max(self.config.min_thrust_ratio * weight);

        TiltThrustReference { roll, pitch, thrust }
    }

    pub fn reset(&mut self) {
        self.velocity_pids.iter_mut().chain(self.position_pids.iter_mut()).for_each(Pid::reset);
    }

    pub fn config(&self) -> &PositionControllerConfig {
        &self.config
    }
}

impl Default for PositionController {
    fn default() -> Self {
        Self::new(PositionControllerConfig::default())
    }
}
