//! Attitude controller
//!
//! Two cascaded loops on Euler angles:
//! - angle loop: roll/pitch/yaw error → body rate reference
//! - rate loop: body rate error → angular acceleration → torque
//!
//! τ = J α_ref + ω × J ω

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::pid::{Pid, PidGains};
use crate::math::wrap_angle;

const DEG: f64 = std::f64::consts::PI / 180.0;

/// Attitude controller gains and loop periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttitudeControllerConfig {
    /// Rate loop period [s]
    pub rate_period: f64,
    /// Angle loop period [s]
    pub angle_period: f64,
    /// Roll, pitch, yaw rate PIDs (output: angular acceleration [rad/s²])
    pub rate_gains: [PidGains; 3],
    /// Roll, pitch, yaw angle PIDs (output: body rate [rad/s])
    pub angle_gains: [PidGains; 3],
}

impl Default for AttitudeControllerConfig {
    fn default() -> Self {
        let rate = PidGains::proportional(100.0, 8.0 * 360.0 * DEG);
        let angle_limit = 2.5 * 360.0 * DEG;
        Self {
            rate_period: 0.002,  // 500 Hz
            angle_period: 0.004, // 250 Hz
            rate_gains: [rate; 3],
            angle_gains: [
                PidGains::proportional(10.0, angle_limit),
                PidGains::proportional(10.0, angle_limit),
                PidGains::proportional(5.0, angle_limit),
            ],
        }
    }
}

/// Cascaded angle/rate attitude controller
#[derive(Debug, Clone)]
pub struct AttitudeController {
    config: AttitudeControllerConfig,
    rate_pids: [Pid; 3],
    angle_pids: [Pid; 3],
}

impl AttitudeController {
    pub fn new(config: AttitudeControllerConfig) -> Self {
        Self {
            rate_pids: config.rate_gains.map(Pid::new),
            angle_pids: config.angle_gains.map(Pid::new),
            config,
        }
    }

    /// Rate loop: body torque tracking `omega_ref`
    ///
    /// # Arguments
    /// * `omega_ref` - Desired body rates [rad/s]
    /// * `omega_meas` - Measured body rates [rad/s]
    /// * `inertia` - Vehicle inertia (body frame)
    pub fn run_rate(
        &mut self,
        omega_ref: &Vector3<f64>,
        omega_meas: &Vector3<f64>,
        inertia: &Matrix3<f64>,
    ) -> Vector3<f64> {
        let ts = self.config.rate_period;
        let error = omega_ref - omega_meas;
        let alpha_ref = Vector3::from_fn(|i, _| self.rate_pids[i].run(error[i], ts));

        inertia * alpha_ref + omega_meas.cross(&(inertia * omega_meas))
    }

    /// Angle loop: body rate reference tracking `rpy_ref`
    ///
    /// The yaw error is wrapped so the vehicle turns the short way round.
    pub fn run_angle(&mut self, rpy_ref: &Vector3<f64>, rpy_meas: &Vector3<f64>) -> Vector3<f64> {
        let ts = self.config.angle_period;
        let mut error = rpy_ref - rpy_meas;
        error.z = wrap_angle(error.z);

        Vector3::from_fn(|i, _| self.angle_pids[i].run(error[i], ts))
    }

    pub fn reset(&mut self) {
        self.rate_pids.iter_mut().chain(self.angle_pids.iter_mut()).for_each(Pid::reset);
    }

    pub fn config(&self) -> &AttitudeControllerConfig {
        &self.config
    }
}

impl Default for AttitudeController {
    fn default() -> Self {
        Self::new(AttitudeControllerConfig::default())
    }
}
