//! Force and torque models
//!
//! The rigid body only sees a body-frame force and torque. Airframe
//! specifics (rotor curves, mixing) live behind [`ForceTorqueModel`].

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Maps an actuator command and the current body velocity to a body wrench
pub trait ForceTorqueModel {
    type Command;

    /// Returns `(force_body, torque_body)`
    fn compute(
        &self,
        command: &Self::Command,
        body_velocity: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>);
}

/// Collective thrust and body torque command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrustTorqueCommand {
    /// Total thrust along body +z [N]
    pub thrust: f64,
    /// Body torque [N·m]
    pub torque: Vector3<f64>,
}

impl ThrustTorqueCommand {
    pub fn new(thrust: f64, torque: Vector3<f64>) -> Self {
        Self { thrust, torque }
    }

    /// Thrust equal to the weight, no torque
    pub fn hover(mass: f64, gravity: f64) -> Self {
        Self {
            thrust: mass * gravity,
            torque: Vector3::zeros(),
        }
    }
}

/// Limits applied to a [`ThrustTorqueCommand`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorLimits {
    /// Minimum thrust [N]
    pub min_thrust: f64,
    /// Maximum thrust [N]
    pub max_thrust: f64,
    /// Maximum absolute torque per axis [N·m]
    pub max_torque: Vector3<f64>,
}

impl Default for ActuatorLimits {
    fn default() -> Self {
        Self {
            min_thrust: 0.0,
            max_thrust: 0.638,
            max_torque: Vector3::new(1e-2, 1e-2, 5e-3),
        }
    }
}

/// Thrust along body z, commanded torque and linear aerodynamic drag
///
/// force = [0, 0, T] + K_aero · v_body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrustTorqueModel {
    /// Linear drag matrix [N·s/m] (body frame, typically negative diagonal)
    pub drag: Matrix3<f64>,
    /// Actuator saturation
    pub limits: ActuatorLimits,
}

impl ThrustTorqueModel {
    pub fn new(drag: Matrix3<f64>, limits: ActuatorLimits) -> Self {
        Self { drag, limits }
    }

    /// Model without drag
    pub fn ideal(limits: ActuatorLimits) -> Self {
        Self::new(Matrix3::zeros(), limits)
    }

    /// Clamp command to actuator limits
    pub fn clamp(&self, command: &ThrustTorqueCommand) -> ThrustTorqueCommand {
        let l = &self.limits;
        ThrustTorqueCommand {
            thrust: command.thrust.clamp(l.min_thrust, l.max_thrust),
            torque: Vector3::new(
                command.torque.x.clamp(-l.max_torque.x, l.max_torque.x),
                command.torque.y.clamp(-l.max_torque.y, l.max_torque.y),
                command.torque.z.clamp(-l.max_torque.z, l.max_torque.z),
            ),
        }
    }
}

impl Default for ThrustTorqueModel {
    fn default() -> Self {
        // Crazyflie-scale drag coefficients
        Self::new(
            Matrix3::from_diagonal(&Vector3::new(-9.1785e-7, -9.1785e-7, -10.311e-7)),
            ActuatorLimits::default(),
        )
    }
}

impl ForceTorqueModel for ThrustTorqueModel {
    type Command = ThrustTorqueCommand;

    fn compute(
        &self,
        command: &ThrustTorqueCommand,
        body_velocity: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let command = self.clamp(command);
        let force = Vector3::new(0.0, 0.0, command.thrust) + self.drag * body_velocity;
        (force, command.torque)
    }
}
