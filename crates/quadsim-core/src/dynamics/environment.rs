//! Environment models
//!
//! Earth-frame wrenches applied on top of gravity, which is part of the
//! rigid-body parameters. The driver rotates them into the body frame.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::RigidBody;

/// Supplies additional earth-frame force and torque for the current state
pub trait EnvironmentModel {
    /// Returns `(force_earth, torque_earth)`
    fn apply(&mut self, body: &RigidBody) -> (Vector3<f64>, Vector3<f64>);
}

/// No disturbances
#[derive(Debug, Clone, Copy, Default)]
pub struct CalmAir;

impl EnvironmentModel for CalmAir {
    fn apply(&mut self, _body: &RigidBody) -> (Vector3<f64>, Vector3<f64>) {
        (Vector3::zeros(), Vector3::zeros())
    }
}

/// Zero-mean white-noise force and torque disturbances
#[derive(Debug, Clone)]
pub struct RandomDisturbance {
    /// Force standard deviation per axis [N]
    force_std: f64,
    /// Torque standard deviation per axis [N·m]
    torque_std: f64,
    rng: StdRng,
}

impl RandomDisturbance {
    pub fn new(force_std: f64, torque_std: f64, seed: u64) -> Self {
        Self {
            force_std: force_std.abs(),
            torque_std: torque_std.abs(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn gaussian_vec3(&mut self, std_dev: f64) -> Vector3<f64> {
        let mut sample = || -> f64 { self.rng.sample(StandardNormal) };
        Vector3::new(sample(), sample(), sample()) * std_dev
    }
}

impl EnvironmentModel for RandomDisturbance {
    fn apply(&mut self, _body: &RigidBody) -> (Vector3<f64>, Vector3<f64>) {
        let force = self.gaussian_vec3(self.force_std);
        let torque = self.gaussian_vec3(self.torque_std);
        (force, torque)
    }
}

impl<E: EnvironmentModel + ?Sized> EnvironmentModel for Box<E> {
    fn apply(&mut self, body: &RigidBody) -> (Vector3<f64>, Vector3<f64>) {
        (**self).apply(body)
    }
}
