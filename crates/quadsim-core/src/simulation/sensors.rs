//! Sensor models for simulation
//!
//! Provides noisy sensor measurements for the estimator. Noise is
//! zero-mean Gaussian drawn from seeded generators, so a run is repeatable.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use super::SensorConfig;
use crate::dynamics::RigidBody;
use crate::error::ConfigError;

/// Gaussian noise source for 3-axis sensors
#[derive(Debug, Clone)]
struct NoiseSource {
    distribution: Normal<f64>,
    rng: StdRng,
}

impl NoiseSource {
    fn new(name: &str, std_dev: f64, seed: u64) -> Result<Self, ConfigError> {
        let distribution = Normal::new(0.0, std_dev)
            .map_err(|e| ConfigError::Invalid(format!("{name} noise std {std_dev}: {e}")))?;
        Ok(Self {
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn sample_vec3(&mut self) -> Vector3<f64> {
        let mut sample = || self.rng.sample(self.distribution);
        Vector3::new(sample(), sample(), sample())
    }
}

/// Position sensor model (e.g., motion capture)
#[derive(Debug, Clone)]
pub struct PositionSensor {
    noise: NoiseSource,
}

impl PositionSensor {
    pub fn new(noise_std: f64, seed: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            noise: NoiseSource::new("position", noise_std, seed)?,
        })
    }

    /// Get noisy position measurement
    pub fn measure(&mut self, true_position: &Vector3<f64>) -> Vector3<f64> {
        true_position + self.noise.sample_vec3()
    }
}

/// IMU (Inertial Measurement Unit) sensor model
#[derive(Debug, Clone)]
pub struct ImuSensor {
    accel_noise: NoiseSource,
    gyro_noise: NoiseSource,
    /// Accelerometer bias
    accel_bias: Vector3<f64>,
    /// Gyroscope bias
    gyro_bias: Vector3<f64>,
}

impl ImuSensor {
    pub fn new(accel_noise_std: f64, gyro_noise_std: f64, seed: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            accel_noise: NoiseSource::new("accelerometer", accel_noise_std, seed)?,
            // Separate stream so gyro samples do not depend on how often the accelerometer is read
            gyro_noise: NoiseSource::new(
                "gyroscope",
                gyro_noise_std,
                seed.wrapping_add(0x9E37_79B9),
            )?,
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
        })
    }

    /// Set accelerometer bias
    pub fn set_accel_bias(&mut self, bias: Vector3<f64>) {
        self.accel_bias = bias;
    }

    /// Set gyroscope bias
    pub fn set_gyro_bias(&mut self, bias: Vector3<f64>) {
        self.gyro_bias = bias;
    }

    /// Measure specific force (body frame)
    ///
    /// `force_body` is the total non-gravitational force on the vehicle, so
    /// a vehicle at rest on the ground or hovering reads `+g` along body z.
    pub fn measure_specific_force(&mut self, force_body: &Vector3<f64>, mass: f64) -> Vector3<f64> {
        force_body / mass + self.accel_bias + self.accel_noise.sample_vec3()
    }

    /// Measure angular velocity (body frame)
    pub fn measure_angular_velocity(&mut self, true_omega: &Vector3<f64>) -> Vector3<f64> {
        true_omega + self.gyro_bias + self.gyro_noise.sample_vec3()
    }
}

/// IMU measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuMeasurement {
    /// Specific force (body frame) [m/s²]
    pub specific_force: Vector3<f64>,
    /// Angular velocity (body frame) [rad/s]
    pub angular_velocity: Vector3<f64>,
}

/// Complete vehicle measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleMeasurement {
    /// Position measurement [m]
    pub position: Vector3<f64>,
    /// IMU measurement
    pub imu: ImuMeasurement,
}

/// Complete sensor suite for a quadrotor
#[derive(Debug, Clone)]
pub struct VehicleSensors {
    /// Position sensor (e.g., motion capture)
    pub position: PositionSensor,
    /// IMU sensor
    pub imu: ImuSensor,
}

impl VehicleSensors {
    pub fn new(config: &SensorConfig) -> Result<Self, ConfigError> {
        let mut imu = ImuSensor::new(
            config.accel_noise_std,
            config.gyro_noise_std,
            config.seed.wrapping_add(1),
        )?;
        imu.set_accel_bias(config.accel_bias);
        imu.set_gyro_bias(config.gyro_bias);

        Ok(Self {
            position: PositionSensor::new(config.position_noise_std, config.seed)?,
            imu,
        })
    }

    /// Get all measurements for the current state
    ///
    /// # Arguments
    /// * `body` - True vehicle state
    /// * `force_body` - Non-gravitational force applied over the last step (body frame)
    pub fn measure(&mut self, body: &RigidBody, force_body: &Vector3<f64>) -> VehicleMeasurement {
        VehicleMeasurement {
            position: self.position.measure(body.position()),
            imu: ImuMeasurement {
                specific_force: self.imu.measure_specific_force(force_body, body.mass()),
                angular_velocity: self.imu.measure_angular_velocity(body.angular_velocity()),
            },
        }
    }
}
