//! Simulation configuration
//!
//! Defines configuration structures for setting up simulations. Every
//! section has physically sensible defaults (Crazyflie 2.0 in the plus
//! configuration) and can be loaded from TOML with missing keys defaulted.

use std::path::Path;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::dynamics::{
    ActuatorLimits, Attitude, AttitudeRepresentation, InitialState, IntegrationOptions,
    RigidBodyParams, ThrustTorqueModel,
};
use crate::error::ConfigError;
use crate::estimation::{UkfOptions, UkfParams};

/// Dimension of the estimator state `[p, rpy, v_body]`
pub const ESTIMATOR_STATE_DIM: usize = 9;

/// Dimension of the estimator measurement (position)
pub const ESTIMATOR_MEASUREMENT_DIM: usize = 3;

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Integration time step [s]; explicit Euler needs it well below the
    /// fastest time constant of the vehicle
    pub dt_sim: f64,
    /// Total simulation duration [s]
    pub duration: f64,
    /// Largest tolerated attitude drift before a step is reported as diverged
    pub invariant_tolerance: f64,
    /// Vehicle parameters
    pub vehicle: VehicleConfig,
    /// Initial state
    pub initial_state: InitialStateConfig,
    /// Integration options
    pub integration: IntegrationConfig,
    /// State estimator
    pub estimator: EstimatorConfig,
    /// Sensor models
    pub sensors: SensorConfig,
    /// Random disturbances
    pub disturbance: DisturbanceConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt_sim: 0.001, // 1 kHz simulation
            duration: 10.0,
            invariant_tolerance: 1e-6,
            vehicle: VehicleConfig::default(),
            initial_state: InitialStateConfig::default(),
            integration: IntegrationConfig::default(),
            estimator: EstimatorConfig::default(),
            sensors: SensorConfig::default(),
            disturbance: DisturbanceConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check ranges and vector lengths
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt_sim.is_finite() && self.dt_sim > 0.0) {
            return Err(invalid(format!("dt_sim must be positive, got {}", self.dt_sim)));
        }
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(invalid(format!("duration must be non-negative, got {}", self.duration)));
        }
        if !(self.invariant_tolerance > 0.0) {
            return Err(invalid(format!(
                "invariant_tolerance must be positive, got {}",
                self.invariant_tolerance
            )));
        }
        if self.vehicle.max_thrust < self.vehicle.min_thrust {
            return Err(invalid("vehicle.max_thrust is below vehicle.min_thrust".to_string()));
        }

        let est = &self.estimator;
        if !est.period.is_finite() {
            return Err(invalid(format!("estimator.period must be finite, got {}", est.period)));
        }
        if est.enabled && est.period < self.dt_sim {
            return Err(invalid(format!(
                "estimator.period {} is shorter than dt_sim {}",
                est.period, self.dt_sim
            )));
        }
        check_diagonal(
            "estimator.initial_covariance",
            &est.initial_covariance,
            ESTIMATOR_STATE_DIM,
            true,
        )?;
        check_diagonal(
            "estimator.process_noise",
            &est.process_noise,
            ESTIMATOR_STATE_DIM,
            false,
        )?;
        check_diagonal(
            "estimator.measurement_noise",
            &est.measurement_noise,
            ESTIMATOR_MEASUREMENT_DIM,
            true,
        )?;

        let s = &self.sensors;
        for (name, std) in [
            ("sensors.position_noise_std", s.position_noise_std),
            ("sensors.accel_noise_std", s.accel_noise_std),
            ("sensors.gyro_noise_std", s.gyro_noise_std),
            ("disturbance.force_std", self.disturbance.force_std),
            ("disturbance.torque_std", self.disturbance.torque_std),
        ] {
            if !(std.is_finite() && std >= 0.0) {
                return Err(invalid(format!("{name} must be non-negative, got {std}")));
            }
        }

        Ok(())
    }

    /// Number of integration steps covering `duration`
    pub fn total_steps(&self) -> u64 {
        (self.duration / self.dt_sim).round() as u64
    }

    /// Integration steps between estimator runs
    pub fn estimator_every(&self) -> u64 {
        ((self.estimator.period / self.dt_sim).round() as u64).max(1)
    }

    /// Time actually elapsed between estimator runs
    ///
    /// A period that is not a multiple of `dt_sim` is rounded to the nearest
    /// whole number of steps.
    pub fn estimator_dt(&self) -> f64 {
        self.estimator_every() as f64 * self.dt_sim
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

fn check_diagonal(
    name: &str,
    values: &[f64],
    len: usize,
    strictly_positive: bool,
) -> Result<(), ConfigError> {
    if values.len() != len {
        return Err(invalid(format!("{name} needs {len} entries, got {}", values.len())));
    }
    let ok = |v: f64| v.is_finite() && if strictly_positive { v > 0.0 } else { v >= 0.0 };
    if let Some(bad) = values.iter().copied().find(|&v| !ok(v)) {
        return Err(invalid(format!("{name} has invalid entry {bad}")));
    }
    Ok(())
}

/// Vehicle physical parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Mass [kg]
    pub mass: f64,
    /// Inertia diagonal [kg·m²]
    pub inertia: Vector3<f64>,
    /// Linear drag diagonal [N·s/m]
    pub drag: Vector3<f64>,
    /// Minimum thrust [N]
    pub min_thrust: f64,
    /// Maximum thrust [N]
    pub max_thrust: f64,
    /// Maximum torque per axis [N·m]
    pub max_torque: Vector3<f64>,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let limits = ActuatorLimits::default();
        Self {
            mass: 0.028,
            inertia: Vector3::new(2.3951e-5, 2.3951e-5, 3.23e-5),
            drag: Vector3::new(-9.1785e-7, -9.1785e-7, -10.311e-7),
            min_thrust: limits.min_thrust,
            max_thrust: limits.max_thrust,
            max_torque: limits.max_torque,
        }
    }
}

impl VehicleConfig {
    pub fn to_params(&self) -> RigidBodyParams {
        RigidBodyParams::from_diagonal(self.mass, self.inertia)
    }

    pub fn to_force_model(&self) -> ThrustTorqueModel {
        ThrustTorqueModel::new(
            Matrix3::from_diagonal(&self.drag),
            ActuatorLimits {
                min_thrust: self.min_thrust,
                max_thrust: self.max_thrust,
                max_torque: self.max_torque,
            },
        )
    }
}

/// Initial state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialStateConfig {
    /// Position [m] (earth frame)
    pub position: Vector3<f64>,
    /// Roll, pitch, yaw [rad]
    pub euler_angles: Vector3<f64>,
    /// Velocity [m/s] (body frame)
    pub body_velocity: Vector3<f64>,
    /// Angular velocity [rad/s] (body frame)
    pub angular_velocity: Vector3<f64>,
}

impl Default for InitialStateConfig {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            euler_angles: Vector3::zeros(),
            body_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

impl InitialStateConfig {
    pub fn to_initial_state(&self, representation: AttitudeRepresentation) -> InitialState {
        InitialState {
            position: self.position,
            attitude: Attitude::from_euler(&self.euler_angles, representation),
            body_velocity: self.body_velocity,
            angular_velocity: self.angular_velocity,
        }
    }

    /// Estimator state `[p, rpy, v_body]`
    pub fn to_estimator_state(&self) -> DVector<f64> {
        let mut x = DVector::zeros(ESTIMATOR_STATE_DIM);
        x.fixed_rows_mut::<3>(0).copy_from(&self.position);
        x.fixed_rows_mut::<3>(3).copy_from(&self.euler_angles);
        x.fixed_rows_mut::<3>(6).copy_from(&self.body_velocity);
        x
    }
}

/// Attitude representation and integration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub representation: AttitudeRepresentation,
    pub options: IntegrationOptions,
}

/// UKF configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Run the estimator during simulation
    pub enabled: bool,
    /// Predict/update period [s]
    pub period: f64,
    /// Sigma-point scaling
    pub params: UkfParams,
    /// Covariance update and recovery options
    pub options: UkfOptions,
    /// Initial covariance diagonal (9 entries)
    pub initial_covariance: Vec<f64>,
    /// Process noise density diagonal (9 entries)
    pub process_noise: Vec<f64>,
    /// Position measurement noise diagonal (3 entries)
    pub measurement_noise: Vec<f64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period: 0.01, // 100 Hz
            params: UkfParams::default(),
            options: UkfOptions::default(),
            initial_covariance: vec![1e-4, 1e-4, 1e-4, 1e-3, 1e-3, 1e-3, 1e-4, 1e-4, 1e-4],
            process_noise: vec![1e-4, 1e-4, 1e-4, 1e-3, 1e-3, 1e-3, 1e-2, 1e-2, 1e-2],
            measurement_noise: vec![1e-4, 1e-4, 1e-4],
        }
    }
}

impl EstimatorConfig {
    pub fn initial_covariance_matrix(&self) -> DMatrix<f64> {
        diagonal(&self.initial_covariance)
    }

    pub fn process_noise_matrix(&self) -> DMatrix<f64> {
        diagonal(&self.process_noise)
    }

    pub fn measurement_noise_matrix(&self) -> DMatrix<f64> {
        diagonal(&self.measurement_noise)
    }
}

fn diagonal(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_column_slice(values))
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Position measurement noise std dev [m]
    pub position_noise_std: f64,
    /// IMU accelerometer noise std dev [m/s²]
    pub accel_noise_std: f64,
    /// IMU gyroscope noise std dev [rad/s]
    pub gyro_noise_std: f64,
    /// Constant accelerometer bias [m/s²]
    pub accel_bias: Vector3<f64>,
    /// Constant gyroscope bias [rad/s]
    pub gyro_bias: Vector3<f64>,
    /// Seed of the sensor noise generators
    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            position_noise_std: 0.01,
            accel_noise_std: 0.1,
            gyro_noise_std: 0.01,
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            seed: 12345,
        }
    }
}

/// Random disturbance configuration (all zero means calm air)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisturbanceConfig {
    /// Force std dev per axis [N] (earth frame)
    pub force_std: f64,
    /// Torque std dev per axis [N·m] (earth frame)
    pub torque_std: f64,
    /// Seed of the disturbance generator
    pub seed: u64,
}

impl Default for DisturbanceConfig {
    fn default() -> Self {
        Self {
            force_std: 0.0,
            torque_std: 0.0,
            seed: 54321,
        }
    }
}

impl DisturbanceConfig {
    pub fn is_calm(&self) -> bool {
        self.force_std == 0.0 && self.torque_std == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::Reorthonormalization;
    use crate::estimation::CovarianceUpdate;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.dt_sim, 0.001);
        assert!(config.validate().is_ok());
        assert_eq!(config.total_steps(), 10_000);
        assert_eq!(config.estimator_every(), 10);
    }

    #[test]
    fn test_vehicle_conversion() {
        let vehicle = VehicleConfig::default();
        let params = vehicle.to_params();

        assert_eq!(params.mass, vehicle.mass);
        assert_eq!(params.inertia[(2, 2)], vehicle.inertia.z);

        let model = vehicle.to_force_model();
        assert_eq!(model.drag[(0, 0)], vehicle.drag.x);
        assert_eq!(model.limits.max_thrust, vehicle.max_thrust);
    }

    #[test]
    fn test_partial_toml() {
        let text = r#"
            dt_sim = 0.002
            duration = 1.5

            [vehicle]
            mass = 0.5

            [integration]
            representation = "Quaternion"

            [integration.options]
            reorthonormalization = "Svd"
            reorthonormalize_every = 5

            [estimator.options]
            covariance_update = "Joseph"

            [sensors]
            seed = 7
        "#;

        let config = SimConfig::from_toml_str(text).unwrap();

        assert_eq!(config.dt_sim, 0.002);
        assert_eq!(config.vehicle.mass, 0.5);
        assert_eq!(config.vehicle.inertia, VehicleConfig::default().inertia);
        assert_eq!(config.integration.representation, AttitudeRepresentation::Quaternion);
        assert_eq!(config.integration.options.reorthonormalization, Reorthonormalization::Svd);
        assert_eq!(config.integration.options.reorthonormalize_every, 5);
        assert_eq!(config.estimator.options.covariance_update, CovarianceUpdate::Joseph);
        assert_eq!(config.sensors.seed, 7);
        assert_eq!(config.total_steps(), 750);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = SimConfig::from_toml_str(&text).unwrap();

        assert_eq!(parsed.estimator.process_noise, config.estimator.process_noise);
        assert_eq!(parsed.initial_state.position, config.initial_state.position);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SimConfig::from_toml_str("dt_sim = -0.01").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err =
            SimConfig::from_toml_str("[estimator]\nmeasurement_noise = [1.0, 1.0]").unwrap_err();
        assert!(err.to_string().contains("measurement_noise"));

        let err = SimConfig::from_toml_str("[sensors]\ngyro_noise_std = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SimConfig::from_toml_str("[estimator]\nperiod = nan").unwrap_err();
        assert!(err.to_string().contains("estimator.period"));
    }

    #[test]
    fn test_estimator_dt_follows_step_grid() {
        let mut config = SimConfig::default();
        assert_eq!(config.estimator_every(), 10);
        assert_relative_eq!(config.estimator_dt(), 0.01, epsilon = 1e-12);

        config.estimator.period = 0.0025;
        assert_eq!(config.estimator_every(), 3);
        assert_relative_eq!(config.estimator_dt(), 0.003, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_error() {
        let err = SimConfig::from_toml_str("dt_sim = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SimConfig::load("/nonexistent/quadsim.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
