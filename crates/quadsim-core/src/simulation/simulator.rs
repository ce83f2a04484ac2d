//! Main simulation runner
//!
//! Fixed-timestep driver for a single quadrotor: command → force model →
//! environment → rigid-body integration → invariant check, with the sensor
//! suite and UKF running at their own period on top of the integrator.

use log::{debug, warn};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::dynamics::{
    CalmAir, EnvironmentModel, ForceTorqueModel, RandomDisturbance, RigidBody, RigidBodySnapshot,
    ThrustTorqueCommand, ThrustTorqueModel,
};
use crate::error::QuadsimError;
use crate::estimation::{PoseMeasurement, PoseVelocityKinematics, UnscentedKalmanFilter};

use super::{SimConfig, VehicleMeasurement, VehicleSensors};

/// UKF over `[p, rpy, v_body]` driven by IMU and position measurements
pub type VehicleEstimator = UnscentedKalmanFilter<PoseVelocityKinematics>;

/// Simulation output for one timestep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimStep {
    /// Simulation time at the end of the step [s]
    pub time: f64,
    /// Vehicle state at the end of the step
    pub state: RigidBodySnapshot,
    /// Command applied over the step (after actuator limits)
    pub command: ThrustTorqueCommand,
    /// Sensor readings, on steps where the estimator ran
    pub measurement: Option<VehicleMeasurement>,
    /// Estimator mean after its update, on steps where it ran
    pub estimate: Option<DVector<f64>>,
}

/// Simulation history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimHistory {
    /// Time stamps [s]
    pub times: Vec<f64>,
    /// Vehicle positions [m] (earth frame)
    pub positions: Vec<Vector3<f64>>,
    /// Roll, pitch, yaw [rad]
    pub euler_angles: Vec<Vector3<f64>>,
    /// Velocities [m/s] (earth frame)
    pub earth_velocities: Vec<Vector3<f64>>,
    /// Angular velocities [rad/s] (body frame)
    pub angular_velocities: Vec<Vector3<f64>>,
    /// Applied thrust [N]
    pub thrusts: Vec<f64>,
    /// Time stamps of estimator updates [s]
    pub estimate_times: Vec<f64>,
    /// Estimator means `[p, rpy, v_body]`
    pub estimates: Vec<DVector<f64>>,
}

impl SimHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a simulation step
    pub fn record(&mut self, step: &SimStep) {
        self.times.push(step.time);
        self.positions.push(step.state.position);
        self.euler_angles.push(step.state.euler_angles);
        self.earth_velocities.push(step.state.earth_velocity);
        self.angular_velocities.push(step.state.angular_velocity);
        self.thrusts.push(step.command.thrust);

        if let Some(estimate) = &step.estimate {
            self.estimate_times.push(step.time);
            self.estimates.push(estimate.clone());
        }
    }

    /// Get simulation duration
    pub fn duration(&self) -> f64 {
        match (self.times.first(), self.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Get number of recorded steps
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Check if history is empty
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Main simulator
pub struct Simulator {
    /// Configuration
    pub config: SimConfig,
    /// Vehicle state
    body: RigidBody,
    /// Actuator and drag model
    force_model: ThrustTorqueModel,
    /// Additional earth-frame wrenches
    environment: Box<dyn EnvironmentModel>,
    /// Sensor models
    sensors: VehicleSensors,
    /// State estimator, when enabled
    estimator: Option<VehicleEstimator>,
    /// Integration steps taken
    steps: u64,
    /// Current simulation time
    time: f64,
    /// History recorder
    history: SimHistory,
}

impl Simulator {
    /// Create a new simulator from configuration
    ///
    /// Fails on invalid configuration, invalid vehicle parameters or an
    /// invalid estimator setup.
    pub fn new(config: SimConfig) -> Result<Self, QuadsimError> {
        config.validate()?;

        let environment: Box<dyn EnvironmentModel> = if config.disturbance.is_calm() {
            Box::new(CalmAir)
        } else {
            let d = &config.disturbance;
            Box::new(RandomDisturbance::new(d.force_std, d.torque_std, d.seed))
        };

        let body = build_body(&config)?;
        let sensors = VehicleSensors::new(&config.sensors)?;
        let estimator = build_estimator(&config)?;

        debug!(
            "simulator ready: dt = {}, {} steps, estimator {}",
            config.dt_sim,
            config.total_steps(),
            if estimator.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            force_model: config.vehicle.to_force_model(),
            config,
            body,
            environment,
            sensors,
            estimator,
            steps: 0,
            time: 0.0,
            history: SimHistory::new(),
        })
    }

    /// Replace the environment model
    pub fn with_environment<E: EnvironmentModel + 'static>(mut self, environment: E) -> Self {
        self.environment = Box::new(environment);
        self
    }

    /// Reset vehicle, sensors, estimator and history to the configured initial state
    ///
    /// The environment model keeps its internal state.
    pub fn reset(&mut self) -> Result<(), QuadsimError> {
        self.body = build_body(&self.config)?;
        self.sensors = VehicleSensors::new(&self.config.sensors)?;
        self.estimator = build_estimator(&self.config)?;
        self.steps = 0;
        self.time = 0.0;
        self.history = SimHistory::new();
        Ok(())
    }

    /// Step simulation forward by `dt_sim`
    ///
    /// Dynamics errors (non-finite state, attitude drift) are returned after
    /// the integration step; estimator errors leave the filter at its last
    /// good estimate. Either way the caller decides how to continue.
    pub fn step(&mut self, command: &ThrustTorqueCommand) -> Result<SimStep, QuadsimError> {
        let dt = self.config.dt_sim;
        let command = self.force_model.clamp(command);

        let (mut force, mut torque) = self.force_model.compute(&command, self.body.body_velocity());
        let (force_earth, torque_earth) = self.environment.apply(&self.body);
        let r_t = self.body.rotation_matrix().transpose();
        force += r_t * force_earth;
        torque += r_t * torque_earth;

        self.body.integrate(dt, &force, &torque);
        self.steps += 1;
        self.time = self.steps as f64 * dt;
        self.body.check_invariants(self.config.invariant_tolerance)?;

        let (measurement, estimate) = match self.estimator.as_mut() {
            Some(filter) if self.steps % self.config.estimator_every() == 0 => {
                let measurement = self.sensors.measure(&self.body, &force);
                let estimate = estimator_step(filter, self.config.estimator_dt(), &measurement)
                    .inspect_err(|e| warn!("estimator failed at t = {:.3}: {e}", self.time))?;
                (Some(measurement), Some(estimate))
            }
            _ => (None, None),
        };

        let step = SimStep {
            time: self.time,
            state: self.body.snapshot(),
            command,
            measurement,
            estimate,
        };
        self.history.record(&step);

        Ok(step)
    }

    /// Run simulation for the configured duration with a controller
    ///
    /// The controller sees the time, the true vehicle state and the current
    /// estimator mean (if any).
    pub fn run<C>(&mut self, mut controller: C) -> Result<&SimHistory, QuadsimError>
    where
        C: FnMut(f64, &RigidBody, Option<&DVector<f64>>) -> ThrustTorqueCommand,
    {
        let total = self.config.total_steps();
        while self.steps < total {
            let estimate = self.estimator.as_ref().map(|f| f.mean());
            let command = controller(self.time, &self.body, estimate);
            self.step(&command)?;
        }

        Ok(&self.history)
    }

    /// Run simulation with zero command (free fall / dynamics test)
    pub fn run_free(&mut self) -> Result<&SimHistory, QuadsimError> {
        self.run(|_t, _body, _estimate| ThrustTorqueCommand::default())
    }

    /// Get current simulation time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Get integration steps taken
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Get current vehicle state
    pub fn body(&self) -> &RigidBody {
        &self.body
    }

    /// Get the state estimator
    pub fn estimator(&self) -> Option<&VehicleEstimator> {
        self.estimator.as_ref()
    }

    /// Get simulation history
    pub fn history(&self) -> &SimHistory {
        &self.history
    }

    /// Get the force model
    pub fn force_model(&self) -> &ThrustTorqueModel {
        &self.force_model
    }
}

/// One predict/update cycle: IMU drives the prediction, position corrects it
fn estimator_step(
    filter: &mut VehicleEstimator,
    dt: f64,
    measurement: &VehicleMeasurement,
) -> Result<DVector<f64>, QuadsimError> {
    let imu = &measurement.imu;
    let control = DVector::from_iterator(
        6,
        imu.angular_velocity.iter().chain(imu.specific_force.iter()).copied(),
    );
    let z = DVector::from_column_slice(measurement.position.as_slice());

    filter.predict(dt, &control)?;
    filter.update(&z)?;
    Ok(filter.mean().clone())
}

fn build_body(config: &SimConfig) -> Result<RigidBody, QuadsimError> {
    let initial = config.initial_state.to_initial_state(config.integration.representation);
    Ok(RigidBody::new(
        initial,
        config.vehicle.to_params(),
        config.integration.options.clone(),
    )?)
}

fn build_estimator(config: &SimConfig) -> Result<Option<VehicleEstimator>, QuadsimError> {
    let est = &config.estimator;
    if !est.enabled {
        return Ok(None);
    }

    let model = PoseVelocityKinematics::new(PoseMeasurement::Position)
        .with_gravity(config.vehicle.to_params().gravity);
    let filter = UnscentedKalmanFilter::new(
        model,
        config.initial_state.to_estimator_state(),
        est.initial_covariance_matrix(),
        est.process_noise_matrix(),
        est.measurement_noise_matrix(),
        est.params,
    )?
    .with_options(est.options);

    Ok(Some(filter))
}
