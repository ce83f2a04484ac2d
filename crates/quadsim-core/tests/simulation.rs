//! Closed-loop simulation tests
//!
//! The full cascade (position → velocity → angle → rate) flies the default
//! Crazyflie-scale vehicle through the fixed-timestep simulator.

use approx::assert_relative_eq;
use nalgebra::{DVector, Vector3};

use quadsim_core::control::{
    AttitudeController, PositionController, Pulse, ReferenceSignal, ReferenceTrajectory,
};
use quadsim_core::dynamics::{RigidBody, ThrustTorqueCommand};
use quadsim_core::math::{euler_xyz_to_rotation_matrix, wrap_angle};
use quadsim_core::simulation::{SimConfig, Simulator};

/// Multi-rate cascade, each loop run on its own period and held in between
struct CascadeController {
    position: PositionController,
    attitude: AttitudeController,
    reference: ReferenceTrajectory,
    dt_sim: f64,
    use_estimate: bool,
    step: u64,
    velocity_ref: Vector3<f64>,
    rpy_ref: Vector3<f64>,
    thrust: f64,
    omega_ref: Vector3<f64>,
    torque: Vector3<f64>,
}

impl CascadeController {
    fn new(reference: ReferenceTrajectory, dt_sim: f64, use_estimate: bool) -> Self {
        Self {
            position: PositionController::default(),
            attitude: AttitudeController::default(),
            reference,
            dt_sim,
            use_estimate,
            step: 0,
            velocity_ref: Vector3::zeros(),
            rpy_ref: Vector3::zeros(),
            thrust: 0.0,
            omega_ref: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    fn every(&self, period: f64) -> bool {
        let n = ((period / self.dt_sim).round() as u64).max(1);
        self.step % n == 0
    }

    fn command(
        &mut self,
        t: f64,
        body: &RigidBody,
        estimate: Option<&DVector<f64>>,
    ) -> ThrustTorqueCommand {
        let rpy = body.euler_angles();
        let target = self.reference.sample(t);

        let (position, velocity) = match estimate.filter(|_| self.use_estimate) {
            Some(x) => {
                let rpy_est = Vector3::new(x[3], x[4], x[5]);
                let v_body = Vector3::new(x[6], x[7], x[8]);
                (Vector3::new(x[0], x[1], x[2]), euler_xyz_to_rotation_matrix(&rpy_est) * v_body)
            }
            None => (*body.position(), body.earth_velocity()),
        };

        let position_config = self.position.config().clone();
        let attitude_config = self.attitude.config().clone();

        if self.every(position_config.position_period) {
            self.velocity_ref = self.position.run_position(&target.position, &position);
        }
        if self.every(position_config.velocity_period) {
            let tilt =
                self.position.run_velocity(&self.velocity_ref, &velocity, rpy.z, body.mass());
            self.rpy_ref = Vector3::new(tilt.roll, tilt.pitch, target.yaw);
            self.thrust = tilt.thrust;
        }
        if self.every(attitude_config.angle_period) {
            self.omega_ref = self.attitude.run_angle(&self.rpy_ref, &rpy);
        }
        if self.every(attitude_config.rate_period) {
            self.torque =
                self.attitude.run_rate(&self.omega_ref, body.angular_velocity(), body.inertia());
        }

        self.step += 1;
        ThrustTorqueCommand::new(self.thrust, self.torque)
    }
}

fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

fn hover_config(duration: f64) -> SimConfig {
    let mut config = SimConfig {
        duration,
        ..SimConfig::default()
    };
    config.initial_state.position = Vector3::new(0.3, -0.2, 0.8);
    config
}

#[test]
fn test_cascade_reaches_hover_point() {
    init_logging();
    let config = hover_config(8.0);
    let target = Vector3::new(0.0, 0.0, 1.0);
    let reference = ReferenceTrajectory::hold(target, 0.0, config.duration);
    let mut controller = CascadeController::new(reference, config.dt_sim, false);

    let mut sim = Simulator::new(config).unwrap();
    sim.run(|t, body, estimate| controller.command(t, body, estimate)).unwrap();

    let body = sim.body();
    assert_relative_eq!(*body.position(), target, epsilon = 0.03);
    assert!(body.earth_velocity().norm() < 0.05);
    assert!(body.euler_angles().xy().norm() < 0.05);

    // Thrust settles at the weight
    let thrust = *sim.history().thrusts.last().unwrap();
    assert_relative_eq!(thrust, body.mass() * quadsim_core::GRAVITY, epsilon = 0.02);
}

#[test]
fn test_cascade_on_estimated_state() {
    init_logging();
    let config = hover_config(8.0);
    let target = Vector3::new(0.0, 0.0, 1.0);
    let reference = ReferenceTrajectory::hold(target, 0.0, config.duration);
    let mut controller = CascadeController::new(reference, config.dt_sim, true);

    let mut sim = Simulator::new(config).unwrap();
    sim.run(|t, body, estimate| controller.command(t, body, estimate)).unwrap();

    assert_relative_eq!(*sim.body().position(), target, epsilon = 0.1);

    let estimate = sim.history().estimates.last().unwrap();
    let position_estimate = Vector3::new(estimate[0], estimate[1], estimate[2]);
    assert_relative_eq!(position_estimate, *sim.body().position(), epsilon = 0.05);
}

#[test]
fn test_yaw_turn_short_way() {
    init_logging();
    let mut config = SimConfig {
        duration: 4.0,
        ..SimConfig::default()
    };
    config.initial_state.euler_angles = Vector3::new(0.0, 0.0, -3.0);
    let reference = ReferenceTrajectory::hold(Vector3::zeros(), 3.0, config.duration);
    let mut controller = CascadeController::new(reference, config.dt_sim, false);

    let mut sim = Simulator::new(config).unwrap();
    sim.run(|t, body, estimate| controller.command(t, body, estimate)).unwrap();

    let yaw = sim.body().euler_angles().z;
    assert!(wrap_angle(yaw - 3.0).abs() < 0.05, "final yaw {yaw}");

    // Turned through ±π rather than through zero
    assert!(sim.history().euler_angles.iter().all(|rpy| rpy.z.abs() > 2.5));
    assert!(sim.body().position().norm() < 0.05);
}

#[test]
fn test_follows_step_reference() {
    init_logging();
    let mut config = SimConfig {
        duration: 9.0,
        ..SimConfig::default()
    };
    config.estimator.enabled = false;
    config.initial_state.position = Vector3::new(0.0, 0.0, 1.0);

    let step = [Pulse::new(1.0, 20.0, 0.3)];
    let reference = ReferenceTrajectory {
        name: "climb".to_string(),
        x: ReferenceSignal::step(0.0, 20.0, 0.0, &step),
        y: ReferenceSignal::constant(0.0, 20.0, 0.0),
        z: ReferenceSignal::step(0.0, 20.0, 1.0, &[Pulse::new(1.0, 20.0, 0.5)]),
        yaw: ReferenceSignal::constant(0.0, 20.0, 0.0),
    };
    let mut controller = CascadeController::new(reference, config.dt_sim, false);

    let mut sim = Simulator::new(config).unwrap();
    sim.run(|t, body, estimate| controller.command(t, body, estimate)).unwrap();

    // Still on the ground setpoint just before the step
    let before = sim.history().times.iter().position(|&t| t >= 0.999).unwrap();
    assert_relative_eq!(
        sim.history().positions[before],
        Vector3::new(0.0, 0.0, 1.0),
        epsilon = 1e-3
    );

    assert_relative_eq!(*sim.body().position(), Vector3::new(0.3, 0.0, 1.5), epsilon = 0.05);
}

#[test]
fn test_config_file_round_trip() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("quadsim-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("sim.toml");
    std::fs::write(
        &path,
        r#"
            dt_sim = 0.002
            duration = 0.2

            [initial_state]
            position = [0.0, 0.0, 2.0]

            [estimator]
            enabled = false
        "#,
    )
    .unwrap();

    let config = SimConfig::load(&path).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    let mut sim = Simulator::new(config).unwrap();
    let history = sim.run_free().unwrap();

    assert_eq!(history.len(), 100);
    assert!(history.estimates.is_empty());
    assert!(history.positions.last().unwrap().z < 2.0);
}
