//! Numerical integration methods
//!
//! Fixed-step schemes over packed state vectors. The rigid body and the
//! filter models use explicit Euler; RK4 is available for drivers that want
//! a higher-order reference trajectory.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// Fixed-step integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    /// x(t+dt) = x(t) + dt·ẋ(t)
    #[default]
    Euler,
    /// Classical 4th-order Runge-Kutta
    Rk4,
}

impl IntegrationScheme {
    /// Advance `x` by one step of this scheme
    pub fn step<const N: usize, F>(
        &self,
        x: &SVector<f64, N>,
        t: f64,
        dt: f64,
        f: F,
    ) -> SVector<f64, N>
    where
        F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
    {
        match self {
            IntegrationScheme::Euler => euler(x, t, dt, f),
            IntegrationScheme::Rk4 => rk4(x, t, dt, f),
        }
    }
}

/// Explicit Euler integration (first-order)
///
/// Only conditionally stable: `dt` must be small relative to the fastest
/// time constant of the system.
pub fn euler<const N: usize, F>(
    x: &SVector<f64, N>,
    t: f64,
    dt: f64,
    f: F,
) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    x + f(t, x) * dt
}

/// Generic RK4 integrator for any state vector
///
/// Solves dx/dt = f(t, x) using 4th-order Runge-Kutta method.
///
/// # Arguments
/// * `x` - Current state
/// * `t` - Current time
/// * `dt` - Time step
/// * `f` - Derivative function f(t, x) -> dx/dt
pub fn rk4<const N: usize, F>(
    x: &SVector<f64, N>,
    t: f64,
    dt: f64,
    f: F,
) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * dt / 2.0));
    let k3 = f(t + dt / 2.0, &(x + k2 * dt / 2.0));
    let k4 = f(t + dt, &(x + k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}
