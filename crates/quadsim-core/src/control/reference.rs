//! Reference signals for closed-loop flights
//!
//! Each axis (x, y, z, yaw) is a piecewise-linear breakpoint table built from
//! step, ramp or sine pulses added on top of a base value. Named scenarios
//! bundle the four axes into a position/yaw reference.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Rise/fall time of a step edge [s]
pub const STEP_EDGE: f64 = 1e-5;

/// Pulse active on `[t_start, t_end]` with amplitude `value` above the base
///
/// A step holds `value` over the window; a ramp rises linearly to `value`
/// at the midpoint and falls back by `t_end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub t_start: f64,
    pub t_end: f64,
    pub value: f64,
}

impl Pulse {
    pub fn new(t_start: f64, t_end: f64, value: f64) -> Self {
        Self { t_start, t_end, value }
    }
}

/// Whole sine periods starting at `t_start`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SinePulse {
    pub t_start: f64,
    pub amplitude: f64,
    pub periods: u32,
    /// Period [s]
    pub period: f64,
    /// Breakpoints per period
    pub points_per_period: u32,
}

/// Scalar reference as a time-indexed breakpoint table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSignal {
    /// Breakpoint times [s]
    pub times: Vec<f64>,
    /// Breakpoint values
    pub values: Vec<f64>,
}

impl ReferenceSignal {
    /// Constant `value` over `[t_start, t_end]`
    pub fn constant(t_start: f64, t_end: f64, value: f64) -> Self {
        Self {
            times: vec![t_start, t_end],
            values: vec![value, value],
        }
    }

    /// Rectangular pulses on top of `base`
    pub fn step(t_start: f64, t_end: f64, base: f64, pulses: &[Pulse]) -> Self {
        let mut signal = Self::with_capacity(2 + 4 * pulses.len());
        signal.push(t_start, base);
        for p in pulses {
            signal.push(p.t_start - STEP_EDGE, base);
            signal.push(p.t_start, base + p.value);
            signal.push(p.t_end, base + p.value);
            signal.push(p.t_end + STEP_EDGE, base);
        }
        signal.push(t_end, base);
        signal
    }

    /// Triangular pulses on top of `base`, peaking at each window's midpoint
    pub fn ramp(t_start: f64, t_end: f64, base: f64, pulses: &[Pulse]) -> Self {
        let mut signal = Self::with_capacity(2 + 3 * pulses.len());
        signal.push(t_start, base);
        for p in pulses {
            signal.push(p.t_start, base);
            signal.push(0.5 * (p.t_start + p.t_end), base + p.value);
            signal.push(p.t_end, base);
        }
        signal.push(t_end, base);
        signal
    }

    /// Sampled sine bursts on top of `base`
    pub fn sine(t_start: f64, t_end: f64, base: f64, pulses: &[SinePulse]) -> Self {
        let mut signal = Self::with_capacity(2);
        signal.push(t_start, base);
        for p in pulses {
            let n = (p.periods * p.points_per_period) as usize;
            let span = f64::from(p.periods) * p.period;
            for i in 0..n {
                let x = if n > 1 { span * i as f64 / (n - 1) as f64 } else { 0.0 };
                signal.push(p.t_start + x, base + p.amplitude * (2.0 * PI / p.period * x).sin());
            }
        }
        signal.push(t_end, base);
        signal
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            times: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, t: f64, value: f64) {
        self.times.push(t);
        self.values.push(value);
    }

    /// Value at time `t`, held constant outside the table
    ///
    /// Interpolates towards the first breakpoint at or after `t`.
    pub fn sample(&self, t: f64) -> f64 {
        let Some(k) = self.times.iter().position(|&tk| tk >= t) else {
            return self.values.last().copied().unwrap_or(0.0);
        };
        if k == 0 {
            return self.values[0];
        }

        let (t0, t1) = (self.times[k - 1], self.times[k]);
        let (v0, v1) = (self.values[k - 1], self.values[k]);
        if t1 <= t0 {
            return v1;
        }
        v0 + (v1 - v0) * (t - t0) / (t1 - t0)
    }

    /// Last breakpoint time
    pub fn end_time(&self) -> f64 {
        self.times.iter().copied().fold(0.0, f64::max)
    }
}

/// Position and yaw reference at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSample {
    /// Earth-frame position [m]
    pub position: Vector3<f64>,
    /// Yaw [rad]
    pub yaw: f64,
}

/// Four-axis reference for the position controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrajectory {
    pub name: String,
    pub x: ReferenceSignal,
    pub y: ReferenceSignal,
    pub z: ReferenceSignal,
    pub yaw: ReferenceSignal,
}

impl ReferenceTrajectory {
    /// Hold a fixed position and yaw for `duration`
    pub fn hold(position: Vector3<f64>, yaw: f64, duration: f64) -> Self {
        Self {
            name: "hold".to_string(),
            x: ReferenceSignal::constant(0.0, duration, position.x),
            y: ReferenceSignal::constant(0.0, duration, position.y),
            z: ReferenceSignal::constant(0.0, duration, position.z),
            yaw: ReferenceSignal::constant(0.0, duration, yaw),
        }
    }

    pub fn sample(&self, t: f64) -> ReferenceSample {
        ReferenceSample {
            position: Vector3::new(self.x.sample(t), self.y.sample(t), self.z.sample(t)),
            yaw: self.yaw.sample(t),
        }
    }

    /// Latest breakpoint over all axes [s]
    pub fn duration(&self) -> f64 {
        [&self.x, &self.y, &self.z, &self.yaw]
            .iter()
            .map(|s| s.end_time())
            .fold(0.0, f64::max)
    }
}

/// Predefined reference flights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceScenario {
    /// Large position and yaw steps, one axis at a time (90 s)
    Step,
    /// Diagonal step then a climb (20 s)
    ShortStep,
    /// Triangular ramps on every axis (90 s)
    Ramp,
    /// One sine period per axis, 10 s period (90 s)
    #[serde(rename = "sin")]
    Sine,
    /// Climb to 7 m and hold (90 s)
    Hover,
}

impl ReferenceScenario {
    pub const ALL: [ReferenceScenario; 5] = [
        ReferenceScenario::Step,
        ReferenceScenario::ShortStep,
        ReferenceScenario::Ramp,
        ReferenceScenario::Sine,
        ReferenceScenario::Hover,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReferenceScenario::Step => "step",
            ReferenceScenario::ShortStep => "shortstep",
            ReferenceScenario::Ramp => "ramp",
            ReferenceScenario::Sine => "sin",
            ReferenceScenario::Hover => "hover",
        }
    }

    /// Build the four-axis reference
    pub fn build(&self) -> ReferenceTrajectory {
        let p = Pulse::new;
        let deg = f64::to_radians;

        let (x, y, z, yaw) = match self {
            ReferenceScenario::Step => (
                ReferenceSignal::step(0.0, 90.0, 0.0, &[p(3.0, 13.0, 20.0), p(63.0, 73.0, -20.0)]),
                ReferenceSignal::step(0.0, 90.0, 0.0, &[p(23.0, 33.0, 20.0), p(63.0, 73.0, -20.0)]),
                ReferenceSignal::step(0.0, 90.0, 3.0, &[p(43.0, 53.0, 3.0), p(63.0, 73.0, 1.0)]),
                ReferenceSignal::step(
                    0.0,
                    90.0,
                    0.0,
                    &[
                        p(3.0, 13.0, deg(450.0)),
                        p(23.0, 33.0, deg(45.0)),
                        p(43.0, 53.0, deg(45.0)),
                        p(63.0, 73.0, deg(-45.0)),
                    ],
                ),
            ),
            ReferenceScenario::ShortStep => (
                ReferenceSignal::step(0.0, 20.0, 0.0, &[p(1.0, 20.0, 20.0)]),
                ReferenceSignal::step(0.0, 20.0, 0.0, &[p(1.0, 20.0, 20.0)]),
                ReferenceSignal::step(0.0, 20.0, 6.0, &[p(10.0, 20.0, 6.0)]),
                ReferenceSignal::step(0.0, 20.0, 0.0, &[p(10.0, 20.0, 0.0)]),
            ),
            ReferenceScenario::Ramp => (
                ReferenceSignal::ramp(0.0, 90.0, 0.0, &[p(3.0, 13.0, 20.0), p(63.0, 73.0, -20.0)]),
                ReferenceSignal::ramp(0.0, 90.0, 0.0, &[p(23.0, 33.0, 20.0), p(63.0, 73.0, -20.0)]),
                ReferenceSignal::ramp(0.0, 90.0, 3.0, &[p(43.0, 53.0, 20.0), p(63.0, 73.0, 20.0)]),
                ReferenceSignal::ramp(
                    0.0,
                    90.0,
                    0.0,
                    &[
                        p(3.0, 13.0, deg(120.0)),
                        p(23.0, 33.0, deg(120.0)),
                        p(43.0, 53.0, deg(120.0)),
                        p(63.0, 73.0, deg(-120.0)),
                    ],
                ),
            ),
            ReferenceScenario::Sine => {
                let burst = |t_start: f64, amplitude: f64| SinePulse {
                    t_start,
                    amplitude,
                    periods: 1,
                    period: 10.0,
                    points_per_period: 20,
                };
                (
                    ReferenceSignal::sine(0.0, 90.0, 0.0, &[burst(3.0, 10.0), burst(63.0, 10.0)]),
                    ReferenceSignal::sine(0.0, 90.0, 0.0, &[burst(23.0, 10.0), burst(63.0, 10.0)]),
                    ReferenceSignal::sine(0.0, 90.0, 3.0, &[burst(43.0, 10.0), burst(63.0, 10.0)]),
                    ReferenceSignal::sine(
                        0.0,
                        90.0,
                        0.0,
                        &[3.0, 23.0, 43.0, 63.0].map(|t| burst(t, deg(60.0))),
                    ),
                )
            }
            ReferenceScenario::Hover => (
                ReferenceSignal::constant(0.0, 90.0, 0.0),
                ReferenceSignal::constant(0.0, 90.0, 0.0),
                ReferenceSignal::step(0.0, 90.0, 3.0, &[p(3.0, 13.0, 4.0), p(63.0, 73.0, 4.0)]),
                ReferenceSignal::constant(0.0, 90.0, 0.0),
            ),
        };

        ReferenceTrajectory {
            name: self.name().to_string(),
            x,
            y,
            z,
            yaw,
        }
    }
}

impl fmt::Display for ReferenceScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReferenceScenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown reference scenario '{s}'")))
    }
}
