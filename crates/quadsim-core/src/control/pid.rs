//! Discrete-time PID
//!
//! Tustin integrator, band-limited differentiator and output saturation
//! with back-calculation anti-windup (Beard & McLain, *Small Unmanned
//! Aircraft*, ch. 6):
//!
//! I ← I + Ts/2 (e + e⁻)
//! D ← (2τ - Ts)/(2τ + Ts) D + 2/(2τ + Ts) (e - e⁻)
//! u = sat(kp e + ki I + kd D)

use serde::{Deserialize, Serialize};

/// PID gains and limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Upper output limit
    pub limit_up: f64,
    /// Lower output limit
    pub limit_down: f64,
    /// Differentiator time constant [s]
    pub tau: f64,
}

impl PidGains {
    /// Proportional-only gains with symmetric output limit
    pub fn proportional(kp: f64, limit: f64) -> Self {
        Self {
            kp,
            ki: 0.0,
            kd: 0.0,
            limit_up: limit,
            limit_down: -limit,
            tau: 0.01,
        }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::proportional(1.0, f64::INFINITY)
    }
}

/// PID controller state
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integrator: f64,
    differentiator: f64,
    error_prev: f64,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integrator: 0.0,
            differentiator: 0.0,
            error_prev: 0.0,
        }
    }

    /// Advance one sample with error `error` and sample period `ts`
    pub fn run(&mut self, error: f64, ts: f64) -> f64 {
        let g = &self.gains;

        self.integrator += ts / 2.0 * (error + self.error_prev);
        self.differentiator = (2.0 * g.tau - ts) / (2.0 * g.tau + ts) * self.differentiator
            + 2.0 / (2.0 * g.tau + ts) * (error - self.error_prev);
        self.error_prev = error;

        let u_raw = g.kp * error + g.ki * self.integrator + g.kd * self.differentiator;
        let u = u_raw.clamp(g.limit_down, g.limit_up);

        // Anti-windup
        if g.ki != 0.0 {
            self.integrator += ts / g.ki * (u - u_raw);
        }

        u
    }

    /// Clear integrator, differentiator and error history
    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.differentiator = 0.0;
        self.error_prev = 0.0;
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn integrator(&self) -> f64 {
        self.integrator
    }

    pub fn differentiator(&self) -> f64 {
        self.differentiator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_proportional_with_saturation() {
        let mut pid = Pid::new(PidGains::proportional(2.0, 1.0));

        assert_relative_eq!(pid.run(0.25, 0.01), 0.5);
        assert_relative_eq!(pid.run(3.0, 0.01), 1.0);
        assert_relative_eq!(pid.run(-3.0, 0.01), -1.0);
    }

    #[test]
    fn test_trapezoidal_integrator() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            ..PidGains::default()
        };
        let mut pid = Pid::new(gains);

        // Constant unit error from zero: first sample integrates half a step
        let ts = 0.1;
        pid.run(1.0, ts);
        assert_relative_eq!(pid.integrator(), 0.05, epsilon = 1e-12);

        for _ in 0..9 {
            pid.run(1.0, ts);
        }
        assert_relative_eq!(pid.integrator(), 0.95, epsilon = 1e-12);
    }

    #[test]
    fn test_anti_windup() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
            limit_up: 0.1,
            limit_down: -0.1,
            tau: 0.01,
        };
        let mut pid = Pid::new(gains);

        for _ in 0..1000 {
            assert!(pid.run(1.0, 0.01) <= 0.1);
        }

        // Held near the saturation level; an unprotected integrator reaches 10
        assert!(pid.integrator() < 1.2);

        for _ in 0..99 {
            pid.run(-1.0, 0.01);
        }
        assert!(pid.run(-1.0, 0.01) < 0.0);
    }

    #[test]
    fn test_differentiator_step_response() {
        let gains = PidGains {
            kp: 0.0,
            kd: 1.0,
            tau: 0.05,
            ..PidGains::default()
        };
        let mut pid = Pid::new(gains);
        let ts = 0.01;

        let first = pid.run(1.0, ts);
        assert_relative_eq!(first, 2.0 / (2.0 * 0.05 + ts), epsilon = 1e-12);

        // Decays for a held error
        let mut last = first;
        for _ in 0..60 {
            let u = pid.run(1.0, ts);
            assert!(u < last);
            last = u;
        }
        assert!(last.abs() < 1e-3);
    }

    #[test]
    fn test_reset() {
        let gains = PidGains {
            ki: 1.0,
            kd: 1.0,
            ..PidGains::default()
        };
        let mut pid = Pid::new(gains);
        pid.run(1.0, 0.1);
        pid.reset();

        assert_eq!(pid.integrator(), 0.0);
        assert_eq!(pid.differentiator(), 0.0);
        assert_relative_eq!(pid.run(0.0, 0.1), 0.0);
    }
}
