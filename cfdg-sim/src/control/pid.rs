//! Proportional-integral-derivative controller used for lane keeping.
use serde::{Deserialize, Serialize};

/// PID gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    #[serde(default = "PidConfig::default_kp")]
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default = "PidConfig::default_kd")]
    pub kd: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: Self::default_kp(),
            ki: 0.0,
            kd: Self::default_kd(),
        }
    }
}

impl PidConfig {
    const fn default_kp() -> f64 {
        1.2
    }

    const fn default_kd() -> f64 {
        0.2
    }
}

/// PID controller owning its integrator and previous error.
///
/// The integrator is unbounded (no anti-windup). One instance belongs to
/// exactly one rollout.
#[derive(Debug, Clone)]
pub struct PidController {
    cfg: PidConfig,
    integral: f64,
    prev_error: f64,
}

impl PidController {
    #[must_use]
    pub const fn new(cfg: PidConfig) -> Self {
        Self {
            cfg,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PidConfig {
        &self.cfg
    }

    #[must_use]
    pub const fn integral(&self) -> f64 {
        self.integral
    }

    pub const fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    /// Feed one error sample and return the control output.
    pub fn step(&mut self, error: f64, dt: f64) -> f64 {
        self.integral += error * dt;
        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };
        self.prev_error = error;
        self.cfg.kp * error + self.cfg.ki * self.integral + self.cfg.kd * derivative
    }
}
