//! Intelligent Driver Model longitudinal controller.
use serde::{Deserialize, Serialize};

/// Floor applied to gaps and desired speed before dividing.
const DIVISION_FLOOR: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdmConfig {
    pub desired_speed: f64,
    pub min_gap: f64,
    pub time_headway: f64,
    #[serde(default = "IdmConfig::default_max_accel")]
    pub max_accel: f64,
    #[serde(default = "IdmConfig::default_comfortable_brake")]
    pub comfortable_brake: f64,
    #[serde(default = "IdmConfig::default_delta")]
    pub delta: f64,
}

impl IdmConfig {
    /// Build a config with the model's stock acceleration terms.
    #[must_use]
    pub const fn new(desired_speed: f64, min_gap: f64, time_headway: f64) -> Self {
        Self {
            desired_speed,
            min_gap,
            time_headway,
            max_accel: Self::default_max_accel(),
            comfortable_brake: Self::default_comfortable_brake(),
            delta: Self::default_delta(),
        }
    }

    const fn default_max_accel() -> f64 {
        1.0
    }

    const fn default_comfortable_brake() -> f64 {
        2.0
    }

    const fn default_delta() -> f64 {
        4.0
    }
}

/// Stateless IDM evaluator.
#[derive(Debug, Clone, Copy)]
pub struct IdmController {
    cfg: IdmConfig,
}

impl IdmController {
    #[must_use]
    pub const fn new(cfg: IdmConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub const fn config(&self) -> &IdmConfig {
        &self.cfg
    }

    /// Acceleration for speed `v`, gap `distance` and closing speed `rel_speed`
    /// (`v_self - v_lead`, positive when closing). The output is unbounded.
    #[must_use]
    pub fn step(&self, v: f64, distance: f64, rel_speed: f64) -> f64 {
        let cfg = &self.cfg;
        let mut desired_gap = cfg.min_gap + v * cfg.time_headway;
        if cfg.max_accel > 0.0 && cfg.comfortable_brake > 0.0 {
            desired_gap +=
                (v * rel_speed) / (2.0 * (cfg.max_accel * cfg.comfortable_brake).sqrt());
        }
        let distance = distance.max(DIVISION_FLOOR);
        let free_road = 1.0 - (v / cfg.desired_speed.max(DIVISION_FLOOR)).powf(cfg.delta);
        let interaction = (desired_gap / distance).powi(2);
        cfg.max_accel * (free_road - interaction)
    }
}
