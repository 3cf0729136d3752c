//! Control primitives: lateral PID and longitudinal IDM.
use serde::{Deserialize, Serialize};

pub mod idm;
pub mod pid;

pub use idm::{IdmConfig, IdmController};
pub use pid::{PidConfig, PidController};

/// Controller gains as they appear under the `controller` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub pid: PidConfig,
    #[serde(default = "ControllerConfig::default_idm")]
    pub idm: IdmConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pid: PidConfig::default(),
            idm: Self::default_idm(),
        }
    }
}

impl ControllerConfig {
    const fn default_idm() -> IdmConfig {
        IdmConfig {
            desired_speed: 13.9,
            min_gap: 2.0,
            time_headway: 1.2,
            max_accel: 1.5,
            comfortable_brake: 2.0,
            delta: 4.0,
        }
    }
}
