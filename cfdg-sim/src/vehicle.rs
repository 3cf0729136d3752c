//! Kinematic bicycle model for the ego vehicle.
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ego pose and scalar speed at one instant (rear-axle reference).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub v: f64,
}

impl VehicleState {
    #[must_use]
    pub const fn new(x: f64, y: f64, yaw: f64, v: f64) -> Self {
        Self { x, y, yaw, v }
    }
}

/// Physical bounds for one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    #[serde(default = "VehicleParams::default_wheel_base")]
    pub wheel_base: f64,
    #[serde(default = "VehicleParams::default_steer_limit")]
    pub steer_limit: f64,
    #[serde(default = "VehicleParams::default_a_min")]
    pub a_min: f64,
    #[serde(default = "VehicleParams::default_a_max")]
    pub a_max: f64,
    /// Carried for downstream consumers; the kinematic step does not limit lateral acceleration.
    #[serde(default = "VehicleParams::default_a_lat_max")]
    pub a_lat_max: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            wheel_base: Self::default_wheel_base(),
            steer_limit: Self::default_steer_limit(),
            a_min: Self::default_a_min(),
            a_max: Self::default_a_max(),
            a_lat_max: Self::default_a_lat_max(),
        }
    }
}

impl VehicleParams {
    const fn default_wheel_base() -> f64 {
        2.8
    }

    const fn default_steer_limit() -> f64 {
        0.6
    }

    const fn default_a_min() -> f64 {
        -6.0
    }

    const fn default_a_max() -> f64 {
        3.0
    }

    const fn default_a_lat_max() -> f64 {
        4.0
    }

    /// Check `wheel_base > 0`, `steer_limit > 0` and `a_min < 0 < a_max`.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheel_base <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "vehicle.wheel_base",
                value: self.wheel_base,
            });
        }
        if self.steer_limit <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "vehicle.steer_limit",
                value: self.steer_limit,
            });
        }
        if !(self.a_min < 0.0 && self.a_max > 0.0) {
            return Err(ConfigError::AccelBounds {
                a_min: self.a_min,
                a_max: self.a_max,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn clamp_steer(&self, steer: f64) -> f64 {
        steer.clamp(-self.steer_limit, self.steer_limit)
    }

    #[must_use]
    pub fn clamp_accel(&self, accel: f64) -> f64 {
        accel.clamp(self.a_min, self.a_max)
    }
}

/// Advance the state by one forward-Euler step.
///
/// Steering and acceleration are clamped to the vehicle bounds before
/// integrating. `dt` must be positive; the caller owns that guarantee.
#[must_use]
pub fn step(
    state: &VehicleState,
    steer: f64,
    accel: f64,
    dt: f64,
    params: &VehicleParams,
) -> VehicleState {
    let steer = params.clamp_steer(steer);
    let accel = params.clamp_accel(accel);
    VehicleState {
        x: state.x + state.v * state.yaw.cos() * dt,
        y: state.y + state.v * state.yaw.sin() * dt,
        yaw: state.yaw + (state.v / params.wheel_base) * steer.tan() * dt,
        v: state.v + accel * dt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_step_advances_x() {
        let params = VehicleParams {
            wheel_base: 2.8,
            steer_limit: 0.6,
            a_min: -6.0,
            a_max: 3.0,
            a_lat_max: 4.0,
        };
        let next = step(&VehicleState::new(0.0, 0.0, 0.0, 1.0), 0.0, 0.0, 0.1, &params);
        assert!((next.x - 0.1).abs() < 1e-12);
        assert!(next.y.abs() < 1e-12);
        assert!(next.yaw.abs() < 1e-12);
        assert!((next.v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn oversized_commands_are_clamped() {
        let params = VehicleParams::default();
        let start = VehicleState::new(0.0, 0.0, 0.0, 5.0);
        let wild = step(&start, 10.0, 100.0, 0.1, &params);
        let bounded = step(&start, params.steer_limit, params.a_max, 0.1, &params);
        assert_eq!(wild, bounded);

        let braking = step(&start, -10.0, -100.0, 0.1, &params);
        let floor = step(&start, -params.steer_limit, params.a_min, 0.1, &params);
        assert_eq!(braking, floor);
    }

    #[test]
    fn yaw_rate_follows_bicycle_geometry() {
        let params = VehicleParams::default();
        let next = step(&VehicleState::new(0.0, 0.0, 0.0, 2.8), 0.3, 0.0, 0.5, &params);
        assert!((next.yaw - 0.3_f64.tan() * 0.5).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_bad_bounds() {
        let params = VehicleParams {
            steer_limit: 0.0,
            ..VehicleParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NonPositive { field, .. }) if field == "vehicle.steer_limit"
        ));
        let params = VehicleParams {
            a_min: 1.0,
            ..VehicleParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::AccelBounds { .. })
        ));
        VehicleParams::default().validate().expect("defaults are valid");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let params: VehicleParams = serde_json::from_str(r#"{"wheel_base": 3.1}"#).unwrap();
        assert!((params.wheel_base - 3.1).abs() < f64::EPSILON);
        assert!((params.steer_limit - 0.6).abs() < f64::EPSILON);
    }
}
