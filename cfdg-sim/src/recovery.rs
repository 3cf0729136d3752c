//! Lane-keeping controller with a perturbation overlay and recovery hysteresis.
use serde::{Deserialize, Serialize};

use crate::control::{IdmController, PidController};
use crate::geometry::{LaneErrors, lane_errors};
use crate::map::MapApi;
use crate::perturb::Perturbation;
use crate::sim::{ControlCommand, Controller};
use crate::vehicle::VehicleState;

/// Gap handed to the IDM when no lead vehicle is modelled.
const FREE_FLOW_GAP: f64 = 1e6;
/// Acceleration ceiling while recovering above the recovery speed.
const RECOVERY_DECEL: f64 = -1.0;

/// Tracking tolerances that count a frame as back on the lane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    #[serde(default = "Tolerance::default_eps_cte")]
    pub eps_cte: f64,
    #[serde(default = "Tolerance::default_eps_yaw")]
    pub eps_yaw: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            eps_cte: Self::default_eps_cte(),
            eps_yaw: Self::default_eps_yaw(),
        }
    }
}

impl Tolerance {
    const fn default_eps_cte() -> f64 {
        0.3
    }

    const fn default_eps_yaw() -> f64 {
        0.1
    }

    #[must_use]
    pub fn admits(&self, errors: &LaneErrors) -> bool {
        errors.within(self.eps_cte, self.eps_yaw)
    }
}

/// The `recover` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "RecoveryConfig::default_cte_threshold")]
    pub cte_threshold: f64,
    #[serde(default = "RecoveryConfig::default_yaw_threshold")]
    pub yaw_threshold: f64,
    #[serde(default = "RecoveryConfig::default_pid_gain_scale")]
    pub pid_gain_scale: f64,
    #[serde(default = "RecoveryConfig::default_min_frames")]
    pub min_frames: u32,
    #[serde(default = "RecoveryConfig::default_window_sec")]
    pub window_sec: f64,
    #[serde(default = "RecoveryConfig::default_desired_speed_recover")]
    pub desired_speed_recover: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cte_threshold: Self::default_cte_threshold(),
            yaw_threshold: Self::default_yaw_threshold(),
            pid_gain_scale: Self::default_pid_gain_scale(),
            min_frames: Self::default_min_frames(),
            window_sec: Self::default_window_sec(),
            desired_speed_recover: Self::default_desired_speed_recover(),
        }
    }
}

impl RecoveryConfig {
    const fn default_cte_threshold() -> f64 {
        0.8
    }

    const fn default_yaw_threshold() -> f64 {
        0.2
    }

    const fn default_pid_gain_scale() -> f64 {
        2.0
    }

    const fn default_min_frames() -> u32 {
        5
    }

    const fn default_window_sec() -> f64 {
        2.0
    }

    const fn default_desired_speed_recover() -> f64 {
        6.0
    }

    /// Tracking error large enough to trigger recovery.
    #[must_use]
    pub fn exceeds_threshold(&self, errors: &LaneErrors) -> bool {
        errors.cte.abs() > self.cte_threshold || errors.heading_err.abs() > self.yaw_threshold
    }

    /// Inside the perturbation or the trailing window after it.
    #[must_use]
    pub fn forced_at(&self, perturbation: &Perturbation, t: f64) -> bool {
        perturbation.start_t <= t && t <= perturbation.end_t() + self.window_sec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    #[default]
    Normal,
    Recovering,
}

/// Guard values evaluated for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryGuards {
    pub exceeds_threshold: bool,
    pub forced: bool,
    pub within_tolerance: bool,
}

/// Two-state hysteresis: enter on a large error or a forced window, leave after
/// `min_frames` consecutive in-tolerance frames outside any forced window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryMachine {
    mode: RecoveryMode,
    good_frames: u32,
    min_frames: u32,
}

impl RecoveryMachine {
    #[must_use]
    pub const fn new(min_frames: u32) -> Self {
        Self {
            mode: RecoveryMode::Normal,
            good_frames: 0,
            min_frames,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> RecoveryMode {
        self.mode
    }

    #[must_use]
    pub const fn good_frames(&self) -> u32 {
        self.good_frames
    }

    /// Advance one frame. Returns true when recovery shaping applies to it.
    ///
    /// Only a bad frame clears the good-frame streak; it survives an exit.
    pub fn observe(&mut self, guards: RecoveryGuards) -> bool {
        if self.mode == RecoveryMode::Normal && (guards.exceeds_threshold || guards.forced) {
            log::debug!("recovery engaged (forced: {})", guards.forced);
            self.mode = RecoveryMode::Recovering;
        }
        if self.mode == RecoveryMode::Normal {
            return false;
        }

        if guards.within_tolerance {
            self.good_frames = self.good_frames.saturating_add(1);
        } else {
            self.good_frames = 0;
        }
        if !guards.forced && self.good_frames >= self.min_frames {
            log::debug!("recovery released after {} good frames", self.good_frames);
            self.mode = RecoveryMode::Normal;
        }
        true
    }
}

/// Per-rollout controller: PID lane keeping, IDM free-flow speed, perturbation
/// overlay and recovery shaping.
#[derive(Debug, Clone)]
pub struct RecoveryController<M> {
    map: M,
    pid: PidController,
    idm: IdmController,
    cfg: RecoveryConfig,
    tolerance: Tolerance,
    perturbation: Perturbation,
    machine: RecoveryMachine,
    dt: f64,
}

impl<M: MapApi> RecoveryController<M> {
    #[must_use]
    pub const fn new(
        map: M,
        pid: PidController,
        idm: IdmController,
        cfg: RecoveryConfig,
        tolerance: Tolerance,
        perturbation: Perturbation,
        dt: f64,
    ) -> Self {
        Self {
            map,
            pid,
            idm,
            cfg,
            tolerance,
            perturbation,
            machine: RecoveryMachine::new(cfg.min_frames),
            dt,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> RecoveryMode {
        self.machine.mode()
    }

    #[must_use]
    pub const fn perturbation(&self) -> &Perturbation {
        &self.perturbation
    }

    /// Commands for `state` at time `t`.
    ///
    /// Recovery shaping scales the controller's own output; the perturbation
    /// deltas are added on top of the shaped command.
    pub fn control(&mut self, state: &VehicleState, t: f64) -> ControlCommand {
        let centerline = self.map.lane_centerline(state.x, state.y);
        let errors = lane_errors(&centerline, state.x, state.y, state.yaw);

        let mut steer = self.pid.step(errors.cte + errors.heading_err, self.dt);
        let mut accel = self.idm.step(state.v, FREE_FLOW_GAP, 0.0);

        let guards = RecoveryGuards {
            exceeds_threshold: self.cfg.exceeds_threshold(&errors),
            forced: self.cfg.forced_at(&self.perturbation, t),
            within_tolerance: self.tolerance.admits(&errors),
        };
        if self.machine.observe(guards) {
            steer *= self.cfg.pid_gain_scale;
            if state.v > self.cfg.desired_speed_recover {
                accel = accel.min(RECOVERY_DECEL);
            }
        }

        let perturb_on = self.perturbation.is_active(t);
        if perturb_on {
            steer += self.perturbation.steer_delta;
            accel += self.perturbation.acc_delta;
        }
        ControlCommand {
            steer,
            accel,
            perturb_on,
        }
    }
}

impl<M: MapApi> Controller for RecoveryController<M> {
    fn control(&mut self, state: &VehicleState, t: f64) -> ControlCommand {
        Self::control(self, state, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{IdmConfig, PidConfig};
    use crate::geometry::Point2;
    use crate::map::LaneMap;

    const GOOD: RecoveryGuards = RecoveryGuards {
        exceeds_threshold: false,
        forced: false,
        within_tolerance: true,
    };
    const BAD: RecoveryGuards = RecoveryGuards {
        exceeds_threshold: true,
        forced: false,
        within_tolerance: false,
    };
    const DRIFTING: RecoveryGuards = RecoveryGuards {
        exceeds_threshold: false,
        forced: false,
        within_tolerance: false,
    };

    #[test]
    fn stays_normal_without_triggers() {
        let mut machine = RecoveryMachine::new(3);
        assert!(!machine.observe(GOOD));
        assert!(!machine.observe(DRIFTING));
        assert_eq!(machine.mode(), RecoveryMode::Normal);
    }

    #[test]
    fn needs_min_frames_consecutive_good_frames_to_exit() {
        let mut machine = RecoveryMachine::new(3);
        assert!(machine.observe(BAD));
        assert!(machine.observe(GOOD));
        assert!(machine.observe(GOOD));
        assert_eq!(machine.mode(), RecoveryMode::Recovering);
        assert!(machine.observe(GOOD));
        assert_eq!(machine.mode(), RecoveryMode::Normal);
    }

    #[test]
    fn single_good_frame_then_bad_does_not_exit() {
        let mut machine = RecoveryMachine::new(2);
        machine.observe(BAD);
        machine.observe(GOOD);
        assert_eq!(machine.good_frames(), 1);
        machine.observe(DRIFTING);
        assert_eq!(machine.good_frames(), 0);
        assert_eq!(machine.mode(), RecoveryMode::Recovering);
        machine.observe(GOOD);
        assert_eq!(machine.mode(), RecoveryMode::Recovering);
        machine.observe(GOOD);
        assert_eq!(machine.mode(), RecoveryMode::Normal);
    }

    #[test]
    fn forced_window_blocks_exit_even_when_tracking_is_good() {
        let mut machine = RecoveryMachine::new(1);
        let forced_good = RecoveryGuards {
            forced: true,
            ..GOOD
        };
        for _ in 0..5 {
            assert!(machine.observe(forced_good));
        }
        assert_eq!(machine.mode(), RecoveryMode::Recovering);
        assert!(machine.observe(GOOD));
        assert_eq!(machine.mode(), RecoveryMode::Normal);
    }

    #[test]
    fn streak_survives_exit_until_a_bad_frame() {
        let mut machine = RecoveryMachine::new(2);
        machine.observe(BAD);
        machine.observe(GOOD);
        machine.observe(GOOD);
        assert_eq!(machine.mode(), RecoveryMode::Normal);
        assert_eq!(machine.good_frames(), 2);

        machine.observe(GOOD);
        assert_eq!(machine.good_frames(), 2);

        assert!(machine.observe(BAD));
        assert_eq!(machine.mode(), RecoveryMode::Recovering);
        assert_eq!(machine.good_frames(), 0);
    }

    #[test]
    fn kept_streak_releases_a_good_re_entry_at_once() {
        let mut machine = RecoveryMachine::new(2);
        machine.observe(BAD);
        machine.observe(GOOD);
        machine.observe(GOOD);
        assert!(machine.observe(RecoveryGuards {
            exceeds_threshold: true,
            ..GOOD
        }));
        assert_eq!(machine.good_frames(), 3);
        assert_eq!(machine.mode(), RecoveryMode::Normal);
    }

    #[test]
    fn forced_window_covers_perturbation_and_trailing_window() {
        let cfg = RecoveryConfig::default();
        let p = Perturbation {
            start_t: 1.0,
            duration: 0.5,
            ..Perturbation::none()
        };
        assert!(!cfg.forced_at(&p, 0.9));
        assert!(cfg.forced_at(&p, 1.2));
        assert!(cfg.forced_at(&p, 3.5));
        assert!(!cfg.forced_at(&p, 3.6));
    }

    fn controller(perturbation: Perturbation, idm: IdmConfig) -> RecoveryController<LaneMap> {
        let map = LaneMap::default().with_lane(
            "main",
            vec![Point2::new(-100.0, 0.0), Point2::new(100.0, 0.0)],
        );
        RecoveryController::new(
            map,
            PidController::new(PidConfig::default()),
            IdmController::new(idm),
            RecoveryConfig::default(),
            Tolerance::default(),
            perturbation,
            0.1,
        )
    }

    #[test]
    fn centred_vehicle_gets_neutral_steer() {
        let mut ctl = controller(Perturbation::none(), IdmConfig::new(10.0, 2.0, 1.0));
        let cmd = ctl.control(&VehicleState::new(0.0, 0.0, 0.0, 5.0), 5.0);
        assert!(cmd.steer.abs() < 1e-12);
        assert!(cmd.accel > 0.0);
        assert!(!cmd.perturb_on);
        assert_eq!(ctl.mode(), RecoveryMode::Normal);
    }

    #[test]
    fn perturbation_window_adds_deltas_after_shaping() {
        let perturbation = Perturbation {
            steer_delta: 0.1,
            acc_delta: -0.5,
            start_t: 0.0,
            duration: 1.0,
            ..Perturbation::none()
        };
        let idm = IdmConfig::new(10.0, 2.0, 1.0);
        let mut ctl = controller(perturbation, idm);
        let state = VehicleState::new(0.0, 0.0, 0.0, 8.0);
        let cmd = ctl.control(&state, 0.0);
        assert!(cmd.perturb_on);
        assert_eq!(ctl.mode(), RecoveryMode::Recovering);
        assert!((cmd.steer - 0.1).abs() < 1e-12);
        // above the recovery speed the base acceleration is capped at -1
        assert!((cmd.accel - (RECOVERY_DECEL - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn large_offset_engages_recovery_and_scales_steer() {
        let mut shaped = controller(Perturbation::none(), IdmConfig::new(10.0, 2.0, 1.0));
        let mut plain_pid = PidController::new(PidConfig::default());
        let state = VehicleState::new(0.0, 1.5, 0.0, 3.0);
        let cmd = shaped.control(&state, 10.0);
        let base = plain_pid.step(1.5, 0.1);
        assert_eq!(shaped.mode(), RecoveryMode::Recovering);
        assert!((cmd.steer - 2.0 * base).abs() < 1e-12);
        // below the recovery speed IDM output is left alone
        assert!(cmd.accel > RECOVERY_DECEL);
    }

    #[test]
    fn missing_lane_means_zero_error() {
        let mut ctl = RecoveryController::new(
            LaneMap::default(),
            PidController::new(PidConfig::default()),
            IdmController::new(IdmConfig::new(10.0, 2.0, 1.0)),
            RecoveryConfig::default(),
            Tolerance::default(),
            Perturbation::none(),
            0.1,
        );
        let cmd = ctl.control(&VehicleState::new(3.0, 4.0, 1.0, 2.0), 5.0);
        assert!(cmd.steer.abs() < f64::EPSILON);
        assert_eq!(ctl.mode(), RecoveryMode::Normal);
    }
}
