//! Fixed-step rollout loop.
use serde::{Deserialize, Serialize};

use crate::vehicle::{self, VehicleParams, VehicleState};

/// Commands produced by a controller for one step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlCommand {
    pub steer: f64,
    pub accel: f64,
    /// Whether a perturbation contributed to this command.
    pub perturb_on: bool,
}

/// Anything that can steer the ego vehicle step by step.
pub trait Controller {
    fn control(&mut self, state: &VehicleState, t: f64) -> ControlCommand;
}

impl<F> Controller for F
where
    F: FnMut(&VehicleState, f64) -> ControlCommand,
{
    fn control(&mut self, state: &VehicleState, t: f64) -> ControlCommand {
        self(state, t)
    }
}

/// One simulated step: the command issued at `t` and the state it produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimFrame {
    pub t: f64,
    pub state: VehicleState,
    pub cmd_steer: f64,
    pub cmd_accel: f64,
    pub perturb_on: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Simulator {
    params: VehicleParams,
}

impl Simulator {
    #[must_use]
    pub const fn new(params: VehicleParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub const fn params(&self) -> &VehicleParams {
        &self.params
    }

    /// Run exactly `steps` iterations from `t = 0`, advancing by `dt`.
    ///
    /// Frames record the command as issued; the vehicle model clamps it.
    pub fn rollout<C>(
        &self,
        init: VehicleState,
        steps: usize,
        dt: f64,
        controller: &mut C,
    ) -> Vec<SimFrame>
    where
        C: Controller + ?Sized,
    {
        let mut frames = Vec::with_capacity(steps);
        let mut state = init;
        let mut t = 0.0;
        for _ in 0..steps {
            let cmd = controller.control(&state, t);
            state = vehicle::step(&state, cmd.steer, cmd.accel, dt, &self.params);
            frames.push(SimFrame {
                t,
                state,
                cmd_steer: cmd.steer,
                cmd_accel: cmd.accel,
                perturb_on: cmd.perturb_on,
            });
            t += dt;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(_: &VehicleState, _: f64) -> ControlCommand {
        ControlCommand::default()
    }

    #[test]
    fn zero_control_rollout_moves_forward() {
        let sim = Simulator::new(VehicleParams::default());
        let frames = sim.rollout(VehicleState::new(0.0, 0.0, 0.0, 1.0), 5, 0.1, &mut idle);
        assert_eq!(frames.len(), 5);
        assert!(frames.windows(2).all(|w| w[1].state.x > w[0].state.x));
        assert!(frames.windows(2).all(|w| w[1].t > w[0].t));
        assert!(frames[0].t.abs() < f64::EPSILON);
    }

    #[test]
    fn zero_steps_produce_no_frames() {
        let sim = Simulator::new(VehicleParams::default());
        assert!(
            sim.rollout(VehicleState::default(), 0, 0.1, &mut idle)
                .is_empty()
        );
    }

    #[test]
    fn closure_controllers_see_time_and_flag_perturbation() {
        let sim = Simulator::new(VehicleParams::default());
        let mut seen = Vec::new();
        let mut control = |_: &VehicleState, t: f64| {
            seen.push(t);
            ControlCommand {
                steer: 0.0,
                accel: 5.0,
                perturb_on: t > 0.15,
            }
        };
        let frames = sim.rollout(VehicleState::default(), 4, 0.1, &mut control);
        assert_eq!(seen.len(), 4);
        assert_eq!(
            frames.iter().map(|f| f.perturb_on).collect::<Vec<_>>(),
            vec![false, false, true, true]
        );
        // recorded command is unclamped, the integrated speed is not
        assert!((frames[0].cmd_accel - 5.0).abs() < f64::EPSILON);
        assert!((frames[0].state.v - 0.3).abs() < 1e-12);
    }
}
