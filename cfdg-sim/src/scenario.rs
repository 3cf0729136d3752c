//! Ground-truth scene records delivered by the ingestion layer.
use serde::{Deserialize, Serialize};

use crate::error::{CfdgError, Result};
use crate::vehicle::VehicleState;

/// Logged ego state for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EgoState {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub v: f64,
    #[serde(default)]
    pub a: f64,
    #[serde(default)]
    pub steer: f64,
}

impl EgoState {
    /// Pose and speed as a simulation state.
    #[must_use]
    pub const fn vehicle_state(&self) -> VehicleState {
        VehicleState::new(self.x, self.y, self.yaw, self.v)
    }
}

/// One tracked object as observed in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub track_token: String,
    #[serde(default)]
    pub t: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub v: f64,
    /// Non-positive means unknown; the labeler substitutes a default.
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default = "AgentState::default_obj_type")]
    pub obj_type: String,
}

impl AgentState {
    fn default_obj_type() -> String {
        "unknown".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub t: f64,
    pub ego: EgoState,
    #[serde(default)]
    pub agents: Vec<AgentState>,
}

/// A recorded scene: ordered frames on one map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub scene_token: String,
    #[serde(default)]
    pub map_name: String,
    pub frames: Vec<Frame>,
}

impl Scenario {
    /// Reject scenes that cannot seed a rollout.
    ///
    /// # Errors
    ///
    /// Returns [`CfdgError::EmptyScenario`] for zero frames and
    /// [`CfdgError::UnorderedFrames`] when a frame time decreases.
    pub fn validate(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(CfdgError::EmptyScenario {
                scene_token: self.scene_token.clone(),
            });
        }
        for (index, pair) in self.frames.windows(2).enumerate() {
            if pair[1].t < pair[0].t {
                return Err(CfdgError::UnorderedFrames {
                    scene_token: self.scene_token.clone(),
                    index: index + 1,
                    previous: pair[0].t,
                    current: pair[1].t,
                });
            }
        }
        Ok(())
    }

    /// Ego state of the first frame, if any.
    #[must_use]
    pub fn initial_state(&self) -> Option<VehicleState> {
        self.frames.first().map(|frame| frame.ego.vehicle_state())
    }

    /// Spacing of the first two frames when it is positive.
    #[must_use]
    pub fn logged_dt(&self) -> Option<f64> {
        match self.frames.as_slice() {
            [first, second, ..] if second.t - first.t > 0.0 => Some(second.t - first.t),
            _ => None,
        }
    }

    /// Agents of frame `index`; indices past the log yield none.
    #[must_use]
    pub fn agents_at(&self, index: usize) -> &[AgentState] {
        self.frames
            .get(index)
            .map(|frame| frame.agents.as_slice())
            .unwrap_or_default()
    }
}
