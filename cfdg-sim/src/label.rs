//! Safety labels for a simulated rollout.
use serde::{Deserialize, Serialize};

use crate::geometry::{OrientedBox, lane_errors};
use crate::map::MapApi;
use crate::recovery::Tolerance;
use crate::scenario::{AgentState, Scenario};
use crate::sim::SimFrame;

/// Closing speed below which no TTC sample is taken.
const MIN_CLOSING_SPEED: f64 = 0.1;

/// The `label` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "LabelConfig::default_ego_length")]
    pub ego_length: f64,
    #[serde(default = "LabelConfig::default_ego_width")]
    pub ego_width: f64,
    /// Substituted when an agent reports a non-positive length.
    #[serde(default = "LabelConfig::default_agent_length")]
    pub agent_length: f64,
    /// Substituted when an agent reports a non-positive width.
    #[serde(default = "LabelConfig::default_agent_width")]
    pub agent_width: f64,
    #[serde(default = "LabelConfig::default_recover_time")]
    pub recover_time: f64,
    #[serde(flatten)]
    pub tolerance: Tolerance,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            ego_length: Self::default_ego_length(),
            ego_width: Self::default_ego_width(),
            agent_length: Self::default_agent_length(),
            agent_width: Self::default_agent_width(),
            recover_time: Self::default_recover_time(),
            tolerance: Tolerance::default(),
        }
    }
}

impl LabelConfig {
    const fn default_ego_length() -> f64 {
        4.8
    }

    const fn default_ego_width() -> f64 {
        2.0
    }

    const fn default_agent_length() -> f64 {
        4.8
    }

    const fn default_agent_width() -> f64 {
        2.0
    }

    const fn default_recover_time() -> f64 {
        3.0
    }

    fn agent_box(&self, agent: &AgentState) -> OrientedBox {
        let length = if agent.length > 0.0 {
            agent.length
        } else {
            self.agent_length
        };
        let width = if agent.width > 0.0 {
            agent.width
        } else {
            self.agent_width
        };
        OrientedBox::new(agent.x, agent.y, agent.yaw, length, width)
    }
}

/// Outcome labels of one rollout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Labels {
    pub collision: bool,
    pub off_road: bool,
    pub is_recovered: bool,
    /// `+∞` when no closing agent was observed; written as `null`.
    #[serde(with = "ttc_serde")]
    pub min_ttc: f64,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            collision: false,
            off_road: false,
            is_recovered: false,
            min_ttc: f64::INFINITY,
        }
    }
}

impl Labels {
    /// Finite TTC, if any sample was taken.
    #[must_use]
    pub fn ttc(&self) -> Option<f64> {
        self.min_ttc.is_finite().then_some(self.min_ttc)
    }
}

mod ttc_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(ttc: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ttc.is_finite().then_some(*ttc).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ttc = Option::<f64>::deserialize(deserializer)?;
        Ok(ttc.unwrap_or(f64::INFINITY))
    }
}

/// Running state of the label fold. Every flag is sticky.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LabelAccumulator {
    labels: Labels,
}

impl LabelAccumulator {
    #[must_use]
    pub const fn labels(&self) -> Labels {
        self.labels
    }

    #[must_use]
    pub const fn with_off_road(mut self, off_road: bool) -> Self {
        self.labels.off_road |= off_road;
        self
    }

    #[must_use]
    pub const fn with_collision(mut self, collision: bool) -> Self {
        self.labels.collision |= collision;
        self
    }

    #[must_use]
    pub const fn with_recovered(mut self, recovered: bool) -> Self {
        self.labels.is_recovered |= recovered;
        self
    }

    #[must_use]
    pub fn with_ttc(mut self, ttc: f64) -> Self {
        self.labels.min_ttc = self.labels.min_ttc.min(ttc);
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Labeler {
    cfg: LabelConfig,
}

impl Labeler {
    #[must_use]
    pub const fn new(cfg: LabelConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub const fn config(&self) -> &LabelConfig {
        &self.cfg
    }

    /// Label `frames` against the logged agents of `scenario`, frame by index.
    ///
    /// Simulated frames past the end of the log see no agents.
    pub fn compute<M>(&self, frames: &[SimFrame], scenario: &Scenario, map: &M) -> Labels
    where
        M: MapApi + ?Sized,
    {
        frames
            .iter()
            .enumerate()
            .fold(LabelAccumulator::default(), |acc, (index, frame)| {
                self.absorb(acc, frame, scenario.agents_at(index), map)
            })
            .labels()
    }

    fn absorb<M>(
        &self,
        acc: LabelAccumulator,
        frame: &SimFrame,
        agents: &[AgentState],
        map: &M,
    ) -> LabelAccumulator
    where
        M: MapApi + ?Sized,
    {
        let ego = &frame.state;
        let ego_box = OrientedBox::new(
            ego.x,
            ego.y,
            ego.yaw,
            self.cfg.ego_length,
            self.cfg.ego_width,
        );
        let mut acc = acc.with_off_road(map.is_off_road(ego_box.corners()));

        for agent in agents {
            acc = acc.with_collision(ego_box.intersects(&self.cfg.agent_box(agent)));
            let closing = ego.v - agent.v;
            if closing > MIN_CLOSING_SPEED {
                let dist = (agent.x - ego.x).hypot(agent.y - ego.y);
                acc = acc.with_ttc(dist / closing);
            }
        }

        if frame.t >= self.cfg.recover_time {
            let centerline = map.lane_centerline(ego.x, ego.y);
            let errors = lane_errors(&centerline, ego.x, ego.y, ego.yaw);
            acc = acc.with_recovered(self.cfg.tolerance.admits(&errors));
        }
        acc
    }
}
