//! One scene end to end: sample, roll out, label.
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::control::{IdmController, PidController};
use crate::error::{CfdgError, Result};
use crate::label::{Labeler, Labels};
use crate::map::MapApi;
use crate::perturb::{Perturbation, PerturbationSampler, PerturbationSummary};
use crate::recovery::RecoveryController;
use crate::scenario::Scenario;
use crate::sim::{SimFrame, Simulator};

/// Everything produced for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneOutcome {
    pub scene_token: String,
    pub map_name: String,
    pub dt: f64,
    pub perturbation: Perturbation,
    pub frames: Vec<SimFrame>,
    pub labels: Labels,
}

/// Flat trajectory record as written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub v: f64,
    pub cmd_steer: f64,
    pub cmd_accel: f64,
    pub perturb_on: bool,
}

impl From<&SimFrame> for TrajectoryRow {
    fn from(frame: &SimFrame) -> Self {
        Self {
            t: frame.t,
            x: frame.state.x,
            y: frame.state.y,
            yaw: frame.state.yaw,
            v: frame.state.v,
            cmd_steer: frame.cmd_steer,
            cmd_accel: frame.cmd_accel,
            perturb_on: frame.perturb_on,
        }
    }
}

/// Column-oriented trajectory: one vector per field, equal lengths.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryColumns {
    pub t: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub yaw: Vec<f64>,
    pub v: Vec<f64>,
    pub cmd_steer: Vec<f64>,
    pub cmd_accel: Vec<f64>,
    pub perturb_on: Vec<bool>,
}

impl TrajectoryColumns {
    #[must_use]
    pub fn len(&self) -> usize {
        self.t.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Whether every column holds the same number of entries.
    #[must_use]
    pub fn is_rectangular(&self) -> bool {
        let n = self.t.len();
        [
            self.x.len(),
            self.y.len(),
            self.yaw.len(),
            self.v.len(),
            self.cmd_steer.len(),
            self.cmd_accel.len(),
            self.perturb_on.len(),
        ]
        .iter()
        .all(|len| *len == n)
    }

    fn push(&mut self, row: TrajectoryRow) {
        self.t.push(row.t);
        self.x.push(row.x);
        self.y.push(row.y);
        self.yaw.push(row.yaw);
        self.v.push(row.v);
        self.cmd_steer.push(row.cmd_steer);
        self.cmd_accel.push(row.cmd_accel);
        self.perturb_on.push(row.perturb_on);
    }
}

impl FromIterator<TrajectoryRow> for TrajectoryColumns {
    fn from_iter<I: IntoIterator<Item = TrajectoryRow>>(iter: I) -> Self {
        let mut columns = Self::default();
        for row in iter {
            columns.push(row);
        }
        columns
    }
}

/// Per-scene metadata written beside the trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub scene_token: String,
    pub map_name: String,
    pub perturbation: PerturbationSummary,
    pub dt: f64,
    pub config_fingerprint: String,
}

impl SceneOutcome {
    #[must_use]
    pub fn trajectory_rows(&self) -> Vec<TrajectoryRow> {
        self.frames.iter().map(TrajectoryRow::from).collect()
    }

    #[must_use]
    pub fn trajectory_columns(&self) -> TrajectoryColumns {
        self.frames.iter().map(TrajectoryRow::from).collect()
    }

    #[must_use]
    pub fn metadata(&self, config_fingerprint: &str) -> SceneMetadata {
        SceneMetadata {
            scene_token: self.scene_token.clone(),
            map_name: self.map_name.clone(),
            perturbation: PerturbationSummary::from(&self.perturbation),
            dt: self.dt,
            config_fingerprint: config_fingerprint.to_string(),
        }
    }
}

/// Run one scenario against `map` with a fresh controller and sampler.
///
/// The rollout covers as many steps as the log has frames and starts from the
/// first logged ego pose.
///
/// # Errors
///
/// Returns an error when the scenario has no frames or goes back in time.
pub fn run_scenario<M>(cfg: &AppConfig, scenario: &Scenario, map: &M) -> Result<SceneOutcome>
where
    M: MapApi + ?Sized,
{
    scenario.validate()?;
    let init = scenario
        .initial_state()
        .ok_or_else(|| CfdgError::EmptyScenario {
            scene_token: scenario.scene_token.clone(),
        })?;
    let dt = cfg.resolve_dt(scenario);

    let sampler = PerturbationSampler::new(cfg.perturb.clone(), cfg.seed, cfg.sample.dt);
    let perturbation = sampler.sample(&scenario.scene_token);

    let mut controller = RecoveryController::new(
        map,
        PidController::new(cfg.controller.pid),
        IdmController::new(cfg.controller.idm),
        cfg.recover,
        cfg.label.tolerance,
        perturbation.clone(),
        dt,
    );
    let frames = Simulator::new(cfg.vehicle).rollout(
        init,
        scenario.frames.len(),
        dt,
        &mut controller,
    );
    let labels = Labeler::new(cfg.label).compute(&frames, scenario, map);

    log::debug!(
        "scene {} rolled out {} frames at dt={dt}",
        scenario.scene_token,
        frames.len()
    );
    Ok(SceneOutcome {
        scene_token: scenario.scene_token.clone(),
        map_name: scenario.map_name.clone(),
        dt,
        perturbation,
        frames,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;
    use crate::map::LaneMap;
    use crate::scenario::{EgoState, Frame};
    use serde_json::json;

    fn straight_scene(token: &str, frames: usize) -> Scenario {
        Scenario {
            scene_token: token.to_string(),
            map_name: "straight".to_string(),
            frames: (0..frames)
                .map(|i| {
                    let t = 0.1 * i as f64;
                    Frame {
                        t,
                        ego: EgoState {
                            t,
                            x: 5.0 * t,
                            v: 5.0,
                            ..EgoState::default()
                        },
                        agents: Vec::new(),
                    }
                })
                .collect(),
        }
    }

    fn straight_map() -> LaneMap {
        LaneMap::default().with_lane(
            "main",
            vec![Point2::new(-10.0, 0.0), Point2::new(200.0, 0.0)],
        )
    }

    #[test]
    fn rollout_matches_log_length_and_is_deterministic() {
        let cfg = AppConfig::load_from_static();
        let scene = straight_scene("scene-abc", 40);
        let first = run_scenario(&cfg, &scene, &straight_map()).unwrap();
        let second = run_scenario(&cfg, &scene, &straight_map()).unwrap();
        assert_eq!(first.frames.len(), 40);
        assert!((first.dt - 0.1).abs() < 1e-12);
        assert_eq!(first, second);
        assert!(first.frames.iter().any(|f| f.perturb_on));
    }

    #[test]
    fn empty_scene_fails_before_simulation() {
        let cfg = AppConfig::load_from_static();
        let err = run_scenario(&cfg, &straight_scene("none", 0), &straight_map()).unwrap_err();
        assert!(matches!(err, CfdgError::EmptyScenario { .. }));
    }

    #[test]
    fn unperturbed_scene_on_lane_recovers() {
        let cfg = AppConfig::from_values(vec![json!({"perturb": {"types": ["calm"]}})]).unwrap();
        let outcome = run_scenario(&cfg, &straight_scene("calm", 50), &straight_map()).unwrap();
        assert_eq!(outcome.perturbation.kind, "calm");
        assert!(outcome.frames.iter().all(|f| !f.perturb_on || f.cmd_steer.abs() < 1e-12));
        assert!(outcome.labels.is_recovered);
        assert!(!outcome.labels.collision);
    }

    #[test]
    fn row_and_column_views_agree() {
        let cfg = AppConfig::load_from_static();
        let outcome = run_scenario(&cfg, &straight_scene("views", 12), &straight_map()).unwrap();
        let rows = outcome.trajectory_rows();
        let columns = outcome.trajectory_columns();
        assert_eq!(rows.len(), 12);
        assert_eq!(columns.len(), 12);
        assert!(columns.is_rectangular());
        assert!((columns.x[7] - rows[7].x).abs() < f64::EPSILON);
        assert_eq!(columns.perturb_on[3], rows[3].perturb_on);

        let meta = outcome.metadata(&cfg.fingerprint());
        assert_eq!(meta.scene_token, "views");
        assert_eq!(meta.perturbation.kind, outcome.perturbation.kind);
        assert_eq!(meta.config_fingerprint.len(), 16);
    }
}
