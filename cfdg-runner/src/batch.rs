//! Parallel execution of many scenes.
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cfdg_sim::{Engine, Labels, Manifest, MapProvider, SceneSink, ScenarioSource};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of one scene as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneReport {
    pub scene_token: String,
    pub passed: bool,
    pub frames: usize,
    pub perturbation: Option<String>,
    pub labels: Option<Labels>,
    pub error: Option<String>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Run every token on a dedicated pool of `jobs` threads (0 = one per core).
///
/// Failures are captured per scene and never stop the rest of the batch.
pub fn run_batch<S, P, K>(
    engine: &Engine<S, P, K>,
    tokens: &[String],
    jobs: usize,
) -> Result<Vec<SceneReport>>
where
    S: ScenarioSource + Sync,
    P: MapProvider + Sync,
    K: SceneSink + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("failed to build worker pool")?;
    Ok(pool.install(|| {
        tokens
            .par_iter()
            .map(|token| run_one(engine, token))
            .collect()
    }))
}

fn run_one<S, P, K>(engine: &Engine<S, P, K>, token: &str) -> SceneReport
where
    S: ScenarioSource,
    P: MapProvider,
    K: SceneSink,
{
    let started = Instant::now();
    match engine.run_scene(token) {
        Ok(outcome) => SceneReport {
            scene_token: token.to_string(),
            passed: true,
            frames: outcome.frames.len(),
            perturbation: Some(outcome.perturbation.kind),
            labels: Some(outcome.labels),
            error: None,
            duration: started.elapsed(),
        },
        Err(err) => {
            log::warn!("scene {token} failed: {err}");
            SceneReport {
                scene_token: token.to_string(),
                passed: false,
                frames: 0,
                perturbation: None,
                labels: None,
                error: Some(err.to_string()),
                duration: started.elapsed(),
            }
        }
    }
}

/// Aggregate labels of the scenes that completed.
#[must_use]
pub fn manifest_of(reports: &[SceneReport]) -> Manifest {
    reports.iter().filter_map(|r| r.labels.as_ref()).collect()
}
