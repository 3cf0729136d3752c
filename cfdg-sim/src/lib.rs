//! Counterfactual scenario core
//!
//! Takes a recorded driving scene, injects a seeded control perturbation, rolls
//! the ego vehicle forward under a lane-keeping controller with recovery
//! shaping, and labels the synthetic trajectory. Data access is abstracted
//! behind the collaborator traits below; this crate performs no I/O of its own
//! beyond reading config files.

pub mod config;
pub mod control;
pub mod error;
pub mod geometry;
pub mod label;
pub mod manifest;
pub mod map;
pub mod numbers;
pub mod perturb;
pub mod pipeline;
pub mod recovery;
pub mod scenario;
pub mod sim;
pub mod vehicle;

// Re-export commonly used types
pub use config::{AppConfig, MapConfig, OutputConfig, SampleConfig, TrajectoryFormat, deep_merge};
pub use control::{ControllerConfig, IdmConfig, IdmController, PidConfig, PidController};
pub use error::{CfdgError, ConfigError, Result};
pub use geometry::{LaneErrors, OrientedBox, Point2, lane_errors};
pub use label::{LabelAccumulator, LabelConfig, Labeler, Labels};
pub use manifest::Manifest;
pub use map::{Lane, LaneMap, MapApi, MapProvider};
pub use perturb::{
    PerturbConfig, PerturbKindConfig, Perturbation, PerturbationSampler, PerturbationSummary,
    StepSpec, ValueSpec, scene_seed,
};
pub use pipeline::{SceneMetadata, SceneOutcome, TrajectoryColumns, TrajectoryRow, run_scenario};
pub use recovery::{
    RecoveryConfig, RecoveryController, RecoveryGuards, RecoveryMachine, RecoveryMode, Tolerance,
};
pub use scenario::{AgentState, EgoState, Frame, Scenario};
pub use sim::{ControlCommand, Controller, SimFrame, Simulator};
pub use vehicle::{VehicleParams, VehicleState};

/// Trait for abstracting scene ingestion
/// Dataset-specific implementations should provide this
pub trait ScenarioSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Tokens of every scene the source can load
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be enumerated.
    fn scene_tokens(&self) -> Result<Vec<String>, Self::Error>;

    /// Load one scene by token
    ///
    /// # Errors
    ///
    /// Returns an error if the scene is unknown or cannot be decoded.
    fn load(&self, scene_token: &str) -> Result<Scenario, Self::Error>;
}

/// Trait for abstracting result persistence
pub trait SceneSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist trajectory, labels and metadata of one scene
    ///
    /// # Errors
    ///
    /// Returns an error if nothing could be written.
    fn write_scene(&self, outcome: &SceneOutcome, meta: &SceneMetadata)
    -> Result<(), Self::Error>;
}

/// Per-scene driver wiring the collaborators to the simulation core
pub struct Engine<S, P, K>
where
    S: ScenarioSource,
    P: MapProvider,
    K: SceneSink,
{
    source: S,
    maps: P,
    sink: K,
    cfg: AppConfig,
    fingerprint: String,
}

impl<S, P, K> Engine<S, P, K>
where
    S: ScenarioSource,
    P: MapProvider,
    K: SceneSink,
{
    /// Start assembling an engine around a validated config
    #[must_use]
    pub fn builder(cfg: AppConfig) -> EngineBuilder<S, P, K> {
        EngineBuilder::new(cfg)
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.cfg
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Every scene token the source offers
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be enumerated.
    pub fn scene_tokens(&self) -> Result<Vec<String>> {
        self.source
            .scene_tokens()
            .map_err(|err| CfdgError::collaborator("scenario source", err))
    }

    /// Load, simulate, label and persist one scene
    ///
    /// # Errors
    ///
    /// Returns an error if the scene is invalid or any collaborator fails.
    pub fn run_scene(&self, scene_token: &str) -> Result<SceneOutcome> {
        let scenario = self
            .source
            .load(scene_token)
            .map_err(|err| CfdgError::collaborator("scenario source", err))?;
        scenario.validate()?;
        let map = self
            .maps
            .map_for(&scenario.map_name)
            .map_err(|err| CfdgError::collaborator("map provider", err))?;

        let outcome = run_scenario(&self.cfg, &scenario, &map)?;
        let meta = outcome.metadata(&self.fingerprint);
        self.sink
            .write_scene(&outcome, &meta)
            .map_err(|err| CfdgError::collaborator("scene sink", err))?;

        log::info!(
            "scene {} done (collision={}, off_road={}, recovered={})",
            outcome.scene_token,
            outcome.labels.collision,
            outcome.labels.off_road,
            outcome.labels.is_recovered
        );
        Ok(outcome)
    }
}

/// Collects collaborators; `build` refuses to proceed without all of them.
pub struct EngineBuilder<S, P, K> {
    cfg: AppConfig,
    source: Option<S>,
    maps: Option<P>,
    sink: Option<K>,
}

impl<S, P, K> EngineBuilder<S, P, K>
where
    S: ScenarioSource,
    P: MapProvider,
    K: SceneSink,
{
    #[must_use]
    pub const fn new(cfg: AppConfig) -> Self {
        Self {
            cfg,
            source: None,
            maps: None,
            sink: None,
        }
    }

    #[must_use]
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn maps(mut self, maps: P) -> Self {
        self.maps = Some(maps);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: K) -> Self {
        self.sink = Some(sink);
        self
    }

    /// # Errors
    ///
    /// Returns [`CfdgError::MissingCollaborator`] naming the first absent
    /// collaborator, or a config error if the config is invalid.
    pub fn build(self) -> Result<Engine<S, P, K>> {
        let source = self
            .source
            .ok_or(CfdgError::MissingCollaborator("scenario source"))?;
        let maps = self
            .maps
            .ok_or(CfdgError::MissingCollaborator("map provider"))?;
        let sink = self
            .sink
            .ok_or(CfdgError::MissingCollaborator("scene sink"))?;
        self.cfg.validate()?;
        let fingerprint = self.cfg.fingerprint();
        Ok(Engine {
            source,
            maps,
            sink,
            cfg: self.cfg,
            fingerprint,
        })
    }
}
