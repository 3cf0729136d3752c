//! Layered pipeline configuration.
//!
//! The bundled defaults are the base layer; every JSON document passed in is
//! deep-merged on top of it, later layers winning, before the result is typed
//! and validated.
use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use twox_hash::XxHash64;

use crate::control::ControllerConfig;
use crate::error::{ConfigError, Result};
use crate::label::LabelConfig;
use crate::perturb::PerturbConfig;
use crate::recovery::RecoveryConfig;
use crate::scenario::Scenario;
use crate::vehicle::VehicleParams;

const DEFAULT_CONFIG_DATA: &str = include_str!("../assets/default_config.json");

/// Step used when neither the config nor the log provides one.
pub const FALLBACK_DT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Simulation step; the logged frame spacing is used when unset.
    #[serde(default)]
    pub dt: Option<f64>,
}

/// Encoding of the written trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryFormat {
    #[default]
    Columnar,
    Rows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub trajectory_format: TrajectoryFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "MapConfig::default_search_radius")]
    pub search_radius: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            search_radius: Self::default_search_radius(),
        }
    }
}

impl MapConfig {
    const fn default_search_radius() -> f64 {
        5.0
    }
}

/// Every recognised option, grouped by section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub sample: SampleConfig,
    #[serde(default)]
    pub vehicle: VehicleParams,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub recover: RecoveryConfig,
    #[serde(default)]
    pub perturb: PerturbConfig,
    #[serde(default)]
    pub label: LabelConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub map: MapConfig,
}

impl AppConfig {
    /// The bundled defaults, untyped, for use as a merge base.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled document is not valid JSON.
    pub fn default_layer() -> Result<Value> {
        Ok(serde_json::from_str(DEFAULT_CONFIG_DATA)?)
    }

    /// The bundled defaults, typed.
    #[must_use]
    pub fn load_from_static() -> Self {
        serde_json::from_str(DEFAULT_CONFIG_DATA).unwrap_or_default()
    }

    /// Merge `layers` over the bundled defaults and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged document does not deserialize or breaks
    /// an invariant.
    pub fn from_values<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut merged = Self::default_layer()?;
        for layer in layers {
            deep_merge(&mut merged, layer);
        }
        let cfg: Self = serde_json::from_value(merged)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read JSON files in order and merge them over the bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if the merged
    /// config is invalid.
    pub fn from_files<P>(paths: &[P]) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut layers = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            log::debug!("loading config layer {}", path.display());
            let raw = std::fs::read_to_string(path)?;
            layers.push(serde_json::from_str::<Value>(&raw)?);
        }
        Self::from_values(layers)
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the invariants the simulation relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vehicle.validate()?;
        if let Some(dt) = self.sample.dt {
            positive("sample.dt", dt)?;
        }

        let idm = &self.controller.idm;
        at_least("controller.idm.min_gap", 0.0, idm.min_gap)?;
        at_least("controller.idm.time_headway", 0.0, idm.time_headway)?;
        positive("controller.idm.delta", idm.delta)?;

        let recover = &self.recover;
        at_least("recover.cte_threshold", 0.0, recover.cte_threshold)?;
        within("recover.yaw_threshold", 0.0, PI, recover.yaw_threshold)?;
        at_least("recover.window_sec", 0.0, recover.window_sec)?;
        if recover.min_frames == 0 {
            return Err(ConfigError::MinViolation {
                field: "recover.min_frames",
                min: 1.0,
                value: 0.0,
            });
        }

        let label = &self.label;
        positive("label.ego_length", label.ego_length)?;
        positive("label.ego_width", label.ego_width)?;
        positive("label.agent_length", label.agent_length)?;
        positive("label.agent_width", label.agent_width)?;
        at_least("label.eps_cte", 0.0, label.tolerance.eps_cte)?;
        within("label.eps_yaw", 0.0, PI, label.tolerance.eps_yaw)?;

        positive("map.search_radius", self.map.search_radius)?;
        self.perturb.validate()
    }

    /// Step for `scenario`: configured, else the logged spacing, else
    /// [`FALLBACK_DT`].
    #[must_use]
    pub fn resolve_dt(&self, scenario: &Scenario) -> f64 {
        self.sample
            .dt
            .filter(|dt| *dt > 0.0)
            .or_else(|| scenario.logged_dt())
            .unwrap_or(FALLBACK_DT)
    }

    /// Stable hex digest of the effective config, stored with every scene.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:016x}", XxHash64::oneshot(0, &bytes))
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other value replaces what was there.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn at_least(field: &'static str, min: f64, value: f64) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::MinViolation { field, min, value })
    }
}

fn within(field: &'static str, min: f64, max: f64, value: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RangeViolation {
            field,
            min,
            max,
            value,
        })
    }
}
