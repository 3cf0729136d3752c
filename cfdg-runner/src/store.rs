//! File-system collaborators: scene directory, map directory and output tree.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use cfdg_sim::{
    LaneMap, MapProvider, Scenario, SceneMetadata, SceneOutcome, SceneSink, ScenarioSource,
    TrajectoryColumns, TrajectoryFormat,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("directory {} does not exist", .0.display())]
    MissingDir(PathBuf),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("trajectory columns have unequal lengths")]
    RaggedColumns,
}

fn existing_dir(path: &Path) -> Result<PathBuf, StoreError> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(StoreError::MissingDir(path.to_path_buf()))
    }
}

fn read_json<T>(path: &Path) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T>(path: &Path, value: &T, pretty: bool) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let encoded = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, encoded).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// One `<scene_token>.json` file per scene.
#[derive(Debug, Clone)]
pub struct DirScenarioSource {
    root: PathBuf,
}

impl DirScenarioSource {
    pub fn new(root: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            root: existing_dir(root)?,
        })
    }

    fn scene_path(&self, scene_token: &str) -> PathBuf {
        self.root.join(format!("{scene_token}.json"))
    }
}

impl ScenarioSource for DirScenarioSource {
    type Error = StoreError;

    fn scene_tokens(&self) -> Result<Vec<String>, Self::Error> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut tokens: Vec<String> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .collect();
        tokens.sort();
        Ok(tokens)
    }

    fn load(&self, scene_token: &str) -> Result<Scenario, Self::Error> {
        let mut scenario: Scenario = read_json(&self.scene_path(scene_token))?;
        if scenario.scene_token.is_empty() {
            scenario.scene_token = scene_token.to_string();
        }
        Ok(scenario)
    }
}

/// `<root>/<map_name>.json` lane maps, parsed once and shared.
#[derive(Debug)]
pub struct DirMapProvider {
    root: PathBuf,
    search_radius: f64,
    cache: RwLock<HashMap<String, Arc<LaneMap>>>,
}

impl DirMapProvider {
    pub fn new(root: &Path, search_radius: f64) -> Result<Self, StoreError> {
        Ok(Self {
            root: existing_dir(root)?,
            search_radius,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn cached(&self, map_name: &str) -> Option<Arc<LaneMap>> {
        self.cache.read().ok()?.get(map_name).cloned()
    }
}

impl MapProvider for DirMapProvider {
    type Map = Arc<LaneMap>;
    type Error = StoreError;

    fn map_for(&self, map_name: &str) -> Result<Self::Map, Self::Error> {
        if let Some(map) = self.cached(map_name) {
            return Ok(map);
        }
        let mut map: LaneMap = read_json(&self.root.join(format!("{map_name}.json")))?;
        map.search_radius = self.search_radius;
        if map.name.is_empty() {
            map.name = map_name.to_string();
        }
        log::debug!(
            "loaded map {map_name} ({} lanes, {} drivable polygons)",
            map.lanes.len(),
            map.drivable_area.len()
        );
        let map = Arc::new(map);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(map_name.to_string(), Arc::clone(&map));
        }
        Ok(map)
    }
}

pub const META_FILE: &str = "meta.json";
pub const LABELS_FILE: &str = "labels.json";
pub const COLUMNS_FILE: &str = "trajectory.columns.json";
pub const ROWS_FILE: &str = "trajectory.json";

/// Writes `<root>/scenes/<token>/` for every finished scene.
#[derive(Debug, Clone)]
pub struct FsSceneWriter {
    root: PathBuf,
    format: TrajectoryFormat,
}

impl FsSceneWriter {
    pub fn new(root: &Path, format: TrajectoryFormat) -> Result<Self, StoreError> {
        fs::create_dir_all(root).map_err(|source| StoreError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            format,
        })
    }

    #[must_use]
    pub fn scene_dir(&self, scene_token: &str) -> PathBuf {
        self.root.join("scenes").join(scene_token)
    }

    fn write_columns(dir: &Path, columns: &TrajectoryColumns) -> Result<(), StoreError> {
        if !columns.is_rectangular() {
            return Err(StoreError::RaggedColumns);
        }
        write_json(&dir.join(COLUMNS_FILE), columns, false)
    }

    fn write_trajectory(&self, dir: &Path, outcome: &SceneOutcome) -> Result<(), StoreError> {
        if self.format == TrajectoryFormat::Columnar {
            match Self::write_columns(dir, &outcome.trajectory_columns()) {
                Ok(()) => return Ok(()),
                Err(err) => log::warn!(
                    "columnar trajectory for {} failed ({err}); writing rows instead",
                    outcome.scene_token
                ),
            }
        }
        write_json(&dir.join(ROWS_FILE), &outcome.trajectory_rows(), false)
    }
}

impl SceneSink for FsSceneWriter {
    type Error = StoreError;

    fn write_scene(&self, outcome: &SceneOutcome, meta: &SceneMetadata) -> Result<(), Self::Error> {
        let dir = self.scene_dir(&outcome.scene_token);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        write_json(&dir.join(META_FILE), meta, true)?;
        write_json(&dir.join(LABELS_FILE), &outcome.labels, true)?;
        self.write_trajectory(&dir, outcome)
    }
}
