//! Seeded, per-scene perturbation sampling.
//!
//! Every draw for a scene comes from one ChaCha stream keyed by the SHA-256
//! digest of the scene token, so a `(scene_token, seed, config)` triple always
//! yields the same perturbation on every platform.
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::numbers::steps_to_seconds;

/// Kind used when the config lists no perturbation types.
pub const DEFAULT_KIND: &str = "impulse";

/// One counterfactual control disturbance, active over `[start_t, start_t + duration]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    pub kind: String,
    pub steer_delta: f64,
    pub acc_delta: f64,
    pub start_t: f64,
    pub duration: f64,
    /// Sampled and recorded but not applied by the controller.
    #[serde(default)]
    pub lateral_offset: f64,
}

impl Perturbation {
    /// A perturbation that never changes the commands.
    #[must_use]
    pub fn none() -> Self {
        Self {
            kind: DEFAULT_KIND.to_string(),
            steer_delta: 0.0,
            acc_delta: 0.0,
            start_t: 0.0,
            duration: 0.0,
            lateral_offset: 0.0,
        }
    }

    #[must_use]
    pub fn end_t(&self) -> f64 {
        self.start_t + self.duration
    }

    /// Inclusive on both ends.
    #[must_use]
    pub fn is_active(&self, t: f64) -> bool {
        self.start_t <= t && t <= self.end_t()
    }
}

/// Compact description stored with scene metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationSummary {
    pub kind: String,
    pub steer_delta: f64,
    pub acc_delta: f64,
    pub start_t: f64,
    pub duration: f64,
}

impl From<&Perturbation> for PerturbationSummary {
    fn from(p: &Perturbation) -> Self {
        Self {
            kind: p.kind.clone(),
            steer_delta: p.steer_delta,
            acc_delta: p.acc_delta,
            start_t: p.start_t,
            duration: p.duration,
        }
    }
}

/// A fixed value or a `[low, high]` range drawn uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Fixed(f64),
    Range([f64; 2]),
}

impl ValueSpec {
    fn draw<R: Rng>(self, rng: &mut R) -> f64 {
        match self {
            Self::Fixed(value) => value,
            Self::Range([low, high]) => low + (high - low) * rng.r#gen::<f64>(),
        }
    }

    fn bounds(self) -> (f64, f64) {
        match self {
            Self::Fixed(value) => (value, value),
            Self::Range([low, high]) => (low, high),
        }
    }
}

/// A fixed step count or an inclusive `[low, high]` integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSpec {
    Fixed(i64),
    Range([i64; 2]),
}

impl StepSpec {
    fn draw<R: Rng>(self, rng: &mut R) -> i64 {
        match self {
            Self::Fixed(value) => value,
            Self::Range([low, high]) => rng.gen_range(low.min(high)..=low.max(high)),
        }
    }
}

fn draw_or_zero<R: Rng>(value: Option<ValueSpec>, rng: &mut R) -> f64 {
    value.map_or(0.0, |value| value.draw(rng))
}

/// Per-kind sampling settings. Absent fields sample as zero and consume no draws.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerturbKindConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steer_delta: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acc_delta: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lateral_offset: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_t: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_t_range: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_steps: Option<StepSpec>,
}

impl PerturbKindConfig {
    fn validate(&self, kind: &str) -> Result<(), ConfigError> {
        let ranged = [
            ("steer_delta", self.steer_delta),
            ("acc_delta", self.acc_delta),
            ("lateral_offset", self.lateral_offset),
            ("start_t", self.start_t),
            ("start_t_range", self.start_t_range),
            ("duration_sec", self.duration_sec),
        ];
        for (name, value) in ranged {
            let Some((low, high)) = value.map(ValueSpec::bounds) else {
                continue;
            };
            if low > high {
                return Err(ConfigError::BoundsInverted {
                    field: format!("perturb.{kind}.{name}"),
                    low,
                    high,
                });
            }
        }
        if let Some((low, _)) = self.duration_sec.map(ValueSpec::bounds)
            && low < 0.0
        {
            return Err(ConfigError::MinViolation {
                field: "perturb.duration_sec",
                min: 0.0,
                value: low,
            });
        }
        Ok(())
    }
}

/// The `perturb` config section: candidate kinds plus one table per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbConfig {
    #[serde(default = "PerturbConfig::default_types")]
    pub types: Vec<String>,
    #[serde(flatten)]
    pub kinds: BTreeMap<String, PerturbKindConfig>,
}

impl Default for PerturbConfig {
    fn default() -> Self {
        Self {
            types: Self::default_types(),
            kinds: BTreeMap::new(),
        }
    }
}

impl PerturbConfig {
    fn default_types() -> Vec<String> {
        vec![DEFAULT_KIND.to_string()]
    }

    #[must_use]
    pub fn with_kind(mut self, kind: &str, cfg: PerturbKindConfig) -> Self {
        self.kinds.insert(kind.to_string(), cfg);
        self
    }

    /// Check every kind table for inverted ranges and negative durations.
    ///
    /// # Errors
    ///
    /// Returns the first invalid range found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kinds
            .iter()
            .try_for_each(|(kind, cfg)| cfg.validate(kind))
    }
}

/// Fold a scene token and the global seed into the generator seed.
///
/// The first eight digest bytes are read big-endian, XORed with the global
/// seed and truncated to 32 bits.
#[must_use]
pub fn scene_seed(scene_token: &str, global_seed: u64) -> u64 {
    let digest = Sha256::digest(scene_token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) ^ global_seed) & 0xFFFF_FFFF
}

/// Deterministic generator of one perturbation per scene.
#[derive(Debug, Clone)]
pub struct PerturbationSampler {
    cfg: PerturbConfig,
    seed: u64,
    dt: Option<f64>,
}

impl PerturbationSampler {
    /// `dt` converts `duration_steps` into seconds; `None` reads steps as seconds.
    #[must_use]
    pub fn new(cfg: PerturbConfig, seed: u64, dt: Option<f64>) -> Self {
        Self {
            cfg,
            seed,
            dt: dt.filter(|dt| *dt > 0.0),
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn sample(&self, scene_token: &str) -> Perturbation {
        let mut rng = ChaCha8Rng::seed_from_u64(scene_seed(scene_token, self.seed));

        let kind = if self.cfg.types.is_empty() {
            DEFAULT_KIND.to_string()
        } else {
            let idx = rng.gen_range(0..self.cfg.types.len());
            self.cfg.types[idx].clone()
        };
        let sub = self.cfg.kinds.get(&kind).copied().unwrap_or_default();

        let steer_delta = draw_or_zero(sub.steer_delta, &mut rng);
        let acc_delta = draw_or_zero(sub.acc_delta, &mut rng);
        let lateral_offset = draw_or_zero(sub.lateral_offset, &mut rng);

        let mut start_t = draw_or_zero(sub.start_t, &mut rng);
        if start_t == 0.0 {
            start_t = draw_or_zero(sub.start_t_range, &mut rng);
        }

        let mut duration = draw_or_zero(sub.duration_sec, &mut rng);
        if duration == 0.0 {
            let steps = sub.duration_steps.map_or(0, |value| value.draw(&mut rng));
            if steps > 0 {
                duration = steps_to_seconds(steps, self.dt);
            }
        }

        let perturbation = Perturbation {
            kind,
            steer_delta,
            acc_delta,
            start_t,
            duration: duration.max(0.0),
            lateral_offset,
        };
        log::debug!("sampled perturbation for {scene_token}: {perturbation:?}");
        perturbation
    }
}
