//! Dataset-level aggregation of scene labels.
use serde::{Deserialize, Serialize};

use crate::label::Labels;
use crate::numbers::{ratio, usize_to_f64};

/// Running totals across every labelled scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub scenes: usize,
    pub collisions: usize,
    pub off_road: usize,
    pub recovered: usize,
    /// Scenes that produced a finite TTC.
    pub ttc_samples: usize,
    pub ttc_sum: f64,
    pub ttc_min: Option<f64>,
}

impl Manifest {
    pub fn update(&mut self, labels: &Labels) {
        self.scenes += 1;
        self.collisions += usize::from(labels.collision);
        self.off_road += usize::from(labels.off_road);
        self.recovered += usize::from(labels.is_recovered);
        if let Some(ttc) = labels.ttc() {
            self.ttc_samples += 1;
            self.ttc_sum += ttc;
            self.ttc_min = Some(self.ttc_min.map_or(ttc, |min| min.min(ttc)));
        }
    }

    #[must_use]
    pub fn collision_rate(&self) -> f64 {
        ratio(self.collisions, self.scenes)
    }

    #[must_use]
    pub fn off_road_rate(&self) -> f64 {
        ratio(self.off_road, self.scenes)
    }

    #[must_use]
    pub fn recovery_rate(&self) -> f64 {
        ratio(self.recovered, self.scenes)
    }

    #[must_use]
    pub fn mean_ttc(&self) -> Option<f64> {
        (self.ttc_samples > 0).then(|| self.ttc_sum / usize_to_f64(self.ttc_samples))
    }
}

impl<'a> FromIterator<&'a Labels> for Manifest {
    fn from_iter<I: IntoIterator<Item = &'a Labels>>(iter: I) -> Self {
        let mut manifest = Self::default();
        for labels in iter {
            manifest.update(labels);
        }
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(collision: bool, off_road: bool, is_recovered: bool, min_ttc: f64) -> Labels {
        Labels {
            collision,
            off_road,
            is_recovered,
            min_ttc,
        }
    }

    #[test]
    fn empty_manifest_has_zero_rates() {
        let manifest = Manifest::default();
        assert!(manifest.collision_rate().abs() < f64::EPSILON);
        assert!(manifest.mean_ttc().is_none());
        assert!(manifest.ttc_min.is_none());
    }

    #[test]
    fn aggregates_counts_and_ttc() {
        let all = [
            labels(true, false, false, 2.0),
            labels(false, true, true, f64::INFINITY),
            labels(false, false, true, 4.0),
            labels(false, false, false, f64::INFINITY),
        ];
        let manifest: Manifest = all.iter().collect();
        assert_eq!(manifest.scenes, 4);
        assert_eq!(manifest.collisions, 1);
        assert_eq!(manifest.off_road, 1);
        assert_eq!(manifest.recovered, 2);
        assert_eq!(manifest.ttc_samples, 2);
        assert!((manifest.collision_rate() - 0.25).abs() < 1e-12);
        assert!((manifest.recovery_rate() - 0.5).abs() < 1e-12);
        assert!((manifest.mean_ttc().unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(manifest.ttc_min, Some(2.0));
    }
}
