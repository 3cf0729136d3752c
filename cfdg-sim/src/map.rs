//! Map queries consumed by the controller and labeler.
use serde::{Deserialize, Serialize};

use crate::geometry::{Point2, polygon_within_union, project_point_to_segment};

/// Lane and drivable-area queries.
///
/// Implementations are expected to answer from memory; a slow backend must be
/// warmed before a rollout starts.
pub trait MapApi {
    /// Centerline of the lane nearest `(x, y)`; empty when no lane is close.
    fn lane_centerline(&self, x: f64, y: f64) -> Vec<Point2>;

    /// Whether the closed polygon lies outside the drivable area.
    fn is_off_road(&self, polygon: &[Point2]) -> bool;
}

impl<M: MapApi + ?Sized> MapApi for &M {
    fn lane_centerline(&self, x: f64, y: f64) -> Vec<Point2> {
        (**self).lane_centerline(x, y)
    }

    fn is_off_road(&self, polygon: &[Point2]) -> bool {
        (**self).is_off_road(polygon)
    }
}

impl<M: MapApi + ?Sized> MapApi for std::sync::Arc<M> {
    fn lane_centerline(&self, x: f64, y: f64) -> Vec<Point2> {
        (**self).lane_centerline(x, y)
    }

    fn is_off_road(&self, polygon: &[Point2]) -> bool {
        (**self).is_off_road(polygon)
    }
}

/// Lookup of a map by name.
pub trait MapProvider {
    type Map: MapApi;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the map a scenario was recorded on.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be located or parsed.
    fn map_for(&self, map_name: &str) -> Result<Self::Map, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    #[serde(default)]
    pub id: String,
    pub centerline: Vec<Point2>,
}

impl Lane {
    fn distance_to(&self, point: Point2) -> f64 {
        match self.centerline.as_slice() {
            [] => f64::INFINITY,
            [only] => point.distance(*only),
            line => line
                .windows(2)
                .map(|seg| project_point_to_segment(point, seg[0], seg[1]).1)
                .fold(f64::INFINITY, f64::min),
        }
    }
}

/// In-memory lane graph with drivable-area polygons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneMap {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lanes: Vec<Lane>,
    #[serde(default)]
    pub drivable_area: Vec<Vec<Point2>>,
    #[serde(default = "LaneMap::default_search_radius")]
    pub search_radius: f64,
}

impl Default for LaneMap {
    fn default() -> Self {
        Self {
            name: String::new(),
            lanes: Vec::new(),
            drivable_area: Vec::new(),
            search_radius: Self::default_search_radius(),
        }
    }
}

impl LaneMap {
    const fn default_search_radius() -> f64 {
        5.0
    }

    /// Parse a map from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a lane map.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_lane(mut self, id: &str, centerline: Vec<Point2>) -> Self {
        self.lanes.push(Lane {
            id: id.to_string(),
            centerline,
        });
        self
    }

    #[must_use]
    pub fn with_drivable_area(mut self, polygon: Vec<Point2>) -> Self {
        self.drivable_area.push(polygon);
        self
    }

    fn nearest_lane(&self, point: Point2) -> Option<&Lane> {
        self.lanes
            .iter()
            .map(|lane| (lane, lane.distance_to(point)))
            .filter(|(_, dist)| *dist <= self.search_radius)
            .fold(None, |best: Option<(&Lane, f64)>, cand| match best {
                Some(b) if b.1 <= cand.1 => Some(b),
                _ => Some(cand),
            })
            .map(|(lane, _)| lane)
    }
}

impl MapApi for LaneMap {
    fn lane_centerline(&self, x: f64, y: f64) -> Vec<Point2> {
        self.nearest_lane(Point2::new(x, y))
            .map(|lane| lane.centerline.clone())
            .unwrap_or_default()
    }

    /// Unknown drivable area counts as on-road; otherwise the union of the
    /// drivable polygons must contain the whole footprint. Touching the edge of
    /// the drivable area is still on-road.
    fn is_off_road(&self, polygon: &[Point2]) -> bool {
        if polygon.is_empty() {
            return true;
        }
        if self.drivable_area.is_empty() {
            return false;
        }
        !polygon_within_union(polygon, &self.drivable_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::OrientedBox;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point2> {
        raw.iter().copied().map(Point2::from).collect()
    }

    fn fixture() -> LaneMap {
        LaneMap::default()
            .with_lane("main", pts(&[(0.0, 0.0), (10.0, 0.0)]))
            .with_lane("side", pts(&[(0.0, 4.0), (10.0, 4.0)]))
            .with_drivable_area(pts(&[(0.0, -2.0), (10.0, -2.0), (10.0, 2.0), (0.0, 2.0)]))
    }

    #[test]
    fn centerline_and_off_road_queries() {
        let map = fixture();
        assert_eq!(map.lane_centerline(1.0, 0.1).len(), 2);

        let on_road = pts(&[(1.0, -0.5), (2.0, -0.5), (2.0, 0.5), (1.0, 0.5)]);
        let off_road = pts(&[(20.0, 20.0), (21.0, 20.0), (21.0, 21.0), (20.0, 21.0)]);
        assert!(!map.is_off_road(&on_road));
        assert!(map.is_off_road(&off_road));
    }

    #[test]
    fn nearest_lane_wins() {
        let map = fixture();
        let line = map.lane_centerline(5.0, 3.5);
        assert!((line[0].y - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn far_queries_find_no_lane() {
        assert!(fixture().lane_centerline(50.0, 50.0).is_empty());
    }

    #[test]
    fn empty_polygon_is_off_road_and_unknown_area_is_not() {
        let map = LaneMap::default();
        assert!(map.is_off_road(&[]));
        assert!(!map.is_off_road(&pts(&[(100.0, 100.0)])));
    }

    #[test]
    fn partially_outside_footprint_is_off_road() {
        let straddling = pts(&[(9.0, -0.5), (11.0, -0.5), (11.0, 0.5), (9.0, 0.5)]);
        assert!(fixture().is_off_road(&straddling));
    }

    #[test]
    fn footprint_crossing_a_notch_is_off_road() {
        let map = LaneMap::default().with_drivable_area(pts(&[
            (0.0, -2.0),
            (20.0, -2.0),
            (20.0, 10.0),
            (16.0, 10.0),
            (16.0, 2.0),
            (0.0, 2.0),
        ]));
        let across = pts(&[(10.0, 0.0), (18.0, 8.0), (19.0, 7.0), (11.0, -1.0)]);
        assert!(map.is_off_road(&across));
    }

    #[test]
    fn ego_filling_its_strip_stays_on_road() {
        let map = LaneMap::default()
            .with_drivable_area(pts(&[(-10.0, -1.0), (10.0, -1.0), (10.0, 1.0), (-10.0, 1.0)]));
        let ego = OrientedBox::new(0.0, 0.0, 0.0, 4.8, 2.0);
        assert!(!map.is_off_road(ego.corners()));
        let nudged = OrientedBox::new(0.0, 0.05, 0.0, 4.8, 2.0);
        assert!(map.is_off_road(nudged.corners()));
    }

    #[test]
    fn parses_from_json_with_default_radius() {
        let map = LaneMap::from_json(
            r#"{"name": "town", "lanes": [{"centerline": [{"x": 0, "y": 0}, {"x": 1, "y": 0}]}]}"#,
        )
        .unwrap();
        assert_eq!(map.name, "town");
        assert!((map.search_radius - 5.0).abs() < f64::EPSILON);
        assert!(!map.lane_centerline(0.5, 0.0).is_empty());
    }
}
