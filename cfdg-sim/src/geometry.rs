//! Planar geometry: segment projection, lane tracking errors and oriented footprints.
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// A point in the map frame, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Closest point on segment `p0 -> p1` and the distance to it.
///
/// A zero-length segment projects onto its start.
#[must_use]
pub fn project_point_to_segment(point: Point2, p0: Point2, p1: Point2) -> (Point2, f64) {
    let dx = p1.x - p0.x;
    let dy = p1.y - p0.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (p0, point.distance(p0));
    }
    let t = (((point.x - p0.x) * dx + (point.y - p0.y) * dy) / len_sq).clamp(0.0, 1.0);
    let proj = Point2::new(p0.x + t * dx, p0.y + t * dy);
    (proj, point.distance(proj))
}

/// Signed lateral offset and heading error of a pose against a reference path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LaneErrors {
    /// Positive when the pose lies left of the segment direction.
    pub cte: f64,
    /// Segment heading minus pose yaw, wrapped to `(-π, π]`.
    pub heading_err: f64,
}

impl LaneErrors {
    /// Both errors are inside the given tolerances.
    #[must_use]
    pub fn within(&self, eps_cte: f64, eps_yaw: f64) -> bool {
        self.cte.abs() <= eps_cte && self.heading_err.abs() <= eps_yaw
    }
}

/// Errors of pose `(x, y, yaw)` against the closest segment of `centerline`.
///
/// Fewer than two points means there is no reference and both errors are zero.
#[must_use]
pub fn lane_errors(centerline: &[Point2], x: f64, y: f64, yaw: f64) -> LaneErrors {
    let pose = Point2::new(x, y);
    let best = centerline
        .windows(2)
        .map(|seg| (seg[0], seg[1], project_point_to_segment(pose, seg[0], seg[1]).1))
        .fold(None, |best: Option<(Point2, Point2, f64)>, cand| match best {
            Some(b) if b.2 <= cand.2 => Some(b),
            _ => Some(cand),
        });
    let Some((p0, p1, dist)) = best else {
        return LaneErrors::default();
    };

    let sx = p1.x - p0.x;
    let sy = p1.y - p0.y;
    let heading_err = wrap_angle(sy.atan2(sx) - yaw);
    let cross = sx * (y - p0.y) - sy * (x - p0.x);
    let cte = if cross >= 0.0 { dist } else { -dist };
    LaneErrors { cte, heading_err }
}

/// Rectangle centred on a pose, rotated by its yaw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    corners: [Point2; 4],
}

impl OrientedBox {
    #[must_use]
    pub fn new(x: f64, y: f64, yaw: f64, length: f64, width: f64) -> Self {
        let dx = length / 2.0;
        let dy = width / 2.0;
        let (s, c) = yaw.sin_cos();
        let corner = |cx: f64, cy: f64| Point2::new(cx * c - cy * s + x, cx * s + cy * c + y);
        Self {
            corners: [
                corner(-dx, -dy),
                corner(-dx, dy),
                corner(dx, dy),
                corner(dx, -dy),
            ],
        }
    }

    /// Corners in ring order, without repeating the first.
    #[must_use]
    pub const fn corners(&self) -> &[Point2; 4] {
        &self.corners
    }

    /// Separating-axis test; touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.edge_normals()
            .into_iter()
            .chain(other.edge_normals())
            .all(|axis| {
                let (a_min, a_max) = project(&self.corners, axis);
                let (b_min, b_max) = project(&other.corners, axis);
                a_max >= b_min && b_max >= a_min
            })
    }

    fn edge_normals(&self) -> [Point2; 2] {
        let [a, b, c, _] = self.corners;
        [
            Point2::new(-(b.y - a.y), b.x - a.x),
            Point2::new(-(c.y - b.y), c.x - b.x),
        ]
    }
}

fn project(corners: &[Point2; 4], axis: Point2) -> (f64, f64) {
    corners
        .iter()
        .map(|p| p.x * axis.x + p.y * axis.y)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Even-odd ray casting; points on the boundary may land on either side.
#[must_use]
pub fn point_in_polygon(point: Point2, polygon: &[Point2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance under which a point counts as lying on a boundary.
const BOUNDARY_EPS: f64 = 1e-9;
/// Offset used to probe either side of an area edge.
const SIDE_STEP: f64 = 1e-6;

fn ring_edges(ring: &[Point2]) -> impl Iterator<Item = (Point2, Point2)> + '_ {
    ring.iter().copied().zip(ring.iter().copied().cycle().skip(1))
}

fn midpoint(a: Point2, b: Point2) -> Point2 {
    Point2::new(f64::midpoint(a.x, b.x), f64::midpoint(a.y, b.y))
}

fn on_ring(point: Point2, ring: &[Point2]) -> bool {
    ring_edges(ring).any(|(a, b)| project_point_to_segment(point, a, b).1 <= BOUNDARY_EPS)
}

/// Inside a polygon or on its boundary.
#[must_use]
pub fn point_in_or_on_polygon(point: Point2, polygon: &[Point2]) -> bool {
    polygon.len() >= 3 && (on_ring(point, polygon) || point_in_polygon(point, polygon))
}

/// Parameter along `a -> b` where it meets `c -> d`; parallel segments never meet.
fn crossing_param(a: Point2, b: Point2, c: Point2, d: Point2) -> Option<f64> {
    let (rx, ry) = (b.x - a.x, b.y - a.y);
    let (sx, sy) = (d.x - c.x, d.y - c.y);
    let denom = rx * sy - ry * sx;
    if denom.abs() <= f64::EPSILON {
        return None;
    }
    let (qx, qy) = (c.x - a.x, c.y - a.y);
    let t = (qx * sy - qy * sx) / denom;
    let u = (qx * ry - qy * rx) / denom;
    ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then_some(t)
}

/// Pieces of `a -> b` between the points where `cutters` meet it.
fn split_segment(a: Point2, b: Point2, cutters: &[(Point2, Point2)]) -> Vec<(Point2, Point2)> {
    let mut params: Vec<f64> = cutters
        .iter()
        .filter_map(|&(c, d)| crossing_param(a, b, c, d))
        .chain([0.0, 1.0])
        .collect();
    params.sort_by(f64::total_cmp);
    params.dedup_by(|next, prev| (*next - *prev).abs() <= BOUNDARY_EPS);
    let at = |t: f64| Point2::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
    params.windows(2).map(|w| (at(w[0]), at(w[1]))).collect()
}

/// Whether `polygon` lies within the union of `areas`, boundary contact included.
///
/// The ring of `polygon` must be covered piece by piece, and any stretch of an
/// area edge passing through its interior needs covered ground on both sides.
/// The second check catches notches of non-convex areas and gaps between them.
#[must_use]
pub fn polygon_within_union(polygon: &[Point2], areas: &[Vec<Point2>]) -> bool {
    let covered = |p: Point2| areas.iter().any(|area| point_in_or_on_polygon(p, area));
    let area_edges: Vec<(Point2, Point2)> = areas
        .iter()
        .filter(|area| area.len() >= 3)
        .flat_map(|area| ring_edges(area))
        .collect();
    let own_edges: Vec<(Point2, Point2)> = ring_edges(polygon).collect();

    let ring_covered = polygon.iter().all(|&vertex| covered(vertex))
        && own_edges.iter().all(|&(a, b)| {
            split_segment(a, b, &area_edges)
                .into_iter()
                .all(|(p, q)| covered(midpoint(p, q)))
        });
    if !ring_covered {
        return false;
    }

    area_edges.iter().all(|&(c, d)| {
        let len = c.distance(d);
        if len <= BOUNDARY_EPS {
            return true;
        }
        let nx = -(d.y - c.y) / len * SIDE_STEP;
        let ny = (d.x - c.x) / len * SIDE_STEP;
        split_segment(c, d, &own_edges).into_iter().all(|(p, q)| {
            let m = midpoint(p, q);
            let interior = point_in_polygon(m, polygon) && !on_ring(m, polygon);
            !interior
                || (covered(Point2::new(m.x + nx, m.y + ny))
                    && covered(Point2::new(m.x - nx, m.y - ny)))
        })
    })
}
