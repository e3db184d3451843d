//! Geodesic primitives
//!
//! Great-circle distance, point-to-segment distance and nearest point search
//! on route polylines. All coordinates are WGS84 decimal degrees and all
//! distances are meters.
//!
//! None of these functions validate their input: NaN coordinates produce
//! NaN (or arbitrary) results. Fixes and routing responses are checked
//! before they reach this module.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every distance in this crate
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A position on the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Great-circle distance between two points
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Longitude difference folded into [-180, 180] so segments that cross the
/// antimeridian stay short in the projected plane.
fn longitude_delta(from: f64, to: f64) -> f64 {
    let mut d = to - from;
    if d > 180.0 {
        d -= 360.0;
    } else if d < -180.0 {
        d += 360.0;
    }
    d
}

/// Distance from `p` to the segment `a`-`b`
///
/// Uses an equirectangular projection around `a`: longitude is scaled by the
/// cosine of the segment's mean latitude and both axes by the Earth radius.
/// The projection parameter is clamped to the segment, so points beyond
/// either end measure to the nearest endpoint.
///
/// The approximation holds for segment lengths up to a few kilometers, which
/// covers the spacing of a routed polyline. It is not a geodesic distance and
/// degrades on long segments and near the poles.
pub fn distance_to_segment(p: &GeoPoint, a: &GeoPoint, b: &GeoPoint) -> f64 {
    if a == b {
        return haversine_distance(p, a);
    }

    let cos_lat = ((a.latitude + b.latitude) / 2.0).to_radians().cos();
    let to_plane = |q: &GeoPoint| {
        Vector2::new(
            longitude_delta(a.longitude, q.longitude).to_radians() * cos_lat * EARTH_RADIUS_M,
            (q.latitude - a.latitude).to_radians() * EARTH_RADIUS_M,
        )
    };

    let ab = to_plane(b);
    let ap = to_plane(p);

    let len_sq = ab.norm_squared();
    if len_sq <= f64::EPSILON {
        return ap.norm();
    }

    let t = (ap.dot(&ab) / len_sq).clamp(0.0, 1.0);
    (ap - ab * t).norm()
}

/// Index of the polyline vertex closest to `p`
///
/// Linear scan; the first of several equidistant vertices wins. An empty
/// slice yields 0, callers check the route before asking.
pub fn nearest_point_index(p: &GeoPoint, points: &[GeoPoint]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (i, point) in points.iter().enumerate() {
        let d = haversine_distance(p, point);
        if d < best_dist {
            best_dist = d;
            best_idx = i;
        }
    }
    best_idx
}

/// Length of the polyline from vertex `from_idx` to its last vertex
pub fn remaining_length(points: &[GeoPoint], from_idx: usize) -> f64 {
    points
        .get(from_idx..)
        .map(|tail| {
            tail.windows(2)
                .map(|w| haversine_distance(&w[0], &w[1]))
                .sum()
        })
        .unwrap_or(0.0)
}

/// Initial great-circle bearing from `from` to `to`, in degrees [0, 360)
pub fn initial_bearing(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = longitude_delta(from.longitude, to.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Signed difference `angle - reference` normalized into (-180, 180]
pub fn signed_angle_difference(angle: f64, reference: f64) -> f64 {
    let d = (angle - reference).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Meters per degree of latitude on the sphere used here
pub fn meters_per_degree() -> f64 {
    EARTH_RADIUS_M * std::f64::consts::PI / 180.0
}

/// Point `north_m` meters north and `east_m` meters east of `origin`
///
/// Flat-earth offset, only meant for short distances (test fixtures, route
/// simulation).
pub fn offset(origin: &GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let deg = meters_per_degree();
    GeoPoint::new(
        origin.latitude + north_m / deg,
        origin.longitude + east_m / (deg * origin.latitude.to_radians().cos()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point_is_zero() {
        let a = GeoPoint::new(52.3702, 4.8952);
        assert_eq!(haversine_distance(&a, &a), 0.0);
        let origin = GeoPoint::new(0.0, 0.0);
        assert_eq!(haversine_distance(&origin, &origin), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = haversine_distance(&a, &b);
        assert!((d - meters_per_degree()).abs() < 1e-6);
    }

    #[test]
    fn test_distance_to_segment_perpendicular() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let p = GeoPoint::new(0.0005, 0.5);

        let d = distance_to_segment(&p, &a, &b);
        let lateral = haversine_distance(&GeoPoint::new(0.0, 0.5), &p);
        assert!((d - lateral).abs() < 0.01, "d={} lateral={}", d, lateral);

        // A segment further north is further from p
        let c = GeoPoint::new(0.01, 0.0);
        let e = GeoPoint::new(0.01, 1.0);
        assert!(d < distance_to_segment(&p, &c, &e));
    }

    #[test]
    fn test_distance_to_segment_clamps_to_endpoints() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 0.001);
        let beyond = GeoPoint::new(0.0, 0.002);

        let d = distance_to_segment(&beyond, &a, &b);
        let to_b = haversine_distance(&beyond, &b);
        assert!((d - to_b).abs() < 0.01);
    }

    #[test]
    fn test_distance_to_degenerate_segment() {
        let a = GeoPoint::new(48.0, 11.0);
        let p = offset(&a, 30.0, 40.0);
        let d = distance_to_segment(&p, &a, &a);
        assert!((d - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_nearest_point_index_ties_to_lowest() {
        let p = GeoPoint::new(0.0, 0.0);
        let points = [
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.0, -0.001),
            GeoPoint::new(0.0, 0.001),
        ];
        assert_eq!(nearest_point_index(&p, &points), 1);
        assert_eq!(nearest_point_index(&p, &[]), 0);
    }

    #[test]
    fn test_remaining_length() {
        let a = GeoPoint::new(10.0, 10.0);
        let points = [a, offset(&a, 100.0, 0.0), offset(&a, 200.0, 0.0)];
        assert!((remaining_length(&points, 0) - 200.0).abs() < 0.1);
        assert!((remaining_length(&points, 1) - 100.0).abs() < 0.1);
        assert_eq!(remaining_length(&points, 2), 0.0);
        assert_eq!(remaining_length(&points, 7), 0.0);
    }

    #[test]
    fn test_initial_bearing() {
        let a = GeoPoint::new(0.0, 0.0);
        assert!((initial_bearing(&a, &GeoPoint::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((initial_bearing(&a, &GeoPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((initial_bearing(&a, &GeoPoint::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((initial_bearing(&a, &GeoPoint::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_signed_angle_difference() {
        assert_eq!(signed_angle_difference(10.0, 350.0), 20.0);
        assert_eq!(signed_angle_difference(350.0, 10.0), -20.0);
        assert_eq!(signed_angle_difference(180.0, 0.0), 180.0);
        assert_eq!(signed_angle_difference(0.0, 180.0), 180.0);
        assert_eq!(signed_angle_difference(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_offset_round_trips_distance() {
        let a = GeoPoint::new(45.0, 7.0);
        let b = offset(&a, 0.0, 100.0);
        assert!((haversine_distance(&a, &b) - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_is_valid() {
        assert!(GeoPoint::new(45.0, 7.0).is_valid());
        assert!(!GeoPoint::new(91.0, 7.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 7.0).is_valid());
    }
}
