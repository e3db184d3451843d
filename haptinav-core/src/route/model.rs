use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::geo::GeoPoint;

/// One maneuver announcement point on a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    /// Human readable text from the routing provider
    pub text: String,
    /// Point at which this instruction is announced or fired
    pub location: GeoPoint,
    /// Device maneuver code, see [`maneuver`](super::maneuver)
    pub maneuver_code: i32,
    /// Inclusive range of route point indices this instruction covers
    pub interval: (usize, usize),
}

/// Speed limit for a half-open range of route point indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedSegment {
    pub from_idx: usize,
    pub to_idx: usize,
    /// `None` when the limit is unknown
    pub speed_kmh: Option<i32>,
}

/// An immutable computed route
///
/// Every index held by the route (instruction intervals, speed segments)
/// refers to its own `points`. A replacement route always carries a strictly
/// greater `version`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteModel {
    points: Vec<GeoPoint>,
    instructions: Vec<Instruction>,
    speed_segments: Vec<SpeedSegment>,
    total_distance_m: f64,
    total_time_ms: i64,
    version: u64,
}

impl RouteModel {
    /// Build a route, validating that every index refers to `points`
    ///
    /// Fewer than two points is accepted here: such a route is reported as
    /// off-route by the tracker, which forces a recalculation.
    pub fn new(
        version: u64,
        points: Vec<GeoPoint>,
        instructions: Vec<Instruction>,
        speed_segments: Vec<SpeedSegment>,
        total_distance_m: f64,
        total_time_ms: i64,
    ) -> Result<Self, RouteError> {
        let len = points.len();

        for (index, point) in points.iter().enumerate() {
            if !point.is_valid() {
                return Err(RouteError::InvalidCoordinate {
                    index,
                    first: point.latitude,
                    second: point.longitude,
                });
            }
        }

        for (index, instruction) in instructions.iter().enumerate() {
            let (start, end) = instruction.interval;
            if start > end || end >= len {
                return Err(RouteError::InvalidInterval {
                    index,
                    start,
                    end,
                    len,
                });
            }
        }

        for (index, segment) in speed_segments.iter().enumerate() {
            if segment.from_idx >= segment.to_idx || segment.to_idx > len {
                return Err(RouteError::InvalidSpeedSegment {
                    index,
                    from: segment.from_idx,
                    to: segment.to_idx,
                    len,
                });
            }
        }

        Ok(RouteModel {
            points,
            instructions,
            speed_segments,
            total_distance_m,
            total_time_ms,
            version,
        })
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn speed_segments(&self) -> &[SpeedSegment] {
        &self.speed_segments
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn total_time_ms(&self) -> i64 {
        self.total_time_ms
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// A route needs at least one segment to guide along
    pub fn is_usable(&self) -> bool {
        self.points.len() >= 2
    }

    pub fn last_point(&self) -> Option<&GeoPoint> {
        self.points.last()
    }

    /// Speed limit at a route point index
    ///
    /// Returns `None` both when no segment covers `idx` and when the covering
    /// segment has an unknown limit.
    pub fn speed_limit_at(&self, idx: usize) -> Option<i32> {
        self.speed_segments
            .iter()
            .find(|s| s.from_idx <= idx && idx < s.to_idx)
            .and_then(|s| s.speed_kmh)
    }
}

/// Source of route versions
///
/// Shared by everything that creates routes for one guidance run so that
/// versions are strictly increasing in creation order.
#[derive(Debug)]
pub struct RouteVersions {
    next: AtomicU64,
}

impl RouteVersions {
    pub fn new() -> Self {
        RouteVersions {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next version
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for RouteVersions {
    fn default() -> Self {
        Self::new()
    }
}
