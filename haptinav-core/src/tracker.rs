//! Off-route detection
//!
//! Decides whether the traveler has left the route and whether a new route
//! should be requested.
//!
//! Deviation is measured as the perpendicular distance to the nearest route
//! *segment*, not the nearest vertex, so sparse polylines on long straight
//! roads do not produce false positives.
//!
//! The plain [`is_off_route`] check has no memory. [`RouteTracker`] wraps it
//! with a [`RecalcPolicy`] so that GPS noise around the threshold cannot
//! start a storm of recalculations: the deviation must persist over several
//! consecutive fixes, requests are spaced by a minimum interval, and only one
//! request may be in flight.

use serde::{Deserialize, Serialize};

use crate::geo::{distance_to_segment, GeoPoint};
use crate::route::RouteModel;

pub const DEFAULT_OFF_ROUTE_THRESHOLD_M: f64 = 30.0;

/// Minimum distance from `position` to any segment of `points`
///
/// `None` for polylines without a segment.
pub fn distance_to_route(position: &GeoPoint, points: &[GeoPoint]) -> Option<f64> {
    points
        .windows(2)
        .map(|w| distance_to_segment(position, &w[0], &w[1]))
        .fold(None, |best: Option<f64>, d| match best {
            Some(b) if b <= d => Some(b),
            _ => Some(d),
        })
}

/// True when `position` is more than `threshold_m` from every route segment
///
/// A route with fewer than two points is always off-route.
pub fn is_off_route(position: &GeoPoint, route: &RouteModel, threshold_m: f64) -> bool {
    match distance_to_route(position, route.points()) {
        Some(d) => d > threshold_m,
        None => true,
    }
}

/// Throttling of recalculation requests
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecalcPolicy {
    /// Minimum time between two requests
    pub min_interval_ms: u64,
    /// Consecutive off-route fixes needed before a request
    pub sustained_fixes: u32,
}

impl Default for RecalcPolicy {
    fn default() -> Self {
        RecalcPolicy {
            min_interval_ms: 5000,
            sustained_fixes: 2,
        }
    }
}

/// Outcome of checking one fix against the route
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerDecision {
    OnRoute {
        distance_m: f64,
    },
    /// Off route, but no request is made for this fix
    Deviating {
        distance_m: Option<f64>,
        consecutive: u32,
    },
    /// Off route and a new route should be requested now
    Recalculate {
        distance_m: Option<f64>,
    },
}

impl TrackerDecision {
    pub fn is_off_route(&self) -> bool {
        !matches!(self, TrackerDecision::OnRoute { .. })
    }
}

/// Stateful off-route tracker for one navigation session
#[derive(Debug, Clone)]
pub struct RouteTracker {
    threshold_m: f64,
    policy: RecalcPolicy,
    consecutive_off_route: u32,
    in_flight: bool,
    last_request_ms: Option<u64>,
}

impl RouteTracker {
    pub fn new(threshold_m: f64, policy: RecalcPolicy) -> Self {
        RouteTracker {
            threshold_m,
            policy,
            consecutive_off_route: 0,
            in_flight: false,
            last_request_ms: None,
        }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Check a fix taken at `now_ms` against `route`
    ///
    /// Returning [`TrackerDecision::Recalculate`] marks a request as in
    /// flight; the caller must report its end through
    /// [`recalculation_finished`](Self::recalculation_finished) or replace
    /// the route.
    pub fn check(&mut self, position: &GeoPoint, route: &RouteModel, now_ms: u64) -> TrackerDecision {
        let distance_m = distance_to_route(position, route.points());
        let off_route = match distance_m {
            Some(d) => d > self.threshold_m,
            None => true,
        };

        if !off_route {
            self.consecutive_off_route = 0;
            return TrackerDecision::OnRoute {
                distance_m: distance_m.unwrap_or(0.0),
            };
        }

        self.consecutive_off_route = self.consecutive_off_route.saturating_add(1);

        let sustained = self.consecutive_off_route >= self.policy.sustained_fixes.max(1);
        let spaced = match self.last_request_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.policy.min_interval_ms,
            None => true,
        };

        if sustained && spaced && !self.in_flight {
            self.in_flight = true;
            self.last_request_ms = Some(now_ms);
            log::debug!(
                "Off route by {:?} m for {} fixes, requesting new route",
                distance_m,
                self.consecutive_off_route
            );
            TrackerDecision::Recalculate { distance_m }
        } else {
            log::trace!(
                "Off route by {:?} m ({} fixes, in flight {})",
                distance_m,
                self.consecutive_off_route,
                self.in_flight
            );
            TrackerDecision::Deviating {
                distance_m,
                consecutive: self.consecutive_off_route,
            }
        }
    }

    /// A request ended without a usable route
    pub fn recalculation_finished(&mut self) {
        self.in_flight = false;
    }

    /// A new route was applied; deviation counting restarts
    ///
    /// The request spacing survives so a replacement route that is itself
    /// unusable does not trigger an immediate second request.
    pub fn route_replaced(&mut self) {
        self.in_flight = false;
        self.consecutive_off_route = 0;
    }
}
