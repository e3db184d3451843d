//! Remaining distance and time
//!
//! Re-estimates what is left of the route by snapping the position to the
//! nearest route vertex and scaling the provider's total time by the
//! remaining fraction of the route length.
//!
//! This assumes a uniform speed over the rest of the route. It is good
//! enough between recalculations but it is not an ETA model.

use serde::Serialize;

use crate::geo::{nearest_point_index, remaining_length, GeoPoint};
use crate::route::RouteModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingTravel {
    pub km_remaining: f64,
    pub minutes_remaining: f64,
}

/// Remaining travel from route vertex `idx`
///
/// `None` when the route has no positive total distance.
pub fn estimate_from_index(idx: usize, route: &RouteModel) -> Option<RemainingTravel> {
    let total = route.total_distance_m();
    if !(total > 0.0) {
        return None;
    }
    let remaining_m = remaining_length(route.points(), idx);
    let ratio = remaining_m / total;

    Some(RemainingTravel {
        km_remaining: remaining_m / 1000.0,
        minutes_remaining: route.total_time_ms() as f64 * ratio / 60_000.0,
    })
}

/// Remaining travel from the route vertex nearest to `position`
pub fn estimate(position: &GeoPoint, route: &RouteModel) -> Option<RemainingTravel> {
    estimate_from_index(nearest_point_index(position, route.points()), route)
}

/// Keeps the last good estimate for routes without a usable total
#[derive(Debug, Clone, Default)]
pub struct RemainingTravelEstimator {
    last: Option<RemainingTravel>,
}

impl RemainingTravelEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<RemainingTravel> {
        self.last
    }

    /// Estimate from vertex `idx`, falling back to the previous estimate
    pub fn update(&mut self, idx: usize, route: &RouteModel) -> Option<RemainingTravel> {
        match estimate_from_index(idx, route) {
            Some(remaining) => {
                self.last = Some(remaining);
                Some(remaining)
            }
            None => {
                log::trace!(
                    "Route v{} has no total distance, keeping previous estimate",
                    route.version()
                );
                self.last
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
