//! Navigation session
//!
//! [`NavigationSession`] owns all guidance state for one trip: the current
//! route, the off-route tracker, the announcement cursor, the remaining
//! travel estimate and what the device was last sent. It has a single owner
//! that feeds it fixes in arrival order; nothing in here blocks or does I/O.
//!
//! Route computation is the caller's business. A fix that leaves the route
//! yields a [`RecalcRequest`]; the caller computes the route and hands it
//! back through [`NavigationSession::apply_recalculated`], which discards
//! results that were overtaken by a newer route.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GuidanceConfig;
use crate::error::SessionError;
use crate::estimator::{estimate_from_index, RemainingTravel, RemainingTravelEstimator};
use crate::geo::{nearest_point_index, GeoPoint};
use crate::route::{RouteModel, RouteRequest};
use crate::scheduler::{Announcement, InstructionScheduler};
use crate::telemetry::{ChangeSet, TelemetryInput, TelemetryMessage, TelemetryStreamer};
use crate::tracker::{RouteTracker, TrackerDecision};

/// One position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Heading in degrees from true north
    #[serde(default)]
    pub bearing: f32,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: u64,
}

impl Fix {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Where to and how
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTarget {
    pub destination: GeoPoint,
    pub vehicle_profile: String,
    pub weighting: String,
    pub locale: String,
}

impl RoutingTarget {
    pub fn request_from(&self, origin: GeoPoint) -> RouteRequest {
        RouteRequest {
            origin,
            destination: self.destination,
            vehicle_profile: self.vehicle_profile.clone(),
            weighting: self.weighting.clone(),
            locale: self.locale.clone(),
        }
    }
}

/// A new route is needed
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcRequest {
    pub request: RouteRequest,
    /// Version of the route the traveler deviated from
    pub based_on_version: u64,
}

/// Everything one fix produced
#[derive(Debug, Clone)]
pub struct FixOutcome {
    /// Device messages in send order
    pub messages: Vec<TelemetryMessage>,
    pub changes: ChangeSet,
    /// `None` while off route
    pub announcement: Option<Announcement>,
    pub remaining: Option<RemainingTravel>,
    /// `None` for fixes that were not processed
    pub decision: Option<TrackerDecision>,
    pub recalculation: Option<RecalcRequest>,
}

impl FixOutcome {
    fn skipped() -> Self {
        FixOutcome {
            messages: Vec::new(),
            changes: ChangeSet::empty(),
            announcement: None,
            remaining: None,
            decision: None,
            recalculation: None,
        }
    }
}

pub struct NavigationSession {
    config: GuidanceConfig,
    target: RoutingTarget,
    route: Arc<RouteModel>,
    tracker: RouteTracker,
    scheduler: InstructionScheduler,
    estimator: RemainingTravelEstimator,
    streamer: TelemetryStreamer,
    last_fix: Option<Fix>,
}

impl NavigationSession {
    /// Start guiding along `route`
    ///
    /// Returns the session and the messages that activate the route on the
    /// device (the first geometry chunk).
    pub fn start(
        config: GuidanceConfig,
        target: RoutingTarget,
        route: Arc<RouteModel>,
    ) -> (Self, Vec<TelemetryMessage>) {
        let mut session = NavigationSession {
            tracker: RouteTracker::new(config.off_route_threshold_m, config.recalc),
            scheduler: InstructionScheduler::new(config.scheduler),
            estimator: RemainingTravelEstimator::new(),
            streamer: TelemetryStreamer::new(config.streamer),
            config,
            target,
            route,
            last_fix: None,
        };
        let messages = session.streamer.activate(&session.route);
        log::info!(
            "Guidance started on route v{}, {} points",
            session.route.version(),
            session.route.points().len()
        );
        (session, messages)
    }

    /// Process one fix
    ///
    /// While off route only the position echo is sent; announcements and
    /// remaining travel would refer to a route the traveler is not on.
    pub fn process_fix(&mut self, fix: &Fix) -> FixOutcome {
        let position = fix.position();
        if !position.is_valid() {
            log::warn!(
                "Ignoring fix with invalid position {}, {}",
                fix.latitude,
                fix.longitude
            );
            return FixOutcome::skipped();
        }
        self.last_fix = Some(*fix);

        let decision = self.tracker.check(&position, &self.route, fix.timestamp);
        if decision.is_off_route() {
            let recalculation = match decision {
                TrackerDecision::Recalculate { .. } => Some(RecalcRequest {
                    request: self.target.request_from(position),
                    based_on_version: self.route.version(),
                }),
                _ => None,
            };
            let (messages, changes) = match self.streamer.position_echo(&position) {
                Some(echo) => (vec![echo], ChangeSet::POSITION),
                None => (Vec::new(), ChangeSet::empty()),
            };
            return FixOutcome {
                messages,
                changes,
                announcement: None,
                remaining: None,
                decision: Some(decision),
                recalculation,
            };
        }

        let route = &self.route;
        let idx = nearest_point_index(&position, route.points());
        let announcement = self.scheduler.update(&position, fix.bearing, route);
        let remaining = self.estimator.update(idx, route);
        let input = TelemetryInput {
            position,
            announcement,
            remaining,
            speed_limit: route.speed_limit_at(idx),
        };
        let (messages, changes) = self.streamer.update(route, &input);
        if !changes.is_empty() {
            log::trace!("Fix at index {} changed {:?}", idx, changes);
        }

        FixOutcome {
            messages,
            changes,
            announcement: Some(announcement),
            remaining,
            decision: Some(decision),
            recalculation: None,
        }
    }

    /// Announcement and remaining travel for a fix, without changing any state
    pub fn query(&self, fix: &Fix) -> (Announcement, Option<RemainingTravel>) {
        let position = fix.position();
        let announcement = self.scheduler.evaluate(&position, fix.bearing, &self.route);
        let idx = nearest_point_index(&position, self.route.points());
        let remaining = estimate_from_index(idx, &self.route).or(self.estimator.last());
        (announcement, remaining)
    }

    /// Switch to a newer route
    ///
    /// The announcement cursor, estimate and deviation count restart, and
    /// the device gets the first chunk of the new geometry.
    pub fn replace_route(
        &mut self,
        route: Arc<RouteModel>,
    ) -> Result<Vec<TelemetryMessage>, SessionError> {
        if route.version() <= self.route.version() {
            return Err(SessionError::StaleRoute {
                offered: route.version(),
                current: self.route.version(),
            });
        }
        log::info!(
            "Route v{} replaces v{}",
            route.version(),
            self.route.version()
        );
        self.route = route;
        self.scheduler.reset();
        self.estimator.reset();
        self.tracker.route_replaced();
        Ok(self.streamer.activate(&self.route))
    }

    /// Apply the result of a [`RecalcRequest`]
    ///
    /// Rejected when the session moved on to another route since the request
    /// was made.
    pub fn apply_recalculated(
        &mut self,
        based_on_version: u64,
        route: Arc<RouteModel>,
    ) -> Result<Vec<TelemetryMessage>, SessionError> {
        if based_on_version != self.route.version() {
            self.tracker.recalculation_finished();
            return Err(SessionError::Superseded {
                requested_for: based_on_version,
                current: self.route.version(),
            });
        }
        self.replace_route(route).map_err(|e| {
            self.tracker.recalculation_finished();
            e
        })
    }

    /// The routing provider gave no usable route; keep the current one
    pub fn recalculation_failed(&mut self) {
        self.tracker.recalculation_finished();
    }

    /// Messages that bring a reconnected device up to date
    ///
    /// The last chunk is returned now, the scalars follow with the next fix.
    pub fn resync_telemetry(&mut self) -> Vec<TelemetryMessage> {
        self.streamer.resync(&self.route)
    }

    pub fn route(&self) -> &Arc<RouteModel> {
        &self.route
    }

    pub fn route_version(&self) -> u64 {
        self.route.version()
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn target(&self) -> &RoutingTarget {
        &self.target
    }

    pub fn last_fix(&self) -> Option<&Fix> {
        self.last_fix.as_ref()
    }

    pub fn last_announced(&self) -> i64 {
        self.scheduler.last_announced()
    }

    pub fn chunk_cursor(&self) -> usize {
        self.streamer.chunk_cursor()
    }

    pub fn streamer(&self) -> &TelemetryStreamer {
        &self.streamer
    }

    pub fn recalculation_in_flight(&self) -> bool {
        self.tracker.is_in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset;
    use crate::route::Instruction;
    use crate::scheduler::SchedulerState;

    const ORIGIN: GeoPoint = GeoPoint::new(52.0, 5.0);

    /// North-bound route, one point every 30 m
    fn route(version: u64, n: usize, instructions_at: &[usize]) -> Arc<RouteModel> {
        let points: Vec<GeoPoint> = (0..n)
            .map(|i| offset(&ORIGIN, 30.0 * i as f64, 0.0))
            .collect();
        let instructions = instructions_at
            .iter()
            .map(|&i| Instruction {
                text: format!("turn at {}", i),
                location: points[i],
                maneuver_code: 2,
                interval: (i, i),
            })
            .collect();
        let total = 30.0 * (n - 1) as f64;
        Arc::new(RouteModel::new(version, points, instructions, vec![], total, 600_000).unwrap())
    }

    fn target() -> RoutingTarget {
        RoutingTarget {
            destination: offset(&ORIGIN, 2000.0, 0.0),
            vehicle_profile: "bike".to_string(),
            weighting: "fastest".to_string(),
            locale: "en".to_string(),
        }
    }

    fn fix_at(p: GeoPoint, timestamp: u64) -> Fix {
        Fix {
            latitude: p.latitude,
            longitude: p.longitude,
            bearing: 0.0,
            timestamp,
        }
    }

    #[test]
    fn test_start_sends_first_chunk() {
        let (session, messages) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 45, &[]));
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], TelemetryMessage::VectorPath(p) if p.len() == 20));
        assert_eq!(session.chunk_cursor(), 20);
        assert_eq!(session.last_announced(), -1);
    }

    #[test]
    fn test_replace_route_resets_cursors() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 45, &[0, 2, 5]));

        // Fire instruction 1 and move the chunk cursor
        let at = session.route().points()[19];
        session.process_fix(&fix_at(session.route().points()[2], 1000));
        session.process_fix(&fix_at(at, 2000));
        assert!(session.last_announced() >= 1);
        assert_eq!(session.chunk_cursor(), 40);

        // Same geometry, new version
        let messages = session.replace_route(route(2, 45, &[0, 2, 5])).unwrap();
        assert_eq!(session.last_announced(), -1);
        assert_eq!(session.streamer().last_chunk(), Some((0, 20)));
        assert!(matches!(&messages[0], TelemetryMessage::VectorPath(p) if p[0] == ORIGIN));
    }

    #[test]
    fn test_replace_route_rejects_older_version() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(3, 10, &[]));
        assert_eq!(
            session.replace_route(route(3, 10, &[])),
            Err(SessionError::StaleRoute {
                offered: 3,
                current: 3
            })
        );
        assert!(session.replace_route(route(2, 10, &[])).is_err());
        assert_eq!(session.route_version(), 3);
    }

    #[test]
    fn test_off_route_requests_recalculation_once() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 10, &[]));
        let away = offset(&ORIGIN, 100.0, 80.0);

        let first = session.process_fix(&fix_at(away, 0));
        assert!(first.recalculation.is_none());
        assert!(first.announcement.is_none());
        assert_eq!(first.messages, vec![TelemetryMessage::CurrentPosition(away)]);

        let second = session.process_fix(&fix_at(away, 1000));
        let request = second.recalculation.expect("recalculation requested");
        assert_eq!(request.based_on_version, 1);
        assert_eq!(request.request.origin, away);
        assert_eq!(request.request.vehicle_profile, "bike");
        assert!(session.recalculation_in_flight());

        let third = session.process_fix(&fix_at(away, 9000));
        assert!(third.recalculation.is_none());
    }

    #[test]
    fn test_apply_recalculated() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 10, &[]));
        let away = offset(&ORIGIN, 100.0, 80.0);
        session.process_fix(&fix_at(away, 0));
        let request = session.process_fix(&fix_at(away, 1000)).recalculation.unwrap();

        // A newer route arrives first, e.g. a new destination
        session.replace_route(route(2, 10, &[])).unwrap();
        assert_eq!(
            session.apply_recalculated(request.based_on_version, route(3, 10, &[])),
            Err(SessionError::Superseded {
                requested_for: 1,
                current: 2
            })
        );
        assert_eq!(session.route_version(), 2);
        assert!(!session.recalculation_in_flight());

        assert!(session.apply_recalculated(2, route(4, 10, &[])).is_ok());
        assert_eq!(session.route_version(), 4);
    }

    #[test]
    fn test_recalculation_failed_keeps_route() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 10, &[]));
        let away = offset(&ORIGIN, 100.0, 80.0);
        session.process_fix(&fix_at(away, 0));
        assert!(session.process_fix(&fix_at(away, 1000)).recalculation.is_some());

        session.recalculation_failed();
        assert_eq!(session.route_version(), 1);
        assert!(!session.recalculation_in_flight());
        // Spacing still applies
        assert!(session.process_fix(&fix_at(away, 2000)).recalculation.is_none());
        assert!(session.process_fix(&fix_at(away, 6500)).recalculation.is_some());
    }

    #[test]
    fn test_on_route_fix_produces_guidance() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 10, &[4]));
        let p = offset(&ORIGIN, 60.0, 3.0);
        let outcome = session.process_fix(&fix_at(p, 0));

        let announcement = outcome.announcement.unwrap();
        assert_eq!(announcement.state, SchedulerState::Approaching);
        assert!(outcome.changes.contains(ChangeSet::DIRECTION | ChangeSet::DISTANCE));
        assert!(outcome.messages.contains(&TelemetryMessage::Direction(2)));
        assert!(outcome.messages.contains(&TelemetryMessage::KilometersRemaining(0)));
        assert!(outcome.messages.contains(&TelemetryMessage::TimeRemaining(8)));
        assert_eq!(session.last_fix(), Some(&fix_at(p, 0)));
    }

    #[test]
    fn test_invalid_fix_is_ignored() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 10, &[]));
        let outcome = session.process_fix(&Fix {
            latitude: 95.0,
            longitude: 5.0,
            bearing: 0.0,
            timestamp: 0,
        });
        assert!(outcome.messages.is_empty());
        assert!(outcome.decision.is_none());
        assert!(session.last_fix().is_none());
    }

    #[test]
    fn test_query_is_pure() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 10, &[4, 6]));
        let fix = fix_at(session.route().points()[4], 0);

        let first = session.query(&fix);
        let second = session.query(&fix);
        assert_eq!(first, second);
        assert_eq!(session.last_announced(), -1);

        session.process_fix(&fix);
        assert_eq!(session.query(&fix), session.query(&fix));
    }

    #[test]
    fn test_resync_resends_chunk() {
        let (mut session, _) =
            NavigationSession::start(GuidanceConfig::default(), target(), route(1, 45, &[]));
        session.process_fix(&fix_at(ORIGIN, 0));
        let resent = session.resync_telemetry();
        assert!(matches!(&resent[..], [TelemetryMessage::VectorPath(p)] if p.len() == 20));

        let outcome = session.process_fix(&fix_at(ORIGIN, 1000));
        assert!(outcome.changes.contains(ChangeSet::DIRECTION | ChangeSet::POSITION));
    }
}
