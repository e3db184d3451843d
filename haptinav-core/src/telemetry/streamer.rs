use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::frame::MAX_PAYLOAD_LEN;
use super::message::TelemetryMessage;
use crate::estimator::RemainingTravel;
use crate::geo::{haversine_distance, GeoPoint};
use crate::route::RouteModel;
use crate::scheduler::Announcement;

pub const DEFAULT_CHUNK_SIZE: usize = 20;
pub const DEFAULT_NEAR_END_THRESHOLD_M: f64 = 5.0;
pub const DEFAULT_POSITION_ECHO_M: f64 = 5.0;

/// Widest `lat,lon;` entry of a `VectorPath` payload
const MAX_POINT_PAYLOAD_LEN: usize = "-90.000000,-180.000000;".len();

/// Largest chunk whose `VectorPath` frame stays within [`MAX_PAYLOAD_LEN`]
pub const MAX_CHUNK_SIZE: usize = MAX_PAYLOAD_LEN / MAX_POINT_PAYLOAD_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamerSettings {
    /// Route points per `VectorPath` message, at most [`MAX_CHUNK_SIZE`]
    pub chunk_size: usize,
    /// Distance to the end of the last sent chunk that triggers the next one
    pub near_end_threshold_m: f64,
    /// Displacement that triggers a new `CurrentPosition`
    pub position_echo_m: f64,
}

impl Default for StreamerSettings {
    fn default() -> Self {
        StreamerSettings {
            chunk_size: DEFAULT_CHUNK_SIZE,
            near_end_threshold_m: DEFAULT_NEAR_END_THRESHOLD_M,
            position_echo_m: DEFAULT_POSITION_ECHO_M,
        }
    }
}

/// Values as last transmitted to the device
///
/// `None` means nothing was sent yet (or the snapshot was cleared for a
/// resync), so the next value is always transmitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub maneuver_code: Option<i32>,
    pub distance_m: Option<i64>,
    pub km_remaining: Option<i64>,
    pub minutes_remaining: Option<i64>,
    pub position: Option<GeoPoint>,
    /// Outer `None`: never sent. Inner `None`: sent as unknown.
    pub speed_limit: Option<Option<i32>>,
}

bitflags! {
    /// Which outputs were sent for one fix
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChangeSet: u8 {
        const DIRECTION = 0b0000_0001;
        const DISTANCE = 0b0000_0010;
        const KILOMETERS = 0b0000_0100;
        const MINUTES = 0b0000_1000;
        const SPEED_LIMIT = 0b0001_0000;
        const POSITION = 0b0010_0000;
        const CHUNK = 0b0100_0000;
    }
}

/// Derived state of one fix
#[derive(Debug, Clone, Copy)]
pub struct TelemetryInput {
    pub position: GeoPoint,
    pub announcement: Announcement,
    pub remaining: Option<RemainingTravel>,
    pub speed_limit: Option<i32>,
}

/// Turns derived guidance state into the smallest set of device messages
///
/// Scalars are only sent when their transmitted (rounded) value changes.
/// Route geometry goes out in chunks of [`StreamerSettings::chunk_size`]
/// points: the first chunk on activation, each following one once the
/// traveler is near the end of the previous one. The chunk cursor only
/// moves forward and restarts at 0 with every new route version.
#[derive(Debug, Clone)]
pub struct TelemetryStreamer {
    settings: StreamerSettings,
    route_version: Option<u64>,
    chunk_cursor: usize,
    last_chunk: Option<(usize, usize)>,
    last_sent: TelemetrySnapshot,
}

impl TelemetryStreamer {
    pub fn new(settings: StreamerSettings) -> Self {
        TelemetryStreamer {
            settings,
            route_version: None,
            chunk_cursor: 0,
            last_chunk: None,
            last_sent: TelemetrySnapshot::default(),
        }
    }

    pub fn chunk_cursor(&self) -> usize {
        self.chunk_cursor
    }

    /// Half-open point range of the most recently sent chunk
    pub fn last_chunk(&self) -> Option<(usize, usize)> {
        self.last_chunk
    }

    pub fn last_sent(&self) -> &TelemetrySnapshot {
        &self.last_sent
    }

    pub fn route_version(&self) -> Option<u64> {
        self.route_version
    }

    /// Start streaming `route`
    ///
    /// A new version restarts chunking and sends the first chunk. Activating
    /// the version already being streamed sends nothing.
    pub fn activate(&mut self, route: &RouteModel) -> Vec<TelemetryMessage> {
        if self.route_version == Some(route.version()) {
            return Vec::new();
        }
        log::debug!(
            "Streaming route v{} ({} points)",
            route.version(),
            route.points().len()
        );
        self.route_version = Some(route.version());
        self.chunk_cursor = 0;
        self.last_chunk = None;
        self.next_chunk(route).into_iter().collect()
    }

    fn next_chunk(&mut self, route: &RouteModel) -> Option<TelemetryMessage> {
        let len = route.points().len();
        if self.chunk_cursor >= len {
            return None;
        }
        let start = self.chunk_cursor;
        let end = (start + self.settings.chunk_size.clamp(1, MAX_CHUNK_SIZE)).min(len);
        self.chunk_cursor = end;
        self.last_chunk = Some((start, end));
        log::trace!("Route v{} chunk [{}, {})", route.version(), start, end);
        Some(TelemetryMessage::VectorPath(route.points()[start..end].to_vec()))
    }

    fn near_chunk_end(&self, position: &GeoPoint, route: &RouteModel) -> bool {
        match self.last_chunk {
            Some((_, end)) => route
                .points()
                .get(end - 1)
                .map(|p| haversine_distance(position, p) <= self.settings.near_end_threshold_m)
                .unwrap_or(false),
            None => false,
        }
    }

    /// `CurrentPosition` when the traveler moved far enough since the last echo
    pub fn position_echo(&mut self, position: &GeoPoint) -> Option<TelemetryMessage> {
        let moved = match self.last_sent.position {
            Some(last) => haversine_distance(&last, position) > self.settings.position_echo_m,
            None => true,
        };
        if !moved {
            return None;
        }
        self.last_sent.position = Some(*position);
        Some(TelemetryMessage::CurrentPosition(*position))
    }

    /// Messages for one fix, in send order
    pub fn update(
        &mut self,
        route: &RouteModel,
        input: &TelemetryInput,
    ) -> (Vec<TelemetryMessage>, ChangeSet) {
        let mut messages = self.activate(route);
        let mut changes = if messages.is_empty() {
            ChangeSet::empty()
        } else {
            ChangeSet::CHUNK
        };

        let code = input.announcement.maneuver_code;
        if self.last_sent.maneuver_code != Some(code) {
            self.last_sent.maneuver_code = Some(code);
            messages.push(TelemetryMessage::Direction(code));
            changes |= ChangeSet::DIRECTION;
        }

        if let Some(d) = input.announcement.distance_m {
            let meters = d.round() as i64;
            if self.last_sent.distance_m != Some(meters) {
                self.last_sent.distance_m = Some(meters);
                messages.push(TelemetryMessage::DistanceBeforeDirection(meters));
                changes |= ChangeSet::DISTANCE;
            }
        }

        if let Some(remaining) = input.remaining {
            let km = remaining.km_remaining.round() as i64;
            if self.last_sent.km_remaining != Some(km) {
                self.last_sent.km_remaining = Some(km);
                messages.push(TelemetryMessage::KilometersRemaining(km));
                changes |= ChangeSet::KILOMETERS;
            }
            let minutes = remaining.minutes_remaining.round() as i64;
            if self.last_sent.minutes_remaining != Some(minutes) {
                self.last_sent.minutes_remaining = Some(minutes);
                messages.push(TelemetryMessage::TimeRemaining(minutes));
                changes |= ChangeSet::MINUTES;
            }
        }

        if self.last_sent.speed_limit != Some(input.speed_limit) {
            self.last_sent.speed_limit = Some(input.speed_limit);
            messages.push(TelemetryMessage::SpeedLimit(input.speed_limit));
            changes |= ChangeSet::SPEED_LIMIT;
        }

        if let Some(echo) = self.position_echo(&input.position) {
            messages.push(echo);
            changes |= ChangeSet::POSITION;
        }

        if self.near_chunk_end(&input.position, route) {
            if let Some(chunk) = self.next_chunk(route) {
                messages.push(chunk);
                changes |= ChangeSet::CHUNK;
            }
        }

        (messages, changes)
    }

    /// Forget what the device was sent, e.g. after it reconnected
    ///
    /// Every scalar goes out again on the next update. The most recent chunk
    /// is returned for an immediate resend; the chunk cursor does not move.
    pub fn resync(&mut self, route: &RouteModel) -> Vec<TelemetryMessage> {
        self.last_sent = TelemetrySnapshot::default();
        if self.route_version != Some(route.version()) {
            return self.activate(route);
        }
        match self.last_chunk {
            Some((start, end)) => vec![TelemetryMessage::VectorPath(
                route.points()[start..end].to_vec(),
            )],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset;
    use crate::route::SpeedSegment;
    use crate::scheduler::SchedulerState;
    use crate::telemetry::{decode_frame, encode_frame};

    fn line_route(version: u64, n: usize) -> RouteModel {
        let origin = GeoPoint::new(45.0, 7.0);
        let points = (0..n)
            .map(|i| offset(&origin, 0.0, 30.0 * i as f64))
            .collect();
        RouteModel::new(version, points, vec![], vec![], 30.0 * (n - 1) as f64, 600_000).unwrap()
    }

    fn input(position: GeoPoint, code: i32, distance_m: Option<f64>) -> TelemetryInput {
        TelemetryInput {
            position,
            announcement: Announcement {
                state: SchedulerState::Approaching,
                maneuver_code: code,
                distance_m,
                instruction_idx: None,
            },
            remaining: None,
            speed_limit: None,
        }
    }

    fn chunk_range(messages: &[TelemetryMessage], route: &RouteModel) -> Option<(usize, usize)> {
        messages.iter().find_map(|m| match m {
            TelemetryMessage::VectorPath(points) => {
                let start = route.points().iter().position(|p| p == &points[0])?;
                Some((start, start + points.len()))
            }
            _ => None,
        })
    }

    #[test]
    fn test_chunks_cover_route_without_gap() {
        let route = line_route(1, 45);
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());

        let first = streamer.activate(&route);
        assert_eq!(chunk_range(&first, &route), Some((0, 20)));

        let mut ranges = Vec::new();
        for idx in [19, 39, 44] {
            let (messages, _) = streamer.update(&route, &input(route.points()[idx], 0, None));
            ranges.push(chunk_range(&messages, &route));
        }
        assert_eq!(ranges, vec![Some((20, 40)), Some((40, 45)), None]);
        assert_eq!(streamer.chunk_cursor(), 45);

        // Lingering at the end sends nothing more
        let (messages, changes) = streamer.update(&route, &input(route.points()[44], 0, None));
        assert!(messages.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_oversized_chunk_still_fits_a_frame() {
        let origin = GeoPoint::new(-89.5, -179.5);
        let points: Vec<GeoPoint> = (0..400)
            .map(|i| offset(&origin, 0.0, 10.0 * i as f64))
            .collect();
        let route = RouteModel::new(1, points, vec![], vec![], 3990.0, 600_000).unwrap();
        let mut streamer = TelemetryStreamer::new(StreamerSettings {
            chunk_size: 1000,
            ..StreamerSettings::default()
        });

        let messages = streamer.activate(&route);
        assert_eq!(chunk_range(&messages, &route), Some((0, MAX_CHUNK_SIZE)));
        let frame = encode_frame(&messages[0]);
        match decode_frame(frame.as_bytes()) {
            Ok(TelemetryMessage::VectorPath(decoded)) => assert_eq!(decoded.len(), MAX_CHUNK_SIZE),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_chunk_away_from_chunk_end() {
        let route = line_route(1, 45);
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        streamer.activate(&route);
        let (_, changes) = streamer.update(&route, &input(route.points()[10], 0, None));
        assert!(!changes.contains(ChangeSet::CHUNK));
        assert_eq!(streamer.chunk_cursor(), 20);
    }

    #[test]
    fn test_new_version_restarts_chunking() {
        let route = line_route(1, 45);
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        streamer.activate(&route);
        streamer.update(&route, &input(route.points()[19], 0, None));
        assert_eq!(streamer.chunk_cursor(), 40);

        // Same geometry, new version
        let replacement = line_route(2, 45);
        let messages = streamer.activate(&replacement);
        assert_eq!(chunk_range(&messages, &replacement), Some((0, 20)));
        assert_eq!(streamer.chunk_cursor(), 20);
        assert!(streamer.activate(&replacement).is_empty());
    }

    #[test]
    fn test_scalars_only_sent_on_change() {
        let route = line_route(1, 10);
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        streamer.activate(&route);
        let p = route.points()[3];

        let (_, changes) = streamer.update(&route, &input(p, -2, Some(61.7)));
        assert!(changes.contains(ChangeSet::DIRECTION | ChangeSet::DISTANCE));
        assert!(changes.contains(ChangeSet::SPEED_LIMIT | ChangeSet::POSITION));
        assert_eq!(streamer.last_sent().distance_m, Some(62));

        // Same rounded distance, same code
        let (messages, changes) = streamer.update(&route, &input(p, -2, Some(62.2)));
        assert!(messages.is_empty());
        assert!(changes.is_empty());

        // Distance changes on its own
        let (messages, changes) = streamer.update(&route, &input(p, -2, Some(50.0)));
        assert_eq!(changes, ChangeSet::DISTANCE);
        assert_eq!(messages, vec![TelemetryMessage::DistanceBeforeDirection(50)]);

        // Back to "continue"
        let (messages, _) = streamer.update(&route, &input(p, 0, Some(50.0)));
        assert_eq!(messages, vec![TelemetryMessage::Direction(0)]);
    }

    #[test]
    fn test_speed_limit_transitions() {
        let origin = GeoPoint::new(45.0, 7.0);
        let points: Vec<GeoPoint> = (0..4).map(|i| offset(&origin, 0.0, 30.0 * i as f64)).collect();
        let segments = vec![SpeedSegment {
            from_idx: 0,
            to_idx: 2,
            speed_kmh: Some(50),
        }];
        let route = RouteModel::new(1, points, vec![], segments, 90.0, 60_000).unwrap();
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        streamer.activate(&route);

        let mut i = input(route.points()[0], 0, None);
        i.speed_limit = route.speed_limit_at(0);
        let (messages, _) = streamer.update(&route, &i);
        assert!(messages.contains(&TelemetryMessage::SpeedLimit(Some(50))));

        i.speed_limit = route.speed_limit_at(2);
        let (messages, _) = streamer.update(&route, &i);
        assert!(messages.contains(&TelemetryMessage::SpeedLimit(None)));

        let (messages, _) = streamer.update(&route, &i);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_remaining_rounded() {
        let route = line_route(1, 10);
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        streamer.activate(&route);

        let mut i = input(route.points()[5], 0, None);
        i.remaining = Some(RemainingTravel {
            km_remaining: 12.4,
            minutes_remaining: 17.6,
        });
        let (messages, _) = streamer.update(&route, &i);
        assert!(messages.contains(&TelemetryMessage::KilometersRemaining(12)));
        assert!(messages.contains(&TelemetryMessage::TimeRemaining(18)));

        i.remaining = Some(RemainingTravel {
            km_remaining: 11.6,
            minutes_remaining: 17.7,
        });
        let (_, changes) = streamer.update(&route, &i);
        assert_eq!(changes, ChangeSet::empty());
    }

    #[test]
    fn test_position_echo_threshold() {
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        let p = GeoPoint::new(45.0, 7.0);
        assert!(streamer.position_echo(&p).is_some());
        assert!(streamer.position_echo(&offset(&p, 3.0, 0.0)).is_none());
        // Measured from the last transmitted position, not the last fix
        assert!(streamer.position_echo(&offset(&p, 6.0, 0.0)).is_some());
    }

    #[test]
    fn test_resync_resends_everything() {
        let route = line_route(1, 45);
        let mut streamer = TelemetryStreamer::new(StreamerSettings::default());
        streamer.activate(&route);
        let i = input(route.points()[19], 3, Some(20.0));
        streamer.update(&route, &i);
        assert_eq!(streamer.chunk_cursor(), 40);

        let resent = streamer.resync(&route);
        assert_eq!(chunk_range(&resent, &route), Some((20, 40)));
        assert_eq!(streamer.chunk_cursor(), 40);
        assert_eq!(streamer.last_sent(), &TelemetrySnapshot::default());

        let (_, changes) = streamer.update(&route, &i);
        assert!(changes.contains(
            ChangeSet::DIRECTION | ChangeSet::DISTANCE | ChangeSet::SPEED_LIMIT | ChangeSet::POSITION
        ));
    }
}
