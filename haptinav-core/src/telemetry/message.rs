use std::fmt::Write;

use serde::Serialize;

use crate::error::FrameError;
use crate::geo::GeoPoint;

/// Device message types and their 3-letter wire tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    Direction,
    DistanceBeforeDirection,
    VectorPath,
    KilometersRemaining,
    TimeRemaining,
    CurrentPosition,
    SpeedLimit,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Direction,
        MessageType::DistanceBeforeDirection,
        MessageType::VectorPath,
        MessageType::KilometersRemaining,
        MessageType::TimeRemaining,
        MessageType::CurrentPosition,
        MessageType::SpeedLimit,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            MessageType::Direction => "DIR",
            MessageType::DistanceBeforeDirection => "DST",
            MessageType::VectorPath => "VEC",
            MessageType::KilometersRemaining => "KMR",
            MessageType::TimeRemaining => "TMR",
            MessageType::CurrentPosition => "POS",
            MessageType::SpeedLimit => "SPD",
        }
    }

    pub fn from_tag(tag: &str) -> Option<MessageType> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }
}

/// Payload used for an unknown speed limit
const UNKNOWN_SPEED: &str = "-";

/// One logical send to the device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TelemetryMessage {
    /// Maneuver code
    Direction(i32),
    /// Meters to the announced maneuver
    DistanceBeforeDirection(i64),
    /// One chunk of route points
    VectorPath(Vec<GeoPoint>),
    KilometersRemaining(i64),
    /// Minutes
    TimeRemaining(i64),
    CurrentPosition(GeoPoint),
    /// km/h, `None` when unknown
    SpeedLimit(Option<i32>),
}

impl TelemetryMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            TelemetryMessage::Direction(_) => MessageType::Direction,
            TelemetryMessage::DistanceBeforeDirection(_) => MessageType::DistanceBeforeDirection,
            TelemetryMessage::VectorPath(_) => MessageType::VectorPath,
            TelemetryMessage::KilometersRemaining(_) => MessageType::KilometersRemaining,
            TelemetryMessage::TimeRemaining(_) => MessageType::TimeRemaining,
            TelemetryMessage::CurrentPosition(_) => MessageType::CurrentPosition,
            TelemetryMessage::SpeedLimit(_) => MessageType::SpeedLimit,
        }
    }

    /// ASCII payload of this message
    ///
    /// Coordinates use 6 decimals (about 0.1 m).
    pub fn payload(&self) -> String {
        match self {
            TelemetryMessage::Direction(code) => code.to_string(),
            TelemetryMessage::DistanceBeforeDirection(v)
            | TelemetryMessage::KilometersRemaining(v)
            | TelemetryMessage::TimeRemaining(v) => v.to_string(),
            TelemetryMessage::CurrentPosition(p) => format!("{:.6},{:.6}", p.latitude, p.longitude),
            TelemetryMessage::SpeedLimit(Some(kmh)) => kmh.to_string(),
            TelemetryMessage::SpeedLimit(None) => UNKNOWN_SPEED.to_string(),
            TelemetryMessage::VectorPath(points) => {
                let mut payload = String::with_capacity(points.len() * 22);
                for (i, p) in points.iter().enumerate() {
                    if i > 0 {
                        payload.push(';');
                    }
                    let _ = write!(&mut payload, "{:.6},{:.6}", p.latitude, p.longitude);
                }
                payload
            }
        }
    }

    /// Parse a payload of the given type
    pub fn from_payload(message_type: MessageType, payload: &str) -> Result<Self, FrameError> {
        let bad = || FrameError::BadPayload {
            tag: message_type.tag(),
            payload: payload.to_string(),
        };
        let int = |s: &str| s.parse::<i64>().map_err(|_| bad());

        let message = match message_type {
            MessageType::Direction => {
                TelemetryMessage::Direction(payload.parse::<i32>().map_err(|_| bad())?)
            }
            MessageType::DistanceBeforeDirection => {
                TelemetryMessage::DistanceBeforeDirection(int(payload)?)
            }
            MessageType::KilometersRemaining => TelemetryMessage::KilometersRemaining(int(payload)?),
            MessageType::TimeRemaining => TelemetryMessage::TimeRemaining(int(payload)?),
            MessageType::SpeedLimit => {
                if payload == UNKNOWN_SPEED {
                    TelemetryMessage::SpeedLimit(None)
                } else {
                    TelemetryMessage::SpeedLimit(Some(payload.parse::<i32>().map_err(|_| bad())?))
                }
            }
            MessageType::CurrentPosition => {
                TelemetryMessage::CurrentPosition(parse_point(payload).ok_or_else(bad)?)
            }
            MessageType::VectorPath => {
                let points = if payload.is_empty() {
                    Vec::new()
                } else {
                    payload
                        .split(';')
                        .map(parse_point)
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(bad)?
                };
                TelemetryMessage::VectorPath(points)
            }
        };
        Ok(message)
    }
}

fn parse_point(s: &str) -> Option<GeoPoint> {
    let (lat, lon) = s.split_once(',')?;
    Some(GeoPoint::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}
