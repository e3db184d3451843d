//! Routing provider request and response mapping
//!
//! The provider answers with a GraphHopper shaped JSON document. Only the
//! fields guidance consumes are modelled; everything else is ignored.
//!
//! ```json
//! {
//!   "paths": [{
//!     "distance": 1520.3,
//!     "time": 182000,
//!     "points": { "coordinates": [[4.89, 52.37], [4.90, 52.37]] },
//!     "instructions": [
//!       { "text": "Turn left", "sign": -2, "interval": [0, 1] }
//!     ],
//!     "details": { "max_speed": [[0, 1, 50.0]] }
//!   }]
//! }
//! ```

use serde::Deserialize;

use super::maneuver::{is_roundabout, maneuver_code};
use super::model::{Instruction, RouteModel, SpeedSegment};
use crate::error::RouteError;
use crate::geo::GeoPoint;

/// Parameters of one route computation
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    /// Resolved vehicle profile, e.g. "car" or "bike"
    pub vehicle_profile: String,
    /// Weighting, e.g. "fastest" or "short_fastest"
    pub weighting: String,
    pub locale: String,
}

impl RouteRequest {
    /// Query parameters for the provider's route endpoint
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "point",
                format!("{},{}", self.origin.latitude, self.origin.longitude),
            ),
            (
                "point",
                format!(
                    "{},{}",
                    self.destination.latitude, self.destination.longitude
                ),
            ),
            ("profile", self.vehicle_profile.clone()),
            ("weighting", self.weighting.clone()),
            ("locale", self.locale.clone()),
            ("points_encoded", "false".to_string()),
            ("instructions", "true".to_string()),
            ("details", "max_speed".to_string()),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub paths: Vec<ResponsePath>,
    /// Error text, present when the provider could not route
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePath {
    pub distance: f64,
    pub time: i64,
    pub points: ResponsePoints,
    #[serde(default)]
    pub instructions: Vec<ResponseInstruction>,
    #[serde(default)]
    pub details: ResponseDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePoints {
    /// `[lon, lat]` or `[lon, lat, elevation]`
    pub coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInstruction {
    pub text: String,
    pub sign: i32,
    /// Roundabout exit angle in radians
    #[serde(default)]
    pub turn_angle: Option<f64>,
    pub interval: [usize; 2],
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseDetails {
    /// `[from, to, km/h or null]`
    #[serde(default)]
    pub max_speed: Vec<(usize, usize, Option<f64>)>,
}

impl RouteResponse {
    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert the first path into a route with the given version
    ///
    /// Every provider instruction becomes two route instructions: one at the
    /// first point of its interval (entry) and one at the last (exit).
    pub fn into_route(self, version: u64) -> Result<RouteModel, RouteError> {
        let path = match self.paths.into_iter().next() {
            Some(path) => path,
            None => {
                return Err(match self.message {
                    Some(message) => RouteError::Provider(message),
                    None => RouteError::EmptyResponse,
                })
            }
        };

        let points = path
            .points
            .coordinates
            .iter()
            .enumerate()
            .map(|(index, c)| match c.as_slice() {
                [lon, lat, ..] => Ok(GeoPoint::new(*lat, *lon)),
                _ => Err(RouteError::InvalidCoordinate {
                    index,
                    first: c.first().copied().unwrap_or(f64::NAN),
                    second: f64::NAN,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if points.len() < 2 {
            return Err(RouteError::DegenerateGeometry(points.len()));
        }

        let mut instructions = Vec::with_capacity(path.instructions.len() * 2);
        for (index, source) in path.instructions.iter().enumerate() {
            let [start, end] = source.interval;
            let (entry, exit) = match (points.get(start), points.get(end)) {
                (Some(entry), Some(exit)) if start <= end => (*entry, *exit),
                _ => {
                    return Err(RouteError::InvalidInterval {
                        index,
                        start,
                        end,
                        len: points.len(),
                    })
                }
            };
            let code = maneuver_code(source.sign, source.turn_angle);
            for location in [entry, exit] {
                instructions.push(Instruction {
                    text: source.text.clone(),
                    location,
                    maneuver_code: code,
                    interval: (start, end),
                });
            }
        }

        let speed_segments = path
            .details
            .max_speed
            .iter()
            .map(|&(from_idx, to_idx, speed)| SpeedSegment {
                from_idx,
                to_idx,
                speed_kmh: speed.filter(|v| v.is_finite()).map(|v| v.round() as i32),
            })
            .collect();

        log::debug!(
            "Route v{}: {} points, {} instructions ({} at roundabouts), {:.0} m, {} ms",
            version,
            points.len(),
            instructions.len(),
            roundabout_count(&instructions),
            path.distance,
            path.time
        );

        RouteModel::new(
            version,
            points,
            instructions,
            speed_segments,
            path.distance,
            path.time,
        )
    }
}

/// Provider maneuvers that enter a roundabout
pub fn roundabout_count(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .filter(|i| is_roundabout(i.maneuver_code))
        .count()
        / 2
}
