//! Haptinav core library
//!
//! Platform-independent turn-by-turn guidance for a haptic navigation device.
//! Nothing in here does I/O: callers feed position fixes and routing
//! responses in and get device telemetry messages out.
//!
//! - [`geo`]: distances, bearings and projections on a spherical earth
//! - [`route`]: routing requests and responses, and the [`route::RouteModel`]
//!   guidance works on
//! - [`tracker`]: decides when the vehicle has left the route
//! - [`scheduler`]: picks the next maneuver to announce
//! - [`estimator`]: remaining distance and time to the destination
//! - [`telemetry`]: the device wire format and the change-gated streamer
//! - [`session`]: ties the above together for one navigation
//!
//! # Example
//!
//! ```
//! use haptinav_core::telemetry::{encode_frame, TelemetryMessage};
//!
//! let frame = encode_frame(&TelemetryMessage::KilometersRemaining(12));
//! assert!(frame.starts_with("$HNKMR,2,12*"));
//! ```

pub mod config;
pub mod error;
pub mod estimator;
pub mod geo;
pub mod route;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod tracker;
