//! Route Model
//!
//! Immutable computed routes, maneuver code mapping and conversion of
//! routing provider responses.
//!
//! A [`RouteModel`] is never mutated: a deviation or a new destination
//! produces a new model with a strictly greater version, allocated from a
//! shared [`RouteVersions`] counter.
//!
//! # Example
//!
//! ```rust
//! use haptinav_core::route::{RouteResponse, RouteVersions};
//!
//! let versions = RouteVersions::new();
//! let json = r#"{"paths": [{"distance": 70.0, "time": 9000,
//!     "points": {"coordinates": [[5.0, 52.0], [5.001, 52.0]]}}]}"#;
//! let route = RouteResponse::from_json(json)
//!     .and_then(|r| r.into_route(versions.next()))
//!     .unwrap();
//! assert_eq!(route.points().len(), 2);
//! ```

pub mod maneuver;
mod model;
mod response;

pub use model::*;
pub use response::*;
