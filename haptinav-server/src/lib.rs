//! Haptinav guidance service
//!
//! Wires the pure guidance logic of [`haptinav_core`] to the outside world:
//!
//! - [`location`] reads position fixes and publishes the latest one
//! - [`routing`] asks a GraphHopper compatible service for routes
//! - [`guidance`] owns the [`NavigationSession`](haptinav_core::session::NavigationSession)
//!   and runs route (re)calculations in the background
//! - [`device`] is the only writer to the haptic device
//!
//! Each of these runs as a `tokio-graceful-shutdown` subsystem.

use std::io;

use haptinav_core::error::RouteError;
use thiserror::Error;

pub mod cli;
pub mod device;
pub mod guidance;
pub mod location;
pub mod routing;

pub use cli::Cli;

#[derive(Error, Debug)]
pub enum GuidanceError {
    #[error("Routing service error: {0}")]
    Routing(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Route(#[from] RouteError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Device {0}: {1}")]
    Device(String, io::Error),
    #[error("Invalid fix '{line}': {reason}")]
    Location { line: String, reason: String },
    #[error("Invalid {0}")]
    Config(String),
    #[error("Shutdown")]
    Shutdown,
}
