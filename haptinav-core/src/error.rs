//! Error types shared by the core modules

use thiserror::Error;

/// Reasons a routing result cannot become a [`RouteModel`](crate::route::RouteModel)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Routing response contains no paths")]
    EmptyResponse,
    #[error("Route has {0} points, at least 2 are required")]
    DegenerateGeometry(usize),
    #[error("Coordinate {index} is invalid: [{first}, {second}]")]
    InvalidCoordinate { index: usize, first: f64, second: f64 },
    #[error("Instruction {index} interval [{start}, {end}] is outside 0..{len}")]
    InvalidInterval {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("Speed segment {index} range [{from}, {to}) is outside 0..{len}")]
    InvalidSpeedSegment {
        index: usize,
        from: usize,
        to: usize,
        len: usize,
    },
    #[error("Routing provider reported an error: {0}")]
    Provider(String),
    #[error("Cannot decode routing response: {0}")]
    Json(String),
}

impl From<serde_json::Error> for RouteError {
    fn from(e: serde_json::Error) -> Self {
        RouteError::Json(e.to_string())
    }
}

/// Errors found while decoding a device frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame header is malformed")]
    BadHeader,
    #[error("Unknown message tag '{0}'")]
    UnknownTag(String),
    #[error("Declared payload length {declared} but frame carries {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Checksum mismatch: frame says {expected:02X}, computed {computed:02X}")]
    Checksum { expected: u8, computed: u8 },
    #[error("Invalid payload for {tag}: '{payload}'")]
    BadPayload { tag: &'static str, payload: String },
    #[error("Frame exceeds {0} bytes")]
    TooLong(usize),
}

/// Errors applying a route to a navigation session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Route version {offered} is not newer than current version {current}")]
    StaleRoute { offered: u64, current: u64 },
    #[error("Recalculation was requested for version {requested_for}, session is at {current}")]
    Superseded { requested_for: u64, current: u64 },
}

/// Rejected guidance configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cannot decode configuration: {0}")]
    Json(String),
    #[error("chunkSize {value} is outside 1..={max}")]
    ChunkSize { value: usize, max: usize },
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e.to_string())
    }
}
