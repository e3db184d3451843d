//! Device telemetry
//!
//! What the haptic device is told, and how it goes over the wire.
//!
//! | Tag | Message | Payload |
//! |-----|---------|---------|
//! | DIR | Direction | maneuver code |
//! | DST | DistanceBeforeDirection | meters |
//! | VEC | VectorPath | `lat,lon;lat,lon;...` (one chunk) |
//! | KMR | KilometersRemaining | km |
//! | TMR | TimeRemaining | minutes |
//! | POS | CurrentPosition | `lat,lon` |
//! | SPD | SpeedLimit | km/h, `-` when unknown |
//!
//! [`TelemetryStreamer`] decides which messages to send, [`encode_frame`]
//! and [`FrameDecoder`] handle framing.

mod frame;
mod message;
mod streamer;

pub use frame::*;
pub use message::*;
pub use streamer::*;
