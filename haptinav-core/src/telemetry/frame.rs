//! Device frame encoding and decoding
//!
//! Pure functions, no I/O. Every message is one ASCII line in an NMEA
//! flavoured envelope:
//!
//! ```text
//! $HN<TAG>,<len>,<payload>*<CS>\r\n
//! ```
//!
//! - `TAG`: 3-letter message tag, see [`MessageType::tag`]
//! - `len`: decimal byte length of `payload`
//! - `CS`: XOR of every byte between `$` and `*`, two upper-case hex digits
//!
//! The explicit length keeps frames self-delimiting even though route
//! chunks use `,` and `;` inside the payload.

use super::message::{MessageType, TelemetryMessage};
use crate::error::FrameError;

/// Talker prefix of every frame
pub const TALKER: &str = "HN";

/// Largest accepted payload
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// `$` + talker + tag + `,`
const HEADER_LEN: usize = 1 + 2 + 3 + 1;

/// Longest length field we wait for before giving up on a header
const MAX_LEN_DIGITS: usize = 5;

/// NMEA checksum of `data`
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Encode one message as a complete frame
///
/// # Example
/// ```
/// use haptinav_core::telemetry::{encode_frame, TelemetryMessage};
/// assert_eq!(encode_frame(&TelemetryMessage::Direction(2)), "$HNDIR,1,2*5A\r\n");
/// ```
pub fn encode_frame(message: &TelemetryMessage) -> String {
    let payload = message.payload();
    let body = format!(
        "{}{},{},{}",
        TALKER,
        message.message_type().tag(),
        payload.len(),
        payload
    );
    format!("${}*{:02X}\r\n", body, checksum(body.as_bytes()))
}

/// Incremental frame decoder
///
/// Bytes are pushed as they arrive; complete frames are taken out with
/// [`next_message`](Self::next_message). Garbage between frames is skipped
/// by resynchronizing on the next `$`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet decoded
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop the leading `$` so the next call resyncs past a bad frame
    fn skip_start(&mut self) {
        self.buf.drain(..1);
    }

    /// Next decoded message
    ///
    /// `None` when more bytes are needed. An error consumes the offending
    /// bytes, so calling again continues with the following frame.
    pub fn next_message(&mut self) -> Option<Result<TelemetryMessage, FrameError>> {
        match self.buf.iter().position(|&b| b == b'$') {
            Some(start) => {
                self.buf.drain(..start);
            }
            None => {
                self.buf.clear();
                return None;
            }
        }

        if self.buf.len() < HEADER_LEN {
            return None;
        }
        if &self.buf[1..3] != TALKER.as_bytes()
            || !self.buf[3..6].iter().all(|b| b.is_ascii_uppercase())
            || self.buf[6] != b','
        {
            self.skip_start();
            return Some(Err(FrameError::BadHeader));
        }

        let len_end = match self.buf[HEADER_LEN..].iter().position(|&b| b == b',') {
            Some(pos) if pos > 0 && pos <= MAX_LEN_DIGITS => HEADER_LEN + pos,
            Some(_) => {
                self.skip_start();
                return Some(Err(FrameError::BadHeader));
            }
            None if self.buf.len() > HEADER_LEN + MAX_LEN_DIGITS => {
                self.skip_start();
                return Some(Err(FrameError::BadHeader));
            }
            None => return None,
        };

        let declared = match std::str::from_utf8(&self.buf[HEADER_LEN..len_end])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            Some(len) => len,
            None => {
                self.skip_start();
                return Some(Err(FrameError::BadHeader));
            }
        };
        if declared > MAX_PAYLOAD_LEN {
            self.skip_start();
            return Some(Err(FrameError::TooLong(MAX_PAYLOAD_LEN)));
        }

        let payload_start = len_end + 1;
        let star = payload_start + declared;
        let frame_len = star + 1 + 2 + 2;
        if self.buf.len() < frame_len {
            return None;
        }

        if self.buf[star] != b'*' || &self.buf[frame_len - 2..frame_len] != b"\r\n" {
            let actual = self.buf[payload_start..]
                .iter()
                .position(|&b| b == b'*')
                .unwrap_or(self.buf.len() - payload_start);
            self.skip_start();
            return Some(Err(FrameError::LengthMismatch { declared, actual }));
        }

        let frame: Vec<u8> = self.buf.drain(..frame_len).collect();

        let computed = checksum(&frame[1..star]);
        let expected = match std::str::from_utf8(&frame[star + 1..star + 3])
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok())
        {
            Some(cs) => cs,
            None => return Some(Err(FrameError::BadHeader)),
        };
        if expected != computed {
            return Some(Err(FrameError::Checksum { expected, computed }));
        }

        let tag = String::from_utf8_lossy(&frame[3..6]).into_owned();
        let message_type = match MessageType::from_tag(&tag) {
            Some(t) => t,
            None => return Some(Err(FrameError::UnknownTag(tag))),
        };
        let payload = String::from_utf8_lossy(&frame[payload_start..star]);
        Some(TelemetryMessage::from_payload(message_type, &payload))
    }
}

/// Decode a buffer that holds exactly one frame
pub fn decode_frame(data: &[u8]) -> Result<TelemetryMessage, FrameError> {
    let mut decoder = FrameDecoder::new();
    decoder.push(data);
    decoder
        .next_message()
        .unwrap_or(Err(FrameError::BadHeader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    #[test]
    fn test_encode_direction() {
        let frame = encode_frame(&TelemetryMessage::Direction(-2));
        assert!(frame.starts_with("$HNDIR,2,-2*"));
        assert!(frame.ends_with("\r\n"));
        let cs = checksum(b"HNDIR,2,-2");
        assert_eq!(frame, format!("$HNDIR,2,-2*{:02X}\r\n", cs));
    }

    #[test]
    fn test_encode_vector_path() {
        let chunk = vec![GeoPoint::new(52.0, 5.0), GeoPoint::new(52.001, 5.002)];
        let frame = encode_frame(&TelemetryMessage::VectorPath(chunk));
        let payload = "52.000000,5.000000;52.001000,5.002000";
        assert!(frame.starts_with(&format!("$HNVEC,{},{}*", payload.len(), payload)));
    }

    #[test]
    fn test_decode_stream_with_garbage() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = b"noise".to_vec();
        bytes.extend_from_slice(encode_frame(&TelemetryMessage::Direction(3)).as_bytes());
        bytes.extend_from_slice(encode_frame(&TelemetryMessage::SpeedLimit(None)).as_bytes());

        // Split in the middle of the second frame
        let (first, second) = bytes.split_at(bytes.len() - 4);
        decoder.push(first);
        assert_eq!(decoder.next_message(), Some(Ok(TelemetryMessage::Direction(3))));
        assert_eq!(decoder.next_message(), None);
        decoder.push(second);
        assert_eq!(decoder.next_message(), Some(Ok(TelemetryMessage::SpeedLimit(None))));
        assert_eq!(decoder.next_message(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut frame = encode_frame(&TelemetryMessage::TimeRemaining(12)).into_bytes();
        let n = frame.len();
        frame[n - 4] = b'0';
        frame[n - 3] = b'0';
        assert!(matches!(decode_frame(&frame), Err(FrameError::Checksum { .. })));
    }

    #[test]
    fn test_decode_length_mismatch_resyncs() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"$HNDIR,5,-2*00\r\n");
        decoder.push(encode_frame(&TelemetryMessage::KilometersRemaining(7)).as_bytes());

        let mut results = Vec::new();
        while let Some(r) = decoder.next_message() {
            results.push(r);
        }
        assert!(matches!(
            results.first(),
            Some(Err(FrameError::LengthMismatch { declared: 5, .. }))
        ));
        assert_eq!(
            results.last(),
            Some(&Ok(TelemetryMessage::KilometersRemaining(7)))
        );
    }

    #[test]
    fn test_decode_unknown_tag() {
        let body = "HNXYZ,1,1";
        let frame = format!("${}*{:02X}\r\n", body, checksum(body.as_bytes()));
        assert_eq!(
            decode_frame(frame.as_bytes()),
            Err(FrameError::UnknownTag("XYZ".to_string()))
        );
    }

    #[test]
    fn test_decode_bad_header() {
        assert_eq!(decode_frame(b"$GPRMC,1,2*00\r\n"), Err(FrameError::BadHeader));
        assert_eq!(decode_frame(b"$HNDIR,abc,1*00\r\n"), Err(FrameError::BadHeader));
    }

    #[test]
    fn test_decode_every_type() {
        let messages = vec![
            TelemetryMessage::Direction(12),
            TelemetryMessage::DistanceBeforeDirection(64),
            TelemetryMessage::VectorPath(vec![GeoPoint::new(-33.5, 151.25)]),
            TelemetryMessage::KilometersRemaining(0),
            TelemetryMessage::TimeRemaining(45),
            TelemetryMessage::CurrentPosition(GeoPoint::new(10.125, -20.5)),
            TelemetryMessage::SpeedLimit(Some(130)),
        ];
        let mut decoder = FrameDecoder::new();
        for m in &messages {
            decoder.push(encode_frame(m).as_bytes());
        }
        for m in &messages {
            assert_eq!(decoder.next_message().as_ref(), Some(&Ok(m.clone())));
        }
    }
}
