//! Wire packet encoding and decoding (spec.md §3, §4.2, §6).

use super::constants::{FRAME_HEADER_LEN, MAX_BODY_LEN, SYNC_BYTES};

/// A decoded response frame: command id, sequence id (host-assigned on the
/// way out; echoed back verbatim by some firmware but never relied upon for
/// correlation — responses are paired by command id, not sequence, per
/// spec.md §3), and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command_id: u16,
    pub sequence_id: u32,
    pub body: Vec<u8>,
}

/// Serialize a command packet for transmission.
///
/// ```text
/// [0x12][0x34][cmd_hi][cmd_lo][seq32 BE][body_len32 BE][body...]
/// ```
/// The host never emits a checksum length (top byte of the length field is
/// always zero on encode).
pub fn encode(command_id: u16, sequence_id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    out.extend_from_slice(&SYNC_BYTES);
    out.extend_from_slice(&command_id.to_be_bytes());
    out.extend_from_slice(&sequence_id.to_be_bytes());
    let length_field = body.len() as u32 & 0x00FF_FFFF;
    out.extend_from_slice(&length_field.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Outcome of attempting to parse one frame from the head of a buffer that
/// is already known to start with valid sync bytes.
pub enum ParseOutcome {
    /// Not enough bytes buffered yet; try again once more data arrives.
    Incomplete,
    /// The declared body length exceeds the maximum legal packet size.
    Oversized,
    /// A complete frame was parsed; `consumed` bytes should be drained from
    /// the front of the buffer.
    Parsed { frame: Frame, consumed: usize },
}

/// Attempt to parse a single frame from `buf`, which must begin with
/// [`SYNC_BYTES`]. Checksum bytes (if any) are consumed but not validated,
/// per spec.md §9's Open Question on checksum handling.
pub fn try_parse_one(buf: &[u8]) -> ParseOutcome {
    debug_assert!(buf.starts_with(&SYNC_BYTES));

    if buf.len() < FRAME_HEADER_LEN {
        return ParseOutcome::Incomplete;
    }

    let command_id = u16::from_be_bytes([buf[2], buf[3]]);
    let sequence_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let length_field = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

    let body_len = (length_field & 0x00FF_FFFF) as usize;
    let cksum_len = ((length_field >> 24) & 0xFF) as usize;

    if body_len > MAX_BODY_LEN {
        return ParseOutcome::Oversized;
    }

    let total = FRAME_HEADER_LEN + body_len + cksum_len;
    if buf.len() < total {
        return ParseOutcome::Incomplete;
    }

    let body = buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + body_len].to_vec();

    ParseOutcome::Parsed {
        frame: Frame {
            command_id,
            sequence_id,
            body,
        },
        consumed: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_body() {
        let body = b"hello".to_vec();
        let encoded = encode(0x04, 7, &body);
        match try_parse_one(&encoded) {
            ParseOutcome::Parsed { frame, consumed } => {
                assert_eq!(frame.command_id, 0x04);
                assert_eq!(frame.sequence_id, 7);
                assert_eq!(frame.body, body);
                assert_eq!(consumed, encoded.len());
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn round_trip_empty_body() {
        let encoded = encode(0x04, 1, &[]);
        match try_parse_one(&encoded) {
            ParseOutcome::Parsed { frame, consumed } => {
                assert!(frame.body.is_empty());
                assert_eq!(consumed, FRAME_HEADER_LEN);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn incomplete_header() {
        let encoded = encode(0x01, 1, b"abc");
        for cut in 0..FRAME_HEADER_LEN {
            match try_parse_one(&encoded[..cut.min(encoded.len())]) {
                ParseOutcome::Incomplete => {}
                other => panic!("expected Incomplete at cut={cut}, got {:?}", discriminant(&other)),
            }
        }
    }

    #[test]
    fn incomplete_body() {
        let encoded = encode(0x01, 1, b"abcdef");
        let cut = FRAME_HEADER_LEN + 2;
        match try_parse_one(&encoded[..cut]) {
            ParseOutcome::Incomplete => {}
            other => panic!("expected Incomplete, got {:?}", discriminant(&other)),
        }
    }

    #[test]
    fn oversized_body_rejected() {
        let mut header = Vec::new();
        header.extend_from_slice(&SYNC_BYTES);
        header.extend_from_slice(&0x04u16.to_be_bytes());
        header.extend_from_slice(&1u32.to_be_bytes());
        let body_len = (MAX_BODY_LEN + 1) as u32;
        header.extend_from_slice(&body_len.to_be_bytes());
        match try_parse_one(&header) {
            ParseOutcome::Oversized => {}
            other => panic!("expected Oversized, got {:?}", discriminant(&other)),
        }
    }

    #[test]
    fn fragmented_arrival_at_every_offset() {
        let encoded = encode(0x04, 42, b"fragment-test-body");
        for split in 0..=encoded.len() {
            let mut buf = encoded[..split].to_vec();
            // Feed the rest in one more chunk; parsing only ever looks at
            // what is currently buffered so this simulates arbitrary
            // fragmentation.
            if split < encoded.len() {
                assert!(matches!(try_parse_one(&buf), ParseOutcome::Incomplete));
            }
            buf.extend_from_slice(&encoded[split..]);
            match try_parse_one(&buf) {
                ParseOutcome::Parsed { frame, consumed } => {
                    assert_eq!(frame.command_id, 0x04);
                    assert_eq!(consumed, encoded.len());
                }
                other => panic!("expected Parsed, got {:?}", discriminant(&other)),
            }
        }
    }

    fn discriminant(outcome: &ParseOutcome) -> &'static str {
        match outcome {
            ParseOutcome::Incomplete => "Incomplete",
            ParseOutcome::Oversized => "Oversized",
            ParseOutcome::Parsed { .. } => "Parsed",
        }
    }
}
