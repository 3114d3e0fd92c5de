//! Append-only receive buffer with sync-byte resync (spec.md §4.2).

use memchr::memchr;

use super::constants::{FRAME_HEADER_LEN, SYNC_BYTES};
use super::packet::{Frame, ParseOutcome, try_parse_one};

/// One decode event extracted from the receive buffer.
#[derive(Debug)]
pub enum FramerEvent {
    /// A complete frame was decoded.
    Frame(Frame),
    /// Sync bytes were not found where expected; the buffer was advanced by
    /// one byte to attempt resync. At most one of these is emitted per
    /// contiguous run of garbage before the next valid sync (or end of
    /// buffer), since after advancing we immediately re-scan.
    Desync,
}

/// Decodes a stream of byte chunks into frames.
///
/// The backing buffer is append-only within a single decode pass: entries
/// are drained from the front once consumed, and the buffer is never
/// reallocated out from under a view a caller might be holding, because no
/// view is ever handed out — only owned [`Frame`]s with their own `Vec<u8>`
/// body.
#[derive(Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    pub fn new() -> Framer {
        Framer { buf: Vec::new() }
    }

    /// Feed newly-read bytes and extract as many complete events as
    /// possible. Bytes that don't yet form a complete frame remain buffered
    /// for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<FramerEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut offset = 0usize;

        loop {
            if self.buf.len() - offset < FRAME_HEADER_LEN {
                break;
            }

            let window = &self.buf[offset..];

            if !window.starts_with(&SYNC_BYTES) {
                // Resync: scan forward for the next occurrence of the first
                // sync byte, then check the second. Advance one byte at a
                // time so we never skip past a valid frame that starts
                // mid-garbage.
                match memchr(SYNC_BYTES[0], &window[1..]) {
                    Some(rel) => offset += 1 + rel,
                    None => {
                        offset = self.buf.len();
                    }
                }
                events.push(FramerEvent::Desync);
                continue;
            }

            match try_parse_one(window) {
                ParseOutcome::Incomplete => break,
                ParseOutcome::Oversized => {
                    // Malformed frame: resync past the bad sync prologue
                    // rather than trusting its declared length.
                    offset += 1;
                    events.push(FramerEvent::Desync);
                }
                ParseOutcome::Parsed { frame, consumed } => {
                    offset += consumed;
                    events.push(FramerEvent::Frame(frame));
                }
            }
        }

        self.buf.drain(..offset);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::encode;

    #[test]
    fn garbage_prefix_then_valid_frame_resyncs_once() {
        let mut framer = Framer::new();
        let mut input = vec![0xAA, 0xBB, 0xCC];
        input.extend_from_slice(&encode(0x04, 1, b"ok"));

        let events = framer.feed(&input);
        let desyncs = events
            .iter()
            .filter(|e| matches!(e, FramerEvent::Desync))
            .count();
        let frames: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                FramerEvent::Frame(f) => Some(f),
                _ => None,
            })
            .collect();

        // The spec requires at most one ProtocolDesync per resync attempt,
        // however many garbage bytes are actually skipped.
        assert_eq!(desyncs, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, b"ok");
    }

    #[test]
    fn empty_body_frame_is_delivered() {
        let mut framer = Framer::new();
        let events = framer.feed(&encode(0x04, 1, &[]));
        assert!(matches!(&events[0], FramerEvent::Frame(f) if f.body.is_empty()));
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut framer = Framer::new();
        let mut input = encode(0x04, 1, b"a");
        input.extend_from_slice(&encode(0x04, 2, b"bb"));
        input.extend_from_slice(&encode(0x04, 3, b"ccc"));

        let events = framer.feed(&input);
        let frames: Vec<_> = events
            .into_iter()
            .filter_map(|e| match e {
                FramerEvent::Frame(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].sequence_id, 1);
        assert_eq!(frames[1].sequence_id, 2);
        assert_eq!(frames[2].sequence_id, 3);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut framer = Framer::new();
        let encoded = encode(0x04, 1, b"payload");
        let (first, second) = encoded.split_at(FRAME_HEADER_LEN + 2);

        let events = framer.feed(first);
        assert!(events.is_empty());

        let events = framer.feed(second);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FramerEvent::Frame(f) if f.body == b"payload"));
    }

    #[test]
    fn fragmented_at_every_byte_offset_still_yields_frame() {
        let encoded = encode(0x05, 9, b"streamed-bytes");
        for split in 0..=encoded.len() {
            let mut framer = Framer::new();
            let mut frames = Vec::new();
            for event in framer.feed(&encoded[..split]) {
                if let FramerEvent::Frame(f) = event {
                    frames.push(f);
                }
            }
            for event in framer.feed(&encoded[split..]) {
                if let FramerEvent::Frame(f) = event {
                    frames.push(f);
                }
            }
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].body, b"streamed-bytes");
        }
    }
}
