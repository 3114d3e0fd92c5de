//! Accumulator/parser for the two streaming commands, `ListFiles` and
//! `StreamFile` (spec.md §4.4).
//!
//! Wire layout for one file-list entry, inferred from the minimum-entry-size
//! and trailing-signature constraints in spec.md §4.4 / §6:
//!
//! ```text
//! [recording_type: u8][size_bytes: u32 BE][filename_len: u16 BE][signature: [u8; 16]][filename: filename_len bytes]
//! ```
//!
//! A zero-length filename yields exactly [`FILE_LIST_MIN_ENTRY_LEN`] (23)
//! bytes, matching the spec's stated minimum.

use std::io::{self, Write};

use crate::model::FileEntry;
use crate::protocol::constants::{
    FILE_LIST_HEADER_MARKER, FILE_LIST_MIN_ENTRY_LEN, FILE_LIST_SIGNATURE_LEN,
};

/// Forward-only accumulator for `ListFiles` response chunks.
///
/// Owns every byte it has ever been fed; entries are parsed into owned
/// `FileEntry` records rather than borrowed slices, so the backing buffer
/// can be drained and reallocated freely without invalidating anything a
/// caller is holding (spec.md §4.4 "no buffer aliasing").
#[derive(Default)]
pub struct FileListAccumulator {
    buf: Vec<u8>,
    header_consumed: bool,
    pub announced_count: Option<u32>,
    pub entries: Vec<FileEntry>,
    pub saw_empty_chunk: bool,
}

impl FileListAccumulator {
    /// Feed one response chunk, parsing as many complete entries out of the
    /// prefix as possible. Stops at the first truncated entry and waits for
    /// more bytes on the next call.
    pub fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            self.saw_empty_chunk = true;
            return;
        }

        self.buf.extend_from_slice(chunk);

        // Wait until at least 6 bytes are buffered before deciding whether a
        // count header is present — chunk boundaries don't align with frame
        // boundaries, so the header can legitimately arrive split across
        // more than one `feed()` call.
        if !self.header_consumed && self.buf.len() >= 6 {
            self.header_consumed = true;
            if self.buf[0..2] == FILE_LIST_HEADER_MARKER {
                let count = u32::from_be_bytes([self.buf[2], self.buf[3], self.buf[4], self.buf[5]]);
                self.announced_count = Some(count);
                self.buf.drain(0..6);
            }
        }

        loop {
            match parse_one_entry(&self.buf) {
                Some((entry, consumed)) => {
                    self.entries.push(entry);
                    self.buf.drain(0..consumed);
                }
                None => break,
            }
        }
    }

    /// Per spec.md §4.4: done when the parsed count reaches the announced
    /// total, or an empty-body sentinel chunk has arrived.
    pub fn is_complete(&self) -> bool {
        self.saw_empty_chunk
            || matches!(self.announced_count, Some(total) if self.entries.len() as u32 >= total)
    }
}

fn parse_one_entry(buf: &[u8]) -> Option<(FileEntry, usize)> {
    if buf.len() < FILE_LIST_MIN_ENTRY_LEN {
        return None;
    }

    let recording_type = buf[0] as u32;
    let size_bytes = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as u64;
    let filename_len = u16::from_be_bytes([buf[5], buf[6]]) as usize;

    let signature_start = 7;
    let signature_end = signature_start + FILE_LIST_SIGNATURE_LEN;
    let filename_start = signature_end;
    let filename_end = filename_start + filename_len;

    if buf.len() < filename_end {
        return None;
    }

    let mut signature = [0u8; FILE_LIST_SIGNATURE_LEN];
    signature.copy_from_slice(&buf[signature_start..signature_end]);

    let filename = String::from_utf8_lossy(&buf[filename_start..filename_end]).into_owned();

    Some((
        FileEntry {
            filename,
            size_bytes,
            // Recording timestamp isn't carried on the wire; downstream
            // collaborators derive it from the filename if they need it.
            created_at: None,
            recording_type,
            signature,
        },
        filename_end,
    ))
}

/// Where `StreamFile` chunks land. A plain `std::fs::File` satisfies this
/// directly; the operations manager wraps it to also track cumulative bytes
/// written for progress reporting.
pub trait ChunkSink {
    fn write_chunk(&mut self, data: &[u8]) -> io::Result<()>;
}

impl ChunkSink for std::fs::File {
    fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_entry(recording_type: u8, size_bytes: u32, filename: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(recording_type);
        out.extend_from_slice(&size_bytes.to_be_bytes());
        out.extend_from_slice(&(filename.len() as u16).to_be_bytes());
        out.extend_from_slice(&[0xAB; FILE_LIST_SIGNATURE_LEN]);
        out.extend_from_slice(filename.as_bytes());
        out
    }

    #[test]
    fn parses_single_entry_with_header() {
        let mut acc = FileListAccumulator::default();
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&FILE_LIST_HEADER_MARKER);
        chunk.extend_from_slice(&1u32.to_be_bytes());
        chunk.extend_from_slice(&encode_entry(1, 1024, "20240101000000REC1.wav"));
        acc.feed(&chunk);

        assert_eq!(acc.announced_count, Some(1));
        assert_eq!(acc.entries.len(), 1);
        assert!(acc.is_complete());
        assert_eq!(acc.entries[0].size_bytes, 1024);
        assert_eq!(acc.entries[0].filename, "20240101000000REC1.wav");
    }

    #[test]
    fn truncated_entry_waits_for_more_bytes() {
        let mut acc = FileListAccumulator::default();
        let full = encode_entry(2, 2048, "short.wav");
        acc.feed(&full[..full.len() - 2]);
        assert!(acc.entries.is_empty());
        assert!(!acc.is_complete());

        acc.feed(&full[full.len() - 2..]);
        assert_eq!(acc.entries.len(), 1);
    }

    #[test]
    fn split_header_across_two_chunks_is_still_detected() {
        // First chunk is shorter than the 6-byte header marker + count; the
        // header must still be picked up once enough bytes accumulate.
        let mut acc = FileListAccumulator::default();
        let mut full = Vec::new();
        full.extend_from_slice(&FILE_LIST_HEADER_MARKER);
        full.extend_from_slice(&2u32.to_be_bytes());
        full.extend_from_slice(&encode_entry(1, 10, "a.wav"));
        full.extend_from_slice(&encode_entry(1, 20, "b.wav"));

        acc.feed(&full[..3]);
        assert_eq!(acc.announced_count, None);
        assert!(acc.entries.is_empty());

        acc.feed(&full[3..]);
        assert_eq!(acc.announced_count, Some(2));
        assert_eq!(acc.entries.len(), 2);
        assert!(acc.is_complete());
    }

    #[test]
    fn empty_chunk_sentinel_ends_stream_without_announced_count() {
        let mut acc = FileListAccumulator::default();
        acc.feed(&encode_entry(1, 10, "a.wav"));
        assert!(!acc.is_complete());
        acc.feed(&[]);
        assert!(acc.is_complete());
    }

    #[test]
    fn three_chunk_stream_matches_announced_count() {
        // Mirrors spec.md §8 scenario 3: header announces 348 entries across
        // three chunks (1 + 200 + 147), terminating once the count is hit.
        let mut acc = FileListAccumulator::default();

        let mut chunk1 = Vec::new();
        chunk1.extend_from_slice(&FILE_LIST_HEADER_MARKER);
        chunk1.extend_from_slice(&348u32.to_be_bytes());
        chunk1.extend_from_slice(&encode_entry(1, 1000, "e0.wav"));
        acc.feed(&chunk1);
        assert_eq!(acc.announced_count, Some(348));
        assert_eq!(acc.entries.len(), 1);
        assert!(!acc.is_complete());

        let mut chunk2 = Vec::new();
        for i in 1..201 {
            chunk2.extend_from_slice(&encode_entry(1, 1000 + i, &format!("e{i}.wav")));
        }
        acc.feed(&chunk2);
        assert_eq!(acc.entries.len(), 201);
        assert!(!acc.is_complete());

        let mut chunk3 = Vec::new();
        for i in 201..348 {
            chunk3.extend_from_slice(&encode_entry(1, 1000 + i, &format!("e{i}.wav")));
        }
        acc.feed(&chunk3);
        assert_eq!(acc.entries.len(), 348);
        assert!(acc.is_complete());

        let unique: std::collections::HashSet<&str> =
            acc.entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(unique.len(), 348);
    }

    #[test]
    fn zero_length_filename_hits_minimum_entry_size() {
        let mut acc = FileListAccumulator::default();
        let entry = encode_entry(0, 0, "");
        assert_eq!(entry.len(), FILE_LIST_MIN_ENTRY_LEN);
        acc.feed(&entry);
        acc.feed(&[]);
        assert_eq!(acc.entries.len(), 1);
        assert_eq!(acc.entries[0].filename, "");
    }
}
