//! Pure duration-inference formula. The only domain rule required to be
//! bit-identical to the reference device firmware.

/// Filename format recognized for duration inference, selecting the base
/// formula applied before the `recording_type` adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameFormat {
    /// `YYYYMMDDHHMMSSREC\d+.wav`
    Legacy,
    /// `YYYYMmmDD-HHMMSS-Rec\d+.hda`
    Modern,
}

pub fn detect_format(filename: &str) -> Option<FilenameFormat> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".wav") && lower.contains("rec") {
        Some(FilenameFormat::Legacy)
    } else if lower.ends_with(".hda") && lower.contains("-rec") {
        Some(FilenameFormat::Modern)
    } else {
        None
    }
}

/// Duration in seconds, computed from the declared file size and recording
/// type. `recording_type` values outside `{1,2,3,5}` fall back to the base
/// formula per the reference implementation (the source does not document
/// their meaning, so they are carried through verbatim rather than guessed
/// at).
pub fn duration_seconds(format: FilenameFormat, recording_type: u32, size_bytes: u64) -> f64 {
    let size = size_bytes as f64;

    let base = match format {
        FilenameFormat::Legacy => size / 32.0,
        FilenameFormat::Modern => (size / 32.0) * 4.0,
    };

    match recording_type {
        1 => base * 2.0,
        2 => (size - 44.0) / 48.0 / 2.0,
        3 => (size - 44.0) / 48.0 / 2.0 / 2.0,
        5 => size / 12.0,
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_legacy_and_modern_formats() {
        assert_eq!(
            detect_format("20250711223631REC04.wav"),
            Some(FilenameFormat::Legacy)
        );
        assert_eq!(
            detect_format("2025Jul11-223631-Rec04.hda"),
            Some(FilenameFormat::Modern)
        );
        assert_eq!(detect_format("readme.txt"), None);
    }

    #[test]
    fn base_formula_legacy() {
        let d = duration_seconds(FilenameFormat::Legacy, 0, 3200.0 as u64);
        assert_eq!(d, 100.0);
    }

    #[test]
    fn base_formula_modern() {
        let d = duration_seconds(FilenameFormat::Modern, 0, 3200);
        assert_eq!(d, 400.0);
    }

    #[test]
    fn recording_type_adjustments() {
        assert_eq!(
            duration_seconds(FilenameFormat::Legacy, 1, 3200),
            200.0 // base * 2
        );
        assert_eq!(
            duration_seconds(FilenameFormat::Legacy, 2, 524.0 as u64),
            (524.0 - 44.0) / 48.0 / 2.0
        );
        assert_eq!(
            duration_seconds(FilenameFormat::Legacy, 3, 524),
            (524.0 - 44.0) / 48.0 / 2.0 / 2.0
        );
        assert_eq!(duration_seconds(FilenameFormat::Legacy, 5, 1200), 100.0);
    }

    #[test]
    fn unknown_recording_type_falls_back_to_base() {
        let base = duration_seconds(FilenameFormat::Legacy, 0, 6400);
        let unknown = duration_seconds(FilenameFormat::Legacy, 42, 6400);
        assert_eq!(base, unknown);
    }
}
