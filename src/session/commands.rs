//! Typed operations exposed by [`super::Session`] (spec.md §4.3, §6).

use std::sync::atomic::Ordering;

use log::debug;

use crate::error::{JensenError, JensenResult};
use crate::model::{CardInfo, DeviceInfo, FileEntry, Settings, StatusCode};
use crate::protocol::constants::*;

use super::dispatch::Step;
use super::gating::{self, Feature};
use super::streaming::{ChunkSink, FileListAccumulator};
use super::{DEFAULT_COMMAND_TIMEOUT, Session};

/// Outcome of a command that can fail for a file-specific reason as well as
/// the usual transport/protocol ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpOutcome {
    Success,
    NotFound,
    Failed,
}

fn interpret_status(status: StatusCode) -> FileOpOutcome {
    match status.0 {
        STATUS_SUCCESS => FileOpOutcome::Success,
        STATUS_NOT_EXISTS => FileOpOutcome::NotFound,
        _ => FileOpOutcome::Failed,
    }
}

fn encode_bcd_datetime(datetime: &str) -> JensenResult<[u8; 7]> {
    let digits: Vec<u32> = datetime
        .chars()
        .filter(|c| c.is_ascii_digit())
        .map(|c| c.to_digit(10).unwrap())
        .collect();
    if digits.len() != 14 {
        return Err(JensenError::Io(std::io::ErrorKind::InvalidInput));
    }
    let mut out = [0u8; 7];
    for (i, pair) in digits.chunks(2).enumerate() {
        out[i] = ((pair[0] as u8) << 4) | pair[1] as u8;
    }
    Ok(out)
}

fn decode_bcd_datetime(bytes: &[u8; 7]) -> String {
    let mut s = String::with_capacity(14);
    for byte in bytes {
        s.push(char::from_digit((byte >> 4) as u32, 10).unwrap_or('0'));
        s.push(char::from_digit((byte & 0x0F) as u32, 10).unwrap_or('0'));
    }
    s
}

impl Session {
    /// Short-circuit guard shared by every auxiliary query that must defer
    /// to an in-progress stream (spec.md §4.3 "Mutual exclusion").
    fn streaming_guard(&self) -> JensenResult<()> {
        if self.is_streaming() {
            Err(JensenError::Busy)
        } else {
            Ok(())
        }
    }

    pub async fn get_device_info(&self) -> JensenResult<DeviceInfo> {
        if self.is_streaming() {
            return self
                .cached_device_info
                .lock()
                .unwrap()
                .clone()
                .ok_or(JensenError::Busy);
        }

        let mut guard = self.inner.lock().await;
        let info = guard
            .drive(
                CMD_GET_DEVICE_INFO,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| {
                    if frame.body.len() < 4 {
                        return Step::Error(JensenError::ProtocolDesync);
                    }
                    let version_code = frame.body[0];
                    let version_number = u32::from_be_bytes([0, frame.body[1], frame.body[2], frame.body[3]]);
                    let serial_bytes = &frame.body[4..];
                    let serial_number = serial_bytes
                        .split(|&b| b == 0)
                        .next()
                        .map(|s| String::from_utf8_lossy(s).into_owned())
                        .unwrap_or_default();
                    Step::Final(DeviceInfo {
                        version_code,
                        version_number,
                        serial_number,
                    })
                },
                (),
            )
            .await?;
        drop(guard);

        *self.cached_device_info.lock().unwrap() = Some(info.clone());
        Ok(info)
    }

    pub async fn get_time(&self) -> JensenResult<String> {
        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_GET_TIME,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| {
                    if frame.body.len() != 7 {
                        return Step::Error(JensenError::ProtocolDesync);
                    }
                    let mut bytes = [0u8; 7];
                    bytes.copy_from_slice(&frame.body);
                    Step::Final(decode_bcd_datetime(&bytes))
                },
                (),
            )
            .await
    }

    pub async fn set_time(&self, datetime: &str) -> JensenResult<StatusCode> {
        if self.streaming_guard().is_err() {
            // Per spec.md §4.3, set-time short-circuits rather than
            // contending for the transport while a stream owns it.
            return Ok(StatusCode(STATUS_BUSY_OR_FAILED));
        }

        let body = encode_bcd_datetime(datetime)?.to_vec();
        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_SET_TIME,
                body,
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await
    }

    pub async fn get_file_count(&self) -> JensenResult<u32> {
        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_GET_FILE_COUNT,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| {
                    if frame.body.len() != 4 {
                        return Step::Error(JensenError::ProtocolDesync);
                    }
                    let count = u32::from_be_bytes(frame.body[..4].try_into().unwrap());
                    Step::Final(count)
                },
                (),
            )
            .await
    }

    /// Legacy firmware omits the in-band file-count header, so older
    /// devices need a `GetFileCount` round trip before `ListFiles` can
    /// know when it's done without relying on the empty-chunk sentinel
    /// alone (spec.md §4.4, §8 scenario 2).
    pub async fn list_files(&self) -> JensenResult<Vec<FileEntry>> {
        let firmware = self.firmware_version().await?;
        let _guard = self.begin_streaming();

        let pre_announced = if firmware < FW_LIST_FILES_COUNT_HEADER {
            let count = self.get_file_count().await?;
            if count == 0 {
                return Ok(Vec::new());
            }
            Some(count)
        } else {
            None
        };

        let mut inner = self.inner.lock().await;
        let mut acc = FileListAccumulator::default();
        if let Some(count) = pre_announced {
            acc.announced_count = Some(count);
        }

        inner
            .drive_streaming(
                CMD_LIST_FILES,
                Vec::new(),
                |frame, acc: &mut FileListAccumulator| {
                    acc.feed(&frame.body);
                    if acc.is_complete() {
                        Step::Final(std::mem::take(&mut acc.entries))
                    } else {
                        Step::Continue
                    }
                },
                acc,
                || false,
            )
            .await
    }

    /// Stream a file to `sink`, returning total bytes written.
    ///
    /// `expected_size` must come from a metadata cache per spec.md §4.4;
    /// this method never re-lists files to discover it.
    pub async fn stream_file(
        &self,
        filename: &str,
        expected_size: u64,
        sink: &mut dyn ChunkSink,
        mut should_cancel: impl FnMut() -> bool,
        mut on_progress: impl FnMut(u64),
    ) -> JensenResult<u64> {
        let _guard = self.begin_streaming();
        let mut inner = self.inner.lock().await;

        inner
            .drive_streaming(
                CMD_STREAM_FILE,
                filename.as_bytes().to_vec(),
                |frame, bytes_written: &mut u64| {
                    if !frame.body.is_empty() {
                        if let Err(e) = sink.write_chunk(&frame.body) {
                            return Step::Error(JensenError::Io(e.kind()));
                        }
                        *bytes_written += frame.body.len() as u64;
                        on_progress(*bytes_written);
                    }
                    if *bytes_written >= expected_size {
                        Step::Final(*bytes_written)
                    } else {
                        Step::Continue
                    }
                },
                0u64,
                &mut should_cancel,
            )
            .await
    }

    pub async fn delete_file(&self, filename: &str) -> JensenResult<FileOpOutcome> {
        if self.streaming_guard().is_err() {
            return Ok(FileOpOutcome::Failed);
        }

        let mut guard = self.inner.lock().await;
        let status = guard
            .drive(
                CMD_DELETE_FILE,
                filename.as_bytes().to_vec(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await?;
        Ok(interpret_status(status))
    }

    pub async fn format_card(&self) -> JensenResult<FileOpOutcome> {
        let firmware = self.firmware_version().await?;
        gating::check(Feature::StorageOps, self.profile.model, firmware)?;

        let mut guard = self.inner.lock().await;
        let status = guard
            .drive(
                CMD_FORMAT_CARD,
                FORMAT_CARD_MAGIC.to_vec(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await?;
        Ok(interpret_status(status))
    }

    pub async fn get_card_info(&self) -> JensenResult<CardInfo> {
        let firmware = self.firmware_version().await?;
        gating::check(Feature::StorageOps, self.profile.model, firmware)?;

        if self.is_streaming() {
            return self
                .cached_card_info
                .lock()
                .unwrap()
                .ok_or(JensenError::Busy);
        }

        let mut guard = self.inner.lock().await;
        let info = guard
            .drive(
                CMD_GET_CARD_INFO,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| {
                    if frame.body.len() != 12 {
                        return Step::Error(JensenError::ProtocolDesync);
                    }
                    let used_bytes = u32::from_be_bytes(frame.body[0..4].try_into().unwrap()) as u64;
                    let capacity_bytes = u32::from_be_bytes(frame.body[4..8].try_into().unwrap()) as u64;
                    let status_raw = u32::from_be_bytes(frame.body[8..12].try_into().unwrap());
                    Step::Final(CardInfo {
                        used_bytes,
                        capacity_bytes,
                        status_raw,
                    })
                },
                (),
            )
            .await?;
        drop(guard);

        *self.cached_card_info.lock().unwrap() = Some(info);
        Ok(info)
    }

    pub async fn get_recording_filename(&self) -> JensenResult<Option<String>> {
        if self.is_streaming() {
            return Ok(self.cached_recording_filename.lock().unwrap().clone());
        }

        let mut guard = self.inner.lock().await;
        let name = guard
            .drive(
                CMD_GET_RECORDING_FILE,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| {
                    if frame.body.is_empty() {
                        Step::Final(None)
                    } else {
                        Step::Final(Some(String::from_utf8_lossy(&frame.body).into_owned()))
                    }
                },
                (),
            )
            .await?;
        drop(guard);

        *self.cached_recording_filename.lock().unwrap() = name.clone();
        Ok(name)
    }

    pub async fn get_settings(&self) -> JensenResult<Settings> {
        let firmware = self.firmware_version().await?;
        gating::check(Feature::Settings, self.profile.model, firmware)?;

        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_GET_SETTINGS,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| {
                    if frame.body.len() != 16 {
                        return Step::Error(JensenError::ProtocolDesync);
                    }
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(&frame.body);
                    Step::Final(Settings::decode(raw))
                },
                (),
            )
            .await
    }

    pub async fn set_settings(&self, settings: Settings) -> JensenResult<StatusCode> {
        let firmware = self.firmware_version().await?;
        gating::check(Feature::Settings, self.profile.model, firmware)?;

        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_SET_SETTINGS,
                settings.encode().to_vec(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await
    }

    pub async fn factory_reset(&self) -> JensenResult<StatusCode> {
        let firmware = self.firmware_version().await?;
        gating::check(Feature::FactoryReset, self.profile.model, firmware)?;
        self.send_factory_reset_command().await
    }

    pub async fn restore_factory_settings(&self) -> JensenResult<StatusCode> {
        let firmware = self.firmware_version().await?;
        gating::check(Feature::RestoreFactorySettings, self.profile.model, firmware)?;
        self.send_factory_reset_command().await
    }

    async fn send_factory_reset_command(&self) -> JensenResult<StatusCode> {
        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_FACTORY_RESET,
                Vec::new(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await
    }

    pub async fn request_firmware_upgrade(&self, size: u32, crc: u32) -> JensenResult<StatusCode> {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&size.to_be_bytes());
        body.extend_from_slice(&crc.to_be_bytes());

        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_REQUEST_FIRMWARE_UPGRADE,
                body,
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await
    }

    pub async fn upload_firmware_chunk(&self, chunk: &[u8]) -> JensenResult<StatusCode> {
        let mut guard = self.inner.lock().await;
        guard
            .drive(
                CMD_FIRMWARE_UPLOAD,
                chunk.to_vec(),
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| status_byte_step(&frame.body),
                (),
            )
            .await
    }

    pub async fn bluetooth_scan(&self) -> JensenResult<Vec<u8>> {
        self.require_bluetooth_family()?;
        self.bluetooth_roundtrip(CMD_BLUETOOTH_SCAN, Vec::new()).await
    }

    pub async fn bluetooth_connect(&self, mac: &[u8; 6]) -> JensenResult<Vec<u8>> {
        self.require_bluetooth_family()?;
        self.bluetooth_roundtrip(CMD_BLUETOOTH_CMD, mac.to_vec()).await
    }

    pub async fn bluetooth_disconnect(&self) -> JensenResult<Vec<u8>> {
        self.require_bluetooth_family()?;
        self.bluetooth_roundtrip(CMD_BLUETOOTH_CMD, vec![0x00]).await
    }

    pub async fn bluetooth_status(&self) -> JensenResult<Vec<u8>> {
        self.require_bluetooth_family()?;
        self.bluetooth_roundtrip(CMD_BLUETOOTH_STATUS, Vec::new()).await
    }

    /// Bluetooth family gating (spec.md §4.3) is purely per-model, not
    /// per-firmware, so this passes a firmware value that can never clear
    /// the `Some(u32::MAX)` sentinel gate on non-P1 models.
    fn require_bluetooth_family(&self) -> JensenResult<()> {
        gating::check(Feature::BluetoothFamily, self.profile.model, u32::MAX)
    }

    async fn bluetooth_roundtrip(&self, command_id: u16, body: Vec<u8>) -> JensenResult<Vec<u8>> {
        let mut guard = self.inner.lock().await;
        guard
            .drive(
                command_id,
                body,
                DEFAULT_COMMAND_TIMEOUT,
                |frame, _acc| Step::Final(frame.body.clone()),
                (),
            )
            .await
    }

    /// A cheap liveness probe, guarded against reentrancy so it is never
    /// invoked from inside another command's own send path (spec.md §4.3).
    pub async fn health_check(&self) -> JensenResult<bool> {
        if self.health_check_in_progress.swap(true, Ordering::AcqRel) {
            debug!("health check already in progress, skipping reentrant call");
            return Ok(true);
        }
        let _guard = ResetFlagOnDrop(&self.health_check_in_progress);

        let mut guard = self.inner.lock().await;
        let result = guard
            .drive(
                CMD_GET_DEVICE_INFO,
                Vec::new(),
                std::time::Duration::from_millis(750),
                |frame, _acc| {
                    if frame.body.len() >= 4 {
                        Step::Final(())
                    } else {
                        Step::Error(JensenError::ProtocolDesync)
                    }
                },
                (),
            )
            .await;

        Ok(result.is_ok())
    }
}

fn status_byte_step(body: &[u8]) -> Step<StatusCode> {
    if body.is_empty() {
        Step::Error(JensenError::ProtocolDesync)
    } else {
        Step::Final(StatusCode(body[0]))
    }
}

struct ResetFlagOnDrop<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for ResetFlagOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcd_round_trip() {
        let encoded = encode_bcd_datetime("20240315143022").unwrap();
        assert_eq!(decode_bcd_datetime(&encoded), "20240315143022");
    }

    #[test]
    fn bcd_rejects_wrong_digit_count() {
        assert!(encode_bcd_datetime("2024").is_err());
    }

    #[test]
    fn status_interpretation_matches_table() {
        assert_eq!(interpret_status(StatusCode(STATUS_SUCCESS)), FileOpOutcome::Success);
        assert_eq!(interpret_status(StatusCode(STATUS_NOT_EXISTS)), FileOpOutcome::NotFound);
        assert_eq!(interpret_status(StatusCode(STATUS_BUSY_OR_FAILED)), FileOpOutcome::Failed);
    }

    /// Mirrors spec.md §8 scenario 1: the device info reply's 4-byte
    /// version field splits into a 1-byte code and a 24-bit version number.
    #[test]
    fn device_info_version_field_splits_as_code_plus_24bit_number() {
        let body = [0x00u8, 0x05, 0x00, 0x22];
        let version_code = body[0];
        let version_number = u32::from_be_bytes([0, body[1], body[2], body[3]]);
        assert_eq!(version_code, 0);
        assert_eq!(version_number, 327714);
    }
}
