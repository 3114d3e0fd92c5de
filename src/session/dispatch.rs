//! The generic request/response and streaming drive loops shared by every
//! typed command in [`super::commands`].
//!
//! Design note (spec.md §9): rather than a mutable global `cmd_id →
//! handler` map, each call site supplies its own handler closure at send
//! time; the "handler registered for a command_id" from spec.md §4.2 is
//! realized here as "the closure the currently active request installed",
//! which is equivalent for a protocol with at most one request in flight
//! (enforced by [`super::SessionInner`] living behind a single async mutex).

use std::time::Duration;

use log::{debug, error, warn};
use tokio::time::Instant;

use crate::error::{JensenError, JensenResult};
use crate::protocol::constants::{
    CMD_BLUETOOTH_CMD, CMD_BLUETOOTH_SCAN, CMD_BLUETOOTH_STATUS, CMD_DELETE_FILE,
    CMD_FACTORY_RESET, CMD_FIRMWARE_UPLOAD, CMD_FORMAT_CARD, CMD_GET_CARD_INFO,
    CMD_GET_DEVICE_INFO, CMD_GET_FILE_COUNT, CMD_GET_RECORDING_FILE, CMD_GET_SETTINGS,
    CMD_GET_TIME, CMD_LIST_FILES, CMD_REQUEST_FIRMWARE_UPGRADE, CMD_SET_SETTINGS, CMD_SET_TIME,
    CMD_STREAM_FILE, STREAM_STALL_INTERVAL, STREAM_STALL_THRESHOLD,
};
use crate::protocol::framer::FramerEvent;
use crate::protocol::packet::{Frame, encode};

use super::SessionInner;

pub fn is_known_command(command_id: u16) -> bool {
    matches!(
        command_id,
        CMD_GET_DEVICE_INFO
            | CMD_GET_TIME
            | CMD_SET_TIME
            | CMD_LIST_FILES
            | CMD_STREAM_FILE
            | CMD_GET_FILE_COUNT
            | CMD_DELETE_FILE
            | CMD_REQUEST_FIRMWARE_UPGRADE
            | CMD_FIRMWARE_UPLOAD
            | CMD_GET_SETTINGS
            | CMD_SET_SETTINGS
            | CMD_GET_CARD_INFO
            | CMD_FORMAT_CARD
            | CMD_GET_RECORDING_FILE
            | CMD_BLUETOOTH_SCAN
            | CMD_BLUETOOTH_CMD
            | CMD_BLUETOOTH_STATUS
            | CMD_FACTORY_RESET
    )
}

/// Outcome a per-frame step function returns to drive the request loop.
pub enum Step<T> {
    Continue,
    Final(T),
    Error(JensenError),
}

impl SessionInner {
    fn next_sequence_id(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn record_protocol_error(&mut self) {
        self.consecutive_protocol_errors += 1;
        if self.consecutive_protocol_errors >= 2 {
            warn!("second consecutive protocol error, marking session for reconnect");
            self.needs_reconnect = true;
        }
    }

    fn record_protocol_success(&mut self) {
        self.consecutive_protocol_errors = 0;
    }

    /// Per spec.md §7: a transport-level failure (lost device, broken
    /// pipe, …) fails the session fast from then on rather than letting
    /// every subsequent command rediscover the same dead handle.
    fn record_transport_error(&mut self) {
        warn!("transport error observed, marking session for reconnect");
        self.needs_reconnect = true;
    }

    /// Drive a non-streaming command to completion within an overall
    /// deadline. Used for everything except `ListFiles` / `StreamFile`.
    pub async fn drive<A, R>(
        &mut self,
        command_id: u16,
        body: Vec<u8>,
        timeout: Duration,
        mut step: impl FnMut(Frame, &mut A) -> Step<R>,
        mut acc: A,
    ) -> JensenResult<R> {
        if self.needs_reconnect {
            return Err(JensenError::Disconnected);
        }

        let sequence_id = self.next_sequence_id();
        let packet = encode(command_id, sequence_id, &body);
        if let Err(e) = self.transport.write(&packet).await {
            self.record_transport_error();
            return Err(e);
        }

        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                error!("command {command_id:#06x} timed out waiting for response");
                return Err(JensenError::Timeout);
            }

            let outcome = match self.transport.read(remaining).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.record_transport_error();
                    return Err(e);
                }
            };
            let chunk = match outcome {
                crate::transport::ReadOutcome::Data(bytes) => bytes,
                crate::transport::ReadOutcome::TimedOut => {
                    error!("command {command_id:#06x} timed out waiting for response");
                    return Err(JensenError::Timeout);
                }
            };

            for event in self.framer.feed(&chunk) {
                match event {
                    FramerEvent::Desync => {
                        self.record_protocol_error();
                        return Err(JensenError::ProtocolDesync);
                    }
                    FramerEvent::Frame(frame) => {
                        if frame.command_id != command_id {
                            if is_known_command(frame.command_id) {
                                self.record_protocol_error();
                                return Err(JensenError::UnexpectedCommand);
                            }
                            debug!("dropping frame for unregistered command {:#06x}", frame.command_id);
                            continue;
                        }

                        self.record_protocol_success();
                        match step(frame, &mut acc) {
                            Step::Continue => continue,
                            Step::Final(value) => return Ok(value),
                            Step::Error(e) => return Err(e),
                        }
                    }
                }
            }
        }
    }

    /// Drive a streaming command (`ListFiles` / `StreamFile`). Per-chunk
    /// waits are not individually time-limited; instead, consecutive
    /// no-data reads are counted and only escalate to a hard failure after
    /// [`STREAM_STALL_THRESHOLD`] consecutive empty waits of
    /// [`STREAM_STALL_INTERVAL`] each.
    pub async fn drive_streaming<A, R>(
        &mut self,
        command_id: u16,
        body: Vec<u8>,
        mut step: impl FnMut(Frame, &mut A) -> Step<R>,
        mut acc: A,
        mut should_cancel: impl FnMut() -> bool,
    ) -> JensenResult<R> {
        if self.needs_reconnect {
            return Err(JensenError::Disconnected);
        }

        let sequence_id = self.next_sequence_id();
        let packet = encode(command_id, sequence_id, &body);
        if let Err(e) = self.transport.write(&packet).await {
            self.record_transport_error();
            return Err(e);
        }

        let mut consecutive_stalls = 0u32;

        loop {
            if should_cancel() {
                self.drain_after_cancel(command_id).await;
                return Err(JensenError::Cancelled);
            }

            let outcome = match self.transport.read(STREAM_STALL_INTERVAL).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.record_transport_error();
                    return Err(e);
                }
            };
            let chunk = match outcome {
                crate::transport::ReadOutcome::Data(bytes) => {
                    consecutive_stalls = 0;
                    bytes
                }
                crate::transport::ReadOutcome::TimedOut => {
                    consecutive_stalls += 1;
                    if consecutive_stalls >= STREAM_STALL_THRESHOLD {
                        error!(
                            "command {command_id:#06x} stalled: {consecutive_stalls} consecutive empty waits"
                        );
                        return Err(JensenError::Timeout);
                    }
                    debug!(
                        "command {command_id:#06x} inter-chunk wait ({consecutive_stalls}/{STREAM_STALL_THRESHOLD})"
                    );
                    continue;
                }
            };

            for event in self.framer.feed(&chunk) {
                match event {
                    FramerEvent::Desync => {
                        self.record_protocol_error();
                        return Err(JensenError::ProtocolDesync);
                    }
                    FramerEvent::Frame(frame) => {
                        if frame.command_id != command_id {
                            if is_known_command(frame.command_id) {
                                self.record_protocol_error();
                                return Err(JensenError::UnexpectedCommand);
                            }
                            debug!("dropping frame for unregistered command {:#06x}", frame.command_id);
                            continue;
                        }

                        self.record_protocol_success();
                        match step(frame, &mut acc) {
                            Step::Continue => continue,
                            Step::Final(value) => return Ok(value),
                            Step::Error(e) => return Err(e),
                        }
                    }
                }
            }
        }
    }

    /// After a cancellation, drain whatever the device is still in the
    /// middle of sending so the next command doesn't trip over stale bytes.
    /// Stops at the first empty read or a short timeout, whichever comes
    /// first.
    async fn drain_after_cancel(&mut self, command_id: u16) {
        use crate::protocol::constants::CANCEL_DRAIN_TIMEOUT;
        loop {
            match self.transport.read(CANCEL_DRAIN_TIMEOUT).await {
                Ok(crate::transport::ReadOutcome::Data(bytes)) if !bytes.is_empty() => {
                    debug!("draining {} bytes after cancel of {command_id:#06x}", bytes.len());
                    let _ = self.framer.feed(&bytes);
                }
                _ => break,
            }
        }
    }
}
