//! The session layer: one [`Session`] owns the claimed [`Transport`] and
//! the framing state for a single connected device, and serializes every
//! request through an async mutex so at most one command is ever in
//! flight (spec.md §4.2, §5).

pub mod commands;
pub mod dispatch;
pub mod gating;
pub mod streaming;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as SyncMutex;
use std::time::Duration;

use log::info;
use tokio::sync::Mutex;

use crate::error::JensenResult;
use crate::model::{CardInfo, DeviceInfo, DeviceProfile};
use crate::protocol::framer::Framer;
use crate::transport::Transport;

/// Default overall deadline for a non-streaming command (spec.md §5).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// State behind the session mutex: only what a command actually needs to
/// touch the wire. Caches that must stay reachable while a stream holds
/// this mutex for its whole duration live on [`Session`] instead, guarded
/// by their own plain `std::sync::Mutex` (spec.md §4.3's streaming
/// short-circuit would deadlock otherwise).
pub struct SessionInner {
    pub(crate) transport: Transport,
    pub(crate) framer: Framer,
    pub(crate) next_sequence: u32,
    pub(crate) needs_reconnect: bool,
    pub(crate) consecutive_protocol_errors: u32,
}

/// A live connection to one Jensen device.
///
/// `streaming_in_progress` and `health_check_in_progress` are tracked
/// outside the mutex (as atomics) so commands that must special-case "a
/// stream owns the wire right now" can check without contending for the
/// lock the stream itself is holding.
pub struct Session {
    inner: Mutex<SessionInner>,
    profile: DeviceProfile,
    cached_device_info: SyncMutex<Option<DeviceInfo>>,
    cached_card_info: SyncMutex<Option<CardInfo>>,
    cached_recording_filename: SyncMutex<Option<String>>,
    streaming_in_progress: AtomicBool,
    health_check_in_progress: AtomicBool,
}

impl Session {
    /// Claim the first matching device, or the one matching `serial` if
    /// given (see [`crate::config::JensenConfig::device_serial`]). Firmware
    /// identity is populated lazily on first gated command via
    /// [`Session::firmware_version`] rather than eagerly here, so
    /// `connect()` never blocks on a round trip the caller didn't ask for.
    pub async fn connect(serial: Option<&str>) -> JensenResult<Session> {
        let (transport, profile) = Transport::claim(serial).await?;
        info!("session established for {}", profile.model);

        Ok(Session {
            inner: Mutex::new(SessionInner {
                transport,
                framer: Framer::default(),
                next_sequence: 1,
                needs_reconnect: false,
                consecutive_protocol_errors: 0,
            }),
            profile,
            cached_device_info: SyncMutex::new(None),
            cached_card_info: SyncMutex::new(None),
            cached_recording_filename: SyncMutex::new(None),
            streaming_in_progress: AtomicBool::new(false),
            health_check_in_progress: AtomicBool::new(false),
        })
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_in_progress.load(Ordering::Acquire)
    }

    /// RAII guard marking a stream as in progress for the duration of a
    /// `ListFiles` / `StreamFile` call, so other commands can see it via
    /// `is_streaming()` without holding the session mutex themselves.
    fn begin_streaming(&self) -> StreamingGuard<'_> {
        self.streaming_in_progress.store(true, Ordering::Release);
        StreamingGuard { session: self }
    }

    /// Cached firmware version, populated by `GetDeviceInfo`. Fetches one
    /// if none is cached yet; callers that already know it (e.g. right
    /// after `get_device_info`) avoid the extra round trip because this is
    /// only consulted by gated commands.
    pub(crate) async fn firmware_version(&self) -> JensenResult<u32> {
        if let Some(info) = self.cached_device_info.lock().unwrap().clone() {
            return Ok(info.version_number);
        }
        let info = self.get_device_info().await?;
        Ok(info.version_number)
    }
}

struct StreamingGuard<'a> {
    session: &'a Session,
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        self.session
            .streaming_in_progress
            .store(false, Ordering::Release);
    }
}
