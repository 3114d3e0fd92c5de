//! Bounded-concurrency worker pool draining a queue of file operations
//! (spec.md §4.5).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

use crate::error::JensenError;
use crate::model::{FileEntry, OperationKind, OperationStatus};
use crate::session::Session;
use crate::session::commands::FileOpOutcome;

use super::progress::{ProgressEvent, ProgressThrottle};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;
const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(250);

struct OperationRecord {
    kind: OperationKind,
    filename: String,
    status: OperationStatus,
    cancel: Arc<AtomicBool>,
}

struct SharedState {
    session: Arc<Session>,
    download_dir: PathBuf,
    records: StdMutex<HashMap<u64, OperationRecord>>,
    queue: StdMutex<VecDeque<u64>>,
    notify: Notify,
    next_id: AtomicU64,
    progress_tx: broadcast::Sender<ProgressEvent>,
    dedupe: StdMutex<HashMap<(OperationKind, String), u64>>,
    metadata_cache: StdMutex<HashMap<String, FileEntry>>,
    force_health_check: AtomicBool,
}

impl SharedState {
    fn emit(&self, id: u64, kind: OperationKind, filename: &str, bytes_done: u64, bytes_total: Option<u64>, status: OperationStatus) {
        let event = ProgressEvent {
            op_id: id,
            kind,
            filename: filename.to_string(),
            bytes_done,
            bytes_total,
            status,
        };
        // No subscribers is a normal, common case; don't log the send error.
        let _ = self.progress_tx.send(event);
    }

    fn set_status(&self, id: u64, status: OperationStatus) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            record.status = status;
        }
    }
}

/// A bounded worker pool draining a FIFO queue of download/delete
/// operations against one [`Session`].
pub struct OperationsManager {
    state: Arc<SharedState>,
}

impl OperationsManager {
    pub fn new(session: Arc<Session>, worker_count: usize, download_dir: PathBuf) -> OperationsManager {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        let state = Arc::new(SharedState {
            session,
            download_dir,
            records: StdMutex::new(HashMap::new()),
            queue: StdMutex::new(VecDeque::new()),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            progress_tx,
            dedupe: StdMutex::new(HashMap::new()),
            metadata_cache: StdMutex::new(HashMap::new()),
            force_health_check: AtomicBool::new(false),
        });

        for worker in 0..worker_count.max(1) {
            let worker_state = state.clone();
            tokio::spawn(async move {
                debug!("operations worker {worker} started");
                worker_loop(worker_state).await;
            });
        }

        OperationsManager { state }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.state.progress_tx.subscribe()
    }

    /// Feed file metadata (typically straight from `Session::list_files`)
    /// into the cache downloads resolve their declared size from.
    pub fn ingest_file_list(&self, entries: &[FileEntry]) {
        let mut cache = self.state.metadata_cache.lock().unwrap();
        for entry in entries {
            cache.insert(entry.filename.clone(), entry.clone());
        }
    }

    pub fn queue_download(&self, filename: &str) -> u64 {
        self.enqueue(OperationKind::Download, filename)
    }

    pub fn queue_delete(&self, filename: &str) -> u64 {
        self.enqueue(OperationKind::Delete, filename)
    }

    /// Expand into per-file `Download` operations enqueued in order, plus
    /// one `BatchDownload` parent record whose progress tracks how many of
    /// its children have reached a terminal state.
    pub fn queue_batch_download(&self, filenames: &[String]) -> (u64, Vec<u64>) {
        let child_ids: Vec<u64> = filenames.iter().map(|f| self.queue_download(f)).collect();
        let batch_id = self.spawn_batch_watcher(OperationKind::BatchDownload, child_ids.clone());
        (batch_id, child_ids)
    }

    pub fn queue_batch_delete(&self, filenames: &[String]) -> (u64, Vec<u64>) {
        let child_ids: Vec<u64> = filenames.iter().map(|f| self.queue_delete(f)).collect();
        let batch_id = self.spawn_batch_watcher(OperationKind::BatchDelete, child_ids.clone());
        (batch_id, child_ids)
    }

    fn spawn_batch_watcher(&self, kind: OperationKind, child_ids: Vec<u64>) -> u64 {
        let batch_id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let total = child_ids.len() as u64;
        self.state.records.lock().unwrap().insert(
            batch_id,
            OperationRecord {
                kind,
                filename: String::new(),
                status: OperationStatus::Active,
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );
        self.state
            .emit(batch_id, kind, "", 0, Some(total), OperationStatus::Active);

        let state = self.state.clone();
        let mut remaining: std::collections::HashSet<u64> = child_ids.into_iter().collect();
        let mut saw_failure = false;
        tokio::spawn(async move {
            if remaining.is_empty() {
                state.set_status(batch_id, OperationStatus::Completed);
                state.emit(batch_id, kind, "", 0, Some(0), OperationStatus::Completed);
                return;
            }
            let mut rx = state.progress_tx.subscribe();
            let mut done = 0u64;
            while !remaining.is_empty() {
                let event = match rx.recv().await {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if remaining.contains(&event.op_id) && event.is_terminal() {
                    remaining.remove(&event.op_id);
                    done += 1;
                    if event.status == OperationStatus::Failed {
                        saw_failure = true;
                    }
                    state.emit(batch_id, kind, "", done, Some(total), OperationStatus::Active);
                }
            }
            let final_status = if saw_failure {
                OperationStatus::Failed
            } else {
                OperationStatus::Completed
            };
            state.set_status(batch_id, final_status);
            state.emit(batch_id, kind, "", done, Some(total), final_status);
        });

        batch_id
    }

    fn enqueue(&self, kind: OperationKind, filename: &str) -> u64 {
        let key = (kind, filename.to_string());
        {
            let dedupe = self.state.dedupe.lock().unwrap();
            if let Some(&existing_id) = dedupe.get(&key) {
                let records = self.state.records.lock().unwrap();
                if let Some(record) = records.get(&existing_id) {
                    if !record.status.is_terminal() {
                        return existing_id;
                    }
                }
            }
        }

        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        self.state.records.lock().unwrap().insert(
            id,
            OperationRecord {
                kind,
                filename: filename.to_string(),
                status: OperationStatus::Pending,
                cancel,
            },
        );
        self.state.dedupe.lock().unwrap().insert(key, id);
        self.state.queue.lock().unwrap().push_back(id);
        self.state.emit(id, kind, filename, 0, None, OperationStatus::Pending);
        self.state.notify.notify_one();
        id
    }

    /// Wait-free and idempotent; cancelling a terminal or unknown id is a
    /// no-op (spec.md §5).
    pub fn cancel(&self, op_id: u64) {
        let mut records = self.state.records.lock().unwrap();
        if let Some(record) = records.get_mut(&op_id) {
            if record.status.is_terminal() {
                return;
            }
            record.cancel.store(true, Ordering::Release);
            if record.status == OperationStatus::Pending {
                record.status = OperationStatus::Cancelled;
                let kind = record.kind;
                let filename = record.filename.clone();
                drop(records);
                self.state
                    .emit(op_id, kind, &filename, 0, None, OperationStatus::Cancelled);
            }
        }
    }
}

async fn worker_loop(state: Arc<SharedState>) {
    loop {
        let id = {
            let mut queue = state.queue.lock().unwrap();
            queue.pop_front()
        };
        let Some(id) = id else {
            state.notify.notified().await;
            continue;
        };
        run_operation(&state, id).await;
    }
}

async fn run_operation(state: &Arc<SharedState>, id: u64) {
    let (kind, filename, cancel) = {
        let records = state.records.lock().unwrap();
        let Some(record) = records.get(&id) else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }
        (record.kind, record.filename.clone(), record.cancel.clone())
    };

    if state.force_health_check.swap(false, Ordering::AcqRel) {
        debug!("forcing health check before dispatching operation {id}");
        let _ = state.session.health_check().await;
    }

    state.set_status(id, OperationStatus::Active);
    state.emit(id, kind, &filename, 0, None, OperationStatus::Active);

    let outcome = match kind {
        OperationKind::Download => run_download(state, id, &filename, &cancel).await,
        OperationKind::Delete => run_delete(state, &filename).await,
        OperationKind::BatchDownload | OperationKind::BatchDelete => {
            // Batches are expanded into child ops at enqueue time; a batch
            // id is never itself pushed onto the dispatch queue.
            warn!("batch kind reached the worker loop directly, ignoring");
            return;
        }
    };

    let status = match &outcome {
        Ok(()) => OperationStatus::Completed,
        Err(JensenError::Cancelled) => OperationStatus::Cancelled,
        Err(_) => OperationStatus::Failed,
    };

    if let Err(JensenError::ProtocolDesync) = outcome {
        warn!("operation {id} hit a protocol desync, forcing health check before next dispatch");
        state.force_health_check.store(true, Ordering::Release);
    }

    if let Err(e) = &outcome {
        if !matches!(e, JensenError::Cancelled) {
            error!("operation {id} ({filename}) failed: {e}");
        }
    }

    state.set_status(id, status);
    state
        .dedupe
        .lock()
        .unwrap()
        .retain(|_, existing_id| *existing_id != id);
    state.emit(id, kind, &filename, 0, None, status);
}

async fn run_download(
    state: &Arc<SharedState>,
    id: u64,
    filename: &str,
    cancel: &Arc<AtomicBool>,
) -> Result<(), JensenError> {
    let expected_size = {
        let cache = state.metadata_cache.lock().unwrap();
        cache.get(filename).map(|entry| entry.size_bytes)
    };
    let Some(expected_size) = expected_size else {
        return Err(JensenError::SizeUnknown);
    };

    let dest_path = state.download_dir.join(filename);
    let mut file = std::fs::File::create(&dest_path).map_err(|e| JensenError::Io(e.kind()))?;

    let mut throttle = ProgressThrottle::new(PROGRESS_MIN_INTERVAL);
    let state_for_progress = state.clone();
    let filename_owned = filename.to_string();

    let result = state
        .session
        .stream_file(
            filename,
            expected_size,
            &mut file,
            || cancel.load(Ordering::Acquire),
            |bytes_done| {
                if throttle.should_emit(Instant::now()) {
                    state_for_progress.emit(
                        id,
                        OperationKind::Download,
                        &filename_owned,
                        bytes_done,
                        Some(expected_size),
                        OperationStatus::Active,
                    );
                }
            },
        )
        .await;

    match result {
        Ok(total) if total == expected_size => {
            info!("downloaded {filename} ({total} bytes) to {}", dest_path.display());
            Ok(())
        }
        Ok(total) => {
            drop(file);
            let _ = std::fs::remove_file(&dest_path);
            Err(JensenError::SizeMismatch {
                expected: expected_size,
                actual: total,
            })
        }
        Err(e) => {
            drop(file);
            let _ = std::fs::remove_file(&dest_path);
            Err(e)
        }
    }
}

async fn run_delete(state: &Arc<SharedState>, filename: &str) -> Result<(), JensenError> {
    match state.session.delete_file(filename).await? {
        FileOpOutcome::Success => {
            state.metadata_cache.lock().unwrap().remove(filename);
            Ok(())
        }
        FileOpOutcome::NotFound => Err(JensenError::FileNotFound(filename.to_string())),
        FileOpOutcome::Failed => Err(JensenError::Io(std::io::ErrorKind::Other)),
    }
}
