//! Progress reporting for the operations manager (spec.md §4.5).

use crate::model::{OperationKind, OperationStatus};

/// One update about an operation's progress. `bytes_total` is `None` until
/// the worker has resolved a declared size (e.g. before the first chunk of
/// a download arrives).
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub op_id: u64,
    pub kind: OperationKind,
    pub filename: String,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    pub status: OperationStatus,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Throttles progress emission to at most one update per `min_interval`
/// per operation, so a fast download doesn't flood subscribers (spec.md
/// §4.5 "a few updates per second").
pub struct ProgressThrottle {
    min_interval: std::time::Duration,
    last_emitted: Option<tokio::time::Instant>,
}

impl ProgressThrottle {
    pub fn new(min_interval: std::time::Duration) -> ProgressThrottle {
        ProgressThrottle {
            min_interval,
            last_emitted: None,
        }
    }

    /// Returns `true` if enough time has passed since the last emission (or
    /// nothing has been emitted yet) and records `now` as the new baseline.
    /// Callers should always let terminal events through regardless of this
    /// check.
    pub fn should_emit(&mut self, now: tokio::time::Instant) -> bool {
        match self.last_emitted {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emitted = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn throttle_blocks_rapid_repeats() {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(async {
                tokio::time::pause();
                let mut throttle = ProgressThrottle::new(Duration::from_millis(200));
                let t0 = tokio::time::Instant::now();
                assert!(throttle.should_emit(t0));
                assert!(!throttle.should_emit(t0));
                tokio::time::advance(Duration::from_millis(250)).await;
                assert!(throttle.should_emit(tokio::time::Instant::now()));
            });
    }
}
