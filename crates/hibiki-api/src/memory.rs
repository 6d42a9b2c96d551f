//! In-memory [`StatusService`] used for `--dry-run` and in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::traits::{Identity, StatusService, StatusUpdate};

#[derive(Debug, Error)]
#[error("in-memory status service failure (simulated)")]
pub struct MemoryError;

/// Records every update instead of sending it anywhere.
#[derive(Debug, Default)]
pub struct MemoryStatus {
    updates: Mutex<Vec<StatusUpdate>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every call, to exercise timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// All successful updates so far, oldest first.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The status as the service would currently show it.
    pub fn current(&self) -> Option<StatusUpdate> {
        self.updates()
            .into_iter()
            .last()
            .filter(|u| !u.is_clear())
    }
}

impl StatusService for MemoryStatus {
    type Error = MemoryError;

    async fn set_status(&self, update: &StatusUpdate) -> Result<(), MemoryError> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MemoryError);
        }

        tracing::info!(text = %update.text, emoji = ?update.emoji, "(dry run) status set");
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update.clone());
        Ok(())
    }

    async fn identity(&self) -> Result<Identity, MemoryError> {
        Ok(Identity {
            user: "dry-run".into(),
            team: "local".into(),
        })
    }
}
