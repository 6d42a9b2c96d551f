use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{EpochMs, SkipReason};
use crate::models::Platform;

/// Maximum number of events retained in the ring buffer.
const ACTIVITY_LOG_CAPACITY: usize = 200;

/// Something the relay did in response to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayEvent {
    Applied {
        text: String,
        platform: Option<Platform>,
    },
    Cleared,
    Skipped {
        reason: SkipReason,
        text: Option<String>,
    },
    ManualSet {
        text: String,
    },
    Failed {
        operation: &'static str,
        message: String,
    },
    Unauthorized {
        route: String,
    },
    ConfigChanged,
}

/// A timestamped event entry.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RelayEvent,
}

/// Bounded ring buffer of relay events.
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(ACTIVITY_LOG_CAPACITY),
        }
    }

    /// Push a new event, evicting the oldest if at capacity.
    pub fn push(&mut self, event: RelayEvent) {
        if self.entries.len() >= ACTIVITY_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(ActivityEntry {
            at: Utc::now(),
            event,
        });
    }

    /// Return a snapshot of all entries (newest last).
    pub fn snapshot(&self) -> Vec<ActivityEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counters exposed on the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub updates_applied: u64,
    pub clears_applied: u64,
    pub manual_updates: u64,
    pub skipped: u64,
    pub errors: u64,
    pub last_update_at: Option<EpochMs>,
}

impl RelayStats {
    /// Update counters for an event. Unauthorized requests and config
    /// changes are logged but not counted.
    pub fn count(&mut self, event: &RelayEvent, now: EpochMs) {
        match event {
            RelayEvent::Applied { .. } => {
                self.updates_applied += 1;
                self.last_update_at = Some(now);
            }
            RelayEvent::Cleared => {
                self.clears_applied += 1;
                self.last_update_at = Some(now);
            }
            RelayEvent::ManualSet { .. } => {
                self.manual_updates += 1;
                self.last_update_at = Some(now);
            }
            RelayEvent::Skipped { .. } => self.skipped += 1,
            RelayEvent::Failed { .. } => self.errors += 1,
            RelayEvent::Unauthorized { .. } | RelayEvent::ConfigChanged => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut log = ActivityLog::new();
        for i in 0..ACTIVITY_LOG_CAPACITY + 5 {
            log.push(RelayEvent::ManualSet {
                text: i.to_string(),
            });
        }
        let entries = log.snapshot();
        assert_eq!(entries.len(), ACTIVITY_LOG_CAPACITY);
        assert_eq!(
            entries[0].event,
            RelayEvent::ManualSet {
                text: "5".into()
            }
        );
    }

    #[test]
    fn stats_count_by_kind() {
        let mut stats = RelayStats::default();
        stats.count(
            &RelayEvent::Applied {
                text: "a".into(),
                platform: None,
            },
            10,
        );
        stats.count(&RelayEvent::Cleared, 20);
        stats.count(
            &RelayEvent::Failed {
                operation: "set",
                message: "boom".into(),
            },
            30,
        );
        stats.count(
            &RelayEvent::Skipped {
                reason: SkipReason::DedupeThrottle,
                text: None,
            },
            40,
        );

        assert_eq!(stats.updates_applied, 1);
        assert_eq!(stats.clears_applied, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.last_update_at, Some(20));
    }

    #[test]
    fn entry_serializes_flat() {
        let mut log = ActivityLog::new();
        log.push(RelayEvent::Skipped {
            reason: SkipReason::DedupeThrottle,
            text: Some("x".into()),
        });
        let value = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(value["kind"], "skipped");
        assert_eq!(value["reason"], "dedupe-throttle");
        assert!(value["at"].is_string());
    }
}
