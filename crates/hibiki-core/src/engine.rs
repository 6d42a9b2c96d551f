//! Throttle and dedupe decisions for outbound status updates.
//!
//! [`decide`] is pure: it looks at the incoming status and the current
//! [`EngineState`] and picks an [`Action`]. The caller performs the external
//! call and, only if it succeeded, feeds the action back through
//! [`EngineState::record`]. A failed call therefore leaves the state exactly
//! as it was and the next event re-evaluates the same decision.

use serde::Serialize;

use crate::models::{NormalizedStatus, Platform, StatusKey};

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

/// Why an event did not lead to an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Nothing is playing, but the current status was not set by us.
    NotOurs,
    /// Nothing is playing, but our status was applied too recently to clear.
    ClearThrottled,
    /// Same content as the last applied status, within the interval.
    DedupeThrottle,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotOurs => "not-ours",
            Self::ClearThrottled => "throttled",
            Self::DedupeThrottle => "dedupe-throttle",
        }
    }

    /// True for the two reasons produced by a not-playing event.
    pub fn is_not_playing(self) -> bool {
        matches!(self, Self::NotOurs | Self::ClearThrottled)
    }
}

/// What to do with an incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Apply {
        text: String,
        key: StatusKey,
        platform: Option<Platform>,
    },
    Clear,
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Active { key: StatusKey, text: String },
}

/// What this process last did to the external status.
///
/// `Idle` means we have not set a status (or have cleared ours); `Active`
/// carries the key and text of the status we applied. Only
/// [`EngineState::record`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    phase: Phase,
    last_applied_at: EpochMs,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_applied_at: 0,
        }
    }

    pub fn is_set_by_us(&self) -> bool {
        matches!(self.phase, Phase::Active { .. })
    }

    pub fn last_applied_key(&self) -> Option<StatusKey> {
        match &self.phase {
            Phase::Active { key, .. } => Some(*key),
            Phase::Idle => None,
        }
    }

    /// Text of the status we currently own, if any.
    pub fn current_text(&self) -> Option<&str> {
        match &self.phase {
            Phase::Active { text, .. } => Some(text),
            Phase::Idle => None,
        }
    }

    /// True when `status` is exactly what we last applied. The text is
    /// compared too, so a digest collision never suppresses a new track.
    pub fn is_current(&self, status: &NormalizedStatus) -> bool {
        match &self.phase {
            Phase::Active { key, text } => *key == status.key && *text == status.display_text,
            Phase::Idle => false,
        }
    }

    pub fn last_applied_at(&self) -> EpochMs {
        self.last_applied_at
    }

    /// Record an action whose external call succeeded.
    pub fn record(&mut self, action: &Action, now: EpochMs) {
        match action {
            Action::Apply { text, key, .. } => {
                self.phase = Phase::Active {
                    key: *key,
                    text: text.clone(),
                };
                self.last_applied_at = now;
            }
            Action::Clear => {
                self.phase = Phase::Idle;
                self.last_applied_at = now;
            }
            Action::Skip(_) => {}
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            is_set_by_us: self.is_set_by_us(),
            last_key: self.last_applied_key().map(|k| k.to_string()),
            status: self.current_text().map(str::to_string),
            last_applied_at: self.last_applied_at,
        }
    }
}

/// Read-only view of [`EngineState`] for health output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub is_set_by_us: bool,
    pub last_key: Option<String>,
    pub status: Option<String>,
    pub last_applied_at: EpochMs,
}

/// Decide what to do with one event.
///
/// `normalized` is `None` for anything that is not a playing track
/// (paused, stopped, malformed payload).
pub fn decide(
    normalized: Option<&NormalizedStatus>,
    now: EpochMs,
    state: &EngineState,
    min_interval_ms: u64,
) -> Action {
    let elapsed = now.saturating_sub(state.last_applied_at);
    let min_interval = i64::try_from(min_interval_ms).unwrap_or(i64::MAX);

    let Some(status) = normalized else {
        return if !state.is_set_by_us() {
            Action::Skip(SkipReason::NotOurs)
        } else if elapsed > min_interval {
            Action::Clear
        } else {
            Action::Skip(SkipReason::ClearThrottled)
        };
    };

    if state.is_current(status) && elapsed < min_interval {
        return Action::Skip(SkipReason::DedupeThrottle);
    }

    Action::Apply {
        text: status.display_text.clone(),
        key: status.key,
        platform: status.platform,
    }
}
