use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use hibiki_api::traits::{Identity, StatusService, StatusUpdate};
use hibiki_core::activity::{ActivityEntry, ActivityLog, RelayEvent, RelayStats};
use hibiki_core::config::{AppConfig, ConfigPatch, EmojiConfig};
use hibiki_core::engine::{self, Action, EngineSnapshot, EngineState, EpochMs, SkipReason};
use hibiki_core::models::PlaybackEvent;
use hibiki_core::normalize::{normalize, sanitize};

/// Text used by the test endpoint when none is given.
pub const DEFAULT_TEST_TEXT: &str = "Test Track — Debugger";

/// How long a test status stays up.
const TEST_STATUS_TTL_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("status update failed: {0}")]
    External(String),
    #[error("status update timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("config error: {0}")]
    Config(String),
}

/// Result of a now-playing submission that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NowPlayingOutcome {
    Applied { status: String },
    Cleared,
    Skipped { reason: SkipReason, text: Option<String> },
}

/// Result of the startup credential check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AuthInfo {
    Verified(Identity),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub template: String,
    pub min_update_ms: u64,
    pub max_status_len: usize,
    pub emoji: EmojiConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub port: u16,
    pub config: ConfigSummary,
    pub engine: EngineSnapshot,
    pub stats: RelayStats,
    pub auth_info: Option<AuthInfo>,
}

/// The values one request needs, copied out of the config lock.
struct Settings {
    template: String,
    max_status_len: usize,
    min_interval_ms: u64,
    emoji: EmojiConfig,
    timeout: Duration,
}

#[derive(Default)]
struct Telemetry {
    stats: RelayStats,
    log: ActivityLog,
}

/// Relays now-playing events to a [`StatusService`].
///
/// Owns the single [`EngineState`]. Deciding, calling the service and
/// recording the result happen under one lock, so concurrent submissions
/// are processed one at a time in arrival order. Readers see the snapshot
/// published after each record and never wait on that lock.
pub struct Relay<S> {
    service: S,
    config: RwLock<AppConfig>,
    engine: Mutex<EngineState>,
    snapshot: watch::Sender<EngineSnapshot>,
    telemetry: StdMutex<Telemetry>,
    auth_info: RwLock<Option<AuthInfo>>,
}

impl<S: StatusService> Relay<S> {
    pub fn new(service: S, config: AppConfig) -> Self {
        Self {
            service,
            config: RwLock::new(config),
            engine: Mutex::new(EngineState::new()),
            snapshot: watch::channel(EngineState::new().snapshot()).0,
            telemetry: StdMutex::new(Telemetry::default()),
            auth_info: RwLock::new(None),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Ask the service whose credential we hold and remember the answer.
    pub async fn refresh_identity(&self) -> AuthInfo {
        let info = match self.service.identity().await {
            Ok(identity) => {
                info!(user = %identity.user, team = %identity.team, "Status service identity verified");
                AuthInfo::Verified(identity)
            }
            Err(e) => {
                warn!(error = %e, "Could not verify status service credential");
                AuthInfo::Failed {
                    error: e.to_string(),
                }
            }
        };
        *self.auth_info.write().await = Some(info.clone());
        info
    }

    /// Check a presented relay key.
    pub async fn authorize(&self, presented: Option<&str>, route: &str) -> Result<(), RelayError> {
        let cfg = self.config.read().await;
        let expected = cfg.relay.key.as_deref().filter(|k| !k.is_empty());

        match (expected, presented) {
            (Some(expected), Some(presented)) if expected == presented => Ok(()),
            _ => {
                drop(cfg);
                warn!(route, "Rejected request with missing or wrong key");
                self.note(
                    RelayEvent::Unauthorized {
                        route: route.to_string(),
                    },
                    now_ms(),
                );
                Err(RelayError::Unauthorized)
            }
        }
    }

    /// Handle one now-playing submission. `None` stands for a payload that
    /// could not be parsed, which counts as "nothing playing".
    pub async fn now_playing(
        &self,
        event: Option<PlaybackEvent>,
    ) -> Result<NowPlayingOutcome, RelayError> {
        self.process(event, now_ms).await
    }

    /// [`Relay::now_playing`] at a fixed time.
    pub async fn now_playing_at(
        &self,
        event: Option<PlaybackEvent>,
        now: EpochMs,
    ) -> Result<NowPlayingOutcome, RelayError> {
        self.process(event, move || now).await
    }

    async fn process<C>(
        &self,
        event: Option<PlaybackEvent>,
        clock: C,
    ) -> Result<NowPlayingOutcome, RelayError>
    where
        C: FnOnce() -> EpochMs,
    {
        let settings = self.settings().await;
        let normalized = event
            .as_ref()
            .and_then(|e| normalize(e, &settings.template, settings.max_status_len));

        let mut state = self.engine.lock().await;
        // Read the clock after the lock so a queued event sees the state
        // left by the one before it.
        let now = clock();
        let action = engine::decide(normalized.as_ref(), now, &state, settings.min_interval_ms);

        match &action {
            Action::Skip(reason) => {
                let text = normalized.map(|n| n.display_text);
                if reason.is_not_playing() {
                    debug!(reason = reason.as_str(), "Not playing, nothing to clear");
                } else {
                    debug!(reason = reason.as_str(), text = ?text, "Skip update");
                }
                self.note(
                    RelayEvent::Skipped {
                        reason: *reason,
                        text: text.clone(),
                    },
                    now,
                );
                Ok(NowPlayingOutcome::Skipped {
                    reason: *reason,
                    text,
                })
            }
            Action::Clear => {
                info!("Clearing status because not playing");
                self.call(self.service.clear_status(), settings.timeout, "clear", now)
                    .await?;
                self.record(&mut state, &action, now);
                self.note(RelayEvent::Cleared, now);
                Ok(NowPlayingOutcome::Cleared)
            }
            Action::Apply { text, platform, .. } => {
                info!(text = %text, platform = ?platform, "Updating status");
                let update = StatusUpdate::new(text.clone())
                    .with_emoji(settings.emoji.for_platform(*platform));
                self.call(self.service.set_status(&update), settings.timeout, "set", now)
                    .await?;
                self.record(&mut state, &action, now);
                self.note(
                    RelayEvent::Applied {
                        text: text.clone(),
                        platform: *platform,
                    },
                    now,
                );
                Ok(NowPlayingOutcome::Applied {
                    status: text.clone(),
                })
            }
        }
    }

    /// Set arbitrary text, bypassing the engine. Empty text clears.
    ///
    /// The engine lock is held for the call so a manual update never
    /// interleaves with a now-playing decision.
    pub async fn set_manual(&self, text: &str, expiration: Option<i64>) -> Result<String, RelayError> {
        let settings = self.settings().await;
        let text = sanitize(text, settings.max_status_len);

        let mut update = StatusUpdate::new(text.clone());
        if !text.is_empty() {
            update = update.with_emoji(settings.emoji.default.clone());
        }
        if let Some(exp) = expiration {
            update = update.expiring_at(exp);
        }

        let _engine = self.engine.lock().await;
        let now = now_ms();
        info!(text = %text, "Manual status set");
        self.call(self.service.set_status(&update), settings.timeout, "manual", now)
            .await?;
        self.note(RelayEvent::ManualSet { text: text.clone() }, now);
        Ok(text)
    }

    /// Set a short-lived test status.
    pub async fn send_test(&self, text: Option<&str>) -> Result<String, RelayError> {
        let text = text.filter(|t| !t.trim().is_empty()).unwrap_or(DEFAULT_TEST_TEXT);
        let expires = Utc::now().timestamp() + TEST_STATUS_TTL_SECS;
        self.set_manual(text, Some(expires)).await
    }

    /// Apply a runtime config change. Returns the resulting settings.
    pub async fn patch_config(&self, patch: ConfigPatch) -> Result<ConfigSummary, RelayError> {
        let mut cfg = self.config.write().await;
        patch
            .apply(&mut cfg)
            .map_err(|e| RelayError::Config(e.to_string()))?;
        let summary = summarize(&cfg);
        drop(cfg);

        info!(
            template = %summary.template,
            min_update_ms = summary.min_update_ms,
            "Config updated"
        );
        self.note(RelayEvent::ConfigChanged, now_ms());
        Ok(summary)
    }

    pub fn engine_snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn health(&self) -> HealthReport {
        let cfg = self.config.read().await;
        let port = cfg.server.port;
        let config = summarize(&cfg);
        drop(cfg);

        HealthReport {
            ok: true,
            port,
            config,
            engine: self.engine_snapshot(),
            stats: self.stats(),
            auth_info: self.auth_info.read().await.clone(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.telemetry().stats.clone()
    }

    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.telemetry().log.snapshot()
    }

    async fn settings(&self) -> Settings {
        let cfg = self.config.read().await;
        Settings {
            template: cfg.relay.template.clone(),
            max_status_len: cfg.relay.max_status_len,
            min_interval_ms: cfg.relay.min_interval_ms(),
            emoji: cfg.emoji.clone(),
            timeout: Duration::from_secs(cfg.server.request_timeout_secs),
        }
    }

    /// Run one external call under a timeout. Failures are counted and
    /// logged here; the caller only decides whether to record state.
    async fn call<F>(
        &self,
        fut: F,
        timeout: Duration,
        operation: &'static str,
        now: EpochMs,
    ) -> Result<(), RelayError>
    where
        F: Future<Output = Result<(), S::Error>>,
    {
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::External(e.to_string())),
            Err(_) => Err(RelayError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            warn!(operation, error = %e, "Status service call failed");
            self.note(
                RelayEvent::Failed {
                    operation,
                    message: e.to_string(),
                },
                now,
            );
        }
        result
    }

    fn record(&self, state: &mut EngineState, action: &Action, now: EpochMs) {
        state.record(action, now);
        self.snapshot.send_replace(state.snapshot());
    }

    fn note(&self, event: RelayEvent, now: EpochMs) {
        let mut telemetry = self.telemetry();
        telemetry.stats.count(&event, now);
        telemetry.log.push(event);
    }

    fn telemetry(&self) -> std::sync::MutexGuard<'_, Telemetry> {
        self.telemetry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn summarize(cfg: &AppConfig) -> ConfigSummary {
    ConfigSummary {
        template: cfg.relay.template.clone(),
        min_update_ms: cfg.relay.min_interval_ms(),
        max_status_len: cfg.relay.max_status_len,
        emoji: cfg.emoji.clone(),
    }
}

fn now_ms() -> EpochMs {
    Utc::now().timestamp_millis()
}
