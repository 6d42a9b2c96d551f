use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::HibikiError;
use crate::models::Platform;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub slack: SlackConfig,
    pub relay: RelayConfig,
    pub emoji: EmojiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Shared secret the browser client must present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub template: String,
    pub min_update_seconds: u64,
    pub max_status_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmojiConfig {
    pub default: String,
    pub youtube: String,
    pub spotify: String,
    pub soundcloud: String,
}

impl EmojiConfig {
    pub fn for_platform(&self, platform: Option<Platform>) -> &str {
        match platform {
            Some(Platform::Youtube) => &self.youtube,
            Some(Platform::Spotify) => &self.spotify,
            Some(Platform::Soundcloud) => &self.soundcloud,
            Some(Platform::Unknown) | None => &self.default,
        }
    }
}

impl RelayConfig {
    pub fn min_interval_ms(&self) -> u64 {
        self.min_update_seconds.saturating_mul(1000)
    }
}

impl AppConfig {
    /// Load config: built-in defaults, then the user file (if it exists)
    /// merged over them, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, HibikiError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`AppConfig::load`] with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, HibikiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        let user = if user_path.exists() {
            tracing::debug!(path = %user_path.display(), "Loading user config");
            Some(std::fs::read_to_string(&user_path)?)
        } else {
            None
        };

        let mut config = Self::from_layers(user.as_deref())?;
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Parse the built-in defaults with an optional user TOML document merged
    /// over them. Keys missing from the user document keep their defaults.
    pub fn from_layers(user: Option<&str>) -> Result<Self, HibikiError> {
        let mut base: toml::Table =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| HibikiError::Config(e.to_string()))?;

        if let Some(user) = user {
            let overlay: toml::Table =
                toml::from_str(user).map_err(|e| HibikiError::Config(e.to_string()))?;
            merge_tables(&mut base, overlay);
        }

        toml::Value::Table(base)
            .try_into()
            .map_err(|e: toml::de::Error| HibikiError::Config(e.to_string()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), HibikiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("SLACK_USER_TOKEN") {
            self.slack.user_token = Some(v);
        }
        if let Some(v) = non_empty("RELAY_KEY") {
            self.relay.key = Some(v);
        }
        if let Some(v) = non_empty("BIND_ADDR") {
            self.server.bind = v;
        }
        if let Some(v) = non_empty("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = non_empty("REQUEST_TIMEOUT_SECONDS") {
            self.server.request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = non_empty("TEMPLATE") {
            self.relay.template = v;
        }
        if let Some(v) = non_empty("MIN_UPDATE_SECONDS") {
            self.relay.min_update_seconds = parse_env("MIN_UPDATE_SECONDS", &v)?;
        }
        if let Some(v) = non_empty("EMOJI") {
            self.emoji.default = v;
        }
        if let Some(v) = non_empty("EMOJI_YOUTUBE") {
            self.emoji.youtube = v;
        }
        if let Some(v) = non_empty("EMOJI_SPOTIFY") {
            self.emoji.spotify = v;
        }
        if let Some(v) = non_empty("EMOJI_SOUNDCLOUD") {
            self.emoji.soundcloud = v;
        }
        Ok(())
    }

    /// Check the credentials needed to serve. The Slack token is only
    /// required when talking to Slack for real.
    pub fn validate(&self, require_slack: bool) -> Result<(), HibikiError> {
        if require_slack && is_blank(&self.slack.user_token) {
            return Err(HibikiError::MissingCredential("SLACK_USER_TOKEN"));
        }
        if is_blank(&self.relay.key) {
            return Err(HibikiError::MissingCredential("RELAY_KEY"));
        }
        self.check_settings()
    }

    /// Check the tunables every config source must respect: the file, the
    /// environment and runtime patches alike.
    pub fn check_settings(&self) -> Result<(), HibikiError> {
        if self.relay.template.trim().is_empty() {
            return Err(HibikiError::Config("template must not be empty".into()));
        }
        if self.relay.max_status_len < MIN_STATUS_LEN {
            return Err(HibikiError::Config(format!(
                "max_status_len must be at least {MIN_STATUS_LEN}"
            )));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(HibikiError::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "hibiki")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

/// Runtime changes accepted by the admin endpoint. Not persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    pub template: Option<String>,
    pub min_update_seconds: Option<u64>,
    pub max_status_len: Option<usize>,
    pub emoji: Option<EmojiPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmojiPatch {
    pub default: Option<String>,
    pub youtube: Option<String>,
    pub spotify: Option<String>,
    pub soundcloud: Option<String>,
}

/// Shortest status length that still leaves room for text plus ellipsis.
const MIN_STATUS_LEN: usize = 10;

impl ConfigPatch {
    /// Apply to `config`. The result is checked before it replaces
    /// `config`, so a rejected patch changes nothing.
    pub fn apply(self, config: &mut AppConfig) -> Result<(), HibikiError> {
        let mut next = config.clone();
        if let Some(template) = self.template {
            next.relay.template = template;
        }
        if let Some(secs) = self.min_update_seconds {
            next.relay.min_update_seconds = secs;
        }
        if let Some(len) = self.max_status_len {
            next.relay.max_status_len = len;
        }
        if let Some(emoji) = self.emoji {
            let target = &mut next.emoji;
            for (slot, value) in [
                (&mut target.default, emoji.default),
                (&mut target.youtube, emoji.youtube),
                (&mut target.spotify, emoji.spotify),
                (&mut target.soundcloud, emoji.soundcloud),
            ] {
                if let Some(value) = value {
                    *slot = value;
                }
            }
        }

        next.check_settings()?;
        *config = next;
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_inner)), toml::Value::Table(overlay_inner)) => {
                merge_tables(base_inner, overlay_inner);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, HibikiError> {
    value
        .trim()
        .parse()
        .map_err(|_| HibikiError::Config(format!("invalid value for {key}: {value:?}")))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8788);
        assert_eq!(config.relay.template, "${title} — ${artist}");
        assert_eq!(config.relay.min_interval_ms(), 4000);
        assert_eq!(config.emoji.default, ":musical_note:");
        assert!(config.slack.user_token.is_none());
        assert!(config.relay.key.is_none());
    }

    #[test]
    fn test_user_layer_merges_over_defaults() {
        let config = AppConfig::from_layers(Some(
            r#"
            [relay]
            min_update_seconds = 10
            key = "secret"
            "#,
        ))
        .unwrap();
        assert_eq!(config.relay.min_update_seconds, 10);
        assert_eq!(config.relay.key.as_deref(), Some("secret"));
        // Untouched keys keep their defaults.
        assert_eq!(config.relay.template, "${title} — ${artist}");
        assert_eq!(config.server.port, 8788);
    }

    #[test]
    fn test_invalid_user_layer_is_an_error() {
        let err = AppConfig::from_layers(Some("[relay]\nmin_update_seconds = \"soon\"")).unwrap_err();
        assert!(matches!(err, HibikiError::Config(_)));
    }

    #[test]
    fn test_load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hibiki.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0\"\n").unwrap();

        let config = AppConfig::load_with(Some(&path), env(&[("RELAY_KEY", "k")])).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.relay.key.as_deref(), Some("k"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("SLACK_USER_TOKEN", "xoxp-1"),
                ("RELAY_KEY", "devkey"),
                ("PORT", "8787"),
                ("MIN_UPDATE_SECONDS", "2"),
                ("TEMPLATE", "${artist}: ${title}"),
                ("EMOJI_SPOTIFY", ":spotify:"),
            ]))
            .unwrap();

        assert_eq!(config.slack.user_token.as_deref(), Some("xoxp-1"));
        assert_eq!(config.relay.key.as_deref(), Some("devkey"));
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.relay.min_interval_ms(), 2000);
        assert_eq!(config.relay.template, "${artist}: ${title}");
        assert_eq!(config.emoji.for_platform(Some(Platform::Spotify)), ":spotify:");
    }

    #[test]
    fn test_env_empty_values_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("TEMPLATE", "  ")])).unwrap();
        assert_eq!(config.relay.template, "${title} — ${artist}");
    }

    #[test]
    fn test_env_bad_number() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.validate(true),
            Err(HibikiError::MissingCredential("SLACK_USER_TOKEN"))
        ));

        config.slack.user_token = Some("xoxp-1".into());
        assert!(matches!(
            config.validate(true),
            Err(HibikiError::MissingCredential("RELAY_KEY"))
        ));

        config.relay.key = Some("devkey".into());
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_validate_dry_run_skips_slack_token() {
        let mut config = AppConfig::default();
        config.relay.key = Some("devkey".into());
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_emoji_fallbacks() {
        let config = AppConfig::default();
        assert_eq!(config.emoji.for_platform(Some(Platform::Youtube)), "▶️");
        assert_eq!(config.emoji.for_platform(Some(Platform::Soundcloud)), "☁️");
        assert_eq!(config.emoji.for_platform(Some(Platform::Unknown)), ":musical_note:");
        assert_eq!(config.emoji.for_platform(None), ":musical_note:");
    }

    #[test]
    fn test_patch_applies_fields() {
        let mut config = AppConfig::default();
        ConfigPatch {
            template: Some("♪ ${title}".into()),
            min_update_seconds: Some(30),
            emoji: Some(EmojiPatch {
                youtube: Some(":yt:".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.relay.template, "♪ ${title}");
        assert_eq!(config.relay.min_update_seconds, 30);
        assert_eq!(config.emoji.youtube, ":yt:");
        assert_eq!(config.emoji.spotify, "🎧");
    }

    #[test]
    fn test_rejected_patch_changes_nothing() {
        let mut config = AppConfig::default();
        let result = ConfigPatch {
            template: Some("new ${title}".into()),
            max_status_len: Some(3),
            ..Default::default()
        }
        .apply(&mut config);

        assert!(result.is_err());
        assert_eq!(config.relay.template, "${title} — ${artist}");
    }

    fn with_key() -> AppConfig {
        let mut config = AppConfig::default();
        config.relay.key = Some("devkey".into());
        config
    }

    #[test]
    fn test_validate_rejects_short_status_len() {
        let mut config = AppConfig::from_layers(Some("[relay]\nmax_status_len = 0\nkey = \"k\"")).unwrap();
        assert!(matches!(config.validate(false), Err(HibikiError::Config(_))));

        config.relay.max_status_len = MIN_STATUS_LEN;
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = with_key();
        config
            .apply_env(env(&[("REQUEST_TIMEOUT_SECONDS", "0")]))
            .unwrap();
        let err = config.validate(false).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_validate_rejects_blank_template() {
        let mut config = with_key();
        config.relay.template = "   ".into();
        assert!(matches!(config.validate(false), Err(HibikiError::Config(_))));
    }

    #[test]
    fn test_patch_and_validate_agree() {
        for len in [0, 3, MIN_STATUS_LEN - 1] {
            let mut config = with_key();
            let patched = ConfigPatch {
                max_status_len: Some(len),
                ..Default::default()
            }
            .apply(&mut config);
            assert!(patched.is_err());

            config.relay.max_status_len = len;
            assert!(config.validate(false).is_err());
        }
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.relay.template, config.relay.template);
    }
}
