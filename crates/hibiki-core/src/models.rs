//! Playback events as reported by the browser client, and the normalized
//! status derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Playback state reported by the client.
///
/// Anything other than `playing` or `paused` deserializes to `Unknown`, so a
/// misbehaving client can never produce a state outside this enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Streaming site the event was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Spotify,
    Soundcloud,
    #[serde(other)]
    Unknown,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Spotify => "spotify",
            Self::Soundcloud => "soundcloud",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One "now playing" sample from the client, sent on every scrape tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub state: PlaybackState,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl PlaybackEvent {
    /// Parse an untrusted JSON payload.
    ///
    /// Returns `None` when the payload does not describe an event at all
    /// (wrong types, not an object). Callers treat that as "not playing".
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Discriminates what a [`StatusKey`] was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Playing,
}

/// Dedupe key for an applied status: a state tag plus a digest of the exact
/// display text. Two keys are equal only when both parts are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StatusKey {
    tag: StatusTag,
    digest: u64,
}

impl StatusKey {
    pub fn playing(display_text: &str) -> Self {
        Self {
            tag: StatusTag::Playing,
            digest: fnv1a(display_text.as_bytes()),
        }
    }

    pub fn tag(&self) -> StatusTag {
        self.tag
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            StatusTag::Playing => write!(f, "playing:{:016x}", self.digest),
        }
    }
}

/// 64-bit FNV-1a. Stable across builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(PRIME)
    })
}

/// A playing event after cleaning and template substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedStatus {
    pub display_text: String,
    pub key: StatusKey,
    pub platform: Option<Platform>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_state_strings_map_to_unknown() {
        let event = PlaybackEvent::from_json(&json!({
            "title": "Song",
            "artist": "Artist",
            "state": "buffering",
            "platform": "tidal",
        }))
        .unwrap();
        assert_eq!(event.state, PlaybackState::Unknown);
        assert_eq!(event.platform, Some(Platform::Unknown));
    }

    #[test]
    fn missing_fields_default() {
        let event = PlaybackEvent::from_json(&json!({ "title": "Song" })).unwrap();
        assert_eq!(event.artist, "");
        assert_eq!(event.state, PlaybackState::Unknown);
        assert_eq!(event.platform, None);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let event = PlaybackEvent::from_json(&json!({
            "title": "Song",
            "state": "playing",
            "token": "devkey",
        }))
        .unwrap();
        assert_eq!(event.state, PlaybackState::Playing);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(PlaybackEvent::from_json(&json!({ "title": 42 })).is_none());
        assert!(PlaybackEvent::from_json(&json!("just a string")).is_none());
    }

    #[test]
    fn key_depends_on_text() {
        assert_eq!(StatusKey::playing("Song A"), StatusKey::playing("Song A"));
        assert_ne!(StatusKey::playing("Song A"), StatusKey::playing("Song B"));
        assert_eq!(StatusKey::playing("x").tag(), StatusTag::Playing);
    }

    #[test]
    fn key_display_is_tagged() {
        let key = StatusKey::playing("");
        assert_eq!(key.to_string(), "playing:cbf29ce484222325");
    }
}
