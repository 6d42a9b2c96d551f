use serde::{Deserialize, Serialize};

use crate::traits::StatusUpdate;

/// Body of `users.profile.set`.
#[derive(Debug, Serialize)]
pub struct ProfileSetRequest<'a> {
    pub profile: Profile<'a>,
}

/// The status subset of a Slack user profile.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Profile<'a> {
    pub status_text: &'a str,
    pub status_emoji: &'a str,
    /// 0 means "never expires".
    pub status_expiration: i64,
}

impl<'a> Profile<'a> {
    /// Slack keeps the emoji when only the text is cleared, so a clear also
    /// sends an empty emoji.
    pub fn from_update(update: &'a StatusUpdate) -> Self {
        let status_emoji = if update.is_clear() {
            ""
        } else {
            update.emoji.as_deref().unwrap_or("")
        };
        Self {
            status_text: &update.text,
            status_emoji,
            status_expiration: update.expiration.unwrap_or(0),
        }
    }
}

/// Envelope shared by every Web API response.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `auth.test`.
#[derive(Debug, Deserialize)]
pub struct AuthTestResponse {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_payload_shape() {
        let update = StatusUpdate::new("Song A — Artist A").with_emoji(":musical_note:");
        let body = serde_json::to_value(ProfileSetRequest {
            profile: Profile::from_update(&update),
        })
        .unwrap();

        assert_eq!(
            body,
            json!({
                "profile": {
                    "status_text": "Song A — Artist A",
                    "status_emoji": ":musical_note:",
                    "status_expiration": 0,
                }
            })
        );
    }

    #[test]
    fn clear_drops_emoji() {
        let update = StatusUpdate::cleared().with_emoji(":musical_note:");
        let profile = Profile::from_update(&update);
        assert_eq!(profile.status_text, "");
        assert_eq!(profile.status_emoji, "");
    }

    #[test]
    fn expiration_passed_through() {
        let update = StatusUpdate::new("Test").expiring_at(1_700_000_060);
        assert_eq!(Profile::from_update(&update).status_expiration, 1_700_000_060);
    }

    #[test]
    fn envelope_error_parses() {
        let env: ApiEnvelope =
            serde_json::from_value(json!({ "ok": false, "error": "invalid_auth" })).unwrap();
        assert!(!env.ok);
        assert_eq!(env.error.as_deref(), Some("invalid_auth"));
    }
}
