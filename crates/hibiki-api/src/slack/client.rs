use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::SlackError;
use super::types::{ApiEnvelope, AuthTestResponse, Profile, ProfileSetRequest};
use crate::traits::{Identity, StatusService, StatusUpdate};

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Slack Web API client authenticated with a user token (`xoxp-…`).
pub struct SlackClient {
    token: String,
    base_url: String,
    http: Client,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL.into())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// The token's first four characters, which name its type
    /// (`xoxp`, `xoxb`, ...). Safe to log.
    pub fn token_kind(&self) -> &str {
        self.token.get(..4).unwrap_or("")
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, SlackError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(SlackError::Status {
                status,
                message: body,
            })
        }
    }

    /// Call a Web API method and decode its response.
    ///
    /// Slack reports most failures as HTTP 200 with `"ok": false`; those are
    /// turned into [`SlackError::Api`].
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, SlackError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SlackError::Parse(e.to_string()))?;

        let envelope: ApiEnvelope = serde_json::from_value(value.clone())
            .map_err(|e| SlackError::Parse(e.to_string()))?;
        if !envelope.ok {
            return Err(SlackError::Api {
                method: method.to_string(),
                message: envelope.error.unwrap_or_else(|| "unknown error".into()),
            });
        }

        serde_json::from_value(value).map_err(|e| SlackError::Parse(e.to_string()))
    }
}

impl StatusService for SlackClient {
    type Error = SlackError;

    async fn set_status(&self, update: &StatusUpdate) -> Result<(), SlackError> {
        let request = ProfileSetRequest {
            profile: Profile::from_update(update),
        };
        let _: ApiEnvelope = self.call("users.profile.set", &request).await?;
        tracing::debug!(text = %update.text, "Slack status set");
        Ok(())
    }

    async fn identity(&self) -> Result<Identity, SlackError> {
        let resp: AuthTestResponse = self.call("auth.test", &serde_json::json!({})).await?;
        Ok(Identity {
            user: resp.user.unwrap_or_default(),
            team: resp.team.unwrap_or_default(),
        })
    }
}
