use thiserror::Error;

/// Errors from the Slack Web API client.
#[derive(Debug, Error)]
pub enum SlackError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Slack answered 200 with `"ok": false`.
    #[error("{method} failed: {message}")]
    Api { method: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}
