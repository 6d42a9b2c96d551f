//! The external status collaborator.
//!
//! The relay only ever sets or clears one status field. Slack implements
//! this for real; [`crate::memory::MemoryStatus`] implements it in memory
//! for dry runs and tests.

use std::future::Future;

use serde::Serialize;

/// A status change to push to the external service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub text: String,
    pub emoji: Option<String>,
    /// Unix timestamp (seconds) after which the service drops the status.
    pub expiration: Option<i64>,
}

impl StatusUpdate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn expiring_at(mut self, unix_secs: i64) -> Self {
        self.expiration = Some(unix_secs);
        self
    }

    /// The update that clears the status.
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_clear(&self) -> bool {
        self.text.is_empty()
    }
}

/// Who the service credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user: String,
    pub team: String,
}

/// A chat service with a single settable status field.
pub trait StatusService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Set the status. An empty `text` clears it.
    fn set_status(
        &self,
        update: &StatusUpdate,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Clear the status.
    fn clear_status(&self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let update = StatusUpdate::cleared();
        async move { self.set_status(&update).await }
    }

    /// Check the credential and report whose it is.
    fn identity(&self) -> impl Future<Output = Result<Identity, Self::Error>> + Send;
}
