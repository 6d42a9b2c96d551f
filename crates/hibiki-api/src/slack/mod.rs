pub mod client;
pub mod error;
pub mod types;

pub use client::SlackClient;
pub use error::SlackError;
