//! Typed errors for the places where the watcher branches on failure kind

use thiserror::Error;

/// Fatal startup problems; the process refuses to run without a valid config
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Failures talking to the chat channel
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("discord answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("discord request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Outcome of a publish that did not complete
#[derive(Error, Debug)]
pub enum PublishError {
    /// Nothing was sent; persisted state was left untouched
    #[error("failed to send notification: {0}")]
    Send(#[source] ChannelError),
    /// The message went out but the new state could not be written
    #[error("notification {message_id} sent but state write failed: {source}")]
    StateWrite {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },
}
