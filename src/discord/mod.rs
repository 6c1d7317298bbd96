//! # Discord Webhook Integration
//!
//! This module provides the channel client that keeps exactly one live
//! notification in a Discord channel. Publishing a new notification means
//! deleting the previous webhook message and posting a fresh one.
//!
//! ## Features
//!
//! - **Message Handles**: Posts with `?wait=true` so Discord returns the created
//!   message, whose `id` is kept as the handle of the live notification
//! - **Deletion**: Removes a previous webhook message by id
//! - **Typed Failures**: Non-2xx answers surface as [`ChannelError::Status`]
//!   with the response body, transport problems as [`ChannelError::Transport`]
//!
//! ## Webhook Endpoints
//!
//! - `POST {webhook_url}?wait=true` creates a message and returns it
//! - `DELETE {webhook_url}/messages/{message_id}` deletes a message created by
//!   the same webhook
//!
//! ## Rate Limits
//!
//! Discord webhooks have the following limits:
//! - **Requests**: 30 per minute
//! - **Embeds**: 10 per message (we use 1)
//! - **Fields**: 25 per embed (we use one per source bucket)
//! - **Field value**: 1024 characters (enforced by the formatter)
//!
//! ## Environment Configuration
//!
//! Set `DISCORD_WEBHOOK_URL` with your webhook URL. The watcher refuses to start
//! without it.

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, info};

use crate::error::ChannelError;
use crate::models::{DiscordMessage, DiscordMessageResponse};
use crate::traits::{ChannelClient, MessageHandle};

/// Discord webhook client for the single live notification.
///
/// ## Fields
///
/// - `client`: Reusable HTTP client, shared with the upstream sources so the
///   same timeout applies to every network call
/// - `webhook_url`: Discord webhook URL, without query string
///
/// ## Thread Safety
///
/// This struct is `Clone` and can be safely shared across async tasks and threads.
/// The underlying `reqwest::Client` is designed for concurrent use.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    /// Creates a new notifier posting to `webhook_url`.
    ///
    /// A trailing slash or query string on the URL is ignored; the client
    /// appends its own path and `wait` parameter.
    pub fn new(client: Client, webhook_url: &str) -> Self {
        let webhook_url = webhook_url
            .split('?')
            .next()
            .unwrap_or(webhook_url)
            .trim_end_matches('/')
            .to_string();

        Self {
            client,
            webhook_url,
        }
    }

    async fn check(response: Response) -> Result<Response, ChannelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl ChannelClient for DiscordNotifier {
    /// Posts `message` and returns the id of the created Discord message.
    ///
    /// ## Error Handling
    ///
    /// - **Network failures and timeouts**: [`ChannelError::Transport`]
    /// - **HTTP errors**: [`ChannelError::Status`] with status and body excerpt
    /// - **Unexpected response body**: [`ChannelError::Transport`] from decoding
    async fn send(&self, message: &DiscordMessage) -> Result<MessageHandle, ChannelError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .query(&[("wait", "true")])
            .json(message)
            .send()
            .await?;

        let created: DiscordMessageResponse = Self::check(response).await?.json().await?;
        info!("Discord notification sent as message {}", created.id);

        Ok(created.id)
    }

    /// Deletes a message previously created through this webhook.
    ///
    /// An already-deleted message answers 404 and is reported as an error like
    /// any other; deciding what is fatal is left to the caller.
    async fn delete_message(&self, handle: &str) -> Result<(), ChannelError> {
        let url = format!(
            "{}/messages/{}",
            self.webhook_url,
            urlencoding::encode(handle)
        );
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;

        debug!("Deleted Discord message {}", handle);
        Ok(())
    }
}
