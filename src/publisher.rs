//! Replacement of the single live notification
//!
//! Steps, in order: delete the previous message (failures ignored), send the
//! new one, persist the new state, append history. Nothing after a failed
//! send runs, so persisted state never claims a publish that did not happen.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::PublishError;
use crate::models::{DiscordMessage, HistoryEntry, Observation, PublishReason};
use crate::state::PersistedState;
use crate::traits::{ChannelClient, HistorySink, StateStore};

/// Everything describing one publish
pub struct Publication<'a> {
    pub fingerprint: &'a str,
    pub message: &'a DiscordMessage,
    pub observation: &'a Observation,
    pub reason: PublishReason,
    pub now: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Publisher {
    channel: Arc<dyn ChannelClient>,
    store: Arc<dyn StateStore>,
    history: Arc<dyn HistorySink>,
}

impl Publisher {
    pub fn new(
        channel: Arc<dyn ChannelClient>,
        store: Arc<dyn StateStore>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            channel,
            store,
            history,
        }
    }

    /// Replace the live notification and return the state now persisted.
    pub async fn publish(
        &self,
        state: &PersistedState,
        publication: Publication<'_>,
    ) -> Result<PersistedState, PublishError> {
        if let Some(previous) = state.last_message_id.as_deref() {
            match self.channel.delete_message(previous).await {
                Ok(()) => info!("Removed previous notification {}", previous),
                Err(e) => warn!("Could not remove previous notification {}: {}", previous, e),
            }
        }

        let message_id = self.channel.send(publication.message).await.map_err(|e| {
            error!("Failed to send notification: {}", e);
            PublishError::Send(e)
        })?;

        let next = PersistedState {
            last_published_fingerprint: publication.fingerprint.to_string(),
            last_message_id: Some(message_id.clone()),
            pending_fingerprint: None,
            pending_count: 0,
            last_change_at: Some(publication.now),
        };
        let saved = self.store.save(&next).await;

        let entry = HistoryEntry {
            published_at: publication.now,
            reason: publication.reason,
            fingerprint: publication.fingerprint.to_string(),
            message_id: Some(message_id.clone()),
            snapshot: publication.observation.clone(),
        };
        if let Err(e) = self.history.append(&entry).await {
            warn!("Failed to record publish history: {}", e);
        }

        match saved {
            Ok(()) => {
                info!(
                    "Published notification {} ({}, fingerprint {})",
                    message_id, publication.reason, publication.fingerprint
                );
                Ok(next)
            }
            Err(source) => {
                error!("Notification {} sent but state was not saved: {}", message_id, source);
                Err(PublishError::StateWrite { message_id, source })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators recording every call, shared with the cycle tests

    use std::sync::Mutex;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    use super::*;
    use crate::error::ChannelError;
    use crate::traits::MessageHandle;

    #[derive(Default)]
    pub struct FakeChannel {
        pub sent: Mutex<Vec<DiscordMessage>>,
        pub deleted: Mutex<Vec<String>>,
        pub fail_send: Mutex<bool>,
        pub fail_delete: bool,
    }

    #[async_trait]
    impl ChannelClient for FakeChannel {
        async fn send(&self, message: &DiscordMessage) -> Result<MessageHandle, ChannelError> {
            if *self.fail_send.lock().unwrap() {
                return Err(ChannelError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            Ok(format!("msg-{}", sent.len()))
        }

        async fn delete_message(&self, handle: &str) -> Result<(), ChannelError> {
            self.deleted.lock().unwrap().push(handle.to_string());
            if self.fail_delete {
                return Err(ChannelError::Status {
                    status: 404,
                    body: "Unknown Message".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub state: Mutex<PersistedState>,
        pub saves: Mutex<usize>,
        pub fail_save: bool,
    }

    impl MemoryStore {
        pub fn with(state: PersistedState) -> Self {
            Self {
                state: Mutex::new(state),
                ..Self::default()
            }
        }

        pub fn current(&self) -> PersistedState {
            self.state.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn load(&self) -> PersistedState {
            self.current()
        }

        async fn save(&self, state: &PersistedState) -> Result<()> {
            if self.fail_save {
                return Err(anyhow!("disk full"));
            }
            *self.state.lock().unwrap() = state.clone();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryHistory {
        pub entries: Mutex<Vec<HistoryEntry>>,
        pub fail: bool,
    }

    #[async_trait]
    impl HistorySink for MemoryHistory {
        async fn append(&self, entry: &HistoryEntry) -> Result<()> {
            if self.fail {
                return Err(anyhow!("database is locked"));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }
}
