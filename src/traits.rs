//! Collaborator interfaces the watcher core is written against

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dedup::DedupPolicy;
use crate::error::ChannelError;
use crate::models::{Classification, DiscordMessage, HistoryEntry, Offer, SourceId};
use crate::state::PersistedState;

/// Static description of an upstream feed
#[derive(Debug, Clone)]
pub struct SourceProfile {
    /// Stable identifier, used in fingerprints and history
    pub id: SourceId,
    /// Display name for notifications
    pub name: String,
    /// Buckets this source reports, each present in every observation
    pub classifications: Vec<Classification>,
    /// How records referring to the same item collapse
    pub dedup: DedupPolicy,
    /// The offer is a price point: discount and final price are part of the
    /// fingerprint, so a repricing counts as a change
    pub price_in_fingerprint: bool,
    /// Most requests one fetch makes back to back; the fetch deadline is
    /// this many request timeouts
    pub fetch_requests: u32,
}

/// An upstream feed producing normalized offers
#[async_trait]
pub trait OfferSource: Send + Sync {
    /// Get the profile for this source
    fn profile(&self) -> &SourceProfile;

    /// Fetch and normalize the offers valid at `now`.
    ///
    /// Any error is treated as this source being unavailable for the cycle.
    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<Offer>>;
}

/// Opaque handle to a message living in the channel
pub type MessageHandle = String;

/// The chat channel the single live notification lives in
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn send(&self, message: &DiscordMessage) -> Result<MessageHandle, ChannelError>;

    async fn delete_message(&self, handle: &str) -> Result<(), ChannelError>;
}

/// Durable home of the debounce bookkeeping
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Never fails: missing or corrupt data yields `PersistedState::default()`
    async fn load(&self) -> PersistedState;

    /// Must be atomic for concurrent readers
    async fn save(&self, state: &PersistedState) -> Result<()>;
}

/// Append-only audit log of publishes
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> Result<()>;
}
