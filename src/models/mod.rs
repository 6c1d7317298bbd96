//! Data models for normalized offers, observations and Discord webhook payloads

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the upstream feed an offer came from (e.g. `epic`, `itad`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which logical bucket an offer belongs to at fetch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Current,
    Upcoming,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::Upcoming => f.write_str("upcoming"),
        }
    }
}

/// Strength of the "this is a giveaway / qualifying deal" signal.
///
/// Ordered so that a stronger signal compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreeSignal {
    /// The record does not qualify and is dropped by the normalizer
    Rejected,
    /// Qualifies through a heuristic (threshold, promotion presence)
    Inferred,
    /// The source states the final price is zero
    Explicit,
}

/// Best-effort price facts; `None` means unknown, never zero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFacts {
    pub original_amount: Option<f64>,
    pub final_amount: Option<f64>,
    pub currency: Option<String>,
    pub discount_percent: Option<u8>,
}

/// A normalized promotional record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub title: String,
    pub url: String,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub price: Option<PriceFacts>,
    pub source: SourceId,
    pub classification: Classification,
    pub free_signal: FreeSignal,
}

impl Offer {
    pub fn final_amount(&self) -> Option<f64> {
        self.price.as_ref().and_then(|p| p.final_amount)
    }

    pub fn original_amount(&self) -> Option<f64> {
        self.price.as_ref().and_then(|p| p.original_amount)
    }

    pub fn discount_percent(&self) -> Option<u8> {
        self.price.as_ref().and_then(|p| p.discount_percent)
    }
}

/// What one source delivered for one bucket during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "offers", rename_all = "lowercase")]
pub enum BucketOutcome {
    Offers(Vec<Offer>),
    /// The fetch failed or timed out; distinct from an empty result
    Unavailable,
}

/// One per-source, per-classification slice of an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub source: SourceId,
    pub classification: Classification,
    pub outcome: BucketOutcome,
}

impl Bucket {
    pub fn label(&self) -> String {
        format!("{}/{}", self.source, self.classification)
    }
}

/// Everything seen across all sources in one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub buckets: Vec<Bucket>,
}

impl Observation {
    pub fn degraded_sources(&self) -> Vec<&SourceId> {
        let mut sources: Vec<&SourceId> = self
            .buckets
            .iter()
            .filter(|b| matches!(b.outcome, BucketOutcome::Unavailable))
            .map(|b| &b.source)
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

/// Why a notification was published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishReason {
    /// Operator command or boot-time publish
    Forced,
    /// The fingerprint changed and was confirmed by enough polls
    ConfirmedChange,
}

impl fmt::Display for PublishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => f.write_str("forced"),
            Self::ConfirmedChange => f.write_str("confirmed_change"),
        }
    }
}

/// Append-only audit record written on every successful publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub published_at: DateTime<Utc>,
    pub reason: PublishReason,
    pub fingerprint: String,
    pub message_id: Option<String>,
    pub snapshot: Observation,
}

/// Discord embed structure for rich notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<DiscordFooter>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Small text line at the bottom of an embed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordFooter {
    pub text: String,
}

/// Discord webhook message payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
}

/// Message object returned by `POST <webhook>?wait=true`
#[derive(Debug, Deserialize)]
pub struct DiscordMessageResponse {
    pub id: String,
}
