//! Upstream feeds turned into normalized offers
//!
//! Each source parses its own payload into [`RawOffer`](crate::normalizer::RawOffer)
//! records and runs them through a per-source
//! [`Normalizer`](crate::normalizer::Normalizer). Fetch errors are returned as-is;
//! the cycle turns them into unavailable buckets.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;

pub mod epic;
pub mod itad;

pub use epic::{EpicSettings, EpicSource};
pub use itad::{ItadSettings, ItadSource};

/// HTTP client shared by every source and the channel client.
///
/// The timeout bounds every request, so a hung upstream becomes a source
/// failure instead of a stuck cycle.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Lenient timestamp parsing: unparseable dates are unknown, not errors
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    parse_window_bound(raw).flatten()
}

/// Strict parsing for promotion window bounds.
///
/// `Some(None)` when the bound is absent, `None` when it is present but
/// unreadable, in which case the whole window is unusable.
pub(crate) fn parse_window_bound(raw: Option<&str>) -> Option<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Some(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|d| Some(d.with_timezone(&Utc))),
    }
}
