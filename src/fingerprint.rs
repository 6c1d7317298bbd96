//! Order-independent content hash of an observation

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::dedup::price_identity;
use crate::models::{BucketOutcome, Observation, Offer, SourceId};
use crate::traits::SourceProfile;

/// Token standing in for a bucket whose source failed this cycle
pub const SOURCE_ERROR: &str = "SOURCE_ERROR";

// Control characters never appear in titles or URLs
const FIELD_SEP: char = '\u{1f}';
const KEY_SEP: char = '\u{1e}';
const BUCKET_SEP: char = '\u{1d}';

/// Builds fingerprints, knowing which sources carry price in their identity
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    price_identity: HashSet<SourceId>,
}

impl Fingerprinter {
    pub fn from_profiles<'a>(profiles: impl IntoIterator<Item = &'a SourceProfile>) -> Self {
        let price_identity = profiles
            .into_iter()
            .filter(|p| p.price_in_fingerprint)
            .map(|p| p.id.clone())
            .collect();
        Self { price_identity }
    }

    /// Stable comparison key of one offer: trimmed title, URL, window bounds
    /// and, for price-identity sources, discount and final price.
    pub fn stable_key(&self, offer: &Offer) -> String {
        let mut fields = vec![
            offer.title.trim().to_string(),
            offer.url.clone(),
            iso(offer.window_start),
            iso(offer.window_end),
        ];
        if self.price_identity.contains(&offer.source) {
            fields.push(price_identity(offer));
        }
        fields.join(&FIELD_SEP.to_string())
    }

    /// Canonical text of the observation, before hashing
    pub fn canonical(&self, observation: &Observation) -> String {
        let mut buckets: Vec<String> = observation
            .buckets
            .iter()
            .map(|bucket| {
                let body = match &bucket.outcome {
                    BucketOutcome::Unavailable => SOURCE_ERROR.to_string(),
                    BucketOutcome::Offers(offers) => {
                        let mut keys: Vec<String> =
                            offers.iter().map(|o| self.stable_key(o)).collect();
                        keys.sort();
                        keys.join(&KEY_SEP.to_string())
                    }
                };
                format!("{}={}", bucket.label(), body)
            })
            .collect();
        buckets.sort();
        buckets.join(&BUCKET_SEP.to_string())
    }

    /// Hex md5 of [`Self::canonical`]; only ever compared for equality
    pub fn fingerprint(&self, observation: &Observation) -> String {
        format!("{:x}", md5::compute(self.canonical(observation)))
    }
}

fn iso(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
