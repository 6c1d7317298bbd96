//! Collapsing of records that refer to the same underlying item

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{Classification, Offer};

/// Which stable fields identify an item for a source family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKey {
    /// Title, URL and promotion window; the same game may come back later
    TitleUrlWindow,
    /// Normalized title, grouping editions of one game together
    TitleFamily,
}

/// Display order of the deduplicated list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOrder {
    /// Current offers by end date, upcoming ones by start date
    Window,
    /// Highest original price, then discount, then cheapest, then title
    Value,
}

/// Per-source declaration of identity and tie-breaking
#[derive(Debug, Clone)]
pub struct DedupPolicy {
    pub key: IdentityKey,
    /// The offer *is* a price point: discount and final price are identity
    pub price_is_identity: bool,
    pub order: OfferOrder,
}

impl DedupPolicy {
    pub fn identity(&self, offer: &Offer) -> String {
        let mut key = match self.key {
            IdentityKey::TitleUrlWindow => format!(
                "{}|{}|{}|{}",
                offer.title.trim(),
                offer.url,
                offer.window_start.map(|d| d.to_rfc3339()).unwrap_or_default(),
                offer.window_end.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ),
            IdentityKey::TitleFamily => title_family_key(&offer.title),
        };

        if self.price_is_identity {
            key.push('|');
            key.push_str(&price_identity(offer));
        }

        key
    }
}

/// Discount and final amount rendered canonically, for sources where the
/// price point is part of what an offer is
pub fn price_identity(offer: &Offer) -> String {
    format!(
        "{}|{}",
        offer.discount_percent().map(|d| d.to_string()).unwrap_or_default(),
        offer.final_amount().map(|p| format!("{p:.2}")).unwrap_or_default(),
    )
}

/// Lowercase, drop bracketed parts, turn separators into spaces and collapse
/// whitespace, so "Game: Deluxe (2024)" and "Game - Deluxe" meet.
pub fn title_family_key(title: &str) -> String {
    let lower = title.to_lowercase();

    let mut stripped = String::with_capacity(lower.len());
    let mut closing: Option<char> = None;
    for c in lower.chars() {
        match (closing, c) {
            (None, '(') => closing = Some(')'),
            (None, '[') => closing = Some(']'),
            (Some(close), c) if c == close => {
                closing = None;
                stripped.push(' ');
            }
            (Some(_), _) => {}
            (None, ':' | '-' | '–' | '—' | '|' | '•' | '·') => stripped.push(' '),
            (None, c) => stripped.push(c),
        }
    }

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compare two records sharing an identity; `Greater` means `a` is kept.
///
/// Order: stronger free signal, lower final price, higher discount, earlier
/// end. Unknown values always lose to known ones.
pub fn preference(a: &Offer, b: &Offer) -> Ordering {
    a.free_signal
        .cmp(&b.free_signal)
        .then_with(|| cmp_known_desc(a.final_amount(), b.final_amount()))
        .then_with(|| cmp_known_asc(a.discount_percent(), b.discount_percent()))
        .then_with(|| cmp_known_desc(a.window_end, b.window_end))
}

/// Keep one offer per identity, then order for display.
///
/// Ties under [`preference`] keep the first record seen.
pub fn deduplicate(offers: Vec<Offer>, policy: &DedupPolicy) -> Vec<Offer> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Offer> = Vec::with_capacity(offers.len());

    for offer in offers {
        let key = policy.identity(&offer);
        match index.get(&key) {
            Some(&slot) => {
                if preference(&offer, &kept[slot]) == Ordering::Greater {
                    kept[slot] = offer;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(offer);
            }
        }
    }

    match policy.order {
        OfferOrder::Window => kept.sort_by(|a, b| {
            let anchor = |o: &Offer| match o.classification {
                Classification::Current => o.window_end,
                Classification::Upcoming => o.window_start,
            };
            cmp_known_desc(anchor(b), anchor(a)).then_with(|| a.title.cmp(&b.title))
        }),
        OfferOrder::Value => kept.sort_by(|a, b| {
            cmp_known_asc(a.original_amount(), b.original_amount())
                .reverse()
                .then_with(|| cmp_known_asc(a.discount_percent(), b.discount_percent()).reverse())
                .then_with(|| cmp_known_desc(a.final_amount(), b.final_amount()).reverse())
                .then_with(|| a.title.cmp(&b.title))
        }),
    }

    kept
}

/// `Greater` when `a` is the larger known value; unknown is smallest
fn cmp_known_asc<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// `Greater` when `a` is the smaller known value; unknown is smallest
fn cmp_known_desc<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
