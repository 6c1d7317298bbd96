//! Mapping of source-specific records onto the canonical [`Offer`]
//!
//! Sources parse their own payloads into a [`RawOffer`] and hand it to a
//! [`Normalizer`] configured with that source's URL rules and qualification
//! predicate. The normalizer never fails: missing fields get fallbacks or stay
//! unknown.

use chrono::{DateTime, Utc};

use crate::models::{Classification, FreeSignal, Offer, PriceFacts, SourceId};

/// Source-agnostic intermediate record with best-effort fields
#[derive(Debug, Clone, Default)]
pub struct RawOffer {
    pub title: Option<String>,
    /// Stable product identifier (slug) used to derive the URL
    pub product_id: Option<String>,
    /// A deal page URL supplied by the source, preferred when present
    pub direct_url: Option<String>,
    /// Item type as reported upstream (`game`, `dlc`, ...)
    pub kind: Option<String>,
    pub mature: bool,
    pub price: PriceFacts,
}

/// Decides whether a raw record qualifies and how strong that signal is
pub trait OfferPredicate: Send + Sync {
    fn signal(&self, raw: &RawOffer) -> FreeSignal;
}

/// Combines predicates; the weakest signal wins
pub struct AllOf(pub Vec<Box<dyn OfferPredicate>>);

impl OfferPredicate for AllOf {
    fn signal(&self, raw: &RawOffer) -> FreeSignal {
        self.0
            .iter()
            .map(|p| p.signal(raw))
            .min()
            .unwrap_or(FreeSignal::Inferred)
    }
}

/// Explicit when the price is known to be zero, `otherwise` for anything else
pub struct ZeroPriceSignal {
    pub otherwise: FreeSignal,
}

impl OfferPredicate for ZeroPriceSignal {
    fn signal(&self, raw: &RawOffer) -> FreeSignal {
        if is_zero_price(&raw.price) {
            FreeSignal::Explicit
        } else {
            self.otherwise
        }
    }
}

/// Threshold rules for deal feeds: cheap enough, discounted enough, and not
/// already cheap at full price
#[derive(Debug, Clone)]
pub struct DealThresholds {
    pub max_final: f64,
    pub min_discount: u8,
    pub currency: String,
}

impl OfferPredicate for DealThresholds {
    fn signal(&self, raw: &RawOffer) -> FreeSignal {
        if raw.kind.as_deref().is_some_and(|k| k != "game") || raw.mature {
            return FreeSignal::Rejected;
        }
        if raw
            .price
            .currency
            .as_deref()
            .is_some_and(|c| c != self.currency)
        {
            return FreeSignal::Rejected;
        }

        let cut = raw.price.discount_percent.unwrap_or(0);
        let qualifies = cut >= self.min_discount
            && raw.price.final_amount.is_some_and(|p| p <= self.max_final)
            && raw.price.original_amount.is_some_and(|r| r > self.max_final);

        match (qualifies, is_zero_price(&raw.price)) {
            (false, _) => FreeSignal::Rejected,
            (true, true) => FreeSignal::Explicit,
            (true, false) => FreeSignal::Inferred,
        }
    }
}

/// Title allow-list. Passes everything when no keywords are configured.
///
/// Keywords of three characters or fewer are risky (`ea` would match half
/// the catalogue): they are only used when exactly three alphanumerics, and
/// then must match as a whole word.
#[derive(Debug, Clone)]
pub struct TitleKeywords {
    pub keywords: Vec<String>,
    pub min_token_len: usize,
}

impl TitleKeywords {
    pub fn matches(&self, title: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();

        for raw in &self.keywords {
            let keyword = raw.to_lowercase();
            let compact: String = keyword.chars().filter(|c| !c.is_whitespace()).collect();

            if compact.chars().count() <= 3 {
                let safe_short =
                    compact.chars().count() == 3 && compact.chars().all(|c| c.is_ascii_alphanumeric());
                if !safe_short {
                    continue;
                }
                if compact.len() < self.min_token_len {
                    if contains_word(&title, &compact) {
                        return true;
                    }
                    continue;
                }
            }

            if title.contains(&keyword) {
                return true;
            }
        }

        false
    }
}

impl OfferPredicate for TitleKeywords {
    fn signal(&self, raw: &RawOffer) -> FreeSignal {
        if self.matches(raw.title.as_deref().unwrap_or_default()) {
            FreeSignal::Explicit
        } else {
            FreeSignal::Rejected
        }
    }
}

/// How a source turns identifiers into URLs
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    /// Product page pattern with an `{id}` placeholder
    pub product_pattern: String,
    /// Generic category page used when no identifier is known
    pub fallback: String,
}

impl UrlTemplate {
    pub fn resolve(&self, raw: &RawOffer) -> String {
        if let Some(url) = raw.direct_url.as_deref().map(str::trim)
            && !url.is_empty()
        {
            return url.to_string();
        }

        match raw.product_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => self.product_pattern.replace("{id}", id),
            _ => self.fallback.clone(),
        }
    }
}

/// Place an offer window relative to `now`.
///
/// Returns `None` for windows that are already over.
pub fn classify(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<Classification> {
    if start.is_some_and(|s| s > now) {
        return Some(Classification::Upcoming);
    }
    if end.is_some_and(|e| now >= e) {
        return None;
    }
    Some(Classification::Current)
}

/// Per-source normalization rules
pub struct Normalizer {
    pub source: SourceId,
    pub urls: UrlTemplate,
    pub predicate: Box<dyn OfferPredicate>,
    pub placeholder_title: String,
}

impl Normalizer {
    /// Build an [`Offer`] from a raw record and its resolved window.
    ///
    /// Returns `None` when the predicate rejects the record or the window is
    /// entirely in the past.
    pub fn normalize(
        &self,
        raw: &RawOffer,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Offer> {
        let free_signal = self.predicate.signal(raw);
        if free_signal == FreeSignal::Rejected {
            return None;
        }
        let classification = classify(now, start, end)?;

        let title = raw
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.placeholder_title.as_str())
            .to_string();

        let price = (raw.price != PriceFacts::default()).then(|| raw.price.clone());

        Some(Offer {
            title,
            url: self.urls.resolve(raw),
            window_start: start,
            window_end: end,
            price,
            source: self.source.clone(),
            classification,
            free_signal,
        })
    }
}

fn is_zero_price(price: &PriceFacts) -> bool {
    price.final_amount.is_some_and(|p| p == 0.0) || price.discount_percent == Some(100)
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    haystack.match_indices(word).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + word.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn epic_normalizer() -> Normalizer {
        Normalizer {
            source: SourceId::new("epic"),
            urls: UrlTemplate {
                product_pattern: "https://store.epicgames.com/it/p/{id}".to_string(),
                fallback: "https://store.epicgames.com/it/free-games".to_string(),
            },
            predicate: Box::new(ZeroPriceSignal {
                otherwise: FreeSignal::Inferred,
            }),
            placeholder_title: "Untitled".to_string(),
        }
    }

    #[rstest]
    #[case(Some(-1), Some(1), Some(Classification::Current))]
    #[case(Some(0), Some(1), Some(Classification::Current))]
    #[case(Some(1), Some(2), Some(Classification::Upcoming))]
    #[case(Some(-2), Some(0), None)]
    #[case(Some(-2), Some(-1), None)]
    #[case(None, None, Some(Classification::Current))]
    #[case(None, Some(1), Some(Classification::Current))]
    fn classifies_windows_against_now(
        #[case] start_h: Option<i64>,
        #[case] end_h: Option<i64>,
        #[case] expected: Option<Classification>,
    ) {
        let start = start_h.map(|h| now() + Duration::hours(h));
        let end = end_h.map(|h| now() + Duration::hours(h));
        assert_eq!(classify(now(), start, end), expected);
    }

    #[test]
    fn missing_fields_fall_back() {
        let offer = epic_normalizer()
            .normalize(&RawOffer::default(), None, Some(now() + Duration::days(1)), now())
            .unwrap();

        assert_eq!(offer.title, "Untitled");
        assert_eq!(offer.url, "https://store.epicgames.com/it/free-games");
        assert_eq!(offer.price, None);
        assert_eq!(offer.free_signal, FreeSignal::Inferred);
    }

    #[test]
    fn url_is_derived_from_product_id() {
        let raw = RawOffer {
            title: Some("  Hades  ".to_string()),
            product_id: Some("hades".to_string()),
            price: PriceFacts {
                final_amount: Some(0.0),
                ..PriceFacts::default()
            },
            ..RawOffer::default()
        };
        let offer = epic_normalizer()
            .normalize(&raw, Some(now()), Some(now() + Duration::days(7)), now())
            .unwrap();

        assert_eq!(offer.title, "Hades");
        assert_eq!(offer.url, "https://store.epicgames.com/it/p/hades");
        assert_eq!(offer.free_signal, FreeSignal::Explicit);
        assert_eq!(offer.classification, Classification::Current);
    }

    #[test]
    fn expired_window_is_not_produced() {
        let offer = epic_normalizer().normalize(
            &RawOffer::default(),
            Some(now() - Duration::days(7)),
            Some(now() - Duration::days(1)),
            now(),
        );
        assert!(offer.is_none());
    }

    fn deal(kind: Option<&str>, cut: u8, final_amount: f64, regular: f64) -> RawOffer {
        RawOffer {
            title: Some("Deal".to_string()),
            kind: kind.map(str::to_string),
            price: PriceFacts {
                original_amount: Some(regular),
                final_amount: Some(final_amount),
                currency: Some("EUR".to_string()),
                discount_percent: Some(cut),
            },
            ..RawOffer::default()
        }
    }

    #[rstest]
    #[case(deal(Some("game"), 80, 5.99, 29.99), FreeSignal::Inferred)]
    #[case(deal(None, 100, 0.0, 19.99), FreeSignal::Explicit)]
    #[case(deal(Some("dlc"), 80, 5.99, 29.99), FreeSignal::Rejected)]
    #[case(deal(Some("game"), 40, 5.99, 9.99), FreeSignal::Rejected)]
    #[case(deal(Some("game"), 90, 12.0, 120.0), FreeSignal::Rejected)]
    #[case(deal(Some("game"), 50, 4.0, 8.0), FreeSignal::Rejected)]
    fn deal_thresholds(#[case] raw: RawOffer, #[case] expected: FreeSignal) {
        let thresholds = DealThresholds {
            max_final: 9.0,
            min_discount: 50,
            currency: "EUR".to_string(),
        };
        assert_eq!(thresholds.signal(&raw), expected);
    }

    #[test]
    fn deal_thresholds_reject_mature_and_foreign_currency() {
        let thresholds = DealThresholds {
            max_final: 9.0,
            min_discount: 50,
            currency: "EUR".to_string(),
        };
        let mut mature = deal(Some("game"), 80, 5.0, 30.0);
        mature.mature = true;
        let mut dollars = deal(Some("game"), 80, 5.0, 30.0);
        dollars.price.currency = Some("USD".to_string());

        assert_eq!(thresholds.signal(&mature), FreeSignal::Rejected);
        assert_eq!(thresholds.signal(&dollars), FreeSignal::Rejected);
    }

    #[rstest]
    #[case("Grand Theft Auto V", true)]
    #[case("GTA V Premium", true)]
    #[case("Agtastic", false)]
    #[case("Tomb Raider GOTY", true)]
    #[case("Eastward", false)]
    #[case("Stardew Valley", false)]
    fn title_keywords(#[case] title: &str, #[case] expected: bool) {
        let filter = TitleKeywords {
            keywords: vec![
                "grand theft auto".to_string(),
                "gta".to_string(),
                "ea".to_string(),
                "tomb raider".to_string(),
            ],
            min_token_len: 4,
        };
        assert_eq!(filter.matches(title), expected);
    }

    #[test]
    fn all_of_takes_the_weakest_signal() {
        let combined = AllOf(vec![
            Box::new(ZeroPriceSignal {
                otherwise: FreeSignal::Inferred,
            }),
            Box::new(DealThresholds {
                max_final: 9.0,
                min_discount: 50,
                currency: "EUR".to_string(),
            }),
        ]);

        let mut raw = deal(None, 100, 0.0, 10.0);
        assert_eq!(combined.signal(&raw), FreeSignal::Explicit);
        raw.mature = true;
        assert_eq!(combined.signal(&raw), FreeSignal::Rejected);
    }
}
