//! Rendering of an observation into the Discord notification

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{
    Bucket, BucketOutcome, Classification, DiscordEmbed, DiscordField, DiscordFooter,
    DiscordMessage, Observation, Offer, PublishReason, SourceId,
};
use crate::traits::SourceProfile;

/// Discord rejects field values longer than this
pub const FIELD_LIMIT: usize = 1024;
const MAX_ITEMS: usize = 10;
const UNAVAILABLE: &str = "⚠️ Source unavailable, retrying on the next check.";

pub struct NotificationFormatter {
    names: HashMap<SourceId, String>,
}

impl NotificationFormatter {
    pub fn new<'a>(profiles: impl IntoIterator<Item = &'a SourceProfile>) -> Self {
        let names = profiles
            .into_iter()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();
        Self { names }
    }

    pub fn render(
        &self,
        observation: &Observation,
        reason: PublishReason,
        now: DateTime<Utc>,
    ) -> DiscordMessage {
        let fields = observation.buckets.iter().map(|b| self.field(b)).collect();

        let degraded: Vec<&str> = observation
            .degraded_sources()
            .into_iter()
            .map(|s| self.name(s))
            .collect();

        let mut description = format!("Updated <t:{}:R>", now.timestamp());
        if !degraded.is_empty() {
            description.push_str(&format!("\nUnavailable this time: {}", degraded.join(", ")));
        }

        let footer = (reason == PublishReason::Forced).then(|| DiscordFooter {
            text: "Manual refresh".to_string(),
        });

        DiscordMessage {
            content: None,
            embeds: vec![DiscordEmbed {
                title: "🎮 Free & cheap games".to_string(),
                description,
                color: 0x0058_65F2, // Discord blue
                timestamp: now.to_rfc3339(),
                fields,
                footer,
            }],
        }
    }

    fn name<'a>(&'a self, source: &'a SourceId) -> &'a str {
        self.names
            .get(source)
            .map_or(source.as_str(), String::as_str)
    }

    fn field(&self, bucket: &Bucket) -> DiscordField {
        let name = match bucket.classification {
            Classification::Current => format!("🎁 {}: available now", self.name(&bucket.source)),
            Classification::Upcoming => format!("⏭️ {}: coming next", self.name(&bucket.source)),
        };

        let value = match &bucket.outcome {
            BucketOutcome::Unavailable => UNAVAILABLE.to_string(),
            BucketOutcome::Offers(offers) if offers.is_empty() => match bucket.classification {
                Classification::Current => "Nothing right now 👀".to_string(),
                Classification::Upcoming => "Nothing announced yet".to_string(),
            },
            BucketOutcome::Offers(offers) => offer_list(offers),
        };

        DiscordField {
            name,
            value,
            inline: false,
        }
    }
}

/// Bullet list of offers, capped in items and in characters, with a
/// "+N more" tail for whatever did not fit.
fn offer_list(offers: &[Offer]) -> String {
    let mut out = String::new();
    let mut shown = 0;

    for offer in offers.iter().take(MAX_ITEMS) {
        let line = offer_line(offer);
        let separator = if out.is_empty() { "" } else { "\n" };
        let remaining_after = offers.len() - shown - 1;
        let reserve = if remaining_after > 0 { tail(remaining_after).len() } else { 0 };

        if out.len() + separator.len() + line.len() + reserve > FIELD_LIMIT {
            break;
        }
        out.push_str(separator);
        out.push_str(&line);
        shown += 1;
    }

    let hidden = offers.len() - shown;
    if hidden > 0 {
        out.push_str(&tail(hidden));
    }
    if out.len() > FIELD_LIMIT {
        out = truncate(&out, FIELD_LIMIT);
    }
    out
}

fn tail(hidden: usize) -> String {
    format!("\n(+{hidden} more)")
}

fn offer_line(offer: &Offer) -> String {
    let mut line = format!("• **[{}]({})**", offer.title, offer.url);

    if let Some(price) = price_text(offer) {
        line.push_str(&format!(" {price}"));
    }

    match offer.classification {
        Classification::Current => {
            if let Some(end) = offer.window_end {
                line.push_str(&format!(" until <t:{}:f>", end.timestamp()));
            }
        }
        Classification::Upcoming => {
            if let Some(start) = offer.window_start {
                line.push_str(&format!(" from <t:{}:f>", start.timestamp()));
            }
        }
    }

    line
}

fn price_text(offer: &Offer) -> Option<String> {
    let price = offer.price.as_ref()?;
    let currency = price.currency.as_deref();

    match (price.original_amount, price.final_amount, price.discount_percent) {
        (Some(original), Some(last), cut) => Some(format!(
            "~~{}~~ → **{}**{}",
            money(original, currency),
            money(last, currency),
            cut.map(|c| format!(" (-{c}%)")).unwrap_or_default()
        )),
        (_, _, Some(cut)) => Some(format!("(-{cut}%)")),
        _ => None,
    }
}

fn money(amount: f64, currency: Option<&str>) -> String {
    let number = format!("{amount:.2}").replace('.', ",");
    match currency {
        Some("EUR") | None => format!("{number}€"),
        Some(code) => format!("{number} {code}"),
    }
}

/// Cut `text` to at most `limit` bytes including the trailing ellipsis
fn truncate(text: &str, limit: usize) -> String {
    let mut end = limit.saturating_sub('…'.len_utf8()).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::dedup::{DedupPolicy, IdentityKey, OfferOrder};
    use crate::models::{FreeSignal, PriceFacts};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 16, 0, 0).unwrap()
    }

    fn profile(id: &str, name: &str) -> SourceProfile {
        SourceProfile {
            id: SourceId::new(id),
            name: name.to_string(),
            classifications: vec![Classification::Current],
            dedup: DedupPolicy {
                key: IdentityKey::TitleUrlWindow,
                price_is_identity: false,
                order: OfferOrder::Window,
            },
            price_in_fingerprint: false,
            fetch_requests: 1,
        }
    }

    fn offer(title: &str) -> Offer {
        Offer {
            title: title.to_string(),
            url: format!("https://store.epicgames.com/it/p/{}", title.to_lowercase()),
            window_start: Some(now()),
            window_end: Some(now() + Duration::days(7)),
            price: None,
            source: SourceId::new("epic"),
            classification: Classification::Current,
            free_signal: FreeSignal::Explicit,
        }
    }

    fn formatter() -> NotificationFormatter {
        NotificationFormatter::new([&profile("epic", "Epic Games"), &profile("itad", "Steam deals")])
    }

    #[test]
    fn failed_sources_get_a_visible_placeholder() {
        let buckets = vec![
            Bucket {
                source: SourceId::new("epic"),
                classification: Classification::Current,
                outcome: BucketOutcome::Offers(vec![offer("Hades")]),
            },
            Bucket {
                source: SourceId::new("itad"),
                classification: Classification::Current,
                outcome: BucketOutcome::Unavailable,
            },
        ];

        let message = formatter().render(&Observation { buckets }, PublishReason::ConfirmedChange, now());
        let embed = &message.embeds[0];

        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields[0].value.contains("[Hades](https://store.epicgames.com/it/p/hades)"));
        assert_eq!(embed.fields[1].value, UNAVAILABLE);
        assert!(embed.fields[1].name.contains("Steam deals"));
        assert!(embed.description.contains("Unavailable this time: Steam deals"));
        assert!(embed.footer.is_none());
    }

    #[test]
    fn long_lists_stay_within_discord_limits() {
        let offers: Vec<Offer> = (0..40)
            .map(|i| offer(&format!("A very long game title number {i} with a subtitle")))
            .collect();
        let buckets = vec![Bucket {
            source: SourceId::new("epic"),
            classification: Classification::Current,
            outcome: BucketOutcome::Offers(offers),
        }];

        let message = formatter().render(&Observation { buckets }, PublishReason::Forced, now());
        let value = &message.embeds[0].fields[0].value;

        assert!(value.len() <= FIELD_LIMIT);
        assert!(value.ends_with("more)"));
        assert!(message.embeds[0].footer.is_some());
    }

    #[test]
    fn deal_prices_are_rendered() {
        let mut deal = offer("Control");
        deal.window_start = None;
        deal.window_end = None;
        deal.price = Some(PriceFacts {
            original_amount: Some(39.99),
            final_amount: Some(3.99),
            currency: Some("EUR".to_string()),
            discount_percent: Some(90),
        });

        assert!(offer_line(&deal).ends_with("~~39,99€~~ → **3,99€** (-90%)"));
    }

    #[test]
    fn empty_buckets_say_so() {
        let buckets = vec![Bucket {
            source: SourceId::new("epic"),
            classification: Classification::Upcoming,
            outcome: BucketOutcome::Offers(vec![]),
        }];

        let message = formatter().render(&Observation { buckets }, PublishReason::ConfirmedChange, now());

        assert_eq!(message.embeds[0].fields[0].value, "Nothing announced yet");
    }

    #[test]
    fn truncate_cuts_multibyte_text_on_a_char_boundary() {
        for prefix in ["", "a", "ab"] {
            let text = format!("{prefix}{}", "è€".repeat(400));

            let cut = truncate(&text, FIELD_LIMIT);

            assert!(cut.len() <= FIELD_LIMIT);
            assert!(cut.ends_with('…'));
            assert!(text.starts_with(cut.trim_end_matches('…')));
        }
    }
}
