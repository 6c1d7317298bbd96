//! Epic Games Store free-games promotions feed

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::parse_window_bound;
use crate::dedup::{DedupPolicy, IdentityKey, OfferOrder};
use crate::models::{Classification, FreeSignal, Offer, PriceFacts, SourceId};
use crate::normalizer::{Normalizer, RawOffer, UrlTemplate, ZeroPriceSignal};
use crate::traits::{OfferSource, SourceProfile};

const PROMOTIONS_URL: &str =
    "https://store-site-backend-static.ak.epicgames.com/freeGamesPromotions";

/// Locale and endpoint for the Epic feed
#[derive(Debug, Clone)]
pub struct EpicSettings {
    pub locale: String,
    pub country: String,
    /// Overrides the promotions endpoint
    pub endpoint: Option<String>,
}

impl EpicSettings {
    fn url(&self) -> String {
        let base = self.endpoint.as_deref().unwrap_or(PROMOTIONS_URL);
        format!(
            "{}?locale={}&country={}&allowCountries={}",
            base,
            urlencoding::encode(&self.locale),
            urlencoding::encode(&self.country),
            urlencoding::encode(&self.country),
        )
    }
}

pub struct EpicSource {
    client: Client,
    settings: EpicSettings,
    profile: SourceProfile,
    normalizer: Normalizer,
}

impl EpicSource {
    pub fn new(client: Client, settings: EpicSettings) -> Self {
        let id = SourceId::new("epic");
        let store = format!("https://store.epicgames.com/{}", settings.locale);

        let profile = SourceProfile {
            id: id.clone(),
            name: "Epic Games Store".to_string(),
            classifications: vec![Classification::Current, Classification::Upcoming],
            dedup: DedupPolicy {
                key: IdentityKey::TitleUrlWindow,
                price_is_identity: false,
                order: OfferOrder::Window,
            },
            price_in_fingerprint: false,
            fetch_requests: 1,
        };

        // Every promotion in this feed is a giveaway; a 0% price makes it explicit
        let normalizer = Normalizer {
            source: id,
            urls: UrlTemplate {
                product_pattern: format!("{store}/p/{{id}}"),
                fallback: format!("{store}/free-games"),
            },
            predicate: Box::new(ZeroPriceSignal {
                otherwise: FreeSignal::Inferred,
            }),
            placeholder_title: "Untitled".to_string(),
        };

        Self {
            client,
            settings,
            profile,
            normalizer,
        }
    }

    /// Walk current and upcoming promotion windows of every element.
    pub fn parse_offers(&self, payload: &PromotionsResponse, now: DateTime<Utc>) -> Vec<Offer> {
        let elements = payload
            .data
            .as_ref()
            .and_then(|d| d.catalog.as_ref())
            .and_then(|c| c.search_store.as_ref())
            .map(|s| s.elements.as_slice())
            .unwrap_or_default();

        let mut offers = Vec::new();
        for element in elements {
            let Some(promotions) = &element.promotions else {
                continue;
            };

            let windows = promotions
                .promotional_offers
                .iter()
                .chain(&promotions.upcoming_promotional_offers)
                .flat_map(|group| &group.promotional_offers);

            for window in windows {
                let (Some(start), Some(end)) = (
                    parse_window_bound(window.start_date.as_deref()),
                    parse_window_bound(window.end_date.as_deref()),
                ) else {
                    debug!(
                        "Skipping window with unreadable dates for {}",
                        element.title.as_deref().unwrap_or("untitled element")
                    );
                    continue;
                };
                let raw = element.raw_offer(window);

                if let Some(offer) = self.normalizer.normalize(&raw, start, end, now) {
                    offers.push(offer);
                }
            }
        }

        offers
    }
}

#[async_trait]
impl OfferSource for EpicSource {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<Offer>> {
        info!("Fetching free games from {}", self.profile.name);

        let response = self.client.get(self.settings.url()).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Epic promotions fetch failed: {}",
                response.status()
            ));
        }

        let payload: PromotionsResponse = response.json().await?;
        let offers = self.parse_offers(&payload, now);

        info!("Found {} promotion windows on {}", offers.len(), self.profile.name);
        Ok(offers)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PromotionsResponse {
    data: Option<PromotionsData>,
}

#[derive(Debug, Deserialize)]
struct PromotionsData {
    #[serde(rename = "Catalog")]
    catalog: Option<Catalog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    search_store: Option<SearchStore>,
}

#[derive(Debug, Deserialize)]
struct SearchStore {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Element {
    title: Option<String>,
    product_slug: Option<String>,
    url_slug: Option<String>,
    #[serde(default)]
    offer_mappings: Option<Vec<PageMapping>>,
    price: Option<ElementPrice>,
    promotions: Option<Promotions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMapping {
    page_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElementPrice {
    total_price: Option<TotalPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalPrice {
    original_price: Option<i64>,
    currency_code: Option<String>,
    currency_info: Option<CurrencyInfo>,
}

#[derive(Debug, Deserialize)]
struct CurrencyInfo {
    decimals: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Promotions {
    #[serde(default)]
    promotional_offers: Vec<PromotionGroup>,
    #[serde(default)]
    upcoming_promotional_offers: Vec<PromotionGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromotionGroup {
    #[serde(default)]
    promotional_offers: Vec<PromotionWindow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromotionWindow {
    start_date: Option<String>,
    end_date: Option<String>,
    discount_setting: Option<DiscountSetting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscountSetting {
    /// Percentage of the original price still to pay; 0 means free
    discount_percentage: Option<u8>,
}

impl Element {
    fn is_mystery(&self) -> bool {
        self.title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains("mystery game"))
    }

    /// First usable slug: product slug, then the product page mapping, then
    /// the URL slug.
    fn slug(&self) -> Option<String> {
        let usable = |s: &&str| !s.is_empty() && *s != "[]";

        self.product_slug
            .as_deref()
            .filter(usable)
            .or_else(|| {
                self.offer_mappings
                    .iter()
                    .flatten()
                    .filter_map(|m| m.page_slug.as_deref())
                    .find(usable)
            })
            .or_else(|| self.url_slug.as_deref().filter(usable))
            .map(|s| s.trim_end_matches("/home").to_string())
    }

    fn raw_offer(&self, window: &PromotionWindow) -> RawOffer {
        let total = self.price.as_ref().and_then(|p| p.total_price.as_ref());
        let scale = total
            .and_then(|t| t.currency_info.as_ref())
            .and_then(|c| c.decimals)
            .map_or(100.0, |d| 10f64.powi(d as i32));
        let original = total
            .and_then(|t| t.original_price)
            .map(|p| p as f64 / scale);
        let pay_percentage = window
            .discount_setting
            .as_ref()
            .and_then(|d| d.discount_percentage)
            .map(|p| p.min(100));

        RawOffer {
            title: self.title.clone(),
            // Mystery slugs point at placeholder pages until the reveal
            product_id: if self.is_mystery() { None } else { self.slug() },
            direct_url: None,
            kind: None,
            mature: false,
            price: PriceFacts {
                original_amount: original,
                final_amount: pay_percentage
                    .map(|p| original.unwrap_or(0.0) * f64::from(p) / 100.0)
                    .filter(|_| original.is_some() || pay_percentage == Some(0)),
                currency: total.and_then(|t| t.currency_code.clone()),
                discount_percent: pay_percentage.map(|p| 100 - p),
            },
        }
    }
}
