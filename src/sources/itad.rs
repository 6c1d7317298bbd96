//! Steam deals through the IsThereAnyDeal `deals/v2` API

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::parse_timestamp;
use crate::dedup::{DedupPolicy, IdentityKey, OfferOrder, deduplicate};
use crate::models::{Classification, Offer, PriceFacts, SourceId};
use crate::normalizer::{
    AllOf, DealThresholds, Normalizer, OfferPredicate, RawOffer, TitleKeywords, UrlTemplate,
};
use crate::traits::{OfferSource, SourceProfile};

const DEALS_URL: &str = "https://api.isthereanydeal.com/deals/v2";
const STEAM_SHOP_ID: u32 = 61;
const PAGE_SIZE: u32 = 200;

/// Filters and paging for the deals feed
#[derive(Debug, Clone)]
pub struct ItadSettings {
    pub api_key: String,
    pub country: String,
    pub max_final_eur: f64,
    pub min_discount_pct: u8,
    pub max_results: usize,
    /// Only keep titles matching `aaa_keywords`
    pub strict_aaa: bool,
    pub aaa_target: usize,
    pub aaa_keywords: Vec<String>,
    pub aaa_min_token_len: usize,
    pub max_pages: u32,
    /// Overrides the deals endpoint
    pub endpoint: Option<String>,
}

impl ItadSettings {
    /// How many unique games the notification should list
    fn wanted(&self) -> usize {
        if self.strict_aaa {
            self.aaa_target.max(1)
        } else {
            self.max_results.clamp(10, 200)
        }
    }

    fn page_url(&self, offset: u32) -> String {
        format!(
            "{}?key={}&country={}&shops={}&limit={}&offset={}&sort=-cut",
            self.endpoint.as_deref().unwrap_or(DEALS_URL),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.country),
            STEAM_SHOP_ID,
            PAGE_SIZE,
            offset,
        )
    }
}

pub struct ItadSource {
    client: Client,
    settings: ItadSettings,
    profile: SourceProfile,
    normalizer: Normalizer,
}

impl ItadSource {
    pub fn new(client: Client, settings: ItadSettings) -> Self {
        let id = SourceId::new("itad");

        // Editions of one game collapse to the cheapest; the listed price is
        // still content, so repricing shows up as a change.
        let profile = SourceProfile {
            id: id.clone(),
            name: "Steam deals".to_string(),
            classifications: vec![Classification::Current],
            dedup: DedupPolicy {
                key: IdentityKey::TitleFamily,
                price_is_identity: false,
                order: OfferOrder::Value,
            },
            price_in_fingerprint: true,
            fetch_requests: settings.max_pages.max(1),
        };

        let mut predicates: Vec<Box<dyn OfferPredicate>> = vec![Box::new(DealThresholds {
            max_final: settings.max_final_eur,
            min_discount: settings.min_discount_pct,
            currency: "EUR".to_string(),
        })];
        if settings.strict_aaa {
            predicates.push(Box::new(TitleKeywords {
                keywords: settings.aaa_keywords.clone(),
                min_token_len: settings.aaa_min_token_len,
            }));
        }

        let normalizer = Normalizer {
            source: id,
            urls: UrlTemplate {
                product_pattern: "https://isthereanydeal.com/game/{id}/".to_string(),
                fallback: "https://isthereanydeal.com/deals/".to_string(),
            },
            predicate: Box::new(AllOf(predicates)),
            placeholder_title: "Untitled".to_string(),
        };

        Self {
            client,
            settings,
            profile,
            normalizer,
        }
    }

    async fn page(&self, offset: u32) -> Result<DealsPage> {
        let response = self
            .client
            .get(self.settings.page_url(offset))
            .header("Accept", "application/json")
            .header("x-api-key", &self.settings.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "ITAD fetch failed: {}{}",
                status,
                if body.is_empty() {
                    String::new()
                } else {
                    format!(" - {}", body.chars().take(160).collect::<String>())
                }
            ));
        }

        Ok(response.json().await?)
    }

    /// Normalize one page into `offers`, skipping exact repeats of a price point
    pub fn collect_page(
        &self,
        page: &DealsPage,
        now: DateTime<Utc>,
        seen: &mut HashSet<String>,
        offers: &mut Vec<Offer>,
    ) {
        for item in &page.list {
            let Some(deal) = &item.deal else {
                continue;
            };

            let raw = item.raw_offer(deal);
            let raw_key = format!(
                "{}|{:?}|{:?}|{:?}",
                item.id.as_deref().unwrap_or_default(),
                raw.price.discount_percent,
                raw.price.final_amount,
                raw.price.original_amount,
            );

            let Some(offer) = self
                .normalizer
                .normalize(&raw, None, parse_timestamp(deal.expiry.as_deref()), now)
            else {
                continue;
            };
            if seen.insert(raw_key) {
                offers.push(offer);
            }
        }
    }
}

#[async_trait]
impl OfferSource for ItadSource {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<Offer>> {
        let wanted = self.settings.wanted();
        info!("Fetching Steam deals from IsThereAnyDeal (want {})", wanted);

        let mut seen = HashSet::new();
        let mut offers = Vec::new();
        let mut offset = 0;

        for page_num in 0..self.settings.max_pages {
            let page = self.page(offset).await?;
            if page.list.is_empty() {
                break;
            }
            self.collect_page(&page, now, &mut seen, &mut offers);

            // Collect more than needed, then sort and slice
            let unique = deduplicate(offers.clone(), &self.profile.dedup).len();
            debug!("ITAD page {}: {} unique matches so far", page_num + 1, unique);
            if unique >= wanted * 3 || !page.has_more {
                break;
            }
            offset = page.next_offset.unwrap_or(offset + PAGE_SIZE);
        }

        let mut games = deduplicate(offers, &self.profile.dedup);
        games.truncate(if self.settings.strict_aaa {
            wanted
        } else {
            self.settings.max_results
        });

        info!("Found {} Steam deals", games.len());
        Ok(games)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsPage {
    #[serde(default)]
    list: Vec<DealItem>,
    #[serde(default)]
    has_more: bool,
    next_offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DealItem {
    id: Option<String>,
    slug: Option<String>,
    title: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    mature: bool,
    deal: Option<Deal>,
}

#[derive(Debug, Deserialize)]
struct Deal {
    price: Option<Amount>,
    regular: Option<Amount>,
    cut: Option<u8>,
    url: Option<String>,
    expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    amount: Option<f64>,
    currency: Option<String>,
}

impl DealItem {
    fn raw_offer(&self, deal: &Deal) -> RawOffer {
        RawOffer {
            title: self.title.clone().or_else(|| self.slug.clone()),
            product_id: self.slug.clone(),
            direct_url: deal.url.clone(),
            kind: self.kind.clone(),
            mature: self.mature,
            price: PriceFacts {
                original_amount: deal.regular.as_ref().and_then(|r| r.amount),
                final_amount: deal.price.as_ref().and_then(|p| p.amount),
                currency: deal.price.as_ref().and_then(|p| p.currency.clone()),
                discount_percent: deal.cut,
            },
        }
    }
}
