//! Hosted catalog API client
//!
//! Searches the CardMarket TCG API on RapidAPI by card name. Requests are
//! rate limited client-side. Network errors, 429 and any 5xx response are
//! retried up to twice with a linear backoff before the lookup is reported
//! as failed. Every retry is one more request against the run's budget.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use super::catalog::{CandidateStore, CatalogError};
use super::quota::QuotaBudget;
use super::resolver::DirectIdentifier;
use crate::models::CandidateListing;

/// Public API host
pub const DEFAULT_API_HOST: &str = "cardmarket-api-tcg.p.rapidapi.com";

/// Default requests per second when not configured
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 2;
const RETRY_STEP_MS: u64 = 500;

/// Search endpoint payload; some deployments return a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchPayload {
    Wrapped {
        #[serde(default)]
        data: Vec<ApiCard>,
    },
    Bare(Vec<ApiCard>),
}

impl SearchPayload {
    fn into_cards(self) -> Vec<ApiCard> {
        match self {
            SearchPayload::Wrapped { data } => data,
            SearchPayload::Bare(cards) => cards,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiCard {
    #[serde(default)]
    name: String,
    #[serde(default)]
    cardmarket_id: Option<u64>,
    #[serde(default)]
    episode: Option<ApiEpisode>,
    #[serde(default)]
    links: Option<ApiLinks>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiEpisode {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiLinks {
    #[serde(default)]
    cardmarket: Option<String>,
}

impl ApiCard {
    /// Normalize; cards without a recoverable product id are dropped
    fn into_listing(self) -> Option<CandidateListing> {
        let catalog_id = self.cardmarket_id.or_else(|| {
            self.links
                .as_ref()
                .and_then(|l| l.cardmarket.as_deref())
                .and_then(DirectIdentifier::parse)
                .map(|d| d.catalog_id())
        })?;

        let expansion = self
            .episode
            .and_then(|e| e.code.or(e.slug))
            .unwrap_or_default();

        Some(CandidateListing::new(catalog_id, self.name, expansion))
    }
}

/// Hosted catalog client
pub struct HostedCatalogClient {
    http_client: reqwest::Client,
    api_key: String,
    host: String,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HostedCatalogClient {
    /// Client for the public API host
    pub fn new(api_key: String, requests_per_second: u32) -> Result<Self, CatalogError> {
        Self::with_base_url(api_key, requests_per_second, format!("https://{}", DEFAULT_API_HOST))
    }

    /// Client for a specific base URL (self-hosted mirror or test server)
    pub fn with_base_url(api_key: String, requests_per_second: u32, base_url: String) -> Result<Self, CatalogError> {
        if api_key.trim().is_empty() {
            return Err(CatalogError::NotConfigured);
        }

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let base_url = base_url.trim_end_matches('/').to_string();
        let host = reqwest::Url::parse(&base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_HOST.to_string());

        Ok(Self {
            http_client,
            api_key,
            host,
            base_url,
            rate_limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    async fn search_once(&self, query: &str, limit: usize) -> Result<Vec<ApiCard>, CatalogError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/pokemon/cards/search", self.base_url);
        let limit = limit.to_string();

        let response = self
            .http_client
            .get(&url)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.host)
            .query(&[
                ("search", query),
                ("limit", limit.as_str()),
                ("page", "1"),
                ("sort", "episode_newest"),
            ])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(CatalogError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api(status.as_u16(), error_text));
        }

        let payload: SearchPayload = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        Ok(payload.into_cards())
    }
}

fn is_retryable(err: &CatalogError) -> bool {
    match err {
        CatalogError::Network(_) | CatalogError::RateLimited => true,
        CatalogError::Api(status, _) => (500..=599).contains(status),
        _ => false,
    }
}

#[async_trait]
impl CandidateStore for HostedCatalogClient {
    async fn search_by_name(
        &self,
        query: &str,
        limit: usize,
        quota: &QuotaBudget,
    ) -> Result<Vec<CandidateListing>, CatalogError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(query = %query, attempt, "Querying hosted catalog");

            match self.search_once(query, limit).await {
                Ok(cards) => {
                    let listings: Vec<CandidateListing> =
                        cards.into_iter().filter_map(ApiCard::into_listing).take(limit).collect();
                    debug!(query = %query, candidates = listings.len(), "Hosted catalog answered");
                    return Ok(listings);
                }
                Err(err) if attempt <= MAX_RETRIES && is_retryable(&err) => {
                    if !quota.try_draw() {
                        warn!(query = %query, attempt, error = %err, "No request budget left for a retry");
                        return Err(err);
                    }
                    let delay = Duration::from_millis(RETRY_STEP_MS * (attempt as u64 + 1));
                    warn!(query = %query, attempt, error = %err, "Transient catalog error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn source_name(&self) -> &'static str {
        "hosted_api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shapes() {
        let wrapped: SearchPayload = serde_json::from_str(
            r#"{"data":[{"name":"Pikachu","cardmarket_id":12,"episode":{"code":"sv8"}}],"paging":{"current":1}}"#,
        )
        .unwrap();
        assert_eq!(wrapped.into_cards().len(), 1);

        let bare: SearchPayload = serde_json::from_str(r#"[{"name":"Pikachu"}]"#).unwrap();
        assert_eq!(bare.into_cards().len(), 1);
    }

    #[test]
    fn test_listing_falls_back_to_redirect_link() {
        let card = ApiCard {
            name: "Pikachu ex".to_string(),
            links: Some(ApiLinks {
                cardmarket: Some("https://www.tcggo.com/external/cm/21443?language=2".to_string()),
            }),
            ..Default::default()
        };
        let listing = card.into_listing().unwrap();
        assert_eq!(listing.catalog_id, 21443);
        assert!(listing.attacks.is_empty());
        assert_eq!(listing.expansion, "");
    }

    #[test]
    fn test_card_without_id_is_dropped() {
        let card = ApiCard {
            name: "Mystery".to_string(),
            ..Default::default()
        };
        assert!(card.into_listing().is_none());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(&CatalogError::Api(503, String::new())));
        assert!(is_retryable(&CatalogError::Api(504, String::new())));
        assert!(is_retryable(&CatalogError::Api(599, String::new())));
        assert!(is_retryable(&CatalogError::RateLimited));
        assert!(is_retryable(&CatalogError::Network("reset".into())));
        assert!(!is_retryable(&CatalogError::Api(401, String::new())));
        assert!(!is_retryable(&CatalogError::Api(404, String::new())));
        assert!(!is_retryable(&CatalogError::Parse("eof".into())));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            HostedCatalogClient::new("  ".to_string(), 3),
            Err(CatalogError::NotConfigured)
        ));
    }
}
