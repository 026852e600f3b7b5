// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Moralis Web3 API integration
//!
//! This module provides the Moralis adapter: EVM collection and wallet pages (used when
//! Alchemy is not configured) and gap-fill collection metadata for both EVM and Solana.

use api_client::{
    ApiClient, ApiError, ConcurrencyGovernor, HealthStatus, NormalizedItem, OwnerPageRequest,
    Page, PageCursor, PageRequest, ProviderAdapter, RawItem, SourceStats, StatsProvider,
    StatsRequest, StatsSource,
};
use serde_json::Value;
use shared_types::Chain;
use tracing::{debug, warn};

use crate::{
    ProviderConfig, ProviderError, ProviderTransport,
    normalizer::{attributes, first_string, http_uri, metadata_object, string_at, u64_at},
};

/// Default EVM API base URL
pub const DEFAULT_BASE_URL: &str = "https://deep-index.moralis.io/api/v2";
/// Default Solana gateway base URL
pub const DEFAULT_SOLANA_BASE_URL: &str = "https://solana-gateway.moralis.io";
/// Default pacing
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 200.0;
/// Largest page Moralis returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Moralis API client implementation
#[derive(Debug)]
pub struct MoralisClient {
    transport: ProviderTransport,
    base_url: String,
    solana_base_url: String,
}

impl MoralisClient {
    /// Create a new Moralis API client
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client cannot be created
    pub fn new(config: &ProviderConfig, governor: ConcurrencyGovernor) -> Result<Self, ProviderError> {
        Self::with_solana_base_url(config, DEFAULT_SOLANA_BASE_URL, governor)
    }

    /// Create a client with an explicit Solana gateway
    ///
    /// # Errors
    ///
    /// Same as [`MoralisClient::new`]
    pub fn with_solana_base_url(
        config: &ProviderConfig,
        solana_base_url: &str,
        governor: ConcurrencyGovernor,
    ) -> Result<Self, ProviderError> {
        let transport = ProviderTransport::new("moralis", config, governor, true)?;
        Ok(Self {
            transport,
            base_url: config.trimmed_base_url().to_string(),
            solana_base_url: solana_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Moralis chain parameter for an EVM chain
    pub const fn chain_param(chain: Chain) -> Option<&'static str> {
        match chain {
            Chain::Ethereum => Some("eth"),
            Chain::Polygon => Some("polygon"),
            Chain::Arbitrum => Some("arbitrum"),
            Chain::Optimism => Some("optimism"),
            Chain::Base => Some("base"),
            Chain::Solana => None,
        }
    }

    fn require_chain(chain: Chain) -> Result<&'static str, ProviderError> {
        Self::chain_param(chain).ok_or(ProviderError::UnsupportedChain {
            chain,
            provider: "moralis",
        })
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Option<Value>, ProviderError> {
        self.transport
            .send_json(|client, key| {
                client
                    .get(url)
                    .query(query)
                    .header("X-API-Key", key.unwrap_or_default())
                    .header("accept", "application/json")
            })
            .await
    }

    fn page_from(body: Option<Value>) -> Page {
        let Some(body) = body else {
            return Page::empty();
        };
        let items = body
            .get("result")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(RawItem).collect())
            .unwrap_or_default();
        Page {
            items,
            next_cursor: string_at(&body, &["cursor"]).and_then(PageCursor::new),
            reported_total: u64_at(&body, &["total"]),
        }
    }

    fn stats_from_metadata(data: &Value) -> SourceStats {
        let mut stats = SourceStats::new(StatsSource::Moralis);
        let metadata = metadata_object(data.get("metadata")).unwrap_or(Value::Null);
        stats.fields.name = string_at(data, &["name"]);
        stats.fields.symbol = string_at(data, &["symbol"]);
        stats.fields.total_supply = u64_at(data, &["total_supply"]);
        stats.fields.description = string_at(&metadata, &["description"]);
        stats.fields.image_url = string_at(&metadata, &["image"]).and_then(|u| http_uri(&u));
        stats
    }
}

impl ApiClient for MoralisClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let url = format!("{}/info/endpointWeights", self.base_url);
        debug!(url, "performing health check on Moralis API");

        let start_time = std::time::Instant::now();
        let result = self.get(&url, &[]).await;
        match result {
            Ok(_) => {
                debug!("Moralis API health check passed in {:?}", start_time.elapsed());
                Ok(HealthStatus::Up)
            }
            Err(ProviderError::Unauthorized { status } | ProviderError::ApiError { status, .. }) => {
                warn!(status, "Moralis API health check failed");
                Ok(HealthStatus::from_probe_status(status))
            }
            Err(ProviderError::RateLimited) => Ok(HealthStatus::from_probe_status(429)),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "moralis"
    }
}

impl ProviderAdapter for MoralisClient {
    fn max_page_size(&self) -> usize {
        MAX_PAGE_SIZE
    }

    fn supports(&self, chain: Chain) -> bool {
        Self::chain_param(chain).is_some()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let chain = Self::require_chain(request.chain)?;
        let url = format!("{}/nft/{}", self.base_url, request.collection_id);
        let mut query = vec![
            ("chain", chain.to_string()),
            ("format", "decimal".to_string()),
            ("limit", request.page_size.min(MAX_PAGE_SIZE).to_string()),
            ("normalizeMetadata", "true".to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("cursor", cursor.to_string()));
        }

        debug!(
            url,
            chain,
            cursor = ?request.cursor,
            "fetching collection page from Moralis"
        );
        Ok(Self::page_from(self.get(&url, &query).await?))
    }

    async fn fetch_owner_page(&self, request: &OwnerPageRequest) -> Result<Page, ApiError> {
        let chain = Self::require_chain(request.chain)?;
        let url = format!("{}/{}/nft", self.base_url, request.owner);
        let mut query = vec![
            ("chain", chain.to_string()),
            ("format", "decimal".to_string()),
            ("limit", request.page_size.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("cursor", cursor.to_string()));
        }

        Ok(Self::page_from(self.get(&url, &query).await?))
    }

    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem> {
        let value = raw.value();
        let (Some(token_id), Some(collection_id)) = (
            string_at(value, &["token_id"]),
            string_at(value, &["token_address"]),
        ) else {
            warn!("skipping Moralis item without token id or address");
            return None;
        };

        let metadata = metadata_object(value.get("normalized_metadata"))
            .or_else(|| metadata_object(value.get("metadata")))
            .unwrap_or(Value::Null);

        let mut item = NormalizedItem::new(token_id, collection_id.to_lowercase(), chain);
        item.name = string_at(&metadata, &["name"]);
        item.description = string_at(&metadata, &["description"]);
        item.image_url = first_string(&metadata, &[&["image"], &["image_url"]])
            .and_then(|u| http_uri(&u));
        item.animation_url = string_at(&metadata, &["animation_url"]).and_then(|u| http_uri(&u));
        item.external_url = first_string(&metadata, &[&["external_url"], &["external_link"]]);
        item.attributes = attributes(metadata.get("attributes"));
        item.owner_id = string_at(value, &["owner_of"]);
        item.collection_name = string_at(value, &["name"]);
        item.token_standard = string_at(value, &["contract_type"]);
        item.raw_source_payload = Some(value.clone());
        Some(item)
    }
}

impl StatsProvider for MoralisClient {
    fn source(&self) -> StatsSource {
        StatsSource::Moralis
    }

    async fn fetch_stats(&self, request: &StatsRequest) -> Result<Option<SourceStats>, ApiError> {
        let data = if let Some(chain) = Self::chain_param(request.chain) {
            let url = format!("{}/nft/{}/metadata", self.base_url, request.collection_id);
            self.get(&url, &[("chain", chain.to_string())]).await?
        } else {
            let url = format!(
                "{}/nft/mainnet/{}/metadata",
                self.solana_base_url, request.collection_id
            );
            self.get(&url, &[]).await?
        };

        Ok(data
            .map(|data| Self::stats_from_metadata(&data))
            .filter(|stats| !stats.is_empty()))
    }
}
