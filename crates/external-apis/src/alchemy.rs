// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Alchemy NFT API integration
//!
//! Primary EVM source for collection pages and the base layer of EVM collection
//! statistics. The API key travels in the URL path, so rotating the key changes the URL.

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
    normalizer::{
        attributes, decimal_token_id, f64_at, first_string, http_uri, metadata_object,
        next_token_id, string_at, u64_at,
    },
};

/// Default base URL template; `{network}` is replaced per chain
pub const DEFAULT_BASE_URL: &str = "https://{network}.g.alchemy.com/v2";
/// Default pacing
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 330.0;
/// Largest page Alchemy returns
pub const MAX_PAGE_SIZE: usize = 100;

const HEALTH_PROBE_CONTRACT: &str = "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d";

/// Alchemy API client
#[derive(Debug)]
pub struct AlchemyClient {
    transport: ProviderTransport,
    base_url: String,
}

impl AlchemyClient {
    /// Create a new Alchemy client
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, governor: ConcurrencyGovernor) -> Result<Self, ProviderError> {
        let transport = ProviderTransport::new("alchemy", config, governor, true)?;
        Ok(Self {
            transport,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    /// Alchemy network slug for a chain
    pub const fn network(chain: Chain) -> Option<&'static str> {
        match chain {
            Chain::Ethereum => Some("eth-mainnet"),
            Chain::Polygon => Some("polygon-mainnet"),
            Chain::Arbitrum => Some("arb-mainnet"),
            Chain::Optimism => Some("opt-mainnet"),
            Chain::Base => Some("base-mainnet"),
            Chain::Solana => None,
        }
    }

    fn endpoint(&self, chain: Chain, key: Option<&str>, method: &str) -> Result<String, ProviderError> {
        let network = Self::network(chain).ok_or(ProviderError::UnsupportedChain {
            chain,
            provider: "alchemy",
        })?;
        let base = self.base_url.replace("{network}", network);
        Ok(format!("{base}/{}/{method}", key.unwrap_or_default()))
    }

    async fn get(
        &self,
        chain: Chain,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, ProviderError> {
        // validate the chain before entering the retry loop
        self.endpoint(chain, None, method)?;
        self.transport
            .send_json(|client, key| {
                let url = self.endpoint(chain, key, method).unwrap_or_default();
                client.get(url).query(query).header("accept", "application/json")
            })
            .await
    }

    /// Contract-level metadata for a collection
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails
    pub async fn contract_metadata(
        &self,
        contract: &str,
        chain: Chain,
    ) -> Result<Option<Value>, ProviderError> {
        self.get(
            chain,
            "getContractMetadata",
            &[("contractAddress", contract.to_string())],
        )
        .await
    }

    fn stats_from_metadata(data: &Value) -> SourceStats {
        let mut stats = SourceStats::new(StatsSource::Alchemy);
        let fields = &mut stats.fields;
        fields.name = first_string(
            data,
            &[
                &["name"],
                &["contractMetadata", "name"],
                &["contractMetadata", "openSea", "collectionName"],
                &["openSea", "collectionName"],
            ],
        );
        fields.symbol = first_string(data, &[&["symbol"], &["contractMetadata", "symbol"]]);
        fields.total_supply = u64_at(data, &["totalSupply"])
            .or_else(|| u64_at(data, &["contractMetadata", "totalSupply"]));

        let open_sea = data
            .get("openSea")
            .or_else(|| data.pointer("/contractMetadata/openSea"))
            .cloned()
            .unwrap_or(Value::Null);
        fields.verified = string_at(&open_sea, &["safelistRequestStatus"])
            .map(|status| status == "verified");
        fields.floor_price = f64_at(&open_sea, &["floorPrice"]).filter(|p| *p > 0.0);
        fields.description = string_at(&open_sea, &["description"]);
        fields.image_url = string_at(&open_sea, &["imageUrl"]).and_then(|u| http_uri(&u));
        fields.website = string_at(&open_sea, &["externalUrl"]);
        fields.twitter = string_at(&open_sea, &["twitterUsername"]);
        fields.discord = string_at(&open_sea, &["discordUrl"]);
        stats
    }

    fn page_from(body: Option<Value>, items_key: &str, cursor_key: &str) -> Page {
        let Some(body) = body else {
            return Page::empty();
        };
        let items = body
            .get(items_key)
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(RawItem).collect())
            .unwrap_or_default();
        Page {
            items,
            next_cursor: string_at(&body, &[cursor_key]).and_then(PageCursor::new),
            reported_total: u64_at(&body, &["totalCount"]),
        }
    }
}

impl ApiClient for AlchemyClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        debug!("performing health check on Alchemy API");
        match self.contract_metadata(HEALTH_PROBE_CONTRACT, Chain::Ethereum).await {
            Ok(_) => Ok(HealthStatus::Up),
            Err(ProviderError::Unauthorized { status } | ProviderError::ApiError { status, .. }) => {
                Ok(HealthStatus::from_probe_status(status))
            }
            Err(ProviderError::RateLimited) => Ok(HealthStatus::from_probe_status(429)),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "alchemy"
    }
}

impl ProviderAdapter for AlchemyClient {
    fn max_page_size(&self) -> usize {
        MAX_PAGE_SIZE
    }

    fn supports(&self, chain: Chain) -> bool {
        Self::network(chain).is_some()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let mut query = vec![
            ("contractAddress", request.collection_id.clone()),
            ("withMetadata", "true".to_string()),
            ("limit", request.page_size.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("startToken", cursor.to_string()));
        }

        debug!(
            collection = %request.collection_id,
            chain = %request.chain,
            cursor = ?request.cursor,
            "fetching collection page from Alchemy"
        );
        let body = self.get(request.chain, "getNFTsForCollection", &query).await?;
        Ok(Self::page_from(body, "nfts", "nextToken"))
    }

    async fn fetch_owner_page(&self, request: &OwnerPageRequest) -> Result<Page, ApiError> {
        let mut query = vec![
            ("owner", request.owner.clone()),
            ("withMetadata", "true".to_string()),
            ("pageSize", request.page_size.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("pageKey", cursor.to_string()));
        }

        let body = self.get(request.chain, "getNFTs", &query).await?;
        Ok(Self::page_from(body, "ownedNfts", "pageKey"))
    }

    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem> {
        let value = raw.value();
        let token_id = string_at(value, &["id", "tokenId"])
            .or_else(|| string_at(value, &["tokenId"]))
            .and_then(|id| decimal_token_id(&id));
        let collection_id = string_at(value, &["contract", "address"]);
        let (Some(token_id), Some(collection_id)) = (token_id, collection_id) else {
            warn!("skipping Alchemy item without token id or contract");
            return None;
        };

        let metadata = metadata_object(value.get("metadata")).unwrap_or(Value::Null);
        let mut item = NormalizedItem::new(token_id, collection_id.to_lowercase(), chain);
        item.name = string_at(&metadata, &["name"]).or_else(|| string_at(value, &["title"]));
        item.description =
            string_at(&metadata, &["description"]).or_else(|| string_at(value, &["description"]));
        item.image_url = first_string(&metadata, &[&["image"], &["image_url"]])
            .or_else(|| {
                value
                    .pointer("/media/0/gateway")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            })
            .and_then(|u| http_uri(&u));
        item.animation_url = string_at(&metadata, &["animation_url"]).and_then(|u| http_uri(&u));
        item.external_url = string_at(&metadata, &["external_url"]);
        item.attributes = attributes(metadata.get("attributes"));
        item.owner_id = value
            .get("owners")
            .and_then(Value::as_array)
            .and_then(|owners| owners.first())
            .and_then(Value::as_str)
            .map(ToString::to_string);
        item.collection_name = first_string(
            value,
            &[
                &["contractMetadata", "name"],
                &["contractMetadata", "openSea", "collectionName"],
            ],
        );
        item.token_standard = first_string(
            value,
            &[&["id", "tokenMetadata", "tokenType"], &["tokenType"]],
        );
        item.raw_source_payload = Some(value.clone());
        Some(item)
    }

    fn synthetic_cursor(&self, last: &NormalizedItem) -> Option<PageCursor> {
        next_token_id(&last.token_id).and_then(PageCursor::new)
    }
}

impl StatsProvider for AlchemyClient {
    fn source(&self) -> StatsSource {
        StatsSource::Alchemy
    }

    async fn fetch_stats(&self, request: &StatsRequest) -> Result<Option<SourceStats>, ApiError> {
        if !self.supports(request.chain) {
            return Ok(None);
        }
        let data = self
            .contract_metadata(&request.collection_id, request.chain)
            .await?;
        Ok(data
            .map(|data| Self::stats_from_metadata(&data))
            .filter(|stats| !stats.is_empty()))
    }
}
