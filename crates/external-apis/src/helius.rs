// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Helius DAS integration for Solana
//!
//! Collection pages come from the `getAssetsByGroup` JSON-RPC method with keyset
//! cursors, wallets from `getAssetsByOwner` with numbered pages. When a caller passes a
//! marketplace symbol instead of a collection key, [`ProviderAdapter::resolve_identifier`]
//! resolves it through a Magic Eden listing and the listed mint's collection grouping,
//! falling back to a `searchAssets` name match.

use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicU64, Ordering},
};

use api_client::{
    ApiClient, ApiError, ConcurrencyGovernor, HealthStatus, NormalizedItem, OwnerPageRequest,
    Page, PageCursor, PageRequest, ProviderAdapter, RawItem, SourceStats, StatsProvider,
    StatsRequest, StatsSource,
};
use regex::Regex;
use serde_json::{Value, json};
use shared_types::Chain;
use tracing::{debug, info, warn};

use crate::{
    MagicEdenClient, ProviderConfig, ProviderError, ProviderTransport,
    normalizer::{attributes, first_string, http_uri, string_at, u64_at},
};

/// Default RPC endpoint
pub const DEFAULT_BASE_URL: &str = "https://mainnet.helius-rpc.com";
/// Default pacing
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 1000.0;
/// Largest page the DAS API returns
pub const MAX_PAGE_SIZE: usize = 10_000;

const NFT_INTERFACES: [&str; 3] = ["V1_NFT", "V2_NFT", "ProgrammableNFT"];
const SEARCH_LIMIT: usize = 100;

static SOLANA_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").ok());

/// Whether `value` looks like a base58 Solana address
pub fn is_solana_address(value: &str) -> bool {
    SOLANA_ADDRESS
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}

/// Helius API client
#[derive(Debug)]
pub struct HeliusClient {
    transport: ProviderTransport,
    rpc_url: String,
    magic_eden: Option<Arc<MagicEdenClient>>,
    request_id: AtomicU64,
}

impl HeliusClient {
    /// Create a new Helius client
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, governor: ConcurrencyGovernor) -> Result<Self, ProviderError> {
        let transport = ProviderTransport::new("helius", config, governor, true)?;
        Ok(Self {
            transport,
            rpc_url: config.trimmed_base_url().to_string(),
            magic_eden: None,
            request_id: AtomicU64::new(1),
        })
    }

    /// Use Magic Eden listings to resolve collection symbols
    #[must_use]
    pub fn with_magic_eden(mut self, magic_eden: Arc<MagicEdenClient>) -> Self {
        self.magic_eden = Some(magic_eden);
        self
    }

    /// Call a DAS JSON-RPC method and return its `result`
    async fn rpc(&self, method: &str, params: Value) -> Result<Option<Value>, ProviderError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": format!("nft-aggregator-{id}"),
            "method": method,
            "params": params,
        });

        let response = self
            .transport
            .send_json(|client, key| {
                client
                    .post(format!("{}/", self.rpc_url))
                    .query(&[("api-key", key.unwrap_or_default())])
                    .json(&body)
            })
            .await?;

        let Some(response) = response else {
            return Ok(None);
        };
        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(ProviderError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: string_at(error, &["message"]).unwrap_or_default(),
            });
        }
        Ok(response.get("result").cloned())
    }

    fn collection_group(asset: &Value) -> Option<String> {
        asset
            .get("grouping")?
            .as_array()?
            .iter()
            .find(|group| {
                first_string(group, &[&["group_key"], &["groupKey"]]).as_deref()
                    == Some("collection")
            })
            .and_then(|group| first_string(group, &[&["group_value"], &["groupValue"]]))
    }

    /// Collection key of the collection a mint belongs to
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails
    pub async fn collection_of_mint(&self, mint: &str) -> Result<Option<String>, ProviderError> {
        let asset = self.rpc("getAsset", json!({ "id": mint })).await?;
        Ok(asset.as_ref().and_then(Self::collection_group))
    }

    async fn resolve_via_magic_eden(&self, symbol: &str) -> Option<String> {
        let magic_eden = self.magic_eden.as_ref()?;
        let mint = match magic_eden.first_listing_mint(symbol).await {
            Ok(Some(mint)) => mint,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, symbol, "Magic Eden listing lookup failed");
                return None;
            }
        };
        match self.collection_of_mint(&mint).await {
            Ok(collection) => collection,
            Err(e) => {
                debug!(error = %e, mint, "collection lookup for listed mint failed");
                None
            }
        }
    }

    async fn resolve_via_search(&self, symbol: &str) -> Result<Option<String>, ProviderError> {
        let needle = symbol.replace(['_', '-'], " ").trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let result = self
            .rpc(
                "searchAssets",
                json!({
                    "tokenType": "nonFungible",
                    "limit": SEARCH_LIMIT,
                    "page": 1,
                }),
            )
            .await?;

        let items = result
            .as_ref()
            .and_then(|r| r.get("items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(items.iter().find_map(|item| {
            let name = string_at(item, &["content", "metadata", "name"])
                .unwrap_or_default()
                .to_lowercase();
            let item_symbol = string_at(item, &["content", "metadata", "symbol"])
                .unwrap_or_default()
                .to_lowercase();
            (name.contains(&needle) || item_symbol == needle.replace(' ', ""))
                .then(|| Self::collection_group(item))
                .flatten()
        }))
    }

    fn page_from(result: Option<Value>, filter_nfts: bool) -> (Page, usize) {
        let Some(result) = result else {
            return (Page::empty(), 0);
        };
        let raw_items: Vec<Value> = result
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let raw_count = raw_items.len();

        let items = raw_items
            .into_iter()
            .filter(|item| {
                !filter_nfts
                    || string_at(item, &["interface"])
                        .is_some_and(|interface| NFT_INTERFACES.contains(&interface.as_str()))
            })
            .map(RawItem)
            .collect();

        let page = Page {
            items,
            next_cursor: string_at(&result, &["cursor"]).and_then(PageCursor::new),
            reported_total: u64_at(&result, &["total"]),
        };
        (page, raw_count)
    }
}

impl ApiClient for HeliusClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        debug!("performing health check on Helius RPC");
        match self.rpc("getHealth", Value::Null).await {
            Ok(_) => Ok(HealthStatus::Up),
            Err(ProviderError::Unauthorized { status } | ProviderError::ApiError { status, .. }) => {
                Ok(HealthStatus::from_probe_status(status))
            }
            Err(ProviderError::RateLimited) => Ok(HealthStatus::from_probe_status(429)),
            Err(ProviderError::Rpc { message, .. }) => Ok(HealthStatus::Degraded { reason: message }),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "helius"
    }
}

impl ProviderAdapter for HeliusClient {
    fn max_page_size(&self) -> usize {
        MAX_PAGE_SIZE
    }

    fn supports(&self, chain: Chain) -> bool {
        chain.is_solana()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        if !self.supports(request.chain) {
            return Err(ApiError::UnsupportedChain {
                chain: request.chain,
                provider: "helius",
            });
        }

        let mut params = json!({
            "groupKey": "collection",
            "groupValue": request.collection_id,
            "limit": request.page_size.min(MAX_PAGE_SIZE),
            "sortBy": {"sortBy": "id", "sortDirection": "asc"},
        });
        if let Some(cursor) = &request.cursor {
            params["cursor"] = Value::String(cursor.to_string());
        }

        debug!(
            collection = %request.collection_id,
            cursor = ?request.cursor,
            "fetching collection page from Helius"
        );
        let result = self.rpc("getAssetsByGroup", params).await?;
        Ok(Self::page_from(result, false).0)
    }

    async fn fetch_owner_page(&self, request: &OwnerPageRequest) -> Result<Page, ApiError> {
        let page_number: u64 = request
            .cursor
            .as_ref()
            .and_then(|c| c.as_str().parse().ok())
            .unwrap_or(1);
        let limit = request.page_size.min(MAX_PAGE_SIZE);

        let result = self
            .rpc(
                "getAssetsByOwner",
                json!({
                    "ownerAddress": request.owner,
                    "limit": limit,
                    "page": page_number,
                }),
            )
            .await?;

        let (mut page, raw_count) = Self::page_from(result, true);
        // numbered pages never carry a cursor; a full raw page means there may be more
        page.next_cursor = if raw_count >= limit && limit > 0 {
            PageCursor::new((page_number + 1).to_string())
        } else {
            None
        };
        page.reported_total = None;
        Ok(page)
    }

    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem> {
        let value = raw.value();
        let Some(token_id) = string_at(value, &["id"]) else {
            warn!("skipping Helius asset without id");
            return None;
        };
        let collection_id = Self::collection_group(value).unwrap_or_default();

        let metadata = value.pointer("/content/metadata").cloned().unwrap_or(Value::Null);
        let first_file = value.pointer("/content/files/0").cloned().unwrap_or(Value::Null);

        let mut item = NormalizedItem::new(token_id, collection_id, chain);
        item.name = string_at(&metadata, &["name"]);
        item.description = string_at(&metadata, &["description"]);
        item.image_url = first_string(&first_file, &[&["cdn_uri"], &["uri"]])
            .or_else(|| string_at(&metadata, &["image"]))
            .or_else(|| string_at(value, &["content", "links", "image"]))
            .and_then(|u| http_uri(&u));
        item.animation_url =
            string_at(value, &["content", "links", "animation_url"]).and_then(|u| http_uri(&u));
        item.external_url = string_at(value, &["content", "links", "external_url"]);
        item.attributes = attributes(metadata.get("attributes"));
        item.owner_id = string_at(value, &["ownership", "owner"]);
        item.collection_name = value
            .get("grouping")
            .and_then(Value::as_array)
            .and_then(|groups| {
                groups
                    .iter()
                    .find_map(|g| string_at(g, &["collection_metadata", "name"]))
            });
        item.token_standard =
            Some(string_at(value, &["interface"]).unwrap_or_else(|| "SPL".to_string()));
        item.raw_source_payload = Some(value.clone());
        Some(item)
    }

    async fn resolve_identifier(
        &self,
        collection_id: &str,
        chain: Chain,
    ) -> Result<Option<String>, ApiError> {
        if !chain.is_solana() || is_solana_address(collection_id) {
            return Ok(None);
        }

        if let Some(found) = self.resolve_via_magic_eden(collection_id).await {
            info!(symbol = collection_id, collection = %found, "resolved collection via Magic Eden listing");
            return Ok(Some(found));
        }

        let found = self.resolve_via_search(collection_id).await?;
        if let Some(found) = &found {
            info!(symbol = collection_id, collection = %found, "resolved collection via name search");
        }
        Ok(found)
    }
}

impl StatsProvider for HeliusClient {
    fn source(&self) -> StatsSource {
        StatsSource::Helius
    }

    async fn fetch_stats(&self, request: &StatsRequest) -> Result<Option<SourceStats>, ApiError> {
        if !request.chain.is_solana() {
            return Ok(None);
        }

        let group_value = if is_solana_address(&request.collection_id) {
            request.collection_id.clone()
        } else {
            match self.resolve_identifier(&request.collection_id, request.chain).await? {
                Some(resolved) => resolved,
                None => return Ok(None),
            }
        };

        let result = self
            .rpc(
                "getAssetsByGroup",
                json!({
                    "groupKey": "collection",
                    "groupValue": group_value,
                    "limit": 1,
                    "page": 1,
                }),
            )
            .await?;

        let Some(first) = result
            .as_ref()
            .and_then(|r| r.get("items"))
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return Ok(None);
        };

        let mut stats = SourceStats::new(StatsSource::Helius);
        stats.fields.name = first
            .get("grouping")
            .and_then(Value::as_array)
            .and_then(|groups| {
                groups
                    .iter()
                    .find_map(|g| string_at(g, &["collection_metadata", "name"]))
            })
            .or_else(|| string_at(first, &["content", "metadata", "name"]));
        stats.fields.symbol = string_at(first, &["content", "metadata", "symbol"]);
        stats.fields.description = string_at(first, &["content", "metadata", "description"]);
        stats.fields.image_url = first
            .pointer("/content/files/0/uri")
            .and_then(Value::as_str)
            .and_then(http_uri);
        warn_if_empty(&stats, &request.collection_id);
        Ok((!stats.is_empty()).then_some(stats))
    }
}

fn warn_if_empty(stats: &SourceStats, collection_id: &str) {
    if stats.is_empty() {
        warn!(collection = collection_id, "Helius returned an asset without collection metadata");
    }
}
