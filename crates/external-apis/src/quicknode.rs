// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! QuickNode NFT API integration
//!
//! Last-resort EVM page source and gap-fill statistics via the `qn_*` JSON-RPC add-on
//! methods. The endpoint token is the API key and is appended to the endpoint URL;
//! `{network}` in the base URL is replaced by the chain slug. Pages are numbered, so the
//! cursor carries the next page number.

use api_client::{
    ApiClient, ApiError, ConcurrencyGovernor, HealthStatus, NormalizedItem, OwnerPageRequest,
    Page, PageCursor, PageRequest, ProviderAdapter, RawItem, SourceStats, StatsProvider,
    StatsRequest, StatsSource,
};
use serde_json::{Value, json};
use shared_types::Chain;
use tracing::{debug, warn};

use crate::{
    ProviderConfig, ProviderError, ProviderTransport,
    normalizer::{attributes, first_string, http_uri, string_at, u64_at},
};

/// Default endpoint template
pub const DEFAULT_BASE_URL: &str = "https://{network}.quiknode.pro";
/// Default pacing
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 100.0;
/// Largest page the NFT API returns
pub const MAX_PAGE_SIZE: usize = 100;

/// QuickNode API client
#[derive(Debug)]
pub struct QuickNodeClient {
    transport: ProviderTransport,
    base_url: String,
}

impl QuickNodeClient {
    /// Create a new QuickNode client
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint token is configured or the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, governor: ConcurrencyGovernor) -> Result<Self, ProviderError> {
        let transport = ProviderTransport::new("quicknode", config, governor, true)?;
        Ok(Self {
            transport,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    /// Endpoint network label for an EVM chain
    pub const fn network(chain: Chain) -> Option<&'static str> {
        match chain {
            Chain::Ethereum => Some("ethereum"),
            Chain::Polygon => Some("matic"),
            Chain::Arbitrum => Some("arbitrum-mainnet"),
            Chain::Optimism => Some("optimism"),
            Chain::Base => Some("base-mainnet"),
            Chain::Solana => None,
        }
    }

    async fn rpc(&self, chain: Chain, method: &str, params: Value) -> Result<Option<Value>, ProviderError> {
        let network = Self::network(chain).ok_or(ProviderError::UnsupportedChain {
            chain,
            provider: "quicknode",
        })?;
        let endpoint = self.base_url.replace("{network}", network);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params],
        });

        let response = self
            .transport
            .send_json(|client, key| {
                client
                    .post(format!("{endpoint}/{}/", key.unwrap_or_default()))
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

    fn page_number(cursor: Option<&PageCursor>) -> u64 {
        cursor
            .and_then(|c| c.as_str().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    /// Convert a numbered result page into a cursor page
    fn page_from(result: Option<Value>, items_key: &str) -> Page {
        let Some(result) = result else {
            return Page::empty();
        };
        let items = result
            .get(items_key)
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(RawItem).collect())
            .unwrap_or_default();

        let page_number = u64_at(&result, &["pageNumber"]).unwrap_or(1);
        let total_pages = u64_at(&result, &["totalPages"]).unwrap_or(page_number);
        Page {
            items,
            next_cursor: (page_number < total_pages)
                .then(|| PageCursor::new((page_number + 1).to_string()))
                .flatten(),
            reported_total: u64_at(&result, &["totalItems"]),
        }
    }
}

impl ApiClient for QuickNodeClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        debug!("performing health check on QuickNode endpoint");
        match self.rpc(Chain::Ethereum, "qn_fetchNFTCollectionDetails", json!({"contracts": []})).await {
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
        "quicknode"
    }
}

impl ProviderAdapter for QuickNodeClient {
    fn max_page_size(&self) -> usize {
        MAX_PAGE_SIZE
    }

    fn supports(&self, chain: Chain) -> bool {
        Self::network(chain).is_some()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let result = self
            .rpc(
                request.chain,
                "qn_fetchNFTsByCollection",
                json!({
                    "collection": request.collection_id,
                    "page": Self::page_number(request.cursor.as_ref()),
                    "perPage": request.page_size.min(MAX_PAGE_SIZE),
                }),
            )
            .await?;
        let mut page = Self::page_from(result, "tokens");
        // collection pages omit the contract on each token
        for item in &mut page.items {
            if item.get("collectionAddress").is_none()
                && let Value::Object(map) = &mut item.0
            {
                map.insert(
                    "collectionAddress".to_string(),
                    Value::String(request.collection_id.clone()),
                );
            }
        }
        Ok(page)
    }

    async fn fetch_owner_page(&self, request: &OwnerPageRequest) -> Result<Page, ApiError> {
        let result = self
            .rpc(
                request.chain,
                "qn_fetchNFTs",
                json!({
                    "wallet": request.owner,
                    "page": Self::page_number(request.cursor.as_ref()),
                    "perPage": request.page_size.min(MAX_PAGE_SIZE),
                }),
            )
            .await?;
        Ok(Self::page_from(result, "assets"))
    }

    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem> {
        let value = raw.value();
        let (Some(token_id), Some(collection_id)) = (
            string_at(value, &["collectionTokenId"]),
            string_at(value, &["collectionAddress"]),
        ) else {
            warn!("skipping QuickNode token without id or contract");
            return None;
        };

        let mut item = NormalizedItem::new(token_id, collection_id.to_lowercase(), chain);
        item.name = string_at(value, &["name"]);
        item.description = string_at(value, &["description"]);
        item.image_url = first_string(value, &[&["imageUrl"], &["image"]]).and_then(|u| http_uri(&u));
        item.attributes = attributes(value.get("traits"));
        item.collection_name = string_at(value, &["collectionName"]);
        item.token_standard = string_at(value, &["contractType"]);
        item.raw_source_payload = Some(value.clone());
        Some(item)
    }
}

impl StatsProvider for QuickNodeClient {
    fn source(&self) -> StatsSource {
        StatsSource::QuickNode
    }

    async fn fetch_stats(&self, request: &StatsRequest) -> Result<Option<SourceStats>, ApiError> {
        if !self.supports(request.chain) {
            return Ok(None);
        }
        let result = self
            .rpc(
                request.chain,
                "qn_fetchNFTCollectionDetails",
                json!({"contracts": [request.collection_id]}),
            )
            .await?;

        let Some(details) = result
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|details| details.first())
        else {
            return Ok(None);
        };

        let mut stats = SourceStats::new(StatsSource::QuickNode);
        stats.fields.name = string_at(details, &["name"]);
        stats.fields.symbol = string_at(details, &["symbol"]);
        stats.fields.description = string_at(details, &["description"]);
        stats.fields.image_url = string_at(details, &["image"]).and_then(|u| http_uri(&u));
        stats.fields.total_supply = u64_at(details, &["totalSupply"]);
        Ok((!stats.is_empty()).then_some(stats))
    }
}
