// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Aggregation service
//!
//! Routes requests to the right adapter, runs the walker or the statistics fan-out and
//! keeps finished results in the [`ResultCache`]. Partial walks, pagination state and
//! total estimates are never cached.

use std::sync::Arc;

use api_client::{
    ApiClient, CollectionStats, NormalizedItem, OwnerPageRequest, PageCursor, ProviderAdapter,
    StatsRequest,
};
use external_apis::{
    ApiRegistry, ResultCache,
    cache::{collection_key, stats_key, wallet_key},
};
use serde::{Deserialize, Serialize};
use shared_types::Chain;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    AggregatorError,
    reconciler::reconcile,
    walker::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, WalkOutcome, WalkRequest, walk},
};

/// Engine-wide defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Page size when a request does not set one
    pub default_page_size: usize,
    /// Page budget per walk
    pub max_pages: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// A collection listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    /// Contract address, collection key or marketplace symbol
    pub collection_id: String,
    /// Chain
    pub chain: Chain,
    /// Cursor of a previous partial response
    pub cursor: Option<PageCursor>,
    /// Requested page size
    pub page_size: Option<usize>,
    /// Page budget, capped by the engine setting
    pub max_pages: Option<usize>,
    /// Marketplace item count, if the caller has one
    pub marketplace_total: Option<u64>,
    /// Drop any cached result before walking
    pub fresh: bool,
}

impl CollectionQuery {
    /// Walk a collection from the start with engine defaults
    pub fn new(collection_id: impl Into<String>, chain: Chain) -> Self {
        Self {
            collection_id: collection_id.into(),
            chain,
            cursor: None,
            page_size: None,
            max_pages: None,
            marketplace_total: None,
            fresh: false,
        }
    }
}

/// A collection listing as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CollectionNfts {
    /// Walk result
    #[serde(flatten)]
    pub outcome: WalkOutcome,
    /// Adapter that served the walk
    pub adapter: String,
    /// Whether the response came from the cache
    #[serde(default)]
    pub cached: bool,
}

/// A wallet holdings request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletQuery {
    /// Wallet address
    pub address: String,
    /// Chains to query, in response order
    pub chains: Vec<Chain>,
    /// Cursor of a previous response, passed to every chain
    pub cursor: Option<PageCursor>,
    /// Requested page size
    pub page_size: Option<usize>,
}

/// One chain's page of wallet holdings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChainWalletPage {
    /// Chain
    pub chain: Chain,
    /// Items on this page
    pub items: Vec<NormalizedItem>,
    /// Cursor for the next page on this chain
    pub next_cursor: Option<PageCursor>,
    /// Why the chain returned nothing, when it failed
    pub error: Option<String>,
    /// Whether the page came from the cache
    #[serde(default)]
    pub cached: bool,
}

impl ChainWalletPage {
    fn failed(chain: Chain, error: impl ToString) -> Self {
        Self {
            chain,
            items: Vec::new(),
            next_cursor: None,
            error: Some(error.to_string()),
            cached: false,
        }
    }
}

/// Wallet holdings across chains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalletNfts {
    /// Wallet address
    pub address: String,
    /// Per-chain pages in request order
    pub chains: Vec<ChainWalletPage>,
    /// Items across all chains
    pub total_count: usize,
    /// Last cursor any chain returned
    pub cursor: Option<PageCursor>,
    /// Whether any chain has another page
    pub has_more: bool,
}

/// Entry point for collection listings, statistics and wallet holdings
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: Arc<ApiRegistry>,
    cache: Arc<ResultCache>,
    settings: EngineSettings,
}

impl Aggregator {
    /// Create a service over configured providers and a cache
    pub fn new(registry: Arc<ApiRegistry>, cache: Arc<ResultCache>, settings: EngineSettings) -> Self {
        Self {
            registry,
            cache,
            settings,
        }
    }

    /// The provider registry
    pub fn registry(&self) -> &ApiRegistry {
        &self.registry
    }

    /// The result cache
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Engine defaults
    pub const fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// List a collection by walking its provider pages
    ///
    /// Walks that start from the first page and reach the end of the collection are
    /// cached. A cursor bypasses the cache; `fresh` evicts the cached entry first.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::NoAdapter`] when no adapter serves the chain and
    /// [`AggregatorError::InvalidRequest`] for an empty collection id
    pub async fn collection_nfts(
        &self,
        query: CollectionQuery,
        cancel: &CancellationToken,
    ) -> Result<CollectionNfts, AggregatorError> {
        let collection_id = query.collection_id.trim().to_string();
        if collection_id.is_empty() {
            return Err(AggregatorError::InvalidRequest(
                "collection id must not be empty".to_string(),
            ));
        }
        let adapter = self.registry.collection_adapter(query.chain)?;
        let key = collection_key(&collection_id, query.chain);

        if query.fresh {
            self.cache.delete(&key).await;
        } else if query.cursor.is_none()
            && let Some(mut cached) = self.cache.get_json::<CollectionNfts>(&key).await
        {
            debug!(key = %key, "serving collection from cache");
            cached.cached = true;
            return Ok(cached);
        }

        let max_pages = query
            .max_pages
            .map_or(self.settings.max_pages, |pages| pages.min(self.settings.max_pages));
        let request = WalkRequest::new(collection_id, query.chain)
            .with_cursor(query.cursor)
            .with_page_size(query.page_size.unwrap_or(self.settings.default_page_size))
            .with_max_pages(max_pages)
            .with_marketplace_total(query.marketplace_total);

        let outcome = walk(&adapter, &request, cancel).await;
        let response = CollectionNfts {
            outcome,
            adapter: adapter.name().to_string(),
            cached: false,
        };

        if request.start_cursor.is_none()
            && response.outcome.stop_reason.is_natural_end()
            && let Err(e) = self.cache.set_json(&key, &response).await
        {
            warn!(key = %key, error = %e, "failed to cache collection");
        }
        Ok(response)
    }

    /// Reconciled statistics for a collection
    ///
    /// Every applicable source is queried concurrently; failed sources are left out of the
    /// merge. The merged record is cached unless `fresh` is set, which also evicts the
    /// previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidRequest`] for an empty collection id
    pub async fn collection_stats(
        &self,
        request: &StatsRequest,
        fresh: bool,
    ) -> Result<CollectionStats, AggregatorError> {
        let collection_id = request.collection_id.trim();
        if collection_id.is_empty() {
            return Err(AggregatorError::InvalidRequest(
                "collection id must not be empty".to_string(),
            ));
        }
        let key = stats_key(collection_id, request.chain);

        if fresh {
            self.cache.delete(&key).await;
        } else if let Some(cached) = self.cache.get_json::<CollectionStats>(&key).await {
            debug!(key = %key, "serving stats from cache");
            return Ok(cached);
        }

        let fan_out = self.registry.fetch_all_stats(request).await;
        let stats = reconcile(collection_id, request.chain, &fan_out.stats);

        if !stats.sources.is_empty()
            && let Err(e) = self.cache.set_json(&key, &stats).await
        {
            warn!(key = %key, error = %e, "failed to cache stats");
        }
        Ok(stats)
    }

    /// One page of a wallet's holdings on each requested chain
    ///
    /// Chains are queried concurrently. A chain without an adapter or with a failing
    /// provider reports its error in place; only a request where no chain can be served
    /// fails as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidRequest`] for an empty address or chain list and
    /// [`AggregatorError::NoAdapter`] when none of the chains has an adapter
    pub async fn wallet_nfts(&self, query: WalletQuery) -> Result<WalletNfts, AggregatorError> {
        let address = query.address.trim().to_string();
        if address.is_empty() {
            return Err(AggregatorError::InvalidRequest(
                "wallet address must not be empty".to_string(),
            ));
        }
        let Some(&first_chain) = query.chains.first() else {
            return Err(AggregatorError::InvalidRequest(
                "at least one chain is required".to_string(),
            ));
        };
        if query
            .chains
            .iter()
            .all(|chain| self.registry.collection_adapter(*chain).is_err())
        {
            return Err(AggregatorError::NoAdapter { chain: first_chain });
        }

        let page_size = query.page_size.unwrap_or(self.settings.default_page_size);
        let mut tasks = JoinSet::new();
        for (position, chain) in query.chains.iter().copied().enumerate() {
            let this = self.clone();
            let address = address.clone();
            let cursor = query.cursor.clone();
            tasks.spawn(async move {
                let page = this.wallet_chain_page(&address, chain, cursor, page_size).await;
                (position, page)
            });
        }

        let mut pages = Vec::with_capacity(query.chains.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(page) => pages.push(page),
                Err(e) => warn!(error = %e, "wallet page task failed"),
            }
        }
        pages.sort_by_key(|(position, _)| *position);
        let chains: Vec<ChainWalletPage> = pages.into_iter().map(|(_, page)| page).collect();

        let total_count = chains.iter().map(|page| page.items.len()).sum();
        let cursor = chains.iter().rev().find_map(|page| page.next_cursor.clone());
        info!(address = %address, chains = chains.len(), items = total_count, "wallet holdings fetched");

        Ok(WalletNfts {
            address,
            has_more: cursor.is_some(),
            cursor,
            total_count,
            chains,
        })
    }

    async fn wallet_chain_page(
        &self,
        address: &str,
        chain: Chain,
        cursor: Option<PageCursor>,
        page_size: usize,
    ) -> ChainWalletPage {
        let adapter = match self.registry.collection_adapter(chain) {
            Ok(adapter) => adapter,
            Err(e) => return ChainWalletPage::failed(chain, e),
        };

        let key = wallet_key(address, chain);
        if cursor.is_none()
            && let Some(mut cached) = self.cache.get_json::<ChainWalletPage>(&key).await
        {
            cached.cached = true;
            return cached;
        }

        let request = OwnerPageRequest {
            owner: address.to_string(),
            chain,
            cursor,
            page_size: page_size.clamp(1, adapter.max_page_size().max(1)),
        };
        let page = match adapter.fetch_owner_page(&request).await {
            Ok(page) => page,
            Err(e) => {
                warn!(provider = adapter.name(), chain = %chain, error = %e, "wallet page failed");
                return ChainWalletPage::failed(chain, e);
            }
        };

        let result = ChainWalletPage {
            chain,
            items: page
                .items
                .iter()
                .filter_map(|raw| adapter.normalize(raw, chain))
                .collect(),
            next_cursor: page.next_cursor,
            error: None,
            cached: false,
        };
        if request.cursor.is_none()
            && let Err(e) = self.cache.set_json(&key, &result).await
        {
            warn!(key = %key, error = %e, "failed to cache wallet page");
        }
        result
    }
}
