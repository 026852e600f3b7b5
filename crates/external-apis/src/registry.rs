// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! API client registry for managing multiple external API providers
//!
//! This module routes page walks to the adapter serving a chain, fans statistics
//! requests out to every applicable source, and aggregates provider health.

use std::{collections::BTreeMap, sync::Arc};

use api_client::{
    ApiClient, ApiError, HealthStatus, NormalizedItem, OwnerPageRequest, Page, PageCursor,
    PageRequest, ProviderAdapter, RawItem, SourceStats, StatsProvider, StatsRequest, StatsSource,
};
use shared_types::Chain;
use tracing::{debug, info, warn};

use crate::{
    AlchemyClient, HeliusClient, MagicEdenClient, MoralisClient, QuickNodeClient, ReservoirClient,
    ScrapeClient,
};

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No adapter serves the chain
    #[error("No adapter configured for chain {chain}")]
    NoAdapter {
        /// Requested chain
        chain: Chain,
    },
}

/// The page adapter chosen for a chain
///
/// Dispatches by enum rather than trait object so the adapter futures stay `Send`
/// without boxing.
#[derive(Debug, Clone, Copy)]
pub enum ChainAdapter<'a> {
    /// Alchemy (EVM)
    Alchemy(&'a AlchemyClient),
    /// Moralis (EVM)
    Moralis(&'a MoralisClient),
    /// QuickNode (EVM)
    QuickNode(&'a QuickNodeClient),
    /// Helius (Solana)
    Helius(&'a HeliusClient),
}

macro_rules! delegate {
    ($self:expr, $client:ident => $body:expr) => {
        match $self {
            ChainAdapter::Alchemy($client) => $body,
            ChainAdapter::Moralis($client) => $body,
            ChainAdapter::QuickNode($client) => $body,
            ChainAdapter::Helius($client) => $body,
        }
    };
}

impl ApiClient for ChainAdapter<'_> {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        delegate!(self, client => client.health_check().await)
    }

    fn name(&self) -> &'static str {
        delegate!(self, client => client.name())
    }
}

impl ProviderAdapter for ChainAdapter<'_> {
    fn max_page_size(&self) -> usize {
        delegate!(self, client => client.max_page_size())
    }

    fn supports(&self, chain: Chain) -> bool {
        delegate!(self, client => client.supports(chain))
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        delegate!(self, client => client.fetch_page(request).await)
    }

    async fn fetch_owner_page(&self, request: &OwnerPageRequest) -> Result<Page, ApiError> {
        delegate!(self, client => client.fetch_owner_page(request).await)
    }

    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem> {
        delegate!(self, client => client.normalize(raw, chain))
    }

    fn synthetic_cursor(&self, last: &NormalizedItem) -> Option<PageCursor> {
        delegate!(self, client => client.synthetic_cursor(last))
    }

    async fn resolve_identifier(
        &self,
        collection_id: &str,
        chain: Chain,
    ) -> Result<Option<String>, ApiError> {
        delegate!(self, client => client.resolve_identifier(collection_id, chain).await)
    }
}

/// Per-source results of a statistics fan-out
#[derive(Debug, Default)]
pub struct StatsFanOut {
    /// Sources that returned a non-empty view
    pub stats: BTreeMap<StatsSource, SourceStats>,
    /// Sources that failed, with the error message
    pub failures: BTreeMap<StatsSource, String>,
}

impl StatsFanOut {
    fn record(&mut self, source: StatsSource, result: Option<Result<Option<SourceStats>, ApiError>>) {
        match result {
            None | Some(Ok(None)) => {}
            Some(Ok(Some(stats))) if stats.is_empty() => {}
            Some(Ok(Some(stats))) => {
                self.stats.insert(source, stats);
            }
            Some(Err(e)) => {
                warn!(source = %source, error = %e, "statistics source failed");
                self.failures.insert(source, e.to_string());
            }
        }
    }
}

/// Registry of configured provider clients
#[derive(Debug, Default)]
pub struct ApiRegistry {
    alchemy: Option<AlchemyClient>,
    moralis: Option<MoralisClient>,
    quicknode: Option<QuickNodeClient>,
    helius: Option<HeliusClient>,
    reservoir: Option<ReservoirClient>,
    magic_eden: Option<Arc<MagicEdenClient>>,
    scrape: Option<ScrapeClient>,
}

impl ApiRegistry {
    /// Create a new empty API registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the Alchemy client
    #[must_use]
    pub fn with_alchemy(mut self, client: AlchemyClient) -> Self {
        self.alchemy = Some(client);
        self
    }

    /// Register the Moralis client
    #[must_use]
    pub fn with_moralis(mut self, client: MoralisClient) -> Self {
        self.moralis = Some(client);
        self
    }

    /// Register the QuickNode client
    #[must_use]
    pub fn with_quicknode(mut self, client: QuickNodeClient) -> Self {
        self.quicknode = Some(client);
        self
    }

    /// Register the Helius client; it picks up Magic Eden for symbol resolution when
    /// Magic Eden is registered first
    #[must_use]
    pub fn with_helius(mut self, client: HeliusClient) -> Self {
        let client = match &self.magic_eden {
            Some(magic_eden) => client.with_magic_eden(Arc::clone(magic_eden)),
            None => client,
        };
        self.helius = Some(client);
        self
    }

    /// Register the Reservoir client
    #[must_use]
    pub fn with_reservoir(mut self, client: ReservoirClient) -> Self {
        self.reservoir = Some(client);
        self
    }

    /// Register the Magic Eden client
    #[must_use]
    pub fn with_magic_eden(mut self, client: Arc<MagicEdenClient>) -> Self {
        self.magic_eden = Some(client);
        self
    }

    /// Register the page scraper
    #[must_use]
    pub fn with_scrape(mut self, client: ScrapeClient) -> Self {
        self.scrape = Some(client);
        self
    }

    /// The adapter that walks collections on `chain`
    ///
    /// EVM chains prefer Alchemy, then Moralis, then QuickNode. Solana uses Helius.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoAdapter`] when no configured adapter serves the chain
    pub fn collection_adapter(&self, chain: Chain) -> Result<ChainAdapter<'_>, RegistryError> {
        let adapter = if chain.is_solana() {
            self.helius.as_ref().map(ChainAdapter::Helius)
        } else {
            self.alchemy
                .as_ref()
                .filter(|c| c.supports(chain))
                .map(ChainAdapter::Alchemy)
                .or_else(|| {
                    self.moralis
                        .as_ref()
                        .filter(|c| c.supports(chain))
                        .map(ChainAdapter::Moralis)
                })
                .or_else(|| {
                    self.quicknode
                        .as_ref()
                        .filter(|c| c.supports(chain))
                        .map(ChainAdapter::QuickNode)
                })
        };

        match adapter {
            Some(adapter) => {
                debug!(chain = %chain, adapter = adapter.name(), "selected page adapter");
                Ok(adapter)
            }
            None => Err(RegistryError::NoAdapter { chain }),
        }
    }

    /// Query every statistics source applicable to the request's chain concurrently
    pub async fn fetch_all_stats(&self, request: &StatsRequest) -> StatsFanOut {
        let evm = request.chain.is_evm();
        let solana = request.chain.is_solana();

        let (alchemy, helius, reservoir, magic_eden, moralis, quicknode, scrape) = tokio::join!(
            fetch_optional(self.alchemy.as_ref().filter(|_| evm), request),
            fetch_optional(self.helius.as_ref().filter(|_| solana), request),
            fetch_optional(self.reservoir.as_ref().filter(|_| evm), request),
            fetch_optional(self.magic_eden.as_deref().filter(|_| solana), request),
            fetch_optional(self.moralis.as_ref(), request),
            fetch_optional(self.quicknode.as_ref().filter(|_| evm), request),
            fetch_optional(
                self.scrape
                    .as_ref()
                    .filter(|_| request.source_url.is_some()),
                request
            ),
        );

        let mut fan_out = StatsFanOut::default();
        fan_out.record(StatsSource::Alchemy, alchemy);
        fan_out.record(StatsSource::Helius, helius);
        fan_out.record(StatsSource::Reservoir, reservoir);
        fan_out.record(StatsSource::MagicEden, magic_eden);
        fan_out.record(StatsSource::Moralis, moralis);
        fan_out.record(StatsSource::QuickNode, quicknode);
        fan_out.record(StatsSource::Scrape, scrape);

        info!(
            collection = %request.collection_id,
            chain = %request.chain,
            sources = fan_out.stats.len(),
            failures = fan_out.failures.len(),
            "statistics fan-out complete"
        );
        fan_out
    }

    /// Health of every registered client, checked concurrently
    pub async fn get_overall_health(&self) -> BTreeMap<String, HealthStatus> {
        let results = tokio::join!(
            check_optional(self.alchemy.as_ref()),
            check_optional(self.moralis.as_ref()),
            check_optional(self.quicknode.as_ref()),
            check_optional(self.helius.as_ref()),
            check_optional(self.reservoir.as_ref()),
            check_optional(self.magic_eden.as_deref()),
            check_optional(self.scrape.as_ref()),
        );

        [
            results.0, results.1, results.2, results.3, results.4, results.5, results.6,
        ]
        .into_iter()
        .flatten()
        .map(|(name, status)| (name.to_string(), status))
        .collect()
    }

    /// Get the count of registered clients
    pub fn client_count(&self) -> usize {
        self.client_names().len()
    }

    /// Get the names of all registered clients
    pub fn client_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if let Some(client) = &self.alchemy {
            names.push(client.name());
        }
        if let Some(client) = &self.moralis {
            names.push(client.name());
        }
        if let Some(client) = &self.quicknode {
            names.push(client.name());
        }
        if let Some(client) = &self.helius {
            names.push(client.name());
        }
        if let Some(client) = &self.reservoir {
            names.push(client.name());
        }
        if let Some(client) = &self.magic_eden {
            names.push(client.name());
        }
        if let Some(client) = &self.scrape {
            names.push(client.name());
        }
        names
    }
}

async fn fetch_optional<S: StatsProvider>(
    provider: Option<&S>,
    request: &StatsRequest,
) -> Option<Result<Option<SourceStats>, ApiError>> {
    let provider = provider?;
    debug!(source = %provider.source(), collection = %request.collection_id, "requesting statistics");
    Some(provider.fetch_stats(request).await)
}

async fn check_optional<C: ApiClient>(client: Option<&C>) -> Option<(&'static str, HealthStatus)> {
    let client = client?;
    let status = match client.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Down {
            reason: format!("Health check failed: {e}"),
        },
    };
    Some((client.name(), status))
}

#[cfg(test)]
mod tests {
    use api_client::ConcurrencyGovernor;

    use super::*;
    use crate::ProviderConfig;

    fn config() -> ProviderConfig {
        ProviderConfig::new("https://example.com", vec!["key".to_string()], 0.0)
    }

    #[tokio::test]
    async fn registry_creation() {
        let registry = ApiRegistry::new();
        assert_eq!(registry.client_count(), 0);
        assert!(registry.client_names().is_empty());
        assert!(registry.get_overall_health().await.is_empty());
    }

    #[test]
    fn no_adapter_for_unconfigured_chain() {
        let registry = ApiRegistry::new();
        assert!(matches!(
            registry.collection_adapter(Chain::Ethereum),
            Err(RegistryError::NoAdapter { chain: Chain::Ethereum })
        ));

        let registry = ApiRegistry::new()
            .with_alchemy(AlchemyClient::new(&config(), ConcurrencyGovernor::default()).unwrap());
        assert!(matches!(
            registry.collection_adapter(Chain::Solana),
            Err(RegistryError::NoAdapter { .. })
        ));
    }

    #[test]
    fn evm_routing_prefers_alchemy_then_moralis() {
        let governor = ConcurrencyGovernor::default();
        let registry = ApiRegistry::new()
            .with_moralis(MoralisClient::new(&config(), governor.clone()).unwrap())
            .with_quicknode(QuickNodeClient::new(&config(), governor.clone()).unwrap());
        assert_eq!(registry.collection_adapter(Chain::Polygon).unwrap().name(), "moralis");

        let registry =
            registry.with_alchemy(AlchemyClient::new(&config(), governor).unwrap());
        assert_eq!(registry.collection_adapter(Chain::Polygon).unwrap().name(), "alchemy");
        assert_eq!(registry.client_count(), 3);
    }

    #[test]
    fn solana_routes_to_helius() {
        let governor = ConcurrencyGovernor::default();
        let registry = ApiRegistry::new()
            .with_magic_eden(Arc::new(
                MagicEdenClient::new(&config(), governor.clone()).unwrap(),
            ))
            .with_helius(HeliusClient::new(&config(), governor).unwrap());
        let adapter = registry.collection_adapter(Chain::Solana).unwrap();
        assert_eq!(adapter.name(), "helius");
        assert_eq!(adapter.max_page_size(), crate::helius::MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn fan_out_skips_unconfigured_sources() {
        let registry = ApiRegistry::new();
        let fan_out = registry
            .fetch_all_stats(&StatsRequest::new("0xabc", Chain::Ethereum))
            .await;
        assert!(fan_out.stats.is_empty());
        assert!(fan_out.failures.is_empty());
    }
}
