// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Reservoir marketplace aggregator integration
//!
//! Marketplace overlay for EVM collections: floor, volume, sales, holder and token
//! counts. Floor prices arrive in wei in `amount.raw`, or already scaled in
//! `amount.decimal`.

use api_client::{
    ApiClient, ApiError, ConcurrencyGovernor, HealthStatus, SourceStats, StatsProvider,
    StatsRequest, StatsSource,
};
use serde_json::Value;
use shared_types::Chain;
use tracing::debug;

use crate::{
    ProviderConfig, ProviderError, ProviderTransport,
    normalizer::{f64_at, first_string, http_uri, scaled, string_at, u64_at},
};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.reservoir.tools/v4";
/// Default pacing
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 1.0;

const WEI_PER_ETH: f64 = 1e18;
const HEALTH_PROBE_CONTRACT: &str = "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d";

/// Reservoir API client
#[derive(Debug)]
pub struct ReservoirClient {
    transport: ProviderTransport,
    base_url: String,
}

impl ReservoirClient {
    /// Create a new Reservoir client; the API key is optional
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, governor: ConcurrencyGovernor) -> Result<Self, ProviderError> {
        let transport = ProviderTransport::new("reservoir", config, governor, false)?;
        Ok(Self {
            transport,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    /// Reservoir chain slug
    pub const fn chain_slug(chain: Chain) -> Option<&'static str> {
        match chain {
            Chain::Ethereum => Some("ethereum"),
            Chain::Polygon => Some("polygon"),
            Chain::Arbitrum => Some("arbitrum"),
            Chain::Optimism => Some("optimism"),
            Chain::Base => Some("base"),
            Chain::Solana => None,
        }
    }

    async fn collection(&self, slug: &str, address: &str) -> Result<Option<Value>, ProviderError> {
        let url = format!("{}/collections/{slug}:{address}/v1", self.base_url);
        self.transport
            .send_json(|client, key| {
                let request = client.get(&url).header("accept", "application/json");
                match key {
                    Some(key) => request.header("X-API-KEY", key),
                    None => request,
                }
            })
            .await
    }

    /// Convert one entry of the `collections` array into a source view
    pub fn stats_from_collection(collection: &Value) -> SourceStats {
        let mut stats = SourceStats::new(StatsSource::Reservoir);
        let fields = &mut stats.fields;

        fields.floor_price = f64_at(collection, &["floorAsk", "price", "amount", "raw"])
            .and_then(|wei| scaled(wei, WEI_PER_ETH))
            .or_else(|| f64_at(collection, &["floorAsk", "price", "amount", "decimal"]))
            .filter(|v| *v > 0.0);
        if fields.floor_price.is_some() {
            fields.floor_price_currency =
                string_at(collection, &["floorAsk", "price", "currency", "symbol"]);
        }

        fields.volume.day = f64_at(collection, &["volume", "1day"]);
        fields.volume.week = f64_at(collection, &["volume", "7day"]);
        fields.volume.month = f64_at(collection, &["volume", "30day"]);
        fields.volume.all_time = f64_at(collection, &["volume", "allTime"]);

        fields.sales.day = u64_at(collection, &["salesCount", "1day"]);
        fields.sales.week = u64_at(collection, &["salesCount", "7day"]);
        fields.sales.month = u64_at(collection, &["salesCount", "30day"]);
        fields.sales.all_time = u64_at(collection, &["salesCount", "allTime"]);

        fields.total_owners = u64_at(collection, &["ownerCount"]);
        fields.total_supply = u64_at(collection, &["tokenCount"])
            .or_else(|| u64_at(collection, &["supply"]))
            .or_else(|| u64_at(collection, &["collection", "tokenCount"]));

        fields.name = first_string(collection, &[&["name"], &["collection", "metadata", "name"]]);
        fields.symbol = string_at(collection, &["symbol"]);
        fields.description = string_at(collection, &["description"]);
        fields.image_url = string_at(collection, &["image"]).and_then(|u| http_uri(&u));
        fields.banner_url = string_at(collection, &["banner"]).and_then(|u| http_uri(&u));
        fields.website = string_at(collection, &["externalUrl"]);
        fields.twitter = string_at(collection, &["twitterUsername"]);
        fields.discord = string_at(collection, &["discordUrl"]);
        fields.verified = collection
            .get("isSpam")
            .and_then(Value::as_bool)
            .map(|spam| !spam);
        stats
    }
}

impl ApiClient for ReservoirClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        debug!("performing health check on Reservoir API");
        match self.collection("ethereum", HEALTH_PROBE_CONTRACT).await {
            Ok(_) => Ok(HealthStatus::Up),
            Err(ProviderError::Unauthorized { status } | ProviderError::ApiError { status, .. }) => {
                Ok(HealthStatus::from_probe_status(status))
            }
            Err(ProviderError::RateLimited) => Ok(HealthStatus::from_probe_status(429)),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "reservoir"
    }
}

impl StatsProvider for ReservoirClient {
    fn source(&self) -> StatsSource {
        StatsSource::Reservoir
    }

    async fn fetch_stats(&self, request: &StatsRequest) -> Result<Option<SourceStats>, ApiError> {
        let Some(slug) = Self::chain_slug(request.chain) else {
            return Ok(None);
        };

        let body = self
            .collection(slug, &request.collection_id.to_lowercase())
            .await?;

        let Some(collection) = body
            .as_ref()
            .and_then(|b| b.get("collections"))
            .and_then(Value::as_array)
            .and_then(|collections| collections.first())
        else {
            debug!(collection = %request.collection_id, "Reservoir has no data for collection");
            return Ok(None);
        };

        let stats = Self::stats_from_collection(collection);
        Ok((!stats.is_empty()).then_some(stats))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn floor_from_wei() {
        let stats = ReservoirClient::stats_from_collection(&json!({
            "name": "Bored Ape Yacht Club",
            "floorAsk": {"price": {
                "currency": {"symbol": "ETH"},
                "amount": {"raw": "12500000000000000000", "decimal": 12.5}
            }},
            "volume": {"1day": 100.5, "allTime": 1_000_000.0},
            "salesCount": {"1day": "7"},
            "ownerCount": 5500,
            "tokenCount": "10000",
            "isSpam": false
        }));

        assert_eq!(stats.fields.floor_price, Some(12.5));
        assert_eq!(stats.fields.floor_price_currency.as_deref(), Some("ETH"));
        assert_eq!(stats.fields.volume.day, Some(100.5));
        assert_eq!(stats.fields.sales.day, Some(7));
        assert_eq!(stats.fields.total_owners, Some(5500));
        assert_eq!(stats.fields.total_supply, Some(10_000));
        assert_eq!(stats.fields.verified, Some(true));
    }

    #[test]
    fn floor_from_decimal_when_raw_missing() {
        let stats = ReservoirClient::stats_from_collection(&json!({
            "floorAsk": {"price": {"amount": {"decimal": 0.75}}}
        }));
        assert_eq!(stats.fields.floor_price, Some(0.75));
        assert!(stats.fields.floor_price_currency.is_none());
    }

    #[test]
    fn solana_is_not_served() {
        assert!(ReservoirClient::chain_slug(Chain::Solana).is_none());
        assert_eq!(ReservoirClient::chain_slug(Chain::Base), Some("base"));
    }
}
