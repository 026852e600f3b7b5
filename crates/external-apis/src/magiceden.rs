// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Magic Eden marketplace integration
//!
//! Marketplace overlay for Solana collection statistics, addressed by collection
//! symbol. Prices arrive in lamports. Also used to turn a symbol into a token mint
//! during Helius identifier resolution.

use api_client::{
    ApiClient, ApiError, ConcurrencyGovernor, HealthStatus, SourceStats, StatsProvider,
    StatsRequest, StatsSource,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    ProviderConfig, ProviderError, ProviderTransport,
    normalizer::{f64_at, first_string, http_uri, scaled, string_at, u64_at},
};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api-mainnet.magiceden.io/v2";
/// Default pacing
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 1.0;

const LAMPORTS_PER_SOL: f64 = 1e9;
const SUPPLY_FIELDS: [&str; 8] = [
    "totalSupply",
    "supply",
    "items",
    "tokenCount",
    "totalItems",
    "itemCount",
    "count",
    "total",
];

/// Magic Eden API client
#[derive(Debug)]
pub struct MagicEdenClient {
    transport: ProviderTransport,
    base_url: String,
}

impl MagicEdenClient {
    /// Create a new Magic Eden client; the API key is optional
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, governor: ConcurrencyGovernor) -> Result<Self, ProviderError> {
        let transport = ProviderTransport::new("magic_eden", config, governor, false)?;
        Ok(Self {
            transport,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        self.transport
            .send_json(|client, key| {
                let request = client
                    .get(&url)
                    .query(query)
                    .header("accept", "application/json");
                match key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            })
            .await
    }

    /// Token mint of the first active listing of a collection
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails
    pub async fn first_listing_mint(&self, symbol: &str) -> Result<Option<String>, ProviderError> {
        let listings = self
            .get(
                &format!("/collections/{symbol}/listings"),
                &[("limit", "1".to_string())],
            )
            .await?;

        Ok(listings
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|listings| listings.first())
            .and_then(|listing| {
                first_string(
                    listing,
                    &[&["tokenMint"], &["token", "mintAddress"], &["mint"], &["mintAddress"]],
                )
            }))
    }

    /// Merge the `/stats` and collection info payloads into one source view
    pub fn stats_from(stats_data: &Value, info_data: &Value) -> SourceStats {
        let mut stats = SourceStats::new(StatsSource::MagicEden);
        let fields = &mut stats.fields;

        let lamports = |key: &str| {
            f64_at(stats_data, &[key])
                .filter(|v| *v > 0.0)
                .and_then(|v| scaled(v, LAMPORTS_PER_SOL))
        };
        fields.floor_price = lamports("floorPrice");
        if fields.floor_price.is_some() {
            fields.floor_price_currency = Some("SOL".to_string());
        }
        fields.average_price = lamports("avgPrice24hr");
        fields.volume.day = lamports("volume24h");
        fields.volume.week = lamports("volume7d");
        fields.volume.month = lamports("volume30d");
        fields.volume.all_time = lamports("volumeAll");

        fields.sales.day = u64_at(stats_data, &["sales24h"]);
        fields.sales.week = u64_at(stats_data, &["sales7d"]);
        fields.sales.month = u64_at(stats_data, &["sales30d"]);
        fields.total_owners = u64_at(stats_data, &["uniqueHolders"])
            .or_else(|| u64_at(stats_data, &["holders"]));

        fields.total_supply = SUPPLY_FIELDS
            .iter()
            .find_map(|key| u64_at(stats_data, &[*key]).filter(|v| *v > 0))
            .or_else(|| {
                SUPPLY_FIELDS
                    .iter()
                    .chain(std::iter::once(&"numberOfItems"))
                    .find_map(|key| u64_at(info_data, &[*key]).filter(|v| *v > 0))
            });

        fields.name = string_at(info_data, &["name"]);
        fields.description = string_at(info_data, &["description"]);
        fields.image_url = string_at(info_data, &["image"]).and_then(|u| http_uri(&u));
        fields.twitter = string_at(info_data, &["twitter"]);
        fields.discord = string_at(info_data, &["discord"]);
        fields.website = string_at(info_data, &["website"]);
        fields.verified = info_data.get("isVerified").and_then(Value::as_bool);
        stats
    }
}

impl ApiClient for MagicEdenClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        debug!("performing health check on Magic Eden API");
        match self
            .get("/collections", &[("limit", "1".to_string())])
            .await
        {
            Ok(_) => Ok(HealthStatus::Up),
            Err(ProviderError::Unauthorized { status } | ProviderError::ApiError { status, .. }) => {
                Ok(HealthStatus::from_probe_status(status))
            }
            Err(ProviderError::RateLimited) => Ok(HealthStatus::from_probe_status(429)),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "magic_eden"
    }
}

impl StatsProvider for MagicEdenClient {
    fn source(&self) -> StatsSource {
        StatsSource::MagicEden
    }

    async fn fetch_stats(&self, request: &StatsRequest) -> Result<Option<SourceStats>, ApiError> {
        if !request.chain.is_solana() {
            return Ok(None);
        }
        let Some(symbol) = request.marketplace_symbol() else {
            debug!(
                collection = %request.collection_id,
                "no marketplace symbol for collection, skipping Magic Eden"
            );
            return Ok(None);
        };

        let stats_path = format!("/collections/{symbol}/stats");
        let info_path = format!("/collections/{symbol}");
        let (stats_data, info_data) =
            tokio::join!(self.get(&stats_path, &[]), self.get(&info_path, &[]));

        let info_data = info_data.unwrap_or_else(|e| {
            warn!(error = %e, symbol, "Magic Eden collection info failed");
            None
        });
        let stats_data = stats_data?;
        if stats_data.is_none() && info_data.is_none() {
            return Ok(None);
        }

        let stats = Self::stats_from(
            &stats_data.unwrap_or(Value::Null),
            &info_data.unwrap_or(Value::Null),
        );
        Ok((!stats.is_empty()).then_some(stats))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lamports_are_converted() {
        let stats = MagicEdenClient::stats_from(
            &json!({
                "floorPrice": 1_500_000_000u64,
                "volumeAll": 2_000_000_000_000u64,
                "avgPrice24hr": 1_200_000_000.0,
                "sales24h": 12,
                "supply": "10000"
            }),
            &json!({
                "name": "Okay Bears",
                "isVerified": true,
                "twitter": "https://twitter.com/okaybears"
            }),
        );

        assert_eq!(stats.fields.floor_price, Some(1.5));
        assert_eq!(stats.fields.floor_price_currency.as_deref(), Some("SOL"));
        assert_eq!(stats.fields.volume.all_time, Some(2000.0));
        assert_eq!(stats.fields.average_price, Some(1.2));
        assert_eq!(stats.fields.sales.day, Some(12));
        assert_eq!(stats.fields.total_supply, Some(10_000));
        assert_eq!(stats.fields.name.as_deref(), Some("Okay Bears"));
        assert_eq!(stats.fields.verified, Some(true));
    }

    #[test]
    fn supply_falls_back_to_info() {
        let stats = MagicEdenClient::stats_from(&json!({}), &json!({"numberOfItems": 555}));
        assert_eq!(stats.fields.total_supply, Some(555));
        assert!(stats.fields.floor_price_currency.is_none());
    }
}
