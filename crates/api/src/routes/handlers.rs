// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers module
//!
//! Health, collection listings, collection statistics, wallet holdings and webhook
//! intake. Collection walks observe the server's cancellation token, so a shutdown ends
//! them with a resumable cursor instead of dropping the work.

use std::{net::SocketAddr, time::Instant};

use aggregator::{CollectionNfts, CollectionQuery, WalletNfts, WalletQuery};
use api_client::{CollectionStats, PageCursor, StatsRequest};
use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::ServerError,
    events::{RecentEvents, WebhookProvider},
    extractors::{JsonExtractor, QueryExtractor},
    metrics,
    middleware::client_ip,
    state::{HealthCheck, ServerState},
    validation,
};

/// Health check endpoint handler
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check endpoint",
    description = "Returns the service status, version, environment, cache backend and the health of every registered provider client.",
    responses(
        (status = 200, description = "Health report", body = HealthCheck),
        (status = 503, description = "Service unavailable", body = String)
    )
)]
pub async fn health_handler(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, ServerError> {
    let health = state.health_check().await?;
    Ok(Json(health))
}

/// Query parameters of a collection listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CollectionParams {
    /// Cursor from a previous partial response
    pub cursor: Option<String>,
    /// Items per provider page, clamped to the provider maximum
    pub page_size: Option<usize>,
    /// Page budget for this walk, capped by the server setting
    pub max_pages: Option<usize>,
    /// Drop any cached listing first
    #[serde(default)]
    pub fresh: bool,
    /// Marketplace item count, used as an estimate when the walk is truncated
    pub marketplace_total: Option<u64>,
}

/// List every item of a collection
///
/// Walks provider pages until the collection ends, the page budget runs out or the
/// provider fails. Partial results report `stop_reason`, `confidence`, `has_more` and a
/// `next_cursor` to resume from.
#[utoipa::path(
    get,
    path = "/v1/collections/{chain}/{collection_id}/nfts",
    tag = "collections",
    summary = "List collection items",
    params(
        ("chain" = String, Path, description = "Chain slug or alias", example = "ethereum"),
        ("collection_id" = String, Path, description = "Contract address, Solana collection key or marketplace symbol"),
        CollectionParams
    ),
    responses(
        (status = 200, description = "Walk result, possibly partial", body = CollectionNfts),
        (status = 400, description = "Invalid chain, identifier or parameters", body = String),
        (status = 404, description = "No provider configured for the chain", body = String),
        (status = 429, description = "Rate limit exceeded", body = String)
    )
)]
pub async fn collection_nfts_handler(
    State(state): State<ServerState>,
    Path((chain, collection_id)): Path<(String, String)>,
    QueryExtractor(params): QueryExtractor<CollectionParams>,
) -> Result<Json<CollectionNfts>, ServerError> {
    let chain = validation::parse_chain(&chain)?;
    let collection_id = validation::collection_id(&collection_id, chain)?;
    metrics::inc_requests_by_chain(chain, "collection_nfts");

    let query = CollectionQuery {
        cursor: params.cursor.and_then(PageCursor::new),
        page_size: validation::page_size(params.page_size)?,
        max_pages: validation::max_pages(params.max_pages)?,
        marketplace_total: params.marketplace_total,
        fresh: params.fresh,
        ..CollectionQuery::new(collection_id, chain)
    };

    let started = Instant::now();
    let result = state
        .aggregator()
        .collection_nfts(query, &state.cancellation_token)
        .await?;

    metrics::record_cache_lookup(result.cached, "collection");
    if !result.cached {
        metrics::observe_walk(chain, &result.outcome, started.elapsed().as_secs_f64());
    }
    Ok(Json(result))
}

/// Query parameters of a statistics request
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsParams {
    /// Marketplace symbol, when it differs from the collection id
    pub symbol: Option<String>,
    /// Collection web page to scrape as a last gap-fill source
    pub source_url: Option<String>,
    /// Drop any cached record first
    #[serde(default)]
    pub fresh: bool,
}

/// Merged statistics of a collection
///
/// Every applicable source is queried concurrently and merged in a fixed priority order.
/// Market cap and owner percentage are derived from the merged fields.
#[utoipa::path(
    get,
    path = "/v1/collections/{chain}/{collection_id}/stats",
    tag = "collections",
    summary = "Collection statistics",
    params(
        ("chain" = String, Path, description = "Chain slug or alias", example = "solana"),
        ("collection_id" = String, Path, description = "Contract address, Solana collection key or marketplace symbol"),
        StatsParams
    ),
    responses(
        (status = 200, description = "Merged statistics", body = CollectionStats),
        (status = 400, description = "Invalid chain or identifier", body = String),
        (status = 429, description = "Rate limit exceeded", body = String)
    )
)]
pub async fn collection_stats_handler(
    State(state): State<ServerState>,
    Path((chain, collection_id)): Path<(String, String)>,
    QueryExtractor(params): QueryExtractor<StatsParams>,
) -> Result<Json<CollectionStats>, ServerError> {
    let chain = validation::parse_chain(&chain)?;
    let collection_id = validation::collection_id(&collection_id, chain)?;
    metrics::inc_requests_by_chain(chain, "stats");

    let request = StatsRequest {
        marketplace_symbol: params.symbol,
        source_url: params.source_url,
        ..StatsRequest::new(collection_id, chain)
    };
    let stats = state
        .aggregator()
        .collection_stats(&request, params.fresh)
        .await?;

    metrics::record_stats_sources(chain, stats.sources.iter().map(|s| s.as_str()));
    Ok(Json(stats))
}

/// Query parameters of a wallet request
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WalletParams {
    /// Comma-separated chains; defaults to every chain of the address family
    pub chains: Option<String>,
    /// Cursor from a previous response
    pub cursor: Option<String>,
    /// Items per chain page
    pub page_size: Option<usize>,
}

/// One page of a wallet's holdings per chain
#[utoipa::path(
    get,
    path = "/v1/wallets/{address}/nfts",
    tag = "wallets",
    summary = "Wallet holdings",
    params(
        ("address" = String, Path, description = "EVM or Solana wallet address"),
        WalletParams
    ),
    responses(
        (status = 200, description = "Per-chain pages; failing chains report an error in place", body = WalletNfts),
        (status = 400, description = "Invalid address, chain or parameters", body = String),
        (status = 404, description = "No provider configured for any requested chain", body = String),
        (status = 429, description = "Rate limit exceeded", body = String)
    )
)]
pub async fn wallet_nfts_handler(
    State(state): State<ServerState>,
    Path(address): Path<String>,
    QueryExtractor(params): QueryExtractor<WalletParams>,
) -> Result<Json<WalletNfts>, ServerError> {
    let family = validation::wallet_family(&address)?;
    let chains = validation::wallet_chains(family, params.chains.as_deref())?;
    for chain in &chains {
        metrics::inc_requests_by_chain(*chain, "wallet_nfts");
    }

    let query = WalletQuery {
        address: address.trim().to_string(),
        chains,
        cursor: params.cursor.and_then(PageCursor::new),
        page_size: validation::page_size(params.page_size)?,
    };
    let wallet = state.aggregator().wallet_nfts(query).await?;

    for page in wallet.chains.iter().filter(|page| page.error.is_none()) {
        metrics::record_cache_lookup(page.cached, "wallet");
    }
    Ok(Json(wallet))
}

/// Acknowledgement of a received webhook
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Always `ok`
    pub status: String,
    /// Human-readable confirmation
    pub message: String,
    /// Id assigned to the stored event
    #[schema(value_type = String)]
    pub id: Uuid,
}

/// Receive a provider webhook
///
/// Deliveries are rate limited per client IP and stored in a bounded ring buffer.
#[utoipa::path(
    post,
    path = "/v1/webhooks/{provider}",
    tag = "webhooks",
    summary = "Receive a webhook",
    params(
        ("provider" = String, Path, description = "alchemy, moralis or helius")
    ),
    request_body(content = Object, description = "Provider payload, stored as received"),
    responses(
        (status = 200, description = "Webhook stored", body = WebhookAck),
        (status = 400, description = "Unknown provider or invalid JSON", body = String),
        (status = 429, description = "Rate limit exceeded", body = String)
    )
)]
pub async fn webhook_handler(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    JsonExtractor(body): JsonExtractor<Value>,
) -> Result<Json<WebhookAck>, ServerError> {
    let provider: WebhookProvider = provider.parse().map_err(ServerError::ValidationError)?;
    let ip = client_ip(&headers, peer);

    let event = state.events().record_event(provider, ip, body);
    info!(id = %event.id, provider = %provider, "webhook stored");

    Ok(Json(WebhookAck {
        status: "ok".to_string(),
        message: "Webhook received".to_string(),
        id: event.id,
    }))
}

/// Query parameters of the events listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsParams {
    /// Number of events, 1 to 1000, default 100
    pub limit: Option<usize>,
}

/// Recent webhook events
#[utoipa::path(
    get,
    path = "/v1/webhooks/events",
    tag = "webhooks",
    summary = "Recent webhook events",
    params(EventsParams),
    responses(
        (status = 200, description = "Most recent events, oldest first", body = RecentEvents),
        (status = 400, description = "Limit out of range", body = String)
    )
)]
pub async fn webhook_events_handler(
    State(state): State<ServerState>,
    QueryExtractor(params): QueryExtractor<EventsParams>,
) -> Result<Json<RecentEvents>, ServerError> {
    let limit = validation::events_limit(params.limit).inspect_err(|e| {
        warn!(error = %e, "rejected events listing");
    })?;
    Ok(Json(state.events().recent(limit)))
}
