// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! This module provides route configuration and handlers for the aggregator server.

pub mod handlers;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use handlers::{
    collection_nfts_handler, collection_stats_handler, health_handler, wallet_nfts_handler,
    webhook_events_handler, webhook_handler,
};

use crate::{
    metrics::metrics_handler,
    middleware::{RateLimiter, rate_limiting_middleware},
    openapi::{openapi_spec, swagger_ui},
    state::ServerState,
};

/// Create application routes with conditional rate limiting
///
/// `rate_limiter` guards the query endpoints; `webhook_limiter` guards webhook delivery
/// and is always applied.
#[allow(clippy::needless_pass_by_value)] // We need to clone the rate limiters for middleware
pub fn create_routes(
    rate_limiter: RateLimiter,
    webhook_limiter: RateLimiter,
) -> Router<ServerState> {
    // Health and metrics endpoints are not rate limited for monitoring purposes
    let monitoring_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    // Documentation endpoints are not rate limited
    let docs_routes = Router::new()
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/swagger-ui", get(swagger_ui));

    let mut api_routes = Router::new()
        .route(
            "/collections/{chain}/{collection_id}/nfts",
            get(collection_nfts_handler),
        )
        .route(
            "/collections/{chain}/{collection_id}/stats",
            get(collection_stats_handler),
        )
        .route("/wallets/{address}/nfts", get(wallet_nfts_handler))
        .route("/webhooks/events", get(webhook_events_handler));

    // Only apply rate limiting middleware if enabled
    if rate_limiter.is_enabled() {
        api_routes = api_routes.layer(middleware::from_fn_with_state(
            rate_limiter.clone(),
            rate_limiting_middleware,
        ));
    }

    let webhook_routes = Router::new()
        .route("/webhooks/{provider}", post(webhook_handler))
        .layer(middleware::from_fn_with_state(
            webhook_limiter.clone(),
            rate_limiting_middleware,
        ));

    let v1 = Router::new().nest("/v1", api_routes.merge(webhook_routes));

    Router::new()
        .merge(monitoring_routes)
        .merge(docs_routes)
        .merge(v1)
}
