// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! `OpenAPI` documentation module
//!
//! This module provides `OpenAPI` specification and `Swagger UI` endpoints for API documentation.

use aggregator::{
    ChainWalletPage, CollectionNfts, StopReason, TotalConfidence, WalkOutcome, WalletNfts,
};
use api_client::{
    Attribute, CollectionStats, NormalizedItem, PageCursor, SalesWindows, StatsFields,
    StatsSource, VolumeWindows,
};
use axum::{Json, http::StatusCode, response::Html};
use shared_types::{Chain, ChainFamily};
use utoipa::OpenApi;

use crate::{
    config::Environment,
    events::{RecentEvents, WebhookEvent, WebhookProvider},
    routes::handlers::{self, WebhookAck},
    state::{HealthCheck, HealthStatus},
};

/// Generated `OpenAPI` document
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "NFT Aggregator API",
        description = "Collection listings, statistics and wallet holdings merged across NFT data providers"
    ),
    paths(
        handlers::health_handler,
        handlers::collection_nfts_handler,
        handlers::collection_stats_handler,
        handlers::wallet_nfts_handler,
        handlers::webhook_handler,
        handlers::webhook_events_handler,
    ),
    components(schemas(
        HealthCheck,
        HealthStatus,
        Environment,
        Chain,
        ChainFamily,
        CollectionNfts,
        WalkOutcome,
        StopReason,
        TotalConfidence,
        NormalizedItem,
        Attribute,
        PageCursor,
        CollectionStats,
        StatsFields,
        StatsSource,
        VolumeWindows,
        SalesWindows,
        WalletNfts,
        ChainWalletPage,
        WebhookProvider,
        WebhookEvent,
        RecentEvents,
        WebhookAck,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "collections", description = "Collection listings and statistics"),
        (name = "wallets", description = "Wallet holdings"),
        (name = "webhooks", description = "Provider webhook intake")
    )
)]
pub struct ApiDoc;

/// `OpenAPI` specification endpoint
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Swagger UI endpoint
pub async fn swagger_ui() -> Result<Html<&'static str>, StatusCode> {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>NFT Aggregator API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css" />
    <style>
        html { box-sizing: border-box; overflow: -moz-scrollbars-vertical; overflow-y: scroll; }
        *, *:before, *:after { box-sizing: inherit; }
        body { margin:0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: '/api-doc/openapi.json',
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                plugins: [
                    SwaggerUIBundle.plugins.DownloadUrl
                ],
                layout: "StandaloneLayout"
            });
        }
    </script>
</body>
</html>
"#;
    Ok(Html(html))
}
