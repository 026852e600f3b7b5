// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the HTTP surface

use std::{net::SocketAddr, sync::Arc, time::Duration};

use aggregator::{Aggregator, EngineSettings};
use api::{Server, ServerConfig, ShutdownConfig};
use api_client::{ConcurrencyGovernor, RetryPolicy};
use axum::http::StatusCode;
use external_apis::{AlchemyClient, ApiRegistry, ProviderConfig, ResultCache};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const KEY: &str = "test-key";
const BAYC: &str = "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d";

async fn start(config: ServerConfig) -> SocketAddr {
    let (addr, _) = Server::new(config, ShutdownConfig::default())
        .expect("Failed to create server")
        .run_for_testing()
        .await
        .expect("Failed to start test server");
    addr
}

async fn get(addr: SocketAddr, route: &str) -> (StatusCode, Value) {
    let response = reqwest::get(format!("http://{addr}{route}"))
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

async fn post_webhook(addr: SocketAddr, provider: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/v1/webhooks/{provider}"))
        .json(body)
        .send()
        .await
        .expect("Failed to send request")
}

#[tokio::test]
async fn health_reports_without_providers() {
    let addr = start(ServerConfig::for_testing()).await;
    let (status, body) = get(addr, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["environment"], "testing");
    assert_eq!(body["cache_backend"], "memory");
    assert!(body["status"].get("Degraded").is_some());
}

#[tokio::test]
async fn metrics_are_exported_as_text() {
    let addr = start(ServerConfig::for_testing()).await;
    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let addr = start(ServerConfig::for_testing()).await;
    let (status, body) = get(addr, "/api-doc/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/wallets/{address}/nfts"].is_object());
}

#[tokio::test]
async fn invalid_parameters_are_rejected() {
    let addr = start(ServerConfig::for_testing()).await;

    let (status, body) = get(addr, &format!("/v1/collections/dogechain/{BAYC}/nfts")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = get(addr, "/v1/collections/ethereum/not-an-address/nfts").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let listing = format!("/v1/collections/ethereum/{BAYC}/nfts");
    let (status, _) = get(addr, &format!("{listing}?page_size=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(addr, &format!("{listing}?max_pages=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(addr, "/v1/wallets/nobody/nfts").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_adapter_is_not_found() {
    let addr = start(ServerConfig::for_testing()).await;
    let (status, body) = get(addr, "/v1/collections/solana/okay_bears/nfts").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("no_adapter"));
}

#[tokio::test]
async fn webhooks_are_stored_and_listed() {
    let addr = start(ServerConfig::for_testing()).await;

    let response = post_webhook(
        addr,
        "alchemy",
        &json!({"event": {"type": "NFT_ACTIVITY"}, "createdAt": "2025-01-01T00:00:00Z"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["message"], "Webhook received");

    let response = post_webhook(addr, "opensea", &json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = get(addr, "/v1/webhooks/events?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["events"][0]["source"], "alchemy");
    assert_eq!(body["events"][0]["event_type"], "NFT_ACTIVITY");
    assert_eq!(body["events"][0]["id"], ack["id"]);

    let (status, _) = get(addr, "/v1/webhooks/events?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_deliveries_are_rate_limited() {
    let mut config = ServerConfig::for_testing();
    config.webhooks.requests_per_minute = 2;
    let addr = start(config).await;

    for _ in 0..2 {
        let response = post_webhook(addr, "moralis", &json!({"tag": "mints"})).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = post_webhook(addr, "moralis", &json!({"tag": "mints"})).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client behind the same proxy has its own budget
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/webhooks/moralis"))
        .header("x-forwarded-for", "203.0.113.9")
        .json(&json!({"tag": "mints"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn query_endpoints_are_rate_limited_when_enabled() {
    let mut config = ServerConfig::for_testing();
    config.rate_limiting.enabled = true;
    config.rate_limiting.requests_per_minute = 1;
    let addr = start(config).await;

    let (status, _) = get(addr, "/v1/webhooks/events").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = get(addr, "/v1/webhooks/events").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], 429);

    // Monitoring is never limited
    let (status, _) = get(addr, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn collection_walk_through_mocked_provider() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{KEY}/getNFTsForCollection")))
        .and(query_param("contractAddress", BAYC))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nfts": [
                {
                    "contract": {"address": BAYC},
                    "id": {"tokenId": "0x01", "tokenMetadata": {"tokenType": "ERC721"}},
                    "metadata": {"name": "Ape 1"}
                },
                {
                    "contract": {"address": BAYC},
                    "id": {"tokenId": "0x02", "tokenMetadata": {"tokenType": "ERC721"}},
                    "metadata": {"name": "Ape 2"}
                }
            ]
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let provider_config = ProviderConfig::new(provider.uri(), vec![KEY.to_string()], 0.0)
        .with_retry(RetryPolicy::immediate(1))
        .with_timeout(5);
    let alchemy = AlchemyClient::new(&provider_config, ConcurrencyGovernor::new(4)).unwrap();
    let aggregator = Aggregator::new(
        Arc::new(ApiRegistry::new().with_alchemy(alchemy)),
        Arc::new(ResultCache::memory(100, Duration::from_secs(60))),
        EngineSettings::default(),
    );

    let (addr, _) = Server::with_aggregator(
        ServerConfig::for_testing(),
        ShutdownConfig::default(),
        aggregator,
    )
    .unwrap()
    .run_for_testing()
    .await
    .unwrap();

    // Checksummed input is normalized before the walk and the cache lookup
    let route = "/v1/collections/eth/0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D/nfts";
    let (status, body) = get(addr, route).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["adapter"], "alchemy");
    assert_eq!(body["cached"], false);
    assert_eq!(body["total_count_in_response"], 2);
    assert_eq!(body["known_total"], 2);
    assert_eq!(body["confidence"], "exact");
    assert_eq!(body["stop_reason"], "completed");
    assert_eq!(body["has_more"], false);

    let (status, body) = get(addr, route).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], true);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}
