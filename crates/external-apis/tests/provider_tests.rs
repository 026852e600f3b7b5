// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the provider adapters
//!
//! These tests use wiremock to mock the upstream APIs and exercise request shapes,
//! pagination fields, normalization and error classification.

use std::sync::Arc;

use api_client::{
    ApiClient, ApiError, HealthStatus, OwnerPageRequest, PageCursor, PageRequest,
    ProviderAdapter, StatsProvider, StatsRequest, StatsSource,
};
use external_apis::{
    AlchemyClient, ApiRegistry, HeliusClient, MagicEdenClient, MoralisClient, ReservoirClient,
    ScrapeClient,
};
use serde_json::json;
use shared_types::Chain;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param},
};

use fixtures::*;

fn page_request(collection_id: &str, chain: Chain, cursor: Option<&str>) -> PageRequest {
    PageRequest {
        collection_id: collection_id.to_string(),
        chain,
        cursor: cursor.and_then(PageCursor::new),
        page_size: 100,
    }
}

#[tokio::test]
async fn alchemy_collection_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{TEST_KEY}/getNFTsForCollection")))
        .and(query_param("contractAddress", BAYC))
        .and(query_param("withMetadata", "true"))
        .and(query_param("startToken", "0x00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::alchemy_collection_page(Some("0x0b"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = AlchemyClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let page = client
        .fetch_page(&page_request(BAYC, Chain::Ethereum, Some("0x00")))
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.next_cursor.as_ref().map(PageCursor::as_str), Some("0x0b"));

    let items: Vec<_> = page
        .items
        .iter()
        .filter_map(|raw| client.normalize(raw, Chain::Ethereum))
        .collect();
    assert_eq!(items[0].token_id, "1");
    assert_eq!(items[1].token_id, "10");
    assert_eq!(items[0].collection_id, BAYC);
    assert_eq!(items[0].token_standard.as_deref(), Some("ERC721"));
    assert_eq!(items[0].attributes.len(), 2);
    assert_eq!(
        items[0].image_url.as_deref(),
        Some("https://cloudflare-ipfs.com/ipfs/QmRRPWG96cmgTn2qSzjwr2qvfNEuhunv6FNeMFGa9bx6mQ")
    );

    // the synthetic cursor continues after the highest token seen
    assert_eq!(
        client.synthetic_cursor(&items[1]).as_ref().map(PageCursor::as_str),
        Some("11")
    );
}

#[tokio::test]
async fn alchemy_missing_collection_is_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = AlchemyClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let page = client
        .fetch_page(&page_request(BAYC, Chain::Polygon, None))
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn alchemy_rejects_solana() {
    let client = AlchemyClient::new(&mock_config("http://127.0.0.1:9"), governor()).unwrap();
    let error = client
        .fetch_page(&page_request(OKAY_BEARS, Chain::Solana, None))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ApiError::UnsupportedChain {
            chain: Chain::Solana,
            provider: "alchemy"
        }
    ));
}

#[tokio::test]
async fn alchemy_stats_from_contract_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{TEST_KEY}/getContractMetadata")))
        .and(query_param("contractAddress", BAYC))
        .respond_with(ResponseTemplate::new(200).set_body_json(alchemy_contract_metadata()))
        .mount(&server)
        .await;

    let client = AlchemyClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let stats = client
        .fetch_stats(&StatsRequest::new(BAYC, Chain::Ethereum))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.source, StatsSource::Alchemy);
    assert_eq!(stats.fields.name.as_deref(), Some("BoredApeYachtClub"));
    assert_eq!(stats.fields.total_supply, Some(10_000));
    assert_eq!(stats.fields.floor_price, Some(11.2));
    assert_eq!(stats.fields.verified, Some(true));
}

#[tokio::test]
async fn moralis_collection_page_sends_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/nft/{BAYC}")))
        .and(header("X-API-Key", TEST_KEY))
        .and(query_param("chain", "eth"))
        .and(query_param("format", "decimal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(moralis_collection_page()))
        .expect(1)
        .mount(&server)
        .await;

    let client = MoralisClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let page = client
        .fetch_page(&page_request(BAYC, Chain::Ethereum, None))
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.reported_total, Some(3));
    assert_eq!(
        page.next_cursor.as_ref().map(PageCursor::as_str),
        Some("moralis-cursor-2")
    );

    let first = client.normalize(&page.items[0], Chain::Ethereum).unwrap();
    assert_eq!(first.name.as_deref(), Some("Ape #1"));
    let second = client.normalize(&page.items[1], Chain::Ethereum).unwrap();
    assert_eq!(second.name.as_deref(), Some("Ape #2"));
}

#[tokio::test]
async fn moralis_unauthorized_reports_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/endpointWeights"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = MoralisClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let status = client.health_check().await.unwrap();
    assert!(status.is_down());
}

#[tokio::test]
async fn helius_collection_page_uses_das_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("api-key", TEST_KEY))
        .and(body_partial_json(json!({
            "method": "getAssetsByGroup",
            "params": {"groupKey": "collection", "groupValue": OKAY_BEARS, "cursor": "c1"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!({
            "total": 2,
            "limit": 1000,
            "cursor": "c2",
            "items": [
                das_asset("Asset1111111111111111111111111111111111111", "Bear #1", "V1_NFT"),
                das_asset("Asset2222222222222222222222222222222222222", "Bear #2", "ProgrammableNFT")
            ]
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let client = HeliusClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let page = client
        .fetch_page(&page_request(OKAY_BEARS, Chain::Solana, Some("c1")))
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.next_cursor.as_ref().map(PageCursor::as_str), Some("c2"));
    assert_eq!(page.reported_total, Some(2));

    let item = client.normalize(&page.items[0], Chain::Solana).unwrap();
    assert_eq!(item.collection_id, OKAY_BEARS);
    assert_eq!(item.name.as_deref(), Some("Bear #1"));
    assert_eq!(
        item.image_url.as_deref(),
        Some("https://cdn.helius-rpc.com/Asset1111111111111111111111111111111111111")
    );
}

#[tokio::test]
async fn helius_page_size_is_clamped_to_the_das_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getAssetsByGroup",
            "params": {"limit": 10_000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!({
            "total": 0,
            "items": []
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let client = HeliusClient::new(&mock_config(&server.uri()), governor()).unwrap();
    assert_eq!(client.max_page_size(), 10_000);

    let request = PageRequest {
        page_size: 25_000,
        ..page_request(OKAY_BEARS, Chain::Solana, None)
    };
    let page = client.fetch_page(&request).await.unwrap();
    assert!(page.is_empty());
}

#[tokio::test]
async fn helius_rpc_error_is_a_permanent_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "error": {"code": -32602, "message": "invalid group value"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HeliusClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let error = client
        .fetch_page(&page_request("bogus", Chain::Solana, None))
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::InvalidResponse { .. }));
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn helius_owner_pages_are_numbered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getAssetsByOwner",
            "params": {"ownerAddress": "Owner", "page": 2, "limit": 2}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!({
            "total": 2,
            "items": [
                das_asset("Asset1111111111111111111111111111111111111", "Bear #1", "V1_NFT"),
                {"id": "Fungible1", "interface": "FungibleToken"}
            ]
        }))))
        .mount(&server)
        .await;

    let client = HeliusClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let page = client
        .fetch_owner_page(&OwnerPageRequest {
            owner: "Owner".to_string(),
            chain: Chain::Solana,
            cursor: PageCursor::new("2"),
            page_size: 2,
        })
        .await
        .unwrap();

    // the fungible asset is filtered out, but the raw page was full
    assert_eq!(page.len(), 1);
    assert_eq!(page.next_cursor.as_ref().map(PageCursor::as_str), Some("3"));
}

#[tokio::test]
async fn helius_resolves_symbol_through_magic_eden_listing() {
    let magic_eden_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/okay_bears/listings"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tokenMint": LISTED_MINT, "price": 25.5}
        ])))
        .expect(1)
        .mount(&magic_eden_server)
        .await;

    let helius_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getAsset", "params": {"id": LISTED_MINT}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(das_asset(
            LISTED_MINT,
            "Bear #77",
            "V1_NFT",
        ))))
        .expect(1)
        .mount(&helius_server)
        .await;

    let magic_eden = Arc::new(
        MagicEdenClient::new(&mock_config(&magic_eden_server.uri()), governor()).unwrap(),
    );
    let helius = HeliusClient::new(&mock_config(&helius_server.uri()), governor())
        .unwrap()
        .with_magic_eden(magic_eden);

    let resolved = helius
        .resolve_identifier("okay_bears", Chain::Solana)
        .await
        .unwrap();
    assert_eq!(resolved.as_deref(), Some(OKAY_BEARS));
}

#[tokio::test]
async fn helius_falls_back_to_name_search() {
    let helius_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "searchAssets"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!({
            "items": [
                {"id": "Other", "content": {"metadata": {"name": "Degods #5"}}, "grouping": []},
                das_asset("Asset1111111111111111111111111111111111111", "Okay Bears #12", "V1_NFT")
            ]
        }))))
        .expect(1)
        .mount(&helius_server)
        .await;

    // no Magic Eden client registered: resolution goes straight to search
    let helius = HeliusClient::new(&mock_config(&helius_server.uri()), governor()).unwrap();
    let resolved = helius
        .resolve_identifier("okay-bears", Chain::Solana)
        .await
        .unwrap();
    assert_eq!(resolved.as_deref(), Some(OKAY_BEARS));
}

#[tokio::test]
async fn magic_eden_stats_convert_lamports() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/okay_bears/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(magic_eden_stats()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/okay_bears"))
        .respond_with(ResponseTemplate::new(200).set_body_json(magic_eden_collection()))
        .mount(&server)
        .await;

    let client = MagicEdenClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let stats = client
        .fetch_stats(&StatsRequest::new("okay_bears", Chain::Solana))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.fields.floor_price, Some(25.5));
    assert_eq!(stats.fields.floor_price_currency.as_deref(), Some("SOL"));
    assert_eq!(stats.fields.average_price, Some(26.0));
    assert_eq!(stats.fields.volume.all_time, Some(1_234_000.0));
    assert_eq!(stats.fields.total_owners, Some(5_100));
    assert_eq!(stats.fields.total_supply, Some(10_000));
    assert_eq!(stats.fields.name.as_deref(), Some("Okay Bears"));
}

#[tokio::test]
async fn magic_eden_skips_addresses_without_symbol() {
    let client = MagicEdenClient::new(&mock_config("http://127.0.0.1:9"), governor()).unwrap();
    let stats = client
        .fetch_stats(&StatsRequest::new(OKAY_BEARS, Chain::Solana))
        .await
        .unwrap();
    assert!(stats.is_none());
}

#[tokio::test]
async fn reservoir_stats_from_collection_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/collections/ethereum:{BAYC}/v1")))
        .and(header("X-API-KEY", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(reservoir_collection()))
        .mount(&server)
        .await;

    let client = ReservoirClient::new(&mock_config(&server.uri()), governor()).unwrap();
    let stats = client
        .fetch_stats(&StatsRequest::new(BAYC, Chain::Ethereum))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.fields.floor_price, Some(10.75));
    assert_eq!(stats.fields.total_supply, Some(9_998));
    assert_eq!(stats.fields.total_owners, Some(5_600));
    assert_eq!(stats.fields.sales.week, Some(70));
}

#[tokio::test]
async fn scrape_reads_open_graph_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collection/okay-bears"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head>
                <meta property="og:title" content="Okay Bears">
                <meta property="og:image" content="https://img.example.com/bears.png">
            </head></html>"#,
        ))
        .mount(&server)
        .await;

    let client = ScrapeClient::new(&mock_config(&server.uri()), governor())
        .unwrap()
        .allow_private_hosts(true);
    let request = StatsRequest {
        source_url: Some(format!("{}/collection/okay-bears", server.uri())),
        ..StatsRequest::new(OKAY_BEARS, Chain::Solana)
    };
    let stats = client.fetch_stats(&request).await.unwrap().unwrap();
    assert_eq!(stats.fields.name.as_deref(), Some("Okay Bears"));
    assert_eq!(
        stats.fields.image_url.as_deref(),
        Some("https://img.example.com/bears.png")
    );
}

#[tokio::test]
async fn registry_fan_out_collects_sources_and_failures() {
    let alchemy_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{TEST_KEY}/getContractMetadata")))
        .respond_with(ResponseTemplate::new(200).set_body_json(alchemy_contract_metadata()))
        .mount(&alchemy_server)
        .await;

    let reservoir_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reservoir_collection()))
        .mount(&reservoir_server)
        .await;

    let moralis_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&moralis_server)
        .await;

    let governor = governor();
    let registry = ApiRegistry::new()
        .with_alchemy(AlchemyClient::new(&mock_config(&alchemy_server.uri()), governor.clone()).unwrap())
        .with_reservoir(
            ReservoirClient::new(&mock_config(&reservoir_server.uri()), governor.clone()).unwrap(),
        )
        .with_moralis(MoralisClient::new(&mock_config(&moralis_server.uri()), governor).unwrap());

    let fan_out = registry
        .fetch_all_stats(&StatsRequest::new(BAYC, Chain::Ethereum))
        .await;

    assert_eq!(
        fan_out.stats.keys().copied().collect::<Vec<_>>(),
        vec![StatsSource::Alchemy, StatsSource::Reservoir]
    );
    assert!(fan_out.failures.contains_key(&StatsSource::Moralis));

    let health = registry.get_overall_health().await;
    assert_eq!(health.len(), 3);
    assert!(matches!(health.get("moralis"), Some(HealthStatus::Down { .. })));
    assert_eq!(health.get("alchemy"), Some(&HealthStatus::Up));
}
