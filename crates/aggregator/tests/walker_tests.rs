// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Walker behaviour against scripted in-memory adapters

use aggregator::{StopReason, TotalConfidence, WalkOutcome, WalkRequest, walk};
use api_client::{ApiError, PageCursor, PageRequest};
use shared_types::Chain;
use tokio_util::sync::CancellationToken;

mod support;
use support::{ScriptedAdapter, page, tokens};

const PS: usize = 10;

fn request(collection_id: &str) -> WalkRequest {
    WalkRequest::new(collection_id, Chain::Ethereum).with_page_size(PS)
}

async fn run(adapter: &ScriptedAdapter, request: &WalkRequest) -> WalkOutcome {
    walk(adapter, request, &CancellationToken::new()).await
}

fn ids(outcome: &WalkOutcome) -> Vec<(String, String)> {
    outcome.items.iter().map(|item| item.identity()).collect()
}

#[tokio::test]
async fn short_first_page_is_exact_after_one_fetch() {
    let adapter = ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 0..7), None, Some(5000))));

    let outcome = run(&adapter, &request("c")).await;

    assert_eq!(adapter.calls(), 1);
    assert_eq!(outcome.known_total, Some(7));
    assert_eq!(outcome.confidence, TotalConfidence::Exact);
    assert_eq!(outcome.total_count_in_response, 7);
    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert!(!outcome.has_more);
    assert!(outcome.next_cursor.is_none());
}

#[tokio::test]
async fn full_pages_without_cursor_keep_walking() {
    let adapter = ScriptedAdapter::new(|call, _| {
        let range = match call {
            0 => 0..PS,
            1 => PS..2 * PS,
            _ => 2 * PS..3 * PS - 1,
        };
        Ok(page(tokens("c", range), None, None))
    });

    let outcome = run(&adapter, &request("c")).await;

    assert_eq!(adapter.calls(), 3);
    assert_eq!(outcome.known_total, Some(3 * 10 - 1));
    assert_eq!(outcome.confidence, TotalConfidence::Exact);
    assert_eq!(outcome.items.len(), 29);
    assert!(adapter.requests().iter().all(|r| r.cursor.is_none()));
}

#[tokio::test]
async fn provider_cursors_are_followed() {
    let adapter = ScriptedAdapter::new(|_, request| {
        let (range, next) = match request.cursor.as_ref().map(PageCursor::as_str) {
            None => (0..PS, Some("p2")),
            Some("p2") => (PS..2 * PS, Some("p3")),
            _ => (2 * PS..2 * PS + 4, None),
        };
        Ok(page(tokens("c", range), next, Some(9999)))
    });

    let outcome = run(&adapter, &request("c")).await;

    let cursors: Vec<_> = adapter
        .requests()
        .iter()
        .map(|r| r.cursor.as_ref().map(|c| c.as_str().to_string()))
        .collect();
    assert_eq!(cursors, vec![None, Some("p2".to_string()), Some("p3".to_string())]);
    // the provider's total is not trusted when the first page has a cursor
    assert_eq!(outcome.known_total, Some(24));
    assert_eq!(outcome.confidence, TotalConfidence::Exact);
}

#[tokio::test]
async fn confidence_never_decreases_with_a_larger_budget() {
    let make = || {
        ScriptedAdapter::new(|call, _| {
            let range = match call {
                0 => 0..PS,
                1 => PS..2 * PS,
                2 => 2 * PS..3 * PS,
                _ => 3 * PS..3 * PS + 2,
            };
            Ok(page(tokens("c", range), None, Some(32)))
        })
    };

    let mut previous = TotalConfidence::Unknown;
    for budget in 1..=5 {
        let adapter = make();
        let outcome = run(&adapter, &request("c").with_max_pages(budget)).await;
        assert!(outcome.confidence >= previous, "budget {budget} lowered confidence");
        previous = outcome.confidence;
    }
    assert_eq!(previous, TotalConfidence::Exact);
}

#[tokio::test]
async fn overlapping_fallback_pages_are_deduplicated_idempotently() {
    let make = || {
        ScriptedAdapter::new(|call, _| {
            let range = match call {
                0 => 0..PS,
                // the re-requested first page overlaps the previous one
                1 => PS / 2..PS + PS / 2,
                _ => PS + PS / 2..PS + PS / 2 + 3,
            };
            Ok(page(tokens("c", range), None, None))
        })
    };

    let first = run(&make(), &request("c")).await;
    let second = run(&make(), &request("c")).await;

    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first.items.len(), 18);
    assert_eq!(first.duplicates, 5);
    assert_eq!(first.processed, 23);
    assert_eq!(first.known_total, Some(18));

    let mut unique = ids(&first);
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), first.items.len());
}

#[tokio::test]
async fn repeated_full_page_gives_up() {
    let adapter = ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 0..PS), None, None)));

    let outcome = run(&adapter, &request("c")).await;

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.stop_reason, StopReason::GaveUp);
    assert!(outcome.has_more);
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);
    assert_eq!(outcome.items.len(), PS);
    assert_eq!(outcome.duplicates, PS);
}

#[tokio::test]
async fn synthetic_cursor_continues_full_pages() {
    let adapter = ScriptedAdapter::new(|_, request| {
        match request.cursor.as_ref().map(PageCursor::as_str) {
            None => Ok(page(tokens("c", 0..PS), None, None)),
            Some("after:9") => Ok(page(tokens("c", PS..PS + 3), None, None)),
            Some(other) => Err(ApiError::InvalidResponse {
                message: format!("unexpected cursor {other}"),
            }),
        }
    })
    .with_synthetic_cursor();

    let outcome = run(&adapter, &request("c")).await;

    assert_eq!(adapter.calls(), 2);
    assert_eq!(
        adapter.requests()[1].cursor.as_ref().map(PageCursor::as_str),
        Some("after:9")
    );
    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.known_total, Some(13));
}

#[tokio::test]
async fn infinite_provider_hits_the_page_limit() {
    let adapter = ScriptedAdapter::new(|call, _| {
        let next = (call + 1).to_string();
        Ok(page(
            tokens("c", call * PS..(call + 1) * PS),
            Some(next.as_str()),
            Some(1_000_000),
        ))
    });

    let outcome = run(&adapter, &request("c").with_max_pages(5)).await;

    assert_eq!(adapter.calls(), 5);
    assert_eq!(outcome.stop_reason, StopReason::PageLimit);
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);
    assert_eq!(outcome.known_total, None);
    assert!(outcome.has_more);
    assert_eq!(outcome.items.len(), 50);
    assert_eq!(outcome.next_cursor.as_ref().map(PageCursor::as_str), Some("5"));
}

#[tokio::test]
async fn marketplace_total_fills_an_unknown_total() {
    let infinite = || {
        ScriptedAdapter::new(|call, _| {
            let next = (call + 1).to_string();
            Ok(page(tokens("c", call * PS..(call + 1) * PS), Some(next.as_str()), None))
        })
    };

    let outcome = run(
        &infinite(),
        &request("c").with_max_pages(2).with_marketplace_total(Some(777)),
    )
    .await;
    assert_eq!(outcome.known_total, Some(777));
    assert_eq!(outcome.confidence, TotalConfidence::Estimate);

    // a count equal to the page size is an echoed page length
    let outcome = run(
        &infinite(),
        &request("c").with_max_pages(2).with_marketplace_total(Some(10)),
    )
    .await;
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);

    // an exact count is never replaced
    let short = ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 0..3), None, None)));
    let outcome = run(&short, &request("c").with_marketplace_total(Some(777))).await;
    assert_eq!(outcome.known_total, Some(3));
    assert_eq!(outcome.confidence, TotalConfidence::Exact);
}

#[tokio::test]
async fn single_empty_page_is_retried_with_the_same_cursor() {
    let adapter = ScriptedAdapter::new(|call, _| match call {
        0 => Ok(page(tokens("c", 0..PS), Some("p2"), None)),
        1 => Ok(page(Vec::new(), None, None)),
        _ => Ok(page(tokens("c", PS..PS + 5), None, None)),
    });

    let outcome = run(&adapter, &request("c")).await;

    let requests = adapter.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].cursor, requests[2].cursor);
    assert_eq!(outcome.known_total, Some(15));
    assert_eq!(outcome.stop_reason, StopReason::Completed);
}

#[tokio::test]
async fn two_empty_pages_end_the_walk() {
    let adapter = ScriptedAdapter::new(|_, _| Ok(page(Vec::new(), None, None)));

    let outcome = run(&adapter, &request("c")).await;

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.known_total, Some(0));
    assert_eq!(outcome.confidence, TotalConfidence::Exact);
    assert!(!outcome.has_more);
    assert!(outcome.resolved_collection_id.is_none());
}

#[tokio::test]
async fn empty_first_page_resolves_the_identifier() {
    let adapter = ScriptedAdapter::new(|_, request| {
        if request.collection_id == "okay_bears" {
            Ok(page(Vec::new(), None, None))
        } else {
            Ok(page(tokens(&request.collection_id, 0..4), None, None))
        }
    })
    .resolving_to("3saAedkM9o5g1u5DCqsuMZuC4GRqPB4TuMkvSsSVvGQ3");

    let outcome = run(&adapter, &request("okay_bears")).await;

    assert_eq!(
        outcome.resolved_collection_id.as_deref(),
        Some("3saAedkM9o5g1u5DCqsuMZuC4GRqPB4TuMkvSsSVvGQ3")
    );
    let requests = adapter.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].cursor.is_none());
    assert_eq!(outcome.known_total, Some(4));
    assert_eq!(outcome.confidence, TotalConfidence::Exact);
}

#[tokio::test]
async fn cancelled_before_start_returns_an_empty_partial() {
    let adapter = ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 0..3), None, None)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = walk(&adapter, &request("c"), &cancel).await;

    assert_eq!(adapter.calls(), 0);
    assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    assert!(outcome.has_more);
    assert!(outcome.items.is_empty());
}

#[tokio::test]
async fn cancelled_mid_walk_keeps_gathered_items() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let adapter = ScriptedAdapter::new(move |call, _| {
        if call == 1 {
            trigger.cancel();
        }
        let next = format!("p{}", call + 2);
        Ok(page(tokens("c", call * PS..(call + 1) * PS), Some(next.as_str()), None))
    });

    let outcome = walk(&adapter, &request("c"), &cancel).await;

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    assert_eq!(outcome.items.len(), 20);
    assert_eq!(outcome.next_cursor.as_ref().map(PageCursor::as_str), Some("p3"));
}

#[tokio::test]
async fn provider_failure_returns_the_partial_result() {
    let adapter = ScriptedAdapter::new(|call, _| match call {
        0 => Ok(page(tokens("c", 0..PS), Some("p2"), None)),
        _ => Err(ApiError::ServiceUnavailable {
            message: "upstream down".to_string(),
        }),
    });

    let outcome = run(&adapter, &request("c")).await;

    assert_eq!(outcome.stop_reason, StopReason::ProviderFailure);
    assert!(outcome.has_more);
    assert_eq!(outcome.items.len(), PS);
    assert_eq!(outcome.next_cursor.as_ref().map(PageCursor::as_str), Some("p2"));
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);
}

#[tokio::test]
async fn page_size_is_clamped_to_the_provider_ceiling() {
    let adapter =
        ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 0..3), None, None))).with_max_page_size(5);

    let outcome = run(&adapter, &request("c").with_page_size(100)).await;

    assert_eq!(adapter.requests()[0].page_size, 5);
    assert_eq!(outcome.known_total, Some(3));
}

#[tokio::test]
async fn resumed_walk_does_not_infer_from_its_first_page() {
    let adapter = ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 40..50), Some("p6"), Some(120))));

    let outcome = run(
        &adapter,
        &request("c")
            .with_cursor(PageCursor::new("p5"))
            .with_max_pages(1),
    )
    .await;

    let requests: Vec<PageRequest> = adapter.requests();
    assert_eq!(requests[0].cursor.as_ref().map(PageCursor::as_str), Some("p5"));
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);
    assert_eq!(outcome.next_cursor.as_ref().map(PageCursor::as_str), Some("p6"));
}

#[tokio::test]
async fn resumed_walk_reaching_the_end_is_not_exact() {
    let adapter = ScriptedAdapter::new(|_, _| Ok(page(tokens("c", 50..53), None, Some(53))));

    let outcome = run(&adapter, &request("c").with_cursor(PageCursor::new("p50"))).await;

    assert_eq!(adapter.calls(), 1);
    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert!(!outcome.has_more);
    assert_eq!(outcome.items.len(), 3);
    assert_eq!(outcome.known_total, None);
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);

    // a marketplace count is still taken as an estimate
    let outcome = run(
        &adapter,
        &request("c")
            .with_cursor(PageCursor::new("p50"))
            .with_marketplace_total(Some(5000)),
    )
    .await;
    assert_eq!(outcome.known_total, Some(5000));
    assert_eq!(outcome.confidence, TotalConfidence::Estimate);
}

#[tokio::test]
async fn stalled_synthetic_cursor_gives_up_without_rewinding() {
    let adapter = ScriptedAdapter::new(|_, request| {
        match request.cursor.as_ref().map(PageCursor::as_str) {
            None => Ok(page(tokens("c", 0..PS), None, None)),
            // ends on an item already seen, so the derived cursor does not move
            _ => {
                let mut items = tokens("c", PS..2 * PS - 1);
                items.extend(tokens("c", PS - 1..PS));
                Ok(page(items, None, None))
            }
        }
    })
    .with_synthetic_cursor();

    let outcome = run(&adapter, &request("c")).await;

    let cursors: Vec<_> = adapter
        .requests()
        .iter()
        .map(|r| r.cursor.as_ref().map(|c| c.as_str().to_string()))
        .collect();
    assert_eq!(
        cursors,
        vec![None, Some("after:9".to_string()), Some("after:9".to_string())]
    );
    assert_eq!(outcome.stop_reason, StopReason::GaveUp);
    assert!(outcome.has_more);
    assert!(outcome.next_cursor.is_none());
    assert_eq!(outcome.items.len(), 2 * PS - 1);
    assert_eq!(outcome.confidence, TotalConfidence::Unknown);
}
