// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Provides global metrics using the default Prometheus registry via macros and
//! an Axum-compatible metrics handler.

use std::sync::LazyLock;

use aggregator::{StopReason, WalkOutcome};
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use external_apis::cache::CacheStats;
use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounterVec, TextEncoder, register_gauge,
    register_histogram_vec, register_int_counter_vec,
};
use shared_types::Chain;
use tracing::error;

use crate::state::ServerState;

/// Total number of API requests received, labeled by chain.
pub static REQUESTS_BY_CHAIN: LazyLock<Option<IntCounterVec>> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nft_aggregator_requests_total",
        "Total number of API requests, labeled by chain and endpoint",
        &["chain", "endpoint"]
    )
    .inspect_err(|e| error!(error = %e, "failed to register requests counter"))
    .ok()
});

/// Walk durations in seconds, labeled by chain and stop reason.
pub static WALK_DURATION: LazyLock<Option<HistogramVec>> = LazyLock::new(|| {
    register_histogram_vec!(
        "nft_aggregator_walk_duration_seconds",
        "Collection walk durations in seconds",
        &["chain", "stop_reason"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .inspect_err(|e| error!(error = %e, "failed to register walk duration histogram"))
    .ok()
});

/// Pages fetched per walk, labeled by chain.
pub static WALK_PAGES: LazyLock<Option<HistogramVec>> = LazyLock::new(|| {
    register_histogram_vec!(
        "nft_aggregator_walk_pages",
        "Provider pages fetched per collection walk",
        &["chain"],
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]
    )
    .inspect_err(|e| error!(error = %e, "failed to register walk pages histogram"))
    .ok()
});

/// Statistics sources that contributed to a merged record.
pub static STATS_SOURCES: LazyLock<Option<IntCounterVec>> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nft_aggregator_stats_sources_total",
        "Statistics sources merged into collection records",
        &["chain", "source"]
    )
    .inspect_err(|e| error!(error = %e, "failed to register stats sources counter"))
    .ok()
});

/// Result cache hit/miss counters
pub static CACHE_OPERATIONS: LazyLock<Option<IntCounterVec>> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nft_aggregator_cache_operations_total",
        "Total number of result cache lookups",
        &["operation", "kind"]
    )
    .inspect_err(|e| error!(error = %e, "failed to register cache operations counter"))
    .ok()
});

/// Requests rejected by a rate limiter
pub static RATE_LIMITED: LazyLock<Option<IntCounterVec>> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nft_aggregator_rate_limited_total",
        "Requests rejected by a per-IP rate limiter",
        &["limiter"]
    )
    .inspect_err(|e| error!(error = %e, "failed to register rate limited counter"))
    .ok()
});

/// Cache utilization gauge
pub static CACHE_UTILIZATION: LazyLock<Option<Gauge>> = LazyLock::new(|| {
    register_gauge!(
        "nft_aggregator_cache_utilization_ratio",
        "Current memory cache utilization as a ratio (0.0 to 1.0)"
    )
    .inspect_err(|e| error!(error = %e, "failed to register cache utilization gauge"))
    .ok()
});

/// Cache hit rate gauge
pub static CACHE_HIT_RATE: LazyLock<Option<Gauge>> = LazyLock::new(|| {
    register_gauge!(
        "nft_aggregator_cache_hit_rate",
        "Memory cache hit rate as a ratio (0.0 to 1.0)"
    )
    .inspect_err(|e| error!(error = %e, "failed to register cache hit rate gauge"))
    .ok()
});

/// Cache size gauge
pub static CACHE_SIZE: LazyLock<Option<Gauge>> = LazyLock::new(|| {
    register_gauge!(
        "nft_aggregator_cache_entries_count",
        "Current number of entries in the memory cache"
    )
    .inspect_err(|e| error!(error = %e, "failed to register cache size gauge"))
    .ok()
});

/// Increment the requests counter
///
/// # Arguments
/// * `chain` - The chain of the request
/// * `endpoint` - Short endpoint name (`collection_nfts`, `stats`, `wallet_nfts`)
pub fn inc_requests_by_chain(chain: Chain, endpoint: &str) {
    if let Some(counter) = REQUESTS_BY_CHAIN.as_ref() {
        counter.with_label_values(&[chain.slug(), endpoint]).inc();
    }
}

/// Record a finished walk: duration by stop reason and page count
pub fn observe_walk(chain: Chain, outcome: &WalkOutcome, duration_secs: f64) {
    observe_walk_duration(chain, outcome.stop_reason, duration_secs);
    if let Some(histogram) = WALK_PAGES.as_ref() {
        #[allow(clippy::cast_precision_loss)]
        histogram
            .with_label_values(&[chain.slug()])
            .observe(outcome.pages_fetched as f64);
    }
}

/// Observe the duration of a walk
pub fn observe_walk_duration(chain: Chain, stop_reason: StopReason, duration_secs: f64) {
    if let Some(histogram) = WALK_DURATION.as_ref() {
        histogram
            .with_label_values(&[chain.slug(), stop_reason.as_str()])
            .observe(duration_secs);
    }
}

/// Count each source merged into a statistics record
pub fn record_stats_sources<'a>(chain: Chain, sources: impl IntoIterator<Item = &'a str>) {
    if let Some(counter) = STATS_SOURCES.as_ref() {
        for source in sources {
            counter.with_label_values(&[chain.slug(), source]).inc();
        }
    }
}

/// Record cache operation metrics
///
/// # Arguments
/// * `operation` - `hit` or `miss`
/// * `kind` - What was looked up (`collection`, `stats`, `wallet`)
pub fn record_cache_operation(operation: &str, kind: &str) {
    if let Some(counter) = CACHE_OPERATIONS.as_ref() {
        counter.with_label_values(&[operation, kind]).inc();
    }
}

/// Record a lookup by whether it was served from the cache
pub fn record_cache_lookup(cached: bool, kind: &str) {
    record_cache_operation(if cached { "hit" } else { "miss" }, kind);
}

/// Count a request refused by a limiter
pub fn inc_rate_limited(limiter: &str) {
    if let Some(counter) = RATE_LIMITED.as_ref() {
        counter.with_label_values(&[limiter]).inc();
    }
}

/// Update cache utilization metrics from a memory cache snapshot
pub fn update_cache_metrics(stats: &CacheStats) {
    if let Some(gauge) = CACHE_UTILIZATION.as_ref() {
        gauge.set(stats.utilization_rate);
    }
    if let Some(gauge) = CACHE_HIT_RATE.as_ref() {
        gauge.set(stats.hit_rate);
    }
    if let Some(gauge) = CACHE_SIZE.as_ref() {
        #[allow(clippy::cast_precision_loss)]
        gauge.set(stats.entry_count as f64);
    }
}

/// Render the default registry in Prometheus text format
///
/// # Errors
///
/// Returns the encoder error message when the registry cannot be encoded
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

/// Axum handler that exports metrics in Prometheus text format
pub async fn metrics_handler(State(state): State<ServerState>) -> Response {
    if let Some(stats) = state.aggregator().cache().memory_stats() {
        update_cache_metrics(&stats);
    }
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_series_are_rendered() {
        inc_requests_by_chain(Chain::Polygon, "collection_nfts");
        record_cache_lookup(true, "stats");
        inc_rate_limited("webhooks");

        let text = render().unwrap();
        assert!(text.contains("nft_aggregator_requests_total"));
        assert!(text.contains("chain=\"polygon\""));
        assert!(text.contains("nft_aggregator_cache_operations_total"));
        assert!(text.contains("nft_aggregator_rate_limited_total"));
    }
}
