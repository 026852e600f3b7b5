// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Cursor pagination walker
//!
//! Drives a [`ProviderAdapter`] page by page until the collection is exhausted, the page
//! budget runs out, the caller cancels or the provider fails. Pages are fetched strictly
//! sequentially. Whatever stops the walk, the items gathered so far are returned together
//! with an explicit stop reason; the walker never returns an error.
//!
//! Each fetched page is classified in this order:
//!
//! 1. empty: retried once with the same cursor, a second consecutive empty page ends the
//!    walk. An empty first page triggers identifier resolution and a restart.
//! 2. next cursor present: continue with it.
//! 3. full page without a cursor: continue with the adapter's synthetic cursor, otherwise
//!    re-request without a cursor. A blind re-request that brings nothing new gives up.
//!    A synthetic cursor equal to the current one is re-requested once the same way.
//! 4. short page without a cursor: the collection is exhausted.
//!
//! Only a walk that counted from the first page reports an exact total at its end. A walk
//! resumed from a cursor has not seen the earlier pages.

use std::collections::HashSet;

use api_client::{NormalizedItem, Page, PageCursor, PageRequest, ProviderAdapter};
use serde::{Deserialize, Serialize};
use shared_types::Chain;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::estimate::{CollectionTotalEstimate, TotalConfidence};

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Page budget used when the caller does not set one
pub const DEFAULT_MAX_PAGES: usize = 500;

/// Parameters of one collection walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRequest {
    /// Contract address, collection key or marketplace symbol
    pub collection_id: String,
    /// Chain to walk
    pub chain: Chain,
    /// Cursor to resume from, `None` to start at the first page
    pub start_cursor: Option<PageCursor>,
    /// Requested page size, clamped to the adapter ceiling
    pub page_size: usize,
    /// Hard cap on fetched pages, empty ones included
    pub max_pages: usize,
    /// Collection size claimed by a marketplace, if the caller has one
    pub marketplace_total: Option<u64>,
}

impl WalkRequest {
    /// Walk a collection from its first page with default limits
    pub fn new(collection_id: impl Into<String>, chain: Chain) -> Self {
        Self {
            collection_id: collection_id.into(),
            chain,
            start_cursor: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            marketplace_total: None,
        }
    }

    /// Resume from a cursor
    #[must_use]
    pub fn with_cursor(mut self, cursor: Option<PageCursor>) -> Self {
        self.start_cursor = cursor;
        self
    }

    /// Set the requested page size
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the page budget
    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Attach a marketplace item count
    #[must_use]
    pub const fn with_marketplace_total(mut self, total: Option<u64>) -> Self {
        self.marketplace_total = total;
        self
    }
}

/// Why a walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The collection was exhausted
    Completed,
    /// The page budget ran out
    PageLimit,
    /// The caller cancelled the walk
    Cancelled,
    /// A page failed after the provider's retries
    ProviderFailure,
    /// Full pages without cursors kept repeating the same items
    GaveUp,
}

impl StopReason {
    /// Label for logs and metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PageLimit => "page_limit",
            Self::Cancelled => "cancelled",
            Self::ProviderFailure => "provider_failure",
            Self::GaveUp => "gave_up",
        }
    }

    /// Whether the walk reached the end of the collection
    pub const fn is_natural_end(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Result of a walk, complete or partial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalkOutcome {
    /// Deduplicated items in provider order
    pub items: Vec<NormalizedItem>,
    /// Number of items in this response
    pub total_count_in_response: usize,
    /// Collection size, as far as it is known
    pub known_total: Option<u64>,
    /// Trust in `known_total`
    pub confidence: TotalConfidence,
    /// Whether the collection has items beyond this response
    pub has_more: bool,
    /// Cursor to resume a partial walk from
    pub next_cursor: Option<PageCursor>,
    /// Pages fetched, empty ones included
    pub pages_fetched: usize,
    /// Items normalized, duplicates included
    pub processed: usize,
    /// Items dropped as already seen
    pub duplicates: usize,
    /// Why the walk ended
    pub stop_reason: StopReason,
    /// The collection id the walk switched to after identifier resolution
    pub resolved_collection_id: Option<String>,
}

struct WalkState {
    collection_id: String,
    cursor: Option<PageCursor>,
    page_size: usize,
    estimate: CollectionTotalEstimate,
    seen: HashSet<(String, String)>,
    items: Vec<NormalizedItem>,
    page_lengths: Vec<u64>,
    pages_fetched: usize,
    processed: usize,
    duplicates: usize,
    consecutive_empty: u8,
    first_page_pending: bool,
    counted_from_start: bool,
    resolution_attempted: bool,
    blind_retry_in_flight: bool,
    resolved_collection_id: Option<String>,
}

impl WalkState {
    fn new(request: &WalkRequest, max_page_size: usize) -> Self {
        Self {
            collection_id: request.collection_id.clone(),
            cursor: request.start_cursor.clone(),
            page_size: request.page_size.clamp(1, max_page_size.max(1)),
            estimate: CollectionTotalEstimate::default(),
            seen: HashSet::new(),
            items: Vec::new(),
            page_lengths: Vec::new(),
            pages_fetched: 0,
            processed: 0,
            duplicates: 0,
            consecutive_empty: 0,
            first_page_pending: true,
            counted_from_start: request.start_cursor.is_none(),
            resolution_attempted: false,
            blind_retry_in_flight: false,
            resolved_collection_id: None,
        }
    }

    fn accumulated(&self) -> u64 {
        u64::try_from(self.items.len()).unwrap_or(u64::MAX)
    }

    /// Normalize a page into the output, returning the number of new items and the last
    /// item seen on the page
    fn absorb<A: ProviderAdapter>(
        &mut self,
        adapter: &A,
        page: &Page,
        chain: Chain,
    ) -> (usize, Option<NormalizedItem>) {
        let mut fresh = 0;
        let mut last = None;
        for raw in &page.items {
            let Some(item) = adapter.normalize(raw, chain) else {
                continue;
            };
            self.processed += 1;
            if self.seen.insert(item.identity()) {
                fresh += 1;
                last = Some(item.clone());
                self.items.push(item);
            } else {
                self.duplicates += 1;
                last = Some(item);
            }
        }
        (fresh, last)
    }

    fn restart_with(&mut self, resolved: String) {
        self.collection_id.clone_from(&resolved);
        self.resolved_collection_id = Some(resolved);
        self.cursor = None;
        self.consecutive_empty = 0;
        self.first_page_pending = true;
        self.counted_from_start = true;
        self.blind_retry_in_flight = false;
    }

    fn finish(self, stop_reason: StopReason, request: &WalkRequest) -> WalkOutcome {
        let natural = stop_reason.is_natural_end();
        let mut estimate = self.estimate;
        if !natural {
            estimate = estimate.truncated();
        } else if self.counted_from_start {
            estimate.complete(self.accumulated());
        }

        let mut page_sizes = self.page_lengths;
        page_sizes.push(u64::try_from(self.page_size).unwrap_or(u64::MAX));
        estimate.absorb_marketplace(request.marketplace_total, &page_sizes);

        let next_cursor = match stop_reason {
            StopReason::PageLimit | StopReason::Cancelled | StopReason::ProviderFailure => {
                self.cursor
            }
            StopReason::Completed | StopReason::GaveUp => None,
        };

        info!(
            collection = %request.collection_id,
            chain = %request.chain,
            stop_reason = stop_reason.as_str(),
            pages = self.pages_fetched,
            items = self.items.len(),
            duplicates = self.duplicates,
            confidence = estimate.confidence().as_str(),
            "collection walk finished"
        );

        WalkOutcome {
            total_count_in_response: self.items.len(),
            items: self.items,
            known_total: estimate.known_total(),
            confidence: estimate.confidence(),
            has_more: !natural,
            next_cursor,
            pages_fetched: self.pages_fetched,
            processed: self.processed,
            duplicates: self.duplicates,
            stop_reason,
            resolved_collection_id: self.resolved_collection_id,
        }
    }
}

/// Walk a collection through one adapter
///
/// The cancellation token is checked before each page and also aborts a page that is in
/// flight; either way the items gathered so far are returned.
pub async fn walk<A: ProviderAdapter>(
    adapter: &A,
    request: &WalkRequest,
    cancel: &CancellationToken,
) -> WalkOutcome {
    let chain = request.chain;
    let mut state = WalkState::new(request, adapter.max_page_size());

    debug!(
        provider = adapter.name(),
        collection = %request.collection_id,
        chain = %chain,
        page_size = state.page_size,
        max_pages = request.max_pages,
        "starting collection walk"
    );

    loop {
        if cancel.is_cancelled() {
            return state.finish(StopReason::Cancelled, request);
        }
        if state.pages_fetched >= request.max_pages {
            warn!(
                collection = %request.collection_id,
                max_pages = request.max_pages,
                "page budget exhausted"
            );
            return state.finish(StopReason::PageLimit, request);
        }

        let page_request = PageRequest {
            collection_id: state.collection_id.clone(),
            chain,
            cursor: state.cursor.clone(),
            page_size: state.page_size,
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return state.finish(StopReason::Cancelled, request),
            result = adapter.fetch_page(&page_request) => result,
        };
        let page = match result {
            Ok(page) => page,
            Err(error) => {
                warn!(
                    provider = adapter.name(),
                    collection = %state.collection_id,
                    cursor = ?state.cursor,
                    error = %error,
                    "page fetch failed"
                );
                return state.finish(StopReason::ProviderFailure, request);
            }
        };

        state.pages_fetched += 1;
        state
            .page_lengths
            .push(u64::try_from(page.len()).unwrap_or(u64::MAX));
        debug!(
            page = state.pages_fetched,
            items = page.len(),
            has_cursor = page.next_cursor.is_some(),
            reported_total = ?page.reported_total,
            "fetched page"
        );

        if page.is_empty() {
            state.consecutive_empty += 1;

            if state.items.is_empty() && !state.resolution_attempted {
                state.resolution_attempted = true;
                match adapter.resolve_identifier(&state.collection_id, chain).await {
                    Ok(Some(resolved)) if resolved != state.collection_id => {
                        info!(from = %state.collection_id, to = %resolved, "restarting walk with resolved collection id");
                        state.restart_with(resolved);
                        continue;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(collection = %state.collection_id, error = %error, "identifier resolution failed");
                    }
                }
            }

            if state.consecutive_empty >= 2 {
                return state.finish(StopReason::Completed, request);
            }
            continue;
        }
        state.consecutive_empty = 0;

        let (fresh, last) = state.absorb(adapter, &page, chain);

        if state.first_page_pending {
            state.first_page_pending = false;
            if state.counted_from_start {
                let count = state.accumulated();
                state.estimate.observe_first_page(
                    count,
                    page.len(),
                    state.page_size,
                    page.next_cursor.is_some(),
                    page.reported_total,
                );
            }
        }

        if let Some(next) = page.next_cursor {
            state.cursor = Some(next);
            state.blind_retry_in_flight = false;
            continue;
        }

        if page.len() < state.page_size {
            return state.finish(StopReason::Completed, request);
        }

        // full page, no cursor
        let synthetic = last.as_ref().and_then(|item| adapter.synthetic_cursor(item));
        if let Some(synthetic) = &synthetic
            && state.cursor.as_ref() != Some(synthetic)
        {
            debug!(cursor = %synthetic, "continuing with synthetic cursor");
            state.cursor = Some(synthetic.clone());
            state.blind_retry_in_flight = false;
            continue;
        }

        if state.blind_retry_in_flight && fresh == 0 {
            warn!(
                collection = %state.collection_id,
                pages = state.pages_fetched,
                "full pages without cursor repeat known items, giving up"
            );
            return state.finish(StopReason::GaveUp, request);
        }
        state.blind_retry_in_flight = true;
        // a synthetic cursor that does not advance is re-requested as is, never rewound
        if synthetic.is_none() {
            state.cursor = None;
        }
    }
}
