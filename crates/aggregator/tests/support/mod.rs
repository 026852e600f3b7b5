// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs, dead_code)]

//! Scripted in-memory page adapter

use std::{
    fmt,
    ops::Range,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use api_client::{
    ApiClient, ApiError, HealthStatus, NormalizedItem, OwnerPageRequest, Page, PageCursor,
    PageRequest, ProviderAdapter, RawItem,
};
use serde_json::json;
use shared_types::Chain;

type Responder = dyn Fn(usize, &PageRequest) -> Result<Page, ApiError> + Send + Sync;

/// An adapter whose pages come from a closure of (call index, request)
pub struct ScriptedAdapter {
    respond: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<PageRequest>>,
    max_page_size: usize,
    synthetic: bool,
    resolves_to: Option<String>,
}

impl fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("calls", &self.calls)
            .field("max_page_size", &self.max_page_size)
            .field("synthetic", &self.synthetic)
            .field("resolves_to", &self.resolves_to)
            .finish_non_exhaustive()
    }
}

impl ScriptedAdapter {
    pub fn new(
        respond: impl Fn(usize, &PageRequest) -> Result<Page, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            max_page_size: 1000,
            synthetic: false,
            resolves_to: None,
        }
    }

    /// Derive `after:{token_id}` cursors from the last item of a full page
    pub fn with_synthetic_cursor(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn resolving_to(mut self, collection_id: &str) -> Self {
        self.resolves_to = Some(collection_id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ApiClient for ScriptedAdapter {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        Ok(HealthStatus::Up)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(call, request)
    }

    async fn fetch_owner_page(&self, _request: &OwnerPageRequest) -> Result<Page, ApiError> {
        Ok(Page::empty())
    }

    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem> {
        let token_id = raw.get("id")?.as_str()?;
        let collection = raw.get("collection")?.as_str()?;
        Some(NormalizedItem::new(token_id, collection, chain))
    }

    fn synthetic_cursor(&self, last: &NormalizedItem) -> Option<PageCursor> {
        self.synthetic
            .then(|| PageCursor::new(format!("after:{}", last.token_id)))
            .flatten()
    }

    async fn resolve_identifier(
        &self,
        _collection_id: &str,
        _chain: Chain,
    ) -> Result<Option<String>, ApiError> {
        Ok(self.resolves_to.clone())
    }
}

/// Raw items with token ids drawn from `range`
pub fn tokens(collection: &str, range: Range<usize>) -> Vec<RawItem> {
    range
        .map(|id| RawItem(json!({"id": id.to_string(), "collection": collection})))
        .collect()
}

pub fn page(items: Vec<RawItem>, next_cursor: Option<&str>, reported_total: Option<u64>) -> Page {
    Page {
        items,
        next_cursor: next_cursor.and_then(PageCursor::new),
        reported_total,
    }
}
