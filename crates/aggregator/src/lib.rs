// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! NFT aggregation engine
//!
//! Walks provider pagination into complete collection listings, reconciles statistics
//! from several sources into one record and caches finished results.
//!
//! - [`walker`]: cursor pagination walker with total inference and deduplication
//! - [`estimate`]: the walk-local, monotonic collection total
//! - [`reconciler`]: fixed-priority field merge with derived market fields
//! - [`service`]: the [`Aggregator`] tying adapters, walker, reconciler and cache together

pub mod error;
pub mod estimate;
pub mod reconciler;
pub mod service;
pub mod walker;

pub use error::AggregatorError;
pub use estimate::{CollectionTotalEstimate, TotalConfidence};
pub use reconciler::reconcile;
pub use service::{
    Aggregator, ChainWalletPage, CollectionNfts, CollectionQuery, EngineSettings, WalletNfts,
    WalletQuery,
};
pub use walker::{StopReason, WalkOutcome, WalkRequest, walk};
