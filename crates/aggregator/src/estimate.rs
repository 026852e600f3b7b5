// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Walk-local collection size estimate

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How much the walker trusts its collection total
///
/// Ordered so that `Unknown < Estimate < Exact`; a walk only ever moves upwards.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TotalConfidence {
    /// No usable figure
    #[default]
    Unknown,
    /// A provider or marketplace claim
    Estimate,
    /// Counted by walking the collection to its end
    Exact,
}

impl TotalConfidence {
    /// Lowercase label for logs and metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Estimate => "estimate",
            Self::Exact => "exact",
        }
    }
}

/// The total of one collection as learned during a single walk
///
/// Every update goes through [`CollectionTotalEstimate::raise`], which refuses to lower the
/// confidence, so the estimate is monotonic for the lifetime of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionTotalEstimate {
    known_total: Option<u64>,
    confidence: TotalConfidence,
}

impl CollectionTotalEstimate {
    /// Current figure, if any
    pub const fn known_total(&self) -> Option<u64> {
        self.known_total
    }

    /// Current confidence
    pub const fn confidence(&self) -> TotalConfidence {
        self.confidence
    }

    /// Whether the total has been counted
    pub fn is_exact(&self) -> bool {
        self.confidence == TotalConfidence::Exact
    }

    /// Replace the figure when `confidence` is strictly higher than the current one
    ///
    /// Returns whether the estimate changed.
    pub fn raise(&mut self, total: u64, confidence: TotalConfidence) -> bool {
        if confidence <= self.confidence {
            return false;
        }
        self.known_total = Some(total);
        self.confidence = confidence;
        true
    }

    /// Apply what the first page of a walk says about the collection
    ///
    /// A short page without a cursor is the whole collection. A full page without a cursor
    /// and a provider total larger than what arrived becomes an estimate. A page with a
    /// cursor leaves the total unknown regardless of what the provider claims.
    pub fn observe_first_page(
        &mut self,
        count: u64,
        raw_len: usize,
        page_size: usize,
        has_cursor: bool,
        reported_total: Option<u64>,
    ) {
        if has_cursor {
            return;
        }
        if raw_len < page_size {
            self.raise(count, TotalConfidence::Exact);
        } else if let Some(reported) = reported_total.filter(|reported| *reported > count) {
            self.raise(reported, TotalConfidence::Estimate);
        }
    }

    /// The walk reached the end of the collection
    pub fn complete(&mut self, accumulated: u64) {
        self.raise(accumulated, TotalConfidence::Exact);
    }

    /// Take a marketplace count when it is plausible
    ///
    /// Counts equal to one of the page sizes seen during the walk are page lengths echoed
    /// back as totals and are ignored. An exact total is never replaced.
    pub fn absorb_marketplace(&mut self, marketplace_total: Option<u64>, page_sizes: &[u64]) -> bool {
        match marketplace_total {
            Some(total) if !page_sizes.contains(&total) => {
                self.raise(total, TotalConfidence::Estimate)
            }
            _ => false,
        }
    }

    /// The figure reported for a walk that stopped before the end
    ///
    /// Only an exact total survives truncation; anything weaker is reported as unknown.
    #[must_use]
    pub fn truncated(&self) -> Self {
        if self.is_exact() {
            *self
        } else {
            Self::default()
        }
    }
}
