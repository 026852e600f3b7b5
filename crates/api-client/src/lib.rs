// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Provider abstractions for NFT data aggregation
//!
//! This crate provides the capability traits every upstream data source implements,
//! the normalized data model they produce, and the shared governor primitives that
//! bound and pace provider traffic.
//!
//! # Core Abstractions
//!
//! - **`ApiClient` Trait**: Health check and identity shared by every provider
//! - **`ProviderAdapter` Trait**: Cursor-paginated enumeration of a collection or wallet
//! - **`StatsProvider` Trait**: Partial collection statistics from one source
//! - **Governor**: Global concurrency semaphore, per-provider pacing and key rotation
//! - **Error Handling**: `ApiError` with a transient/permanent classification

use shared_types::Chain;
use thiserror::Error;

pub mod governor;
pub mod health;
pub mod types;

pub use governor::*;
pub use health::*;
pub use types::*;

/// Generic trait for external API clients
///
/// This trait provides the identity and health surface shared by all provider
/// integrations.
pub trait ApiClient: Send + Sync {
    /// Check the health of this API client
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails
    fn health_check(&self) -> impl Future<Output = Result<HealthStatus, ApiError>> + Send;

    /// Get the name/identifier of this API client
    fn name(&self) -> &'static str;
}

/// A provider that enumerates NFTs page by page
///
/// Implementations translate the generic chain into the provider's own identifier,
/// clamp the page size to the provider ceiling and treat "collection not found" as an
/// empty page rather than an error.
pub trait ProviderAdapter: ApiClient {
    /// Largest page the provider will return
    fn max_page_size(&self) -> usize;

    /// Whether this adapter can serve the given chain
    fn supports(&self, chain: Chain) -> bool;

    /// Fetch one page of raw collection items
    ///
    /// # Errors
    ///
    /// Returns an error once the provider's transient-failure retries are exhausted,
    /// or immediately for permanent failures such as rejected credentials
    fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page, ApiError>> + Send;

    /// Fetch one page of raw items owned by a wallet
    ///
    /// # Errors
    ///
    /// Same classification as [`ProviderAdapter::fetch_page`]
    fn fetch_owner_page(
        &self,
        request: &OwnerPageRequest,
    ) -> impl Future<Output = Result<Page, ApiError>> + Send;

    /// Convert a raw item into the normalized schema, `None` when the item is unusable
    fn normalize(&self, raw: &RawItem, chain: Chain) -> Option<NormalizedItem>;

    /// A continuation token derived from the last item of a full page that came back
    /// without a cursor
    fn synthetic_cursor(&self, _last: &NormalizedItem) -> Option<PageCursor> {
        None
    }

    /// Resolve a human-readable identifier (such as a marketplace symbol) into the
    /// provider's collection id
    ///
    /// # Errors
    ///
    /// Returns an error if every lookup in the resolution chain failed outright
    fn resolve_identifier(
        &self,
        _collection_id: &str,
        _chain: Chain,
    ) -> impl Future<Output = Result<Option<String>, ApiError>> + Send {
        std::future::ready(Ok(None))
    }
}

/// A provider that contributes partial collection statistics
pub trait StatsProvider: ApiClient {
    /// The source tag used by the reconciler to rank this provider
    fn source(&self) -> StatsSource;

    /// Fetch this source's view of a collection, `None` when it knows nothing about it
    ///
    /// # Errors
    ///
    /// Returns an error when the source failed; callers treat it as absent
    fn fetch_stats(
        &self,
        request: &StatsRequest,
    ) -> impl Future<Output = Result<Option<SourceStats>, ApiError>> + Send;
}

/// Common errors that can occur when working with API clients
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {message}")]
    Http { message: String },

    /// Upstream returned a status outside the handled set
    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Invalid response format
    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    /// Service unavailable
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Chain not served by this provider
    #[error("Chain {chain} is not supported by {provider}")]
    UnsupportedChain {
        chain: Chain,
        provider: &'static str,
    },

    /// Network timeout
    #[error("Request timeout after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Client independent error
    #[error(transparent)]
    Custom { error: anyhow::Error },
}

impl ApiError {
    /// Whether the failure is transient and the call may succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. }
            | Self::RateLimitExceeded { .. }
            | Self::ServiceUnavailable { .. }
            | Self::Timeout { .. } => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Authentication { .. }
            | Self::InvalidResponse { .. }
            | Self::Configuration { .. }
            | Self::UnsupportedChain { .. }
            | Self::Custom { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ApiError::Timeout { timeout_seconds: 30 }.is_retryable());
        assert!(
            ApiError::RateLimitExceeded {
                retry_after_seconds: 5
            }
            .is_retryable()
        );
        assert!(
            ApiError::Status {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            ApiError::Status {
                status: 408,
                message: String::new()
            }
            .is_retryable()
        );

        assert!(
            !ApiError::Status {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ApiError::Authentication {
                message: "bad key".to_string()
            }
            .is_retryable()
        );
        assert!(
            !ApiError::UnsupportedChain {
                chain: Chain::Solana,
                provider: "alchemy"
            }
            .is_retryable()
        );
    }
}
