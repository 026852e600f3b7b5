// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Provider error type shared by every HTTP integration

use api_client::ApiError;
use shared_types::Chain;
use thiserror::Error;

/// Errors raised while talking to an upstream provider
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// JSON-RPC error object in a successful HTTP response
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Authentication failed
    #[error("Authentication failed with status {status}")]
    Unauthorized { status: u16 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider does not serve this chain
    #[error("{provider} does not support chain {chain}")]
    UnsupportedChain {
        chain: Chain,
        provider: &'static str,
    },

    /// Timeout error
    #[error("Request timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The request governor refused a permit
    #[error("Request governor unavailable: {0}")]
    Governor(String),

    /// A caller-supplied URL points somewhere we refuse to fetch
    #[error("Refusing to fetch {0}")]
    UnsafeUrl(String),
}

impl ProviderError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(error) => !error.is_decode() && !error.is_builder(),
            Self::ApiError { status, .. } => matches!(status, 408 | 500..=599),
            Self::RateLimited | Self::Timeout { .. } => true,
            Self::Json(_)
            | Self::Rpc { .. }
            | Self::Unauthorized { .. }
            | Self::Config(_)
            | Self::UnsupportedChain { .. }
            | Self::Governor(_)
            | Self::UnsafeUrl(_) => false,
        }
    }
}

impl From<ApiError> for ProviderError {
    fn from(value: ApiError) -> Self {
        Self::Governor(value.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Http(error) => ApiError::Http {
                message: error.to_string(),
            },
            ProviderError::Json(error) => ApiError::InvalidResponse {
                message: error.to_string(),
            },
            ProviderError::Rpc { code, message } => ApiError::InvalidResponse {
                message: format!("rpc error {code}: {message}"),
            },
            ProviderError::ApiError { status, message } => ApiError::Status { status, message },
            ProviderError::RateLimited => ApiError::RateLimitExceeded {
                retry_after_seconds: 5,
            },
            ProviderError::Unauthorized { .. } => ApiError::Authentication {
                message: value.to_string(),
            },
            ProviderError::Config(message) => ApiError::Configuration { message },
            ProviderError::UnsupportedChain { chain, provider } => {
                ApiError::UnsupportedChain { chain, provider }
            }
            ProviderError::Timeout { seconds } => ApiError::Timeout {
                timeout_seconds: seconds,
            },
            ProviderError::Governor(message) => ApiError::ServiceUnavailable { message },
            ProviderError::UnsafeUrl(url) => ApiError::Configuration {
                message: format!("unsafe source url: {url}"),
            },
        }
    }
}
