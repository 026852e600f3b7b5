// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport shared by every provider adapter
//!
//! One [`ProviderTransport`] per provider owns the HTTP client, the credential ring and
//! the pacer. Every attempt waits for the pacer, then takes a permit from the global
//! [`ConcurrencyGovernor`] and holds it only for the call itself. Transient failures retry with jittered exponential
//! backoff; a 429 rotates to the next key and sleeps before the retry. A 404 is reported
//! as `None` so adapters can turn it into an empty page.

use std::time::Duration;

use api_client::{ConcurrencyGovernor, KeyRing, RequestPacer, RetryPolicy};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio::time::timeout;
use tokio_retry::{
    RetryIf,
    strategy::{ExponentialBackoff, jitter},
};
use tracing::{debug, warn};

use crate::ProviderError;

const USER_AGENT: &str = "nft-aggregator/0.1.0";

/// Connection settings for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    pub base_url: String,
    /// Credentials, rotated on rate-limit responses
    pub api_keys: Vec<String>,
    /// Pacing limit for this provider
    pub requests_per_second: f64,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Retry budget and backoff shape
    pub retry: RetryPolicy,
}

impl ProviderConfig {
    /// Settings with the default timeout and retry policy
    pub fn new(base_url: impl Into<String>, api_keys: Vec<String>, requests_per_second: f64) -> Self {
        Self {
            base_url: base_url.into(),
            api_keys,
            requests_per_second,
            timeout_seconds: 30,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Base URL without a trailing slash
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Paced, governed, retrying HTTP sender for one provider
#[derive(Debug)]
pub struct ProviderTransport {
    provider: &'static str,
    client: Client,
    keys: Option<KeyRing>,
    pacer: RequestPacer,
    governor: ConcurrencyGovernor,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ProviderTransport {
    /// Build a transport
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is empty, `require_key` is set and no key is
    /// configured, or the HTTP client cannot be created
    pub fn new(
        provider: &'static str,
        config: &ProviderConfig,
        governor: ConcurrencyGovernor,
        require_key: bool,
    ) -> Result<Self, ProviderError> {
        if config.base_url.trim().is_empty() {
            return Err(ProviderError::Config(format!(
                "{provider}: base URL cannot be empty"
            )));
        }

        let keys = match KeyRing::new(&config.api_keys) {
            Ok(ring) => Some(ring),
            Err(_) if !require_key => None,
            Err(_) => {
                return Err(ProviderError::Config(format!(
                    "{provider}: at least one API key is required"
                )));
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            provider,
            client,
            keys,
            pacer: RequestPacer::per_second(config.requests_per_second),
            governor,
            retry: config.retry,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    /// The key the next request will use
    pub fn current_key(&self) -> Option<&str> {
        self.keys.as_ref().map(KeyRing::current)
    }

    /// Send a request built by `build` and parse the JSON body
    ///
    /// `build` is invoked once per attempt with the current key, so a retry after a
    /// rate-limit response carries the rotated key. Returns `Ok(None)` on 404.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first permanent error
    pub async fn send_json<F>(&self, build: F) -> Result<Option<Value>, ProviderError>
    where
        F: Fn(&Client, Option<&str>) -> RequestBuilder,
    {
        match self.send_text(build).await? {
            None => Ok(None),
            Some(body) if body.trim().is_empty() => Ok(Some(Value::Null)),
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        }
    }

    /// Send a request built by `build` and return the raw body
    ///
    /// # Errors
    ///
    /// Same as [`ProviderTransport::send_json`]
    pub async fn send_text<F>(&self, build: F) -> Result<Option<String>, ProviderError>
    where
        F: Fn(&Client, Option<&str>) -> RequestBuilder,
    {
        let strategy = ExponentialBackoff::from_millis(self.retry.backoff_base.max(1))
            .factor(self.retry.backoff_factor_ms.max(1))
            .max_delay(self.retry.max_delay)
            .map(jitter)
            .take(self.retry.retries());

        RetryIf::spawn(
            strategy,
            || self.attempt(&build),
            |error: &ProviderError| {
                let retry = error.is_retryable();
                if retry {
                    debug!(provider = self.provider, error = %error, "retrying provider request");
                }
                retry
            },
        )
        .await
    }

    async fn attempt<F>(&self, build: &F) -> Result<Option<String>, ProviderError>
    where
        F: Fn(&Client, Option<&str>) -> RequestBuilder,
    {
        self.pacer.pace().await;
        let permit = self.governor.acquire().await?;

        let request = build(&self.client, self.current_key());
        let response = timeout(self.timeout, request.send())
            .await
            .map_err(|_| ProviderError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(ProviderError::Http)?;

        let status = response.status();
        match status {
            status if status.is_success() => {
                let body = response.text().await.map_err(ProviderError::Http)?;
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => {
                debug!(provider = self.provider, "resource not found");
                Ok(None)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(provider = self.provider, status = status.as_u16(), "provider rejected credentials");
                Err(ProviderError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                drop(permit);
                if let Some(keys) = &self.keys {
                    keys.rotate();
                }
                warn!(
                    provider = self.provider,
                    backoff_ms = self.retry.rate_limit_backoff.as_millis(),
                    "rate limited, rotating key"
                );
                tokio::time::sleep(self.retry.rate_limit_backoff).await;
                Err(ProviderError::RateLimited)
            }
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!(
                    provider = self.provider,
                    status = status.as_u16(),
                    error = %error_text,
                    "provider API error"
                );
                Err(ProviderError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }
}
