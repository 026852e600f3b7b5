// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware module for HTTP request processing
//!
//! This module provides per-IP rate limiting for the API and the webhook intake.

use std::{
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{config::RateLimitingConfig, error::ServerError, metrics::inc_rate_limited};

// Rate limiting constants
const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Sliding-window request limiter keyed by client IP
///
/// Each IP may make `requests_per_minute` requests in any 60 second window. Rejected
/// requests are not recorded, so a client that backs off regains capacity as its
/// oldest requests age out.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    scope: &'static str,
    config: RateLimitingConfig,
    window: Duration,
    requests: Arc<DashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitingConfig) -> Self {
        Self::with_window(config, Duration::from_secs(RATE_LIMIT_WINDOW_SECONDS))
    }

    /// Create a limiter with a custom window length
    pub fn with_window(config: RateLimitingConfig, window: Duration) -> Self {
        Self {
            scope: "api",
            config,
            window,
            requests: Arc::new(DashMap::new()),
        }
    }

    /// Label the limiter in logs and metrics
    #[must_use]
    pub fn named(mut self, scope: &'static str) -> Self {
        self.scope = scope;
        self
    }

    /// Label used in logs and metrics
    pub fn scope(&self) -> &'static str {
        self.scope
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Admit a request from `ip` and record it, or refuse it
    ///
    /// Always admits when the limiter is disabled.
    pub fn check_and_record(&self, ip: IpAddr) -> bool {
        if !self.config.enabled {
            return true;
        }

        let now = Instant::now();
        if self.requests.len() > MAX_RATE_LIMIT_ENTRIES {
            self.cleanup_expired_entries(now);
        }

        let limit = usize::try_from(self.config.requests_per_minute).unwrap_or(usize::MAX);
        let mut timestamps = self.requests.entry(ip).or_default();
        while timestamps
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= limit {
            debug!(ip = %ip, requests = timestamps.len(), "rate limiting IP");
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Check if a request from the given IP should be rate limited, recording it if not
    pub fn is_rate_limited(&self, ip: IpAddr) -> bool {
        !self.check_and_record(ip)
    }

    /// Number of IPs currently tracked
    pub fn tracked_ips(&self) -> usize {
        self.requests.len()
    }

    /// Drop IPs with no request inside the window, then the stalest if still over capacity
    fn cleanup_expired_entries(&self, now: Instant) {
        let entries_before = self.requests.len();

        self.requests.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|newest| now.duration_since(*newest) < self.window)
        });

        let entries_after = self.requests.len();
        let cleaned_up = entries_before.saturating_sub(entries_after);
        if cleaned_up > 0 {
            debug!(cleaned_up, "cleaned up expired rate limiter entries");
        }

        if entries_after > MAX_RATE_LIMIT_ENTRIES {
            warn!(
                entries = entries_after,
                "rate limiter still over capacity after cleanup, removing oldest"
            );

            let mut oldest_entries: Vec<_> = self
                .requests
                .iter()
                .map(|entry| (*entry.key(), entry.value().back().copied()))
                .collect();
            oldest_entries.sort_by_key(|(_, newest)| *newest);

            let entries_to_remove = entries_after - MAX_RATE_LIMIT_ENTRIES / 2;
            for (ip, _) in oldest_entries.into_iter().take(entries_to_remove) {
                self.requests.remove(&ip);
            }
        }
    }
}

/// Client IP: the first `X-Forwarded-For` hop when present and valid, else the peer
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}

/// Rate limiting middleware function
pub async fn rate_limiting_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(rate_limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let ip = client_ip(req.headers(), addr);

    if !rate_limiter.check_and_record(ip) {
        warn!(ip = %ip, limiter = rate_limiter.scope(), "rate limit exceeded");
        inc_rate_limited(rate_limiter.scope());
        return Err(ServerError::RateLimited);
    }

    Ok(next.run(req).await)
}
