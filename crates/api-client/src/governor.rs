// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Request governance shared by all providers
//!
//! - [`ConcurrencyGovernor`]: system-wide cap on in-flight provider calls. A permit
//!   covers one HTTP attempt, never a whole pagination walk.
//! - [`RequestPacer`]: per-provider minimum interval between requests.
//! - [`KeyRing`]: rotating credential list, advanced on rate-limit responses.
//! - [`RetryPolicy`]: attempt budget and backoff shape for transient failures.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore},
    time::Instant,
};
use tracing::debug;

use crate::ApiError;

const DEFAULT_MAX_WORKERS: usize = 10;

/// Global bound on concurrent provider calls
#[derive(Debug, Clone)]
pub struct ConcurrencyGovernor {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl Default for ConcurrencyGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl ConcurrencyGovernor {
    /// Create a governor with `max_workers` permits (at least one)
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Wait for a permit; hold it for exactly one provider call
    ///
    /// # Errors
    ///
    /// Returns an error if the governor has been closed
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ApiError::ServiceUnavailable {
                message: "request governor is closed".to_string(),
            })
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured permit count
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

/// Enforces a minimum interval between requests of one provider
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Pace at `requests_per_second`; zero or negative disables pacing
    pub fn per_second(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(min_interval)
    }

    /// Pace with an explicit minimum interval
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Minimum gap between two requests
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until the provider may be called again, then claim the slot
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis(), "pacing provider request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Rotating list of API credentials
pub struct KeyRing {
    keys: Vec<String>,
    index: AtomicUsize,
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.keys.len())
            .field("index", &self.index.load(Ordering::Relaxed))
            .finish()
    }
}

impl KeyRing {
    /// Build a ring from a list of keys, ignoring blank entries
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no usable key remains
    pub fn new<I, S>(keys: I) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(ApiError::Configuration {
                message: "at least one API key is required".to_string(),
            });
        }

        Ok(Self {
            keys,
            index: AtomicUsize::new(0),
        })
    }

    /// Build a ring from a comma-separated list
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the list holds no usable key
    pub fn from_list(list: &str) -> Result<Self, ApiError> {
        Self::new(list.split(','))
    }

    /// The key to use for the next request
    pub fn current(&self) -> &str {
        let i = self.index.load(Ordering::Relaxed) % self.keys.len();
        &self.keys[i]
    }

    /// Advance to the next key and return it
    pub fn rotate(&self) -> &str {
        let next = self.index.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        debug!(
            key_index = next % self.keys.len(),
            key_count = self.keys.len(),
            "rotating API key"
        );
        &self.keys[next % self.keys.len()]
    }

    /// Number of keys in the ring
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; a ring is never built empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Attempt budget and backoff shape for transient provider failures
///
/// Delays grow as `base^n * factor_ms` milliseconds, capped at `max_delay`.
/// The defaults yield 2s, 4s, 8s, 10s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: usize,
    /// Exponential base
    pub backoff_base: u64,
    /// Multiplier applied to each step, in milliseconds
    pub backoff_factor_ms: u64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Extra sleep after a rate-limit response, before the retry
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
            backoff_factor_ms: 1000,
            max_delay: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting, for tests and local mocks
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            backoff_base: 1,
            backoff_factor_ms: 1,
            max_delay: Duration::from_millis(1),
            rate_limit_backoff: Duration::ZERO,
        }
    }

    /// Number of retries after the first attempt
    pub fn retries(&self) -> usize {
        self.max_attempts.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ring_rotation_wraps() {
        let ring = KeyRing::from_list("a, b ,,c").unwrap();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.current(), "a");
        assert_eq!(ring.rotate(), "b");
        assert_eq!(ring.current(), "b");
        assert_eq!(ring.rotate(), "c");
        assert_eq!(ring.rotate(), "a");
    }

    #[test]
    fn key_ring_requires_a_key() {
        assert!(matches!(
            KeyRing::from_list(" , "),
            Err(ApiError::Configuration { .. })
        ));
    }

    #[test]
    fn key_ring_debug_hides_keys() {
        let ring = KeyRing::from_list("secret-key").unwrap();
        let debug = format!("{ring:?}");
        assert!(!debug.contains("secret-key"));
    }

    #[tokio::test]
    async fn governor_bounds_permits() {
        let governor = ConcurrencyGovernor::new(2);
        let first = tokio_test::assert_ok!(governor.acquire().await);
        let _second = tokio_test::assert_ok!(governor.acquire().await);
        assert_eq!(governor.available(), 0);

        drop(first);
        assert_eq!(governor.available(), 1);
        assert_eq!(ConcurrencyGovernor::new(0).max_workers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_requests() {
        let pacer = RequestPacer::per_second(2.0);
        assert_eq!(pacer.min_interval(), Duration::from_millis(500));

        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn pacer_disabled_for_zero_rate() {
        assert_eq!(RequestPacer::per_second(0.0).min_interval(), Duration::ZERO);
    }

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries(), 2);
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(RetryPolicy::immediate(0).retries(), 0);
    }
}
