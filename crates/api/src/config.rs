// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! This module provides configuration structures and logic for the aggregator server,
//! supporting different environments and validation of configuration parameters.
//!
//! Provider credentials may also come from the conventional comma-separated variables
//! (`ALCHEMY_API_KEY`, `MORALIS_API_KEY`, ...) and the Redis URL from `REDIS_URL`.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use aggregator::EngineSettings;
use anyhow::{Result, anyhow, ensure};
use api_client::RetryPolicy;
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use external_apis::CacheBackend;
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_with::{DurationSeconds, serde_as};

use crate::error::{ServerError, ServerResult};

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Create a safe default port for development
    pub const fn default_development() -> Self {
        Self {
            port: 3000,
            environment: Environment::Development,
        }
    }

    /// Create a safe testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // re-validated in `load` once the environment is known
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated timeout duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(seconds <= 300, "timeout cannot exceed 300");
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Create a safe default timeout (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Create a safe testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// Connection settings for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Register the provider at all
    pub enabled: bool,
    /// Comma-separated API keys, rotated on rate limits
    pub api_key: Option<String>,
    /// Override of the provider's default endpoint
    pub base_url: Option<String>,
    /// Override of the provider's default pacing
    pub requests_per_second: Option<f64>,
}

impl ProviderSettings {
    fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Non-empty keys from `api_key`
    pub fn keys(&self) -> Vec<String> {
        self.api_key
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Whether a key-requiring provider can be registered
    pub fn has_keys(&self) -> bool {
        self.enabled && !self.keys().is_empty()
    }

    /// `base_url` or the given default
    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(default)
    }
}

/// Per-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Alchemy NFT API
    pub alchemy: ProviderSettings,
    /// Moralis
    pub moralis: ProviderSettings,
    /// `QuickNode` NFT add-on
    pub quicknode: ProviderSettings,
    /// Helius DAS
    pub helius: ProviderSettings,
    /// Reservoir marketplace statistics
    pub reservoir: ProviderSettings,
    /// Magic Eden marketplace statistics
    pub magic_eden: ProviderSettings,
    /// Web page scrape overlay
    pub scrape: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            alchemy: ProviderSettings::enabled(),
            moralis: ProviderSettings::enabled(),
            quicknode: ProviderSettings::enabled(),
            helius: ProviderSettings::enabled(),
            reservoir: ProviderSettings::enabled(),
            magic_eden: ProviderSettings::enabled(),
            scrape: ProviderSettings::enabled(),
        }
    }
}

impl ProvidersConfig {
    /// Every provider switched off
    pub fn disabled() -> Self {
        Self {
            alchemy: ProviderSettings::default(),
            moralis: ProviderSettings::default(),
            quicknode: ProviderSettings::default(),
            helius: ProviderSettings::default(),
            reservoir: ProviderSettings::default(),
            magic_eden: ProviderSettings::default(),
            scrape: ProviderSettings::default(),
        }
    }

    /// Fill missing keys from the conventional environment variables
    fn apply_key_variables(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let slots = [
            ("ALCHEMY_API_KEY", &mut self.alchemy),
            ("MORALIS_API_KEY", &mut self.moralis),
            ("HELIUS_API_KEY", &mut self.helius),
            ("QUICKNODE_API_KEY", &mut self.quicknode),
            ("RESERVOIR_API_KEY", &mut self.reservoir),
            ("MAGICEDEN_API_KEY", &mut self.magic_eden),
        ];
        for (variable, settings) in slots {
            if settings.keys().is_empty()
                && let Some(value) = lookup(variable).filter(|v| !v.trim().is_empty())
            {
                settings.api_key = Some(value);
            }
        }
    }
}

/// Walker, governor and retry settings
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider calls in flight across all walks
    pub max_workers: usize,
    /// Attempts per provider request, including the first
    pub max_retries: usize,
    /// Exponential base of the retry backoff
    pub retry_backoff_base: u64,
    /// Multiplier of each backoff step, in milliseconds
    pub retry_base_delay_ms: u64,
    /// Upper bound for one backoff delay
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_retry_delay: Duration,
    /// Extra sleep after a rate-limit response
    #[serde_as(as = "DurationSeconds<u64>")]
    pub rate_limit_backoff: Duration,
    /// Per-request provider timeout in seconds
    pub request_timeout_seconds: u64,
    /// Page size when a request does not set one
    pub default_page_size: usize,
    /// Page budget per walk
    pub max_pages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let settings = EngineSettings::default();
        Self {
            max_workers: 10,
            max_retries: retry.max_attempts,
            retry_backoff_base: retry.backoff_base,
            retry_base_delay_ms: retry.backoff_factor_ms,
            max_retry_delay: retry.max_delay,
            rate_limit_backoff: retry.rate_limit_backoff,
            request_timeout_seconds: 30,
            default_page_size: settings.default_page_size,
            max_pages: settings.max_pages,
        }
    }
}

impl EngineConfig {
    /// Retry policy shared by every provider
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            backoff_base: self.retry_backoff_base,
            backoff_factor_ms: self.retry_base_delay_ms,
            max_delay: self.max_retry_delay,
            rate_limit_backoff: self.rate_limit_backoff,
        }
    }

    /// Walker defaults
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            default_page_size: self.default_page_size.max(1),
            max_pages: self.max_pages.max(1),
        }
    }
}

/// Result cache settings
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage backend
    pub backend: CacheBackend,
    /// Default entry lifetime
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ttl: Duration,
    /// Capacity of the memory backend
    pub max_entries: usize,
    /// Redis connection URL
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl: Duration::from_secs(900),
            max_entries: 10_000,
            redis_url: None,
        }
    }
}

/// Per-IP rate limiting of the `/v1` API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Apply the limiter
    pub enabled: bool,
    /// Requests allowed per IP in any 60 second window
    pub requests_per_minute: u32,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 120,
        }
    }
}

/// Webhook intake settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Events retained in the ring buffer
    pub max_events: usize,
    /// Deliveries allowed per IP in any 60 second window
    pub requests_per_minute: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            requests_per_minute: 100,
        }
    }
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Environment type
    pub environment: Environment,
    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Walker and governor settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Result cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// API rate limiting
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Webhook intake
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::default_development(),
            timeout_seconds: TimeoutSeconds::default(),
            environment: Environment::Development,
            providers: ProvidersConfig::default(),
            engine: EngineConfig::default(),
            cache: CacheConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with the `SERVER__` prefix, nested with `__`
    ///    (`SERVER__CACHE__BACKEND=redis`)
    ///
    /// Provider keys and the Redis URL left unset fall back to the conventional variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000)?
            .set_default("timeout_seconds", 30)?
            .set_default("environment", "development")?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        let mut server_config: Self = config.try_deserialize()?;

        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        server_config.apply_conventional_variables(|name| std::env::var(name).ok());
        Ok(server_config)
    }

    fn apply_conventional_variables(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.providers.apply_key_variables(&lookup);
        if self.cache.redis_url.is_none() {
            self.cache.redis_url = lookup("REDIS_URL").filter(|url| !url.trim().is_empty());
        }
    }

    /// Create configuration optimized for testing
    ///
    /// No provider is registered and rate limiting is off; tests opt in explicitly.
    pub fn for_testing() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(),
            timeout_seconds: TimeoutSeconds::testing(),
            environment: Environment::Testing,
            providers: ProvidersConfig::disabled(),
            engine: EngineConfig::default(),
            cache: CacheConfig {
                max_entries: 1_000,
                ..CacheConfig::default()
            },
            rate_limiting: RateLimitingConfig {
                enabled: false,
                ..RateLimitingConfig::default()
            },
            webhooks: WebhookConfig::default(),
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}
