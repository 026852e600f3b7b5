// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the main server struct and implementation for the NFT API server,
//! including server lifecycle management, router configuration, and coordinated graceful
//! shutdown using `CancellationToken`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use aggregator::Aggregator;
use api_client::ConcurrencyGovernor;
use axum::{Router, http::HeaderName};
use external_apis::{
    AlchemyClient, ApiRegistry, CacheBackend, HeliusClient, MagicEdenClient, MoralisClient,
    ProviderConfig, ProviderError, QuickNodeClient, ReservoirClient, ResultCache, ScrapeClient,
    alchemy, helius, magiceden, moralis, quicknode, reservoir, scrape,
};
use hyper::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn};

use crate::{
    config::{EngineConfig, ProviderSettings, ServerConfig},
    error::{ServerError, ServerResult},
    middleware::RateLimiter,
    routes::create_routes,
    state::ServerState,
};

// Server constants
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for graceful shutdown before forcing termination
    pub graceful_timeout: Duration,
    /// Maximum time to wait for all tasks to complete after graceful shutdown
    pub force_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
            force_timeout: Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Map a provider construction failure onto a dependency error
fn dependency(provider: &'static str) -> impl Fn(ProviderError) -> ServerError {
    move |e| ServerError::Dependency {
        message: format!("{provider}: {e}"),
    }
}

/// Main server struct
#[derive(Debug)]
#[allow(dead_code)]
pub struct Server {
    /// Server configuration
    config: ServerConfig,
    /// Application router
    router: Router,
    /// Server state
    state: ServerState,
    /// Cancellation token for coordinated shutdown
    cancellation_token: CancellationToken,
    /// Configuration for coordinated shutdown
    graceful_shutdown_config: ShutdownConfig,
}

impl Server {
    /// Create new server instance
    ///
    /// Builds the provider registry, the result cache and the aggregation service from
    /// the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Dependency` if a provider client cannot be built, or
    /// `ServerError::Config` if the cache settings are unusable.
    pub fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> ServerResult<Self> {
        let governor = ConcurrencyGovernor::new(config.engine.max_workers);
        let registry = Self::create_api_registry_from_config(&config, &governor)?;
        let cache = Self::create_cache_from_config(&config)?;

        info!(
            providers = ?registry.client_names(),
            cache = %cache.backend(),
            max_workers = config.engine.max_workers,
            "aggregation service configured"
        );

        let aggregator = Aggregator::new(
            Arc::new(registry),
            Arc::new(cache),
            config.engine.settings(),
        );
        Self::with_aggregator(config, shutdown_config, aggregator)
    }

    /// Provider connection settings with the engine's retry and timeout policy applied
    fn provider_config(
        settings: &ProviderSettings,
        engine: &EngineConfig,
        default_base_url: &str,
        default_requests_per_second: f64,
    ) -> ProviderConfig {
        ProviderConfig::new(
            settings.base_url_or(default_base_url),
            settings.keys(),
            settings
                .requests_per_second
                .unwrap_or(default_requests_per_second),
        )
        .with_retry(engine.retry_policy())
        .with_timeout(engine.request_timeout_seconds)
    }

    /// Create API registry from server configuration
    ///
    /// Providers that need credentials are registered only when a key is configured.
    fn create_api_registry_from_config(
        config: &ServerConfig,
        governor: &ConcurrencyGovernor,
    ) -> ServerResult<ApiRegistry> {
        let providers = &config.providers;
        let engine = &config.engine;
        let mut registry = ApiRegistry::new();

        if providers.alchemy.has_keys() {
            let provider = Self::provider_config(
                &providers.alchemy,
                engine,
                alchemy::DEFAULT_BASE_URL,
                alchemy::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = AlchemyClient::new(&provider, governor.clone())
                .map_err(dependency("alchemy"))?;
            registry = registry.with_alchemy(client);
        }

        if providers.moralis.has_keys() {
            let provider = Self::provider_config(
                &providers.moralis,
                engine,
                moralis::DEFAULT_BASE_URL,
                moralis::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = MoralisClient::new(&provider, governor.clone())
                .map_err(dependency("moralis"))?;
            registry = registry.with_moralis(client);
        }

        if providers.quicknode.has_keys() {
            let provider = Self::provider_config(
                &providers.quicknode,
                engine,
                quicknode::DEFAULT_BASE_URL,
                quicknode::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = QuickNodeClient::new(&provider, governor.clone())
                .map_err(dependency("quicknode"))?;
            registry = registry.with_quicknode(client);
        }

        if providers.reservoir.enabled {
            let provider = Self::provider_config(
                &providers.reservoir,
                engine,
                reservoir::DEFAULT_BASE_URL,
                reservoir::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = ReservoirClient::new(&provider, governor.clone())
                .map_err(dependency("reservoir"))?;
            registry = registry.with_reservoir(client);
        }

        // Magic Eden goes in before Helius so Helius can resolve marketplace symbols
        if providers.magic_eden.enabled {
            let provider = Self::provider_config(
                &providers.magic_eden,
                engine,
                magiceden::DEFAULT_BASE_URL,
                magiceden::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = MagicEdenClient::new(&provider, governor.clone())
                .map_err(dependency("magic_eden"))?;
            registry = registry.with_magic_eden(Arc::new(client));
        }

        if providers.helius.has_keys() {
            let provider = Self::provider_config(
                &providers.helius,
                engine,
                helius::DEFAULT_BASE_URL,
                helius::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = HeliusClient::new(&provider, governor.clone())
                .map_err(dependency("helius"))?;
            registry = registry.with_helius(client);
        }

        if providers.scrape.enabled {
            let provider = Self::provider_config(
                &providers.scrape,
                engine,
                "",
                scrape::DEFAULT_REQUESTS_PER_SECOND,
            );
            let client = ScrapeClient::new(&provider, governor.clone())
                .map_err(dependency("scrape"))?;
            registry = registry.with_scrape(client);
        }

        if registry.client_count() == 0 {
            warn!("no provider configured, collection and wallet requests will fail");
        }
        Ok(registry)
    }

    /// Create the result cache from server configuration
    fn create_cache_from_config(config: &ServerConfig) -> ServerResult<ResultCache> {
        let cache = &config.cache;
        match cache.backend {
            CacheBackend::Memory => Ok(ResultCache::memory(cache.max_entries, cache.ttl)),
            CacheBackend::Redis => {
                let url = cache.redis_url.as_deref().ok_or_else(|| ServerError::Config {
                    message: "cache.redis_url is required for the redis backend".to_string(),
                })?;
                ResultCache::redis(url, cache.ttl).map_err(|e| ServerError::Config {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Create server around a prebuilt aggregation service for dependency injection
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub fn with_aggregator(
        config: ServerConfig,
        graceful_shutdown_config: ShutdownConfig,
        aggregator: Aggregator,
    ) -> ServerResult<Self> {
        let cancellation_token = CancellationToken::new();
        let state = ServerState::new(
            config.clone(),
            aggregator,
            cancellation_token.child_token(),
        );
        let router = Self::create_router(state.clone());

        Ok(Self {
            config,
            router,
            state,
            cancellation_token,
            graceful_shutdown_config,
        })
    }

    /// Create application router with middleware
    fn create_router(state: ServerState) -> Router {
        let timeout_duration = state.config().timeout_seconds.value();

        // Create rate limiters from configuration
        let rate_limiter = RateLimiter::new(state.config().rate_limiting.clone());
        let webhook_limiter = state.webhook_limiter().clone();

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id)
                    } else {
                        tracing::error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(timeout_duration));

        create_routes(rate_limiter, webhook_limiter)
            .layer(middleware)
            .with_state(state)
    }

    /// Run the server with coordinated graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or `ServerError::Startup` if the server fails to start.
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        info!(
            address = %actual_addr,
            environment = %self.config.environment,
            "NFT aggregator server starting",
        );

        let cancellation_token = self.cancellation_token.clone();
        let shutdown_token = cancellation_token.clone();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(shutdown_token).await;
        });

        let server_result = axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            info!("NFT aggregator server shut down gracefully");
        })
        .await;

        if let Err(e) = server_result {
            error!(error = ?e, "Server error during shutdown");
            Err(ServerError::Shutdown { source: e })
        } else {
            Ok(())
        }
    }

    /// Handle shutdown signals and trigger coordinated cancellation
    ///
    /// This function listens for SIGINT (Ctrl+C) and SIGTERM signals,
    /// and cancels the provided cancellation token when received.
    ///
    /// # Arguments
    ///
    /// * `cancellation_token` - Token to cancel when shutdown signal is received
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        let signal_received = async {
            #[cfg(unix)]
            #[allow(clippy::expect_used)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => {
                        warn!("Received SIGTERM signal, initiating coordinated shutdown");
                        "SIGTERM"
                    },
                    _ = sigint.recv() => {
                        warn!("Received SIGINT signal, initiating coordinated shutdown");
                        "SIGINT"
                    },
                }
            }

            #[cfg(not(unix))]
            #[allow(clippy::expect_used)]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install CTRL+C signal handler");
                warn!("Received CTRL+C signal, initiating coordinated shutdown");
                "CTRL+C"
            }
        };

        // Wait for either a signal or existing cancellation
        tokio::select! {
            signal_name = signal_received => {
                warn!("Shutdown signal {} received, cancelling all operations...", signal_name);
                cancellation_token.cancel();
            },
            () = cancellation_token.cancelled() => {
                warn!("Cancellation token already cancelled, shutdown signal handler exiting");
            }
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing, returns the bound address
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(self) -> ServerResult<(SocketAddr, CancellationToken)> {
        let addr = self.config.socket_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let token = self.cancellation_token.child_token();
        let task = token.child_token();
        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                self.router
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { task.cancelled().await })
            .await;
        });

        Ok((actual_addr, token))
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state for testing
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[tokio::test]
    async fn server_creation() -> ServerResult<()> {
        let config = ServerConfig::for_testing();
        let server = Server::new(config, ShutdownConfig::default())?;
        assert_eq!(server.config().environment, Environment::Testing);
        assert!(!server.cancellation_token().is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn programmatic_shutdown() -> ServerResult<()> {
        let config = ServerConfig::for_testing();
        let server = Server::new(config, ShutdownConfig::default())?;

        assert!(!server.cancellation_token().is_cancelled());

        server.shutdown();

        assert!(server.cancellation_token().is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn keyed_providers_need_keys() -> ServerResult<()> {
        let mut config = ServerConfig::for_testing();
        config.providers.alchemy.enabled = true;
        config.providers.reservoir.enabled = true;

        let server = Server::new(config.clone(), ShutdownConfig::default())?;
        assert_eq!(
            server.state().aggregator().registry().client_names(),
            vec!["reservoir"]
        );

        config.providers.alchemy.api_key = Some("key-a, key-b".to_string());
        let server = Server::new(config, ShutdownConfig::default())?;
        assert_eq!(server.state().aggregator().registry().client_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn redis_backend_requires_url() {
        let mut config = ServerConfig::for_testing();
        config.cache.backend = CacheBackend::Redis;
        let err = tokio_test::assert_err!(Server::new(config, ShutdownConfig::default()));
        assert!(matches!(err, ServerError::Config { .. }));
    }

    #[tokio::test]
    async fn shutdown_config_default() {
        let config = ShutdownConfig::default();
        assert_eq!(
            config.graceful_timeout,
            Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.force_timeout,
            Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS)
        );
    }
}
