// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server state management module
//!
//! This module provides shared application state for the aggregator server: the
//! aggregation service, the webhook intake components and coordinated cancellation.

use std::collections::HashMap;

use aggregator::Aggregator;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::{
    config::{Environment, RateLimitingConfig, ServerConfig},
    error::ServerResult,
    events::EventLog,
    middleware::RateLimiter,
};

/// Shared application state with cancellation token support
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Server configuration
    config: ServerConfig,
    /// Collection, statistics and wallet service
    aggregator: Aggregator,
    /// Received webhooks
    events: EventLog,
    /// Per-IP limiter for webhook deliveries
    webhook_limiter: RateLimiter,
    /// Cancellation token for coordinated shutdown
    pub cancellation_token: CancellationToken,
}

impl ServerState {
    /// Create new server state
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `aggregator` - Aggregation service over the configured providers
    /// * `cancellation_token` - Token for coordinated cancellation; in-flight walks stop
    ///   with a resumable cursor when it fires
    pub fn new(
        config: ServerConfig,
        aggregator: Aggregator,
        cancellation_token: CancellationToken,
    ) -> Self {
        let events = EventLog::new(config.webhooks.max_events);
        let webhook_limiter = RateLimiter::new(RateLimitingConfig {
            enabled: true,
            requests_per_minute: config.webhooks.requests_per_minute,
        })
        .named("webhooks");
        Self {
            config,
            aggregator,
            events,
            webhook_limiter,
            cancellation_token,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The aggregation service
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Webhook event log
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Webhook rate limiter
    pub fn webhook_limiter(&self) -> &RateLimiter {
        &self.webhook_limiter
    }

    /// Perform health check operations
    pub async fn health_check(&self) -> ServerResult<HealthCheck> {
        let external_api_clients = self.aggregator.registry().get_overall_health().await;

        let api_clients: HashMap<_, _> = external_api_clients
            .into_iter()
            .map(|(name, status)| (name, Self::convert_health_status(status)))
            .collect();

        let status = if api_clients.is_empty() {
            HealthStatus::Degraded {
                reason: Box::from("no provider configured"),
            }
        } else if api_clients.values().all(|s| matches!(s, HealthStatus::Down { .. })) {
            HealthStatus::Down {
                reason: Box::from("every provider is down"),
            }
        } else if api_clients.values().any(|s| !matches!(s, HealthStatus::Up)) {
            HealthStatus::Degraded {
                reason: Box::from("some providers are unavailable"),
            }
        } else {
            HealthStatus::Up
        };

        Ok(HealthCheck {
            status,
            version: Box::from(env!("CARGO_PKG_VERSION")),
            environment: self.config.environment,
            timestamp: chrono::Utc::now().to_rfc3339(),
            cache_backend: self.aggregator.cache().backend().to_string(),
            webhook_events: self.events.len(),
            api_clients,
        })
    }

    /// Convert external API health status to internal health status
    fn convert_health_status(external_status: api_client::HealthStatus) -> HealthStatus {
        match external_status {
            api_client::HealthStatus::Up => HealthStatus::Up,
            api_client::HealthStatus::Degraded { reason } => HealthStatus::Degraded {
                reason: reason.into_boxed_str(),
            },
            api_client::HealthStatus::Down { reason } => HealthStatus::Down {
                reason: reason.into_boxed_str(),
            },
        }
    }
}

/// Health status of a service or dependency
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum HealthStatus {
    /// Service is fully operational and responding normally
    Up,

    /// Service is not operational or has critical failures
    Down {
        /// Human-readable explanation of why the service is down
        #[schema(value_type = String)]
        reason: Box<str>,
    },

    /// Service is operational but experiencing performance issues or partial failures
    Degraded {
        /// Human-readable explanation of the degradation condition
        #[schema(value_type = String)]
        reason: Box<str>,
    },
}

/// Health check status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthCheck {
    /// Service status
    pub status: HealthStatus,
    /// Service version
    #[schema(value_type = String)]
    pub version: Box<str>,
    /// Environment
    pub environment: Environment,
    /// Timestamp
    pub timestamp: String,
    /// Result cache backend in use
    pub cache_backend: String,
    /// Webhook events currently retained
    pub webhook_events: usize,
    /// Status of individual API clients
    #[schema(value_type = Object)]
    pub api_clients: HashMap<String, HealthStatus>,
}
