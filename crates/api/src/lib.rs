// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! NFT Aggregator Server Implementation
//!
//! This crate provides the HTTP server for the NFT aggregation service, built with Axum
//! on top of the [`aggregator`] engine and the provider clients in [`external_apis`].
//!
//! # Module Structure
//!
//! - [`config`]: Server, provider, engine and cache configuration with hierarchical loading
//! - [`error`]: Error types and HTTP response handling with proper status codes
//! - [`state`]: Shared application state management with cancellation token support
//! - [`server`]: Server lifecycle, dependency wiring and coordinated shutdown
//! - [`routes`]: Route configuration and HTTP request handlers
//! - [`middleware`]: Per-IP sliding-window rate limiting
//! - [`validation`]: Chain, identifier and paging parameter checks
//! - [`events`]: Bounded log of received provider webhooks
//! - [`extractors`]: JSON body and query extractors with descriptive rejections
//! - [`metrics`]: Prometheus series and the `/metrics` endpoint
//! - [`openapi`]: `OpenAPI` specification and Swagger UI endpoints for API documentation
//!
//! # Key Features
//!
//! - **Cursor Walks**: Collection listings walk provider pages to the end or to a budget,
//!   returning a resumable cursor and a confidence-tagged total when cut short
//! - **Field Reconciliation**: Collection statistics merged from every applicable source
//!   in a fixed priority order
//! - **Graceful Shutdown**: Coordinated termination using `CancellationToken` with timeouts
//! - **Rate Limiting**: IP-based request limiting for queries and webhook delivery
//! - **Health Monitoring**: Aggregated health checks across all configured providers

pub mod config;
pub mod error;
pub mod events;
pub mod extractors;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;
pub mod validation;

pub use config::{Environment, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use events::{EventLog, WebhookEvent, WebhookProvider};
pub use server::{Server, ShutdownConfig};
pub use state::{HealthCheck, ServerState};
