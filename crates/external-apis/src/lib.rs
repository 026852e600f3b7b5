// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! External API integrations for NFT data providers
//!
//! This crate provides the provider adapters behind the aggregation engine, the
//! transport they share and the registry that routes requests to them.
//!
//! # Architecture
//!
//! - **Page adapters**: [`alchemy`], [`moralis`], [`quicknode`] (EVM) and [`helius`] (Solana)
//! - **Statistics overlays**: [`reservoir`], [`magiceden`] and [`scrape`]
//! - **Transport**: [`transport::ProviderTransport`] - governed, paced, retrying HTTP with
//!   key rotation on rate limits
//! - **Registry**: [`registry::ApiRegistry`] - per-chain adapter routing, statistics
//!   fan-out and concurrent health checks
//! - **Cache**: [`cache::ResultCache`] - in-memory or Redis result cache

pub mod alchemy;
pub mod cache;
pub mod error;
pub mod helius;
pub mod magiceden;
pub mod moralis;
pub mod normalizer;
pub mod quicknode;
pub mod registry;
pub mod reservoir;
pub mod scrape;
pub mod transport;

pub use alchemy::AlchemyClient;
pub use cache::{CacheBackend, CacheError, ResultCache};
pub use error::ProviderError;
pub use helius::HeliusClient;
pub use magiceden::MagicEdenClient;
pub use moralis::MoralisClient;
pub use quicknode::QuickNodeClient;
pub use registry::{ApiRegistry, ChainAdapter, RegistryError, StatsFanOut};
pub use reservoir::ReservoirClient;
pub use scrape::ScrapeClient;
pub use transport::{ProviderConfig, ProviderTransport};
