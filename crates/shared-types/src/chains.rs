// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Blockchain chain identifiers
//!
//! This module provides type-safe identifiers for every network the aggregator
//! can enumerate, together with the chain family that decides which providers
//! and merge policy apply.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[schema(example = "ethereum")]
pub enum Chain {
    /// Ethereum mainnet
    Ethereum,
    /// Polygon `PoS`
    Polygon,
    /// Arbitrum One
    Arbitrum,
    /// Optimism mainnet
    Optimism,
    /// Base mainnet
    Base,
    /// Solana mainnet-beta
    Solana,
}

/// Chain family, which decides the provider set and the field merge policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// Account-based EVM networks addressed by 20-byte hex contracts
    Evm,
    /// Solana, addressed by base58 collection keys and mints
    Solana,
}

impl Chain {
    /// Returns the human-readable name of the chain
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ethereum => "Ethereum",
            Self::Polygon => "Polygon",
            Self::Arbitrum => "Arbitrum",
            Self::Optimism => "Optimism",
            Self::Base => "Base",
            Self::Solana => "Solana",
        }
    }

    /// Returns the lowercase slug used in URLs and cache keys
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Polygon => "polygon",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Base => "base",
            Self::Solana => "solana",
        }
    }

    /// Returns the chain family
    pub const fn family(self) -> ChainFamily {
        match self {
            Self::Solana => ChainFamily::Solana,
            Self::Ethereum | Self::Polygon | Self::Arbitrum | Self::Optimism | Self::Base => {
                ChainFamily::Evm
            }
        }
    }

    /// Whether this chain is an EVM network
    pub const fn is_evm(self) -> bool {
        matches!(self.family(), ChainFamily::Evm)
    }

    /// Whether this chain is Solana
    pub const fn is_solana(self) -> bool {
        matches!(self.family(), ChainFamily::Solana)
    }

    /// Native currency symbol, used as the default floor price currency
    pub const fn native_currency(self) -> &'static str {
        match self.family() {
            ChainFamily::Evm => "ETH",
            ChainFamily::Solana => "SOL",
        }
    }

    /// Returns all supported chains
    pub const fn all() -> &'static [Self] {
        &[
            Self::Ethereum,
            Self::Polygon,
            Self::Arbitrum,
            Self::Optimism,
            Self::Base,
            Self::Solana,
        ]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Chain {
    type Err = ChainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Self::Ethereum),
            "polygon" | "matic" => Ok(Self::Polygon),
            "arbitrum" | "arb" => Ok(Self::Arbitrum),
            "optimism" | "op" => Ok(Self::Optimism),
            "base" => Ok(Self::Base),
            "solana" | "sol" => Ok(Self::Solana),
            _ => Err(ChainParseError::InvalidName(s.to_string())),
        }
    }
}

impl Serialize for Chain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.slug())
    }
}

impl<'de> Deserialize<'de> for Chain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChainVisitor;

        impl serde::de::Visitor<'_> for ChainVisitor {
            type Value = Chain;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a supported chain name (ethereum, polygon, arbitrum, optimism, base, solana)"
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Chain::from_str(value).map_err(|_| {
                    E::invalid_value(
                        serde::de::Unexpected::Str(value),
                        &"a supported chain name (ethereum, polygon, arbitrum, optimism, base, solana)",
                    )
                })
            }
        }

        deserializer.deserialize_str(ChainVisitor)
    }
}

/// Error type for chain parsing
#[derive(Debug, thiserror::Error)]
pub enum ChainParseError {
    /// Unknown chain name
    #[error(
        "unsupported chain: {0}. Supported chains are: ethereum, polygon, arbitrum, optimism, base, solana"
    )]
    InvalidName(String),
}
