// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

use external_apis::RegistryError;
use shared_types::Chain;
use thiserror::Error;

/// Failures the aggregation service reports to its caller
///
/// Provider failures are not errors at this level: they end walks with a stop reason or
/// drop a statistics source.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// No configured adapter serves the chain
    #[error("No adapter configured for chain {chain}")]
    NoAdapter {
        /// Requested chain
        chain: Chain,
    },

    /// The request cannot be served as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<RegistryError> for AggregatorError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NoAdapter { chain } => Self::NoAdapter { chain },
        }
    }
}
