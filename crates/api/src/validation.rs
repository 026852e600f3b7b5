// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Request parameter validation
//!
//! Chains are parsed from their slugs or aliases. EVM identifiers must be 20-byte hex
//! addresses; Solana identifiers may be base58 keys or marketplace symbols.

use std::sync::LazyLock;

use alloy_primitives::Address;
use external_apis::helius::is_solana_address;
use regex::Regex;
use shared_types::{Chain, ChainFamily};

use crate::error::{ServerError, ServerResult};

static SYMBOL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").ok());

/// Largest page size a caller may request
pub const MAX_PAGE_SIZE: usize = 1000;
/// Largest page budget a caller may request
pub const MAX_PAGES: usize = 10_000;

/// Parse a chain path or query segment
pub fn parse_chain(raw: &str) -> ServerResult<Chain> {
    raw.parse()
        .map_err(|e: shared_types::ChainParseError| ServerError::ValidationError(e.to_string()))
}

/// Parse a comma-separated chain list, dropping duplicates and keeping order
pub fn parse_chain_list(raw: &str) -> ServerResult<Vec<Chain>> {
    let mut chains = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let chain = parse_chain(part)?;
        if !chains.contains(&chain) {
            chains.push(chain);
        }
    }
    if chains.is_empty() {
        return Err(ServerError::ValidationError(
            "chains must name at least one chain".to_string(),
        ));
    }
    Ok(chains)
}

fn is_symbol(value: &str) -> bool {
    SYMBOL.as_ref().is_some_and(|pattern| pattern.is_match(value))
}

/// Validate and normalize a collection identifier for a chain
///
/// EVM addresses are returned lowercased.
pub fn collection_id(raw: &str, chain: Chain) -> ServerResult<String> {
    let id = raw.trim();
    match chain.family() {
        ChainFamily::Evm => id
            .parse::<Address>()
            .map(|_| id.to_lowercase())
            .map_err(|_| {
                ServerError::ValidationError(format!(
                    "invalid collection address for {chain}: {id}"
                ))
            }),
        ChainFamily::Solana if is_solana_address(id) || is_symbol(id) => Ok(id.to_string()),
        ChainFamily::Solana => Err(ServerError::ValidationError(format!(
            "invalid Solana collection key or symbol: {id}"
        ))),
    }
}

/// Which family a wallet address belongs to
pub fn wallet_family(raw: &str) -> ServerResult<ChainFamily> {
    let address = raw.trim();
    if address.parse::<Address>().is_ok() {
        Ok(ChainFamily::Evm)
    } else if is_solana_address(address) {
        Ok(ChainFamily::Solana)
    } else {
        Err(ServerError::ValidationError(format!(
            "invalid wallet address: {address}"
        )))
    }
}

/// Chains to query for a wallet: the explicit list, or every chain of the address family
pub fn wallet_chains(family: ChainFamily, requested: Option<&str>) -> ServerResult<Vec<Chain>> {
    match requested.filter(|r| !r.trim().is_empty()) {
        Some(list) => parse_chain_list(list),
        None => Ok(Chain::all()
            .iter()
            .copied()
            .filter(|chain| chain.family() == family)
            .collect()),
    }
}

/// Bound a requested page size
pub fn page_size(requested: Option<usize>) -> ServerResult<Option<usize>> {
    match requested {
        Some(0) => Err(ServerError::ValidationError(
            "page_size must be at least 1".to_string(),
        )),
        Some(size) if size > MAX_PAGE_SIZE => Err(ServerError::ValidationError(format!(
            "page_size cannot exceed {MAX_PAGE_SIZE}"
        ))),
        other => Ok(other),
    }
}

/// Bound a requested page budget
pub fn max_pages(requested: Option<usize>) -> ServerResult<Option<usize>> {
    match requested {
        Some(0) => Err(ServerError::ValidationError(
            "max_pages must be at least 1".to_string(),
        )),
        Some(pages) if pages > MAX_PAGES => Err(ServerError::ValidationError(format!(
            "max_pages cannot exceed {MAX_PAGES}"
        ))),
        other => Ok(other),
    }
}

/// Bound the webhook events limit to 1..=1000
pub fn events_limit(requested: Option<usize>) -> ServerResult<usize> {
    match requested.unwrap_or(100) {
        limit @ 1..=1000 => Ok(limit),
        _ => Err(ServerError::ValidationError(
            "limit must be between 1 and 1000".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAYC: &str = "0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D";
    const MINT: &str = "J1S9H3QjnRtBbbuD4HjPV6RpRhwuk4zKbxsnCHuTgh9w";

    #[test]
    fn chains_parse_with_aliases() {
        assert_eq!(parse_chain("eth").unwrap(), Chain::Ethereum);
        assert!(parse_chain("dogechain").is_err());
        assert_eq!(
            parse_chain_list("polygon, eth,polygon").unwrap(),
            vec![Chain::Polygon, Chain::Ethereum]
        );
        assert!(parse_chain_list(" , ").is_err());
    }

    #[test]
    fn evm_collections_are_addresses() {
        assert_eq!(
            collection_id(BAYC, Chain::Ethereum).unwrap(),
            BAYC.to_lowercase()
        );
        assert!(collection_id("boredapes", Chain::Ethereum).is_err());
        assert!(collection_id("0x123", Chain::Base).is_err());
    }

    #[test]
    fn solana_collections_accept_keys_and_symbols() {
        assert_eq!(collection_id(MINT, Chain::Solana).unwrap(), MINT);
        assert_eq!(collection_id("okay_bears", Chain::Solana).unwrap(), "okay_bears");
        assert!(collection_id("okay bears!", Chain::Solana).is_err());
    }

    #[test]
    fn wallet_defaults_to_its_family() {
        assert_eq!(wallet_family(BAYC).unwrap(), ChainFamily::Evm);
        assert_eq!(wallet_family(MINT).unwrap(), ChainFamily::Solana);
        assert!(wallet_family("nope").is_err());

        let evm = wallet_chains(ChainFamily::Evm, None).unwrap();
        assert!(evm.iter().all(|c| c.is_evm()));
        assert_eq!(evm.len(), 5);
        assert_eq!(
            wallet_chains(ChainFamily::Solana, Some("")).unwrap(),
            vec![Chain::Solana]
        );
        assert_eq!(
            wallet_chains(ChainFamily::Evm, Some("base")).unwrap(),
            vec![Chain::Base]
        );
    }

    #[test]
    fn bounds() {
        assert!(page_size(Some(0)).is_err());
        assert!(page_size(Some(1001)).is_err());
        assert_eq!(page_size(None).unwrap(), None);
        assert!(max_pages(Some(0)).is_err());
        assert_eq!(events_limit(None).unwrap(), 100);
        assert_eq!(events_limit(Some(1000)).unwrap(), 1000);
        assert!(events_limit(Some(0)).is_err());
        assert!(events_limit(Some(1001)).is_err());
    }
}
