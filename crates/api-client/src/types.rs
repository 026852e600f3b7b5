// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Normalized NFT data model shared by providers, the walker and the reconciler

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use shared_types::Chain;
use utoipa::ToSchema;

/// Opaque provider continuation token
///
/// Only its presence is meaningful outside the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    /// Wrap a provider token, `None` for empty strings
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Raw token as sent back to the provider
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Untouched item payload as returned by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(pub serde_json::Value);

impl RawItem {
    /// Field lookup on the payload
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Borrow the payload
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for RawItem {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One page request for a collection enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Contract address or Solana collection key
    pub collection_id: String,
    /// Chain to query
    pub chain: Chain,
    /// Continuation token, `None` for the first page
    pub cursor: Option<PageCursor>,
    /// Requested page size, already clamped to the provider ceiling
    pub page_size: usize,
}

/// One page request for a wallet's holdings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerPageRequest {
    /// Wallet address
    pub owner: String,
    /// Chain to query
    pub chain: Chain,
    /// Continuation token, `None` for the first page
    pub cursor: Option<PageCursor>,
    /// Requested page size
    pub page_size: usize,
}

/// One page of raw provider items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Raw items in provider order
    pub items: Vec<RawItem>,
    /// Continuation token, if the provider returned one
    pub next_cursor: Option<PageCursor>,
    /// Total the provider claims for the collection, if any
    pub reported_total: Option<u64>,
}

impl Page {
    /// A page with no items, used for "not found" responses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of raw items on the page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single trait entry of an NFT
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attribute {
    /// Trait name
    pub trait_type: String,
    /// Trait value, kept as provided (string, number or bool)
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    /// Optional rendering hint such as `number` or `date`
    pub display_type: Option<String>,
}

/// One NFT in the chain-agnostic schema
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NormalizedItem {
    /// Token id, decimal string on EVM, mint or asset id on Solana
    pub token_id: String,
    /// Contract address or collection group key
    pub collection_id: String,
    /// Chain the item lives on
    pub chain: Chain,
    /// Display name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Image URL, always HTTP(S)
    pub image_url: Option<String>,
    /// Animation URL, always HTTP(S)
    pub animation_url: Option<String>,
    /// External URL
    pub external_url: Option<String>,
    /// Current owner, when known
    pub owner_id: Option<String>,
    /// Ordered trait list
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Collection name as reported alongside the item
    pub collection_name: Option<String>,
    /// `ERC721`, `ERC1155` or a Solana interface name
    pub token_standard: Option<String>,
    /// Provider payload passed through untouched
    #[schema(value_type = Object)]
    pub raw_source_payload: Option<serde_json::Value>,
}

impl NormalizedItem {
    /// A bare item with identity only
    pub fn new(token_id: impl Into<String>, collection_id: impl Into<String>, chain: Chain) -> Self {
        Self {
            token_id: token_id.into(),
            collection_id: collection_id.into(),
            chain,
            name: None,
            description: None,
            image_url: None,
            animation_url: None,
            external_url: None,
            owner_id: None,
            attributes: Vec::new(),
            collection_name: None,
            token_standard: None,
            raw_source_payload: None,
        }
    }

    /// The deduplication key within one walk
    pub fn identity(&self) -> (String, String) {
        (self.token_id.clone(), self.collection_id.clone())
    }
}

/// Data sources for collection statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    /// Alchemy NFT API
    Alchemy,
    /// Helius DAS API
    Helius,
    /// Reservoir marketplace aggregator
    Reservoir,
    /// Magic Eden marketplace
    MagicEden,
    /// Moralis Web3 API
    Moralis,
    /// QuickNode
    QuickNode,
    /// `OpenGraph` tags of a collection web page
    Scrape,
}

impl StatsSource {
    /// Stable lowercase name used in logs and metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alchemy => "alchemy",
            Self::Helius => "helius",
            Self::Reservoir => "reservoir",
            Self::MagicEden => "magic_eden",
            Self::Moralis => "moralis",
            Self::QuickNode => "quicknode",
            Self::Scrape => "scrape",
        }
    }
}

impl fmt::Display for StatsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traded volume over the standard windows
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VolumeWindows {
    /// Last 24 hours
    pub day: Option<f64>,
    /// Last 7 days
    pub week: Option<f64>,
    /// Last 30 days
    pub month: Option<f64>,
    /// All time
    pub all_time: Option<f64>,
}

/// Sale counts over the standard windows
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SalesWindows {
    /// Last 24 hours
    pub day: Option<u64>,
    /// Last 7 days
    pub week: Option<u64>,
    /// Last 30 days
    pub month: Option<u64>,
    /// All time
    pub all_time: Option<u64>,
}

/// Collection fields a source can contribute
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatsFields {
    /// Collection name
    pub name: Option<String>,
    /// Ticker symbol
    pub symbol: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Whether a marketplace verified the collection
    pub verified: Option<bool>,
    /// Number of tokens in the collection
    pub total_supply: Option<u64>,
    /// Number of distinct holders
    pub total_owners: Option<u64>,
    /// Lowest listing price
    pub floor_price: Option<f64>,
    /// Currency of the floor price
    pub floor_price_currency: Option<String>,
    /// Average sale price
    pub average_price: Option<f64>,
    /// Traded volume
    #[serde(default)]
    pub volume: VolumeWindows,
    /// Sale counts
    #[serde(default)]
    pub sales: SalesWindows,
    /// Project website
    pub website: Option<String>,
    /// Twitter handle or URL
    pub twitter: Option<String>,
    /// Discord invite
    pub discord: Option<String>,
    /// Collection image
    pub image_url: Option<String>,
    /// Collection banner
    pub banner_url: Option<String>,
}

/// One source's partial view of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Which source produced this view
    pub source: StatsSource,
    /// Fields the source reported
    pub fields: StatsFields,
    /// Market cap as claimed upstream; never copied into the merged record
    pub reported_market_cap: Option<f64>,
}

impl SourceStats {
    /// Empty view for a source
    pub fn new(source: StatsSource) -> Self {
        Self {
            source,
            fields: StatsFields::default(),
            reported_market_cap: None,
        }
    }

    /// Whether the source contributed nothing usable
    pub fn is_empty(&self) -> bool {
        self.fields == StatsFields::default()
    }
}

/// Reconciled statistics for one collection on one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CollectionStats {
    /// Contract address or collection key
    pub collection_id: String,
    /// Chain
    pub chain: Chain,
    /// Merged fields
    #[serde(flatten)]
    pub fields: StatsFields,
    /// `floor_price * total_supply`
    pub market_cap: Option<f64>,
    /// `total_owners / total_supply * 100`
    pub owners_percentage: Option<f64>,
    /// Sources that contributed a non-empty payload
    pub sources: Vec<StatsSource>,
}

/// A statistics request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRequest {
    /// Contract address, collection key or marketplace symbol
    pub collection_id: String,
    /// Chain
    pub chain: Chain,
    /// Explicit marketplace symbol, if the caller knows it
    pub marketplace_symbol: Option<String>,
    /// Collection web page for the scrape overlay
    pub source_url: Option<String>,
}

impl StatsRequest {
    /// A request with no marketplace hints
    pub fn new(collection_id: impl Into<String>, chain: Chain) -> Self {
        Self {
            collection_id: collection_id.into(),
            chain,
            marketplace_symbol: None,
            source_url: None,
        }
    }

    /// The symbol to query Magic Eden with
    ///
    /// Explicit symbols win. Otherwise the collection id is used when it does not look
    /// like an on-chain address: shorter than 32 characters, or containing characters
    /// outside `[A-Za-z0-9_-]`.
    pub fn marketplace_symbol(&self) -> Option<String> {
        if let Some(symbol) = self.marketplace_symbol.as_deref().map(str::trim)
            && !symbol.is_empty()
        {
            return Some(symbol.to_string());
        }

        let id = self.collection_id.as_str();
        let address_like = id.len() >= 32
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        (!address_like && !id.is_empty()).then(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_rejects_blank_tokens() {
        assert!(PageCursor::new("").is_none());
        assert!(PageCursor::new("   ").is_none());
        assert_eq!(PageCursor::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn marketplace_symbol_derivation() {
        let short = StatsRequest::new("degods", Chain::Solana);
        assert_eq!(short.marketplace_symbol().as_deref(), Some("degods"));

        let address = StatsRequest::new("J1S9H3QjnRtBbbuD4HjPV6RpRhwuk4zKbxsnCHuTgh9w", Chain::Solana);
        assert_eq!(address.marketplace_symbol(), None);

        let odd = StatsRequest::new("okay bears collection with a long name", Chain::Solana);
        assert!(odd.marketplace_symbol().is_some());

        let explicit = StatsRequest {
            marketplace_symbol: Some("okay_bears".to_string()),
            ..address
        };
        assert_eq!(explicit.marketplace_symbol().as_deref(), Some("okay_bears"));
    }

    #[test]
    fn normalized_item_skips_empty_fields() {
        let item = NormalizedItem::new("1", "0xabc", Chain::Ethereum);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["token_id"], "1");
        assert_eq!(json["chain"], "ethereum");
        assert!(json.get("name").is_none());
        assert_eq!(item.identity(), ("1".to_string(), "0xabc".to_string()));
    }

    #[test]
    fn source_stats_emptiness() {
        let mut stats = SourceStats::new(StatsSource::Reservoir);
        assert!(stats.is_empty());
        stats.reported_market_cap = Some(10.0);
        assert!(stats.is_empty());
        stats.fields.floor_price = Some(1.2);
        assert!(!stats.is_empty());
    }
}
