// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Field reconciler
//!
//! Merges the partial views of several statistics sources into one record. The order in
//! which sources are applied is fixed per chain family and never depends on which response
//! arrived first:
//!
//! | Family | Base    | Marketplace | Gap-fill             |
//! |--------|---------|-------------|----------------------|
//! | EVM    | Alchemy | Reservoir   | Moralis, `QuickNode` |
//! | Solana | Helius  | Magic Eden  | Moralis              |
//!
//! The scrape overlay is applied last. Market cap and owner percentage are always derived
//! from the merged record.

use std::collections::BTreeMap;

use api_client::{CollectionStats, SourceStats, StatsFields, StatsSource};
use shared_types::Chain;
use tracing::debug;

/// How an overlay may touch fields that are already set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlay {
    /// Writes only missing fields
    GapFill,
    /// Also overwrites market fields
    Marketplace,
}

const EVM_ORDER: &[(StatsSource, Overlay)] = &[
    (StatsSource::Alchemy, Overlay::GapFill),
    (StatsSource::Reservoir, Overlay::Marketplace),
    (StatsSource::Moralis, Overlay::GapFill),
    (StatsSource::QuickNode, Overlay::GapFill),
    (StatsSource::Scrape, Overlay::GapFill),
];

const SOLANA_ORDER: &[(StatsSource, Overlay)] = &[
    (StatsSource::Helius, Overlay::GapFill),
    (StatsSource::MagicEden, Overlay::Marketplace),
    (StatsSource::Moralis, Overlay::GapFill),
    (StatsSource::Scrape, Overlay::GapFill),
];

/// Sources in application order for a chain
pub fn merge_order(chain: Chain) -> impl Iterator<Item = StatsSource> {
    order(chain).iter().map(|(source, _)| *source)
}

fn order(chain: Chain) -> &'static [(StatsSource, Overlay)] {
    if chain.is_solana() { SOLANA_ORDER } else { EVM_ORDER }
}

/// Default floor price currency for a chain
pub const fn default_currency(chain: Chain) -> &'static str {
    if chain.is_solana() { "SOL" } else { "ETH" }
}

/// Merge source views into one record
///
/// Sources missing from the map (failed, empty or not applicable) are skipped. The merge
/// never fails; a record with nothing but the collection id as its name is a valid result.
pub fn reconcile(
    collection_id: &str,
    chain: Chain,
    sources: &BTreeMap<StatsSource, SourceStats>,
) -> CollectionStats {
    let mut fields = StatsFields::default();
    let mut contributed = Vec::new();

    for &(source, overlay) in order(chain) {
        let Some(stats) = sources.get(&source).filter(|stats| !stats.is_empty()) else {
            continue;
        };
        if apply(&mut fields, &stats.fields, overlay, collection_id, chain) {
            contributed.push(source);
        }
        if let Some(claimed) = stats.reported_market_cap {
            debug!(source = %source, claimed, "ignoring upstream market cap");
        }
    }

    if fields.name.as_deref().is_none_or(|name| name == collection_id) {
        fields.name = Some(collection_id.to_string());
    }
    if fields.floor_price.is_some() && fields.floor_price_currency.is_none() {
        fields.floor_price_currency = Some(default_currency(chain).to_string());
    }

    let market_cap = match (fields.floor_price, fields.total_supply) {
        (Some(floor), Some(supply)) => Some(floor * as_f64(supply)),
        _ => None,
    };
    let owners_percentage = match (fields.total_owners, fields.total_supply) {
        (Some(owners), Some(supply)) if supply > 0 => Some(as_f64(owners) / as_f64(supply) * 100.0),
        _ => None,
    };

    debug!(
        collection = %collection_id,
        chain = %chain,
        sources = contributed.len(),
        "reconciled collection stats"
    );

    CollectionStats {
        collection_id: collection_id.to_string(),
        chain,
        fields,
        market_cap,
        owners_percentage,
        sources: contributed,
    }
}

#[allow(clippy::cast_precision_loss)]
const fn as_f64(value: u64) -> f64 {
    value as f64
}

fn text(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive_f64(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn positive_u64(value: Option<u64>) -> Option<u64> {
    value.filter(|v| *v > 0)
}

/// Write `incoming` into `slot` when the slot is empty or `overwrite` is set
fn merge<T>(slot: &mut Option<T>, incoming: Option<T>, overwrite: bool) -> bool {
    match incoming {
        Some(value) if slot.is_none() || overwrite => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

/// Apply one overlay, returning whether it wrote anything
fn apply(
    target: &mut StatsFields,
    incoming: &StatsFields,
    overlay: Overlay,
    collection_id: &str,
    chain: Chain,
) -> bool {
    let market = overlay == Overlay::Marketplace;
    let mut wrote = false;

    let name = text(incoming.name.as_ref()).filter(|name| name.as_str() != collection_id);
    wrote |= merge(&mut target.name, name.cloned(), false);
    wrote |= merge(&mut target.symbol, text(incoming.symbol.as_ref()).cloned(), false);
    wrote |= merge(&mut target.description, text(incoming.description.as_ref()).cloned(), false);
    // an unverified flag is the providers' default, not a claim
    let verifies = target.verified == Some(false) && incoming.verified == Some(true);
    wrote |= merge(&mut target.verified, incoming.verified, verifies);
    wrote |= merge(&mut target.average_price, positive_f64(incoming.average_price), false);
    wrote |= merge(&mut target.website, text(incoming.website.as_ref()).cloned(), false);
    wrote |= merge(&mut target.twitter, text(incoming.twitter.as_ref()).cloned(), false);
    wrote |= merge(&mut target.discord, text(incoming.discord.as_ref()).cloned(), false);
    wrote |= merge(&mut target.image_url, text(incoming.image_url.as_ref()).cloned(), false);
    wrote |= merge(&mut target.banner_url, text(incoming.banner_url.as_ref()).cloned(), false);

    wrote |= merge(&mut target.total_supply, positive_u64(incoming.total_supply), market);
    wrote |= merge(&mut target.total_owners, positive_u64(incoming.total_owners), market);

    // price and currency travel together
    if merge(&mut target.floor_price, positive_f64(incoming.floor_price), market) {
        wrote = true;
        target.floor_price_currency = text(incoming.floor_price_currency.as_ref())
            .cloned()
            .or_else(|| Some(default_currency(chain).to_string()));
    }

    let volume = &incoming.volume;
    wrote |= merge(&mut target.volume.day, positive_f64(volume.day), market);
    wrote |= merge(&mut target.volume.week, positive_f64(volume.week), market);
    wrote |= merge(&mut target.volume.month, positive_f64(volume.month), market);
    wrote |= merge(&mut target.volume.all_time, positive_f64(volume.all_time), market);

    let sales = &incoming.sales;
    wrote |= merge(&mut target.sales.day, positive_u64(sales.day), market);
    wrote |= merge(&mut target.sales.week, positive_u64(sales.week), market);
    wrote |= merge(&mut target.sales.month, positive_u64(sales.month), market);
    wrote |= merge(&mut target.sales.all_time, positive_u64(sales.all_time), market);

    wrote
}
