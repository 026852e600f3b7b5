// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Field extraction helpers shared by the provider normalizers
//!
//! Provider payloads are loosely typed: numbers arrive as strings, metadata arrives as
//! JSON-encoded strings and media links point at content-addressed storage. These helpers
//! turn that into the typed values the normalized schema expects.

use alloy_primitives::U256;
use api_client::Attribute;
use serde_json::Value;

/// Public gateway used for `ipfs://` and bare CID links
pub const IPFS_GATEWAY: &str = "https://cloudflare-ipfs.com/ipfs/";

/// Normalize a media link to HTTP(S)
///
/// - `http://` and `https://` links pass through
/// - `ipfs://X` and `ipfs://ipfs/X` become `{gateway}X`
/// - bare `Qm…` CIDs (optionally followed by a path) get the gateway prefix
///
/// Anything else is dropped.
pub fn http_uri(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }

    if let Some(rest) = raw.strip_prefix("ipfs://") {
        let rest = rest.trim_start_matches('/');
        let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
        return (!rest.is_empty()).then(|| format!("{IPFS_GATEWAY}{rest}"));
    }

    let first_segment = raw.split('/').next().unwrap_or_default();
    if raw.starts_with("Qm") && first_segment.len() > 40 {
        return Some(format!("{IPFS_GATEWAY}{raw}"));
    }

    None
}

/// Walk a path of object keys
pub fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Non-empty string at `path`
pub fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    at(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// First non-empty string among several paths
pub fn first_string(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| string_at(value, path))
}

/// Unsigned integer at `path`, accepting numbers and numeric strings
pub fn u64_at(value: &Value, path: &[&str]) -> Option<u64> {
    as_u64(at(value, path)?)
}

/// Float at `path`, accepting numbers and numeric strings
pub fn f64_at(value: &Value, path: &[&str]) -> Option<f64> {
    as_f64(at(value, path)?)
}

/// Lenient unsigned conversion
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let v = f as u64;
                    v
                })
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lenient float conversion
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}

/// Metadata that may arrive as an object or as a JSON-encoded string
pub fn metadata_object(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Object(_) => value.cloned(),
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .ok()
            .filter(Value::is_object),
        _ => None,
    }
}

/// Convert an attribute array into ordered trait entries
///
/// Accepts `trait_type`, `traitType`, `key` or `name` for the trait name.
pub fn attributes(value: Option<&Value>) -> Vec<Attribute> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let trait_type = first_string(
                entry,
                &[&["trait_type"], &["traitType"], &["key"], &["name"]],
            )?;
            Some(Attribute {
                trait_type,
                value: entry.get("value").cloned().unwrap_or(Value::Null),
                display_type: string_at(entry, &["display_type"]),
            })
        })
        .collect()
}

/// Token id as a decimal string; hex ids (`0x…`) are converted
pub fn decimal_token_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).ok().map(|id| id.to_string()),
        None => Some(raw.to_string()),
    }
}

/// The decimal successor of a token id, used as a synthetic start token
pub fn next_token_id(decimal: &str) -> Option<String> {
    let id = U256::from_str_radix(decimal.trim(), 10).ok()?;
    id.checked_add(U256::from(1u8)).map(|next| next.to_string())
}

/// Convert a base-unit amount (wei, lamports) into whole units
pub fn scaled(value: f64, divisor: f64) -> Option<f64> {
    (divisor > 0.0).then(|| value / divisor).filter(|v| v.is_finite())
}
