// src/ingest.rs
//! Input boundary: accepted document shapes and legacy field names are
//! resolved here, once, into `RawTransaction`.
use serde_json::Value;

use crate::models::{
    DecodedParam, DexFlags, EnrichedTransfer, LogEvent, RawTransaction, TransferEntry,
};

/// Unwrap the accepted top-level shapes into a list of entries.
///
/// Accepts a bare array, `{items: [..]}`, `{data: {items: [..]}}` and
/// `{data: [..]}`. Anything else yields an empty list.
pub fn to_entries(root: &Value) -> &[Value] {
    if let Some(arr) = root.as_array() {
        return arr;
    }
    if let Some(arr) = root.get("items").and_then(Value::as_array) {
        return arr;
    }
    if let Some(data) = root.get("data") {
        if let Some(arr) = data.get("items").and_then(Value::as_array) {
            return arr;
        }
        if let Some(arr) = data.as_array() {
            return arr;
        }
    }
    &[]
}

/// Map one external entry into the canonical transaction shape.
/// Returns `None` for non-object entries.
pub fn normalize_entry(value: &Value) -> Option<RawTransaction> {
    let obj = value.as_object()?;

    let success = obj.get("success") == Some(&Value::Bool(true))
        || obj.get("successful") == Some(&Value::Bool(true));

    let timestamp = truthy_str(value.get("timestamp"))
        .or_else(|| truthy_str(value.get("block_signed_at")))
        .or_else(|| truthy_str(value.get("raw").and_then(|r| r.get("block_signed_at"))));

    let tx_hash = truthy_str(value.get("tx_hash")).or_else(|| truthy_str(value.get("hash")));

    let token_transfers = obj
        .get("token_transfers")
        .and_then(Value::as_array)
        .map(|list| list.iter().map(transfer_entry).collect());

    let log_events = obj
        .get("log_events")
        .and_then(Value::as_array)
        .map(|list| list.iter().map(log_event).collect());

    let dex_flags = obj.get("dex_flags").filter(|f| f.is_object()).map(|f| DexFlags {
        is_swap: is_truthy(f.get("is_swap")),
        is_liquidity_add: is_truthy(f.get("is_liquidity_add")),
        is_liquidity_remove: is_truthy(f.get("is_liquidity_remove")),
        saw_sync: is_truthy(f.get("saw_sync")),
    });

    Some(RawTransaction {
        success,
        timestamp,
        tx_hash,
        token_transfers,
        log_events,
        dex_flags,
    })
}

/// Normalize a whole document. Non-object entries are dropped.
pub fn normalize_document(root: &Value) -> Vec<RawTransaction> {
    to_entries(root).iter().filter_map(normalize_entry).collect()
}

fn transfer_entry(value: &Value) -> TransferEntry {
    if !value.is_object() {
        return TransferEntry::Malformed;
    }
    TransferEntry::Enriched(EnrichedTransfer {
        token: string_field(value.get("token")),
        contract: string_field(value.get("contract")),
        decimals: present(value.get("decimals")),
        from: string_field(value.get("from")),
        to: string_field(value.get("to")),
        amount: present(value.get("amount")),
        amount_raw: present(value.get("amount_raw")),
    })
}

fn log_event(value: &Value) -> LogEvent {
    let decoded = value.get("decoded");
    let params = decoded
        .and_then(|d| d.get("params"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|p| p.is_object())
                .map(|p| DecodedParam {
                    name: string_field(p.get("name")),
                    value: present(p.get("value")),
                })
                .collect()
        })
        .unwrap_or_default();

    LogEvent {
        decoded_name: string_field(decoded.and_then(|d| d.get("name"))),
        params,
        sender_address: string_field(value.get("sender_address")),
        sender_name: string_field(value.get("sender_name")),
        sender_contract_ticker_symbol: string_field(value.get("sender_contract_ticker_symbol")),
        sender_contract_decimals: present(value.get("sender_contract_decimals")),
    }
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn truthy_str(value: Option<&Value>) -> Option<String> {
    string_field(value).filter(|s| !s.is_empty())
}

/// Loose truthiness over JSON values: null, false, 0, NaN and "" are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Numeric coercion for loosely typed amount fields.
///
/// Numbers pass through, strings are trimmed and parsed (an empty string
/// is zero, `0x` prefixes are read as hex), booleans are 0/1. Anything
/// else, or an unparseable string, yields `None`.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_numeric(s.trim()),
        _ => None,
    }
}

fn parse_numeric(s: &str) -> Option<f64> {
    if s.is_empty() {
        return Some(0.0);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u128::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    // Rust accepts "inf"/"nan" spellings; treat only plain numerals as numbers.
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return match s {
            "Infinity" | "+Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        };
    }
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_every_accepted_shape() {
        let tx = json!({"tx_hash": "0x1"});
        assert_eq!(to_entries(&json!([tx.clone()])).len(), 1);
        assert_eq!(to_entries(&json!({"items": [tx.clone(), tx.clone()]})).len(), 2);
        assert_eq!(to_entries(&json!({"data": {"items": [tx.clone()]}})).len(), 1);
        assert_eq!(to_entries(&json!({"data": [tx.clone()]})).len(), 1);
    }

    #[test]
    fn unknown_shapes_yield_nothing() {
        assert!(to_entries(&json!({"transactions": []})).is_empty());
        assert!(to_entries(&json!("hello")).is_empty());
        assert!(to_entries(&json!({"data": {"rows": [1]}})).is_empty());
        assert!(to_entries(&Value::Null).is_empty());
    }

    #[test]
    fn resolves_legacy_field_names() {
        let tx = normalize_entry(&json!({
            "successful": true,
            "hash": "0xabc",
            "raw": {"block_signed_at": "2025-07-30T00:00:01Z"}
        }))
        .unwrap();
        assert!(tx.success);
        assert_eq!(tx.tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(tx.timestamp.as_deref(), Some("2025-07-30T00:00:01Z"));

        let tx = normalize_entry(&json!({
            "timestamp": "2025-07-30T00:00:02Z",
            "block_signed_at": "2025-07-30T00:00:03Z",
            "tx_hash": "0xdef",
            "hash": "0x999",
        }))
        .unwrap();
        assert_eq!(tx.timestamp.as_deref(), Some("2025-07-30T00:00:02Z"));
        assert_eq!(tx.tx_hash.as_deref(), Some("0xdef"));
    }

    #[test]
    fn success_requires_literal_true() {
        assert!(!normalize_entry(&json!({"success": "true"})).unwrap().success);
        assert!(!normalize_entry(&json!({"success": 1})).unwrap().success);
        assert!(!normalize_entry(&json!({})).unwrap().success);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(normalize_entry(&json!(42)).is_none());
        assert!(normalize_entry(&Value::Null).is_none());
        assert!(normalize_entry(&json!(["tx"])).is_none());
    }

    #[test]
    fn precomputed_flags_use_truthiness() {
        let tx = normalize_entry(&json!({
            "dex_flags": {"is_swap": 1, "is_liquidity_add": "", "saw_sync": "yes"}
        }))
        .unwrap();
        assert_eq!(
            tx.dex_flags,
            Some(DexFlags {
                is_swap: true,
                is_liquidity_add: false,
                is_liquidity_remove: false,
                saw_sync: true,
            })
        );
    }

    #[test]
    fn number_coercion() {
        assert_eq!(to_number(&json!("1000000")), Some(1_000_000.0));
        assert_eq!(to_number(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(to_number(&json!("")), Some(0.0));
        assert_eq!(to_number(&json!("0x10")), Some(16.0));
        assert_eq!(to_number(&json!("1e3")), Some(1000.0));
        assert_eq!(to_number(&json!("abc")), None);
        assert_eq!(to_number(&json!("nan")), None);
        assert_eq!(to_number(&json!({"v": 1})), None);
    }
}
