// src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical view of one transaction, built once at the input boundary
/// by `ingest::normalize_entry`. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct RawTransaction {
    pub success: bool,
    pub timestamp: Option<String>,
    pub tx_hash: Option<String>,
    /// `None` when the field is absent or not a list.
    pub token_transfers: Option<Vec<TransferEntry>>,
    pub log_events: Option<Vec<LogEvent>>,
    pub dex_flags: Option<DexFlags>,
}

/// An entry of a pre-enriched `token_transfers` list.
#[derive(Debug, Clone)]
pub enum TransferEntry {
    Enriched(EnrichedTransfer),
    /// Anything that is not a JSON object.
    Malformed,
}

/// Loosely typed transfer as produced by an enrichment pass. Amount and
/// decimals may arrive as numbers or strings, so they stay raw here.
#[derive(Debug, Clone, Default)]
pub struct EnrichedTransfer {
    pub token: Option<String>,
    pub contract: Option<String>,
    pub decimals: Option<Value>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<Value>,
    pub amount_raw: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    /// `decoded.name`, only when it is a string.
    pub decoded_name: Option<String>,
    pub params: Vec<DecodedParam>,
    pub sender_address: Option<String>,
    pub sender_name: Option<String>,
    pub sender_contract_ticker_symbol: Option<String>,
    pub sender_contract_decimals: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct DecodedParam {
    pub name: Option<String>,
    pub value: Option<Value>,
}

/// DEX event indicators. Independent, not mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DexFlags {
    pub is_swap: bool,
    pub is_liquidity_add: bool,
    pub is_liquidity_remove: bool,
    pub saw_sync: bool,
}

impl DexFlags {
    pub fn all_set(&self) -> bool {
        self.is_swap && self.is_liquidity_add && self.is_liquidity_remove && self.saw_sync
    }
}

/// A single token movement with a finite, human-readable amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenTransfer {
    pub token: Option<String>,
    pub contract: Option<String>,
    pub decimals: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_txs: u64,
    pub total_successful_txs: u64,
    pub total_token_transfers: u64,
    pub total_swaps: u64,
    pub total_liquidity_adds: u64,
    pub total_liquidity_removes: u64,
    pub total_sync_events_seen: u64,
}

/// Per-contract summary. `contract` is always lower-cased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerTokenAggregate {
    pub contract: String,
    pub symbol: Option<String>,
    pub decimals: Option<i64>,
    pub transfer_count: u64,
    // No wallet attribution yet: both totals sum every observed amount.
    pub total_amount_in: f64,
    pub total_amount_out: f64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

/// One row per attributable transfer, joined with its transaction context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTransferRecord {
    pub tx_hash: Option<String>,
    pub timestamp: Option<String>,
    pub token: Option<String>,
    pub contract: String,
    pub decimals: Option<i64>,
    pub amount: f64,
    pub from: Option<String>,
    pub to: Option<String>,
    pub is_swap: bool,
    pub is_liquidity_add: bool,
    pub is_liquidity_remove: bool,
    pub saw_sync: bool,
    pub success: bool,
}

/// The `transfer_stats.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferStats {
    pub global: GlobalStats,
    pub per_token: Vec<PerTokenAggregate>,
}

/// Output of one LLM pass over a flat transfer row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Row-level symbol some producers write next to `input_transaction`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub input_transaction: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationResult {
    /// Lenient decode, field by field. A mistyped field falls back on its
    /// own; `input_transaction` and `model_output` survive regardless.
    pub fn from_value_lossy(index: usize, value: &Value) -> Self {
        let text = |key: &str| match value.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        let model_output = value
            .get("model_output")
            .filter(|v| !v.is_null())
            .cloned();

        Self {
            index: value
                .get("index")
                .and_then(Value::as_u64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or(index),
            tx_hash: text("tx_hash"),
            token: value.get("token").and_then(Value::as_str).map(str::to_string),
            input_transaction: value.get("input_transaction").cloned().unwrap_or(Value::Null),
            model_output,
            error: text("error"),
        }
    }

    /// Raw `model_output.classification` string, if any.
    pub fn classification(&self) -> Option<&str> {
        self.model_output
            .as_ref()
            .and_then(|o| o.get("classification"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lossy_decode_keeps_good_fields_next_to_bad_ones() {
        let row = json!({
            "index": "0",
            "tx_hash": 42,
            "input_transaction": {"token": "USDC", "amount": 12.5},
            "model_output": {"classification": "bullish"},
            "error": {"code": 500}
        });
        let decoded = ClassificationResult::from_value_lossy(7, &row);
        assert_eq!(decoded.index, 7);
        assert_eq!(decoded.tx_hash.as_deref(), Some("42"));
        assert_eq!(decoded.classification(), Some("bullish"));
        assert_eq!(decoded.input_transaction["token"], "USDC");
        assert_eq!(decoded.error.as_deref(), Some(r#"{"code":500}"#));
    }

    #[test]
    fn lossy_decode_of_a_non_object_is_an_empty_row() {
        let decoded = ClassificationResult::from_value_lossy(3, &json!("junk"));
        assert_eq!(
            decoded,
            ClassificationResult {
                index: 3,
                ..Default::default()
            }
        );
    }
}
