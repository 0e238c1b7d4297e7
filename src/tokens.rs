// src/tokens.rs
use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{RawTransaction, TransferEntry};

/// A contract to price, with the first metadata seen for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingToken {
    pub contract: String,
    pub symbol: Option<String>,
    pub decimals: Option<i64>,
}

/// Distinct contracts across pre-enriched transfers, sorted by contract.
/// Missing symbol/decimals are filled from later entries.
pub fn list_tokens(transactions: &[RawTransaction]) -> Vec<PricingToken> {
    let mut by_contract: BTreeMap<String, PricingToken> = BTreeMap::new();

    let enriched = transactions
        .iter()
        .filter_map(|tx| tx.token_transfers.as_ref())
        .flatten()
        .filter_map(|entry| match entry {
            TransferEntry::Enriched(t) => Some(t),
            TransferEntry::Malformed => None,
        });

    for t in enriched {
        let Some(contract) = t.contract.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let contract = contract.to_lowercase();
        let decimals = t
            .decimals
            .as_ref()
            .and_then(crate::ingest::to_number)
            .filter(|d| d.is_finite() && d.fract() == 0.0)
            .map(|d| d as i64);

        let cur = by_contract.entry(contract.clone()).or_insert_with(|| PricingToken {
            contract,
            symbol: None,
            decimals: None,
        });
        if cur.symbol.as_deref().map_or(true, str::is_empty) {
            if let Some(symbol) = t.token.as_ref().filter(|s| !s.is_empty()) {
                cur.symbol = Some(symbol.clone());
            }
        }
        if cur.decimals.is_none() {
            cur.decimals = decimals;
        }
    }

    by_contract.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize_document;
    use serde_json::json;

    #[test]
    fn dedups_by_lowercased_contract() {
        let txs = normalize_document(&json!([
            {"token_transfers": [
                {"contract": "0xBBB", "decimals": "6"},
                {"contract": "0xaaa", "token": "AAA"}
            ]},
            {"token_transfers": [
                {"contract": "0xbbb", "token": "BBB", "decimals": 8},
                {"contract": "0xAAA", "token": "OTHER", "decimals": 18},
                {"token": "NOCONTRACT"}
            ]}
        ]));
        let tokens = list_tokens(&txs);
        assert_eq!(
            tokens,
            vec![
                PricingToken {
                    contract: "0xaaa".into(),
                    symbol: Some("AAA".into()),
                    decimals: Some(18),
                },
                PricingToken {
                    contract: "0xbbb".into(),
                    symbol: Some("BBB".into()),
                    decimals: Some(6),
                },
            ]
        );
    }
}
