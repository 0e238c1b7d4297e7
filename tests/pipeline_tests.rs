//! End-to-end checks over the transfer and classification pipeline.

use chain_sentiment::ingest::{normalize_document, to_entries};
use chain_sentiment::models::ClassificationResult;
use chain_sentiment::stats::Verdict;
use chain_sentiment::{aggregate, aggregate_values, extract_transfers, store, summarize};
use serde_json::{json, Value};

fn transfer_log(symbol: &str, contract: &str, raw: &str, decimals: u32) -> Value {
    json!({
        "sender_address": contract,
        "sender_contract_ticker_symbol": symbol,
        "sender_contract_decimals": decimals,
        "decoded": {"name": "Transfer", "params": [
            {"name": "from", "value": "0xfrom"},
            {"name": "to", "value": "0xto"},
            {"name": "value", "value": raw}
        ]}
    })
}

/// A mixed document: enriched transfers, log-derived transfers,
/// null contracts, junk entries and legacy field names.
fn fixture() -> Value {
    json!({
        "data": {
            "items": [
                {
                    "tx_hash": "0x01",
                    "timestamp": "2025-07-30T00:00:05Z",
                    "success": true,
                    "dex_flags": {"is_swap": true, "is_liquidity_add": false,
                                  "is_liquidity_remove": false, "saw_sync": true},
                    "token_transfers": [
                        {"token": "USDC", "contract": "0xA0b8", "decimals": 6, "amount": "250.5"},
                        {"token": "WHYPE", "contract": "0x5555", "decimals": 18,
                         "amount_raw": "2000000000000000000"},
                        {"token": "GHOST", "contract": null, "decimals": 18, "amount": 9}
                    ]
                },
                {
                    "hash": "0x02",
                    "block_signed_at": "2025-07-30T00:00:01Z",
                    "successful": true,
                    "log_events": [
                        transfer_log("usdc", "0xa0B8", "1000000", 6),
                        transfer_log("HYPE", "0x7777", "300", 2),
                        {"decoded": {"name": "Mint"}},
                        {"decoded": {"name": "Sync"}}
                    ]
                },
                {
                    "tx_hash": "0x03",
                    "raw": {"block_signed_at": "2025-07-30T00:00:09Z"},
                    "success": false,
                    "log_events": [
                        {"decoded": {"name": "Burn"}},
                        transfer_log("HYPE", "0x7777", "not-a-number", 2)
                    ]
                },
                null,
                7,
                "garbage"
            ]
        }
    })
}

#[test]
fn global_transfer_count_matches_extraction() {
    let doc = fixture();
    let txs = normalize_document(&doc);
    assert_eq!(txs.len(), 3);

    let expected: usize = txs.iter().map(|tx| extract_transfers(tx).len()).sum();
    let report = aggregate(&txs);
    assert_eq!(report.global.total_token_transfers, expected as u64);
    assert_eq!(report.global.total_token_transfers, 5);
    assert_eq!(report.global.total_txs, 3);
    assert_eq!(report.global.total_successful_txs, 2);
    assert_eq!(report.global.total_swaps, 1);
    assert_eq!(report.global.total_liquidity_adds, 1);
    assert_eq!(report.global.total_liquidity_removes, 1);
    assert_eq!(report.global.total_sync_events_seen, 2);

    // the null-contract transfer is counted but never joined
    assert_eq!(report.flat.len(), 4);
}

#[test]
fn per_token_counts_match_flat_rows() {
    let report = aggregate_values(to_entries(&fixture()));

    for token in &report.per_token {
        let rows = report
            .flat
            .iter()
            .filter(|r| r.contract.to_lowercase() == token.contract)
            .count() as u64;
        assert_eq!(token.transfer_count, rows, "contract {}", token.contract);
        assert_eq!(token.total_amount_in, token.total_amount_out);
    }

    let usdc = report
        .per_token
        .iter()
        .find(|t| t.contract == "0xa0b8")
        .expect("usdc aggregate");
    assert_eq!(usdc.symbol.as_deref(), Some("USDC"));
    assert_eq!(usdc.transfer_count, 2);
    assert_eq!(usdc.total_amount_in, 251.5);
    assert_eq!(usdc.first_seen.as_deref(), Some("2025-07-30T00:00:01Z"));
    assert_eq!(usdc.last_seen.as_deref(), Some("2025-07-30T00:00:05Z"));

    let symbols: Vec<_> = report.per_token.iter().map(|t| t.symbol.clone().unwrap_or_default()).collect();
    assert_eq!(symbols, vec!["HYPE", "USDC", "WHYPE"]);
}

#[test]
fn aggregation_is_idempotent_and_byte_stable() {
    let doc = fixture();
    let entries = to_entries(&doc);

    let first = aggregate_values(entries);
    let second = aggregate_values(entries);

    let a = serde_json::to_string_pretty(&first.stats()).unwrap();
    let b = serde_json::to_string_pretty(&second.stats()).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&first.flat).unwrap(),
        serde_json::to_string(&second.flat).unwrap()
    );
    assert_eq!(doc, fixture(), "input must not be mutated");
}

#[test]
fn unknown_document_shapes_aggregate_to_nothing() {
    let report = aggregate_values(to_entries(&json!({"result": [{"tx_hash": "0x1"}]})));
    assert_eq!(report.global.total_txs, 0);
    assert!(report.per_token.is_empty());
    assert!(report.flat.is_empty());
}

#[test]
fn flat_rows_feed_classification_statistics() {
    let report = aggregate_values(to_entries(&fixture()));
    let labels = ["Bullish", " bearish ", "BULLISH", "maybe"];

    let results: Vec<ClassificationResult> = report
        .flat
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (row, label))| ClassificationResult {
            index: i,
            tx_hash: row.tx_hash.clone(),
            token: None,
            input_transaction: serde_json::to_value(row).unwrap(),
            model_output: Some(json!({
                "classification": label,
                "reasoning": "fixture",
                "market_impact": "negligible"
            })),
            error: None,
        })
        .collect();

    let stats = summarize(&results);
    assert_eq!(stats.sample_size, 4);
    assert_eq!(stats.classification.counts.bullish, 2);
    assert_eq!(stats.classification.counts.bearish, 1);
    assert_eq!(stats.classification.counts.unknown, 1);
    assert_eq!(stats.final_verdict.bullish_share_pct, 66.67);
    assert_eq!(stats.final_verdict.bearish_share_pct, 33.33);
    assert_eq!(stats.final_verdict.verdict, Verdict::Bullish);

    let pct = stats.classification.percentages;
    assert!((pct.bullish + pct.bearish + pct.neutral + pct.unknown - 100.0).abs() < 0.05);
}

#[test]
fn classification_results_survive_a_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("llm_answers.json");

    let rows = vec![
        ClassificationResult {
            index: 0,
            tx_hash: Some("0x1".into()),
            token: None,
            input_transaction: json!({"token": "USDC", "amount": 10.0}),
            model_output: Some(json!({"classification": "bearish"})),
            error: None,
        },
        ClassificationResult {
            index: 1,
            tx_hash: None,
            token: None,
            input_transaction: json!({"token": "USDC", "amount": 5.0}),
            model_output: None,
            error: Some("Ollama HTTP 500".into()),
        },
    ];
    store::write_json(&path, &rows).unwrap();

    let loaded: Vec<ClassificationResult> = store::read_rows(&path)
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, v)| ClassificationResult::from_value_lossy(i, v))
        .collect();
    assert_eq!(loaded, rows);

    let stats = summarize(&loaded);
    assert_eq!(stats.final_verdict.verdict, Verdict::Bearish);
    assert_eq!(stats.token_amounts["USDC"], 15.0);
    assert_eq!(stats.amounts_by_class.unknown, 5.0);
}
