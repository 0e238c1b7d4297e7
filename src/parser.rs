// src/parser.rs
use serde_json::Value;

use crate::ingest::to_number;
use crate::models::{DexFlags, EnrichedTransfer, LogEvent, RawTransaction, TokenTransfer, TransferEntry};

/// Raw integer units → human-readable amount (`raw / 10^decimals`).
///
/// `None` when either input is missing, decimals is not finite, or the
/// result overflows. Precision loss from f64 division is accepted.
pub fn normalize_amount(raw: Option<&Value>, decimals: Option<&Value>) -> Option<f64> {
    let raw = to_number(raw?)?;
    let decimals = to_number(decimals?).filter(|d| d.is_finite())?;
    let n = raw / 10f64.powf(decimals);
    n.is_finite().then_some(n)
}

/// Decimal count as carried on a transfer record: finite and integral, else `None`.
fn decimals_field(value: Option<&Value>) -> Option<i64> {
    let d = to_number(value?)?;
    (d.is_finite() && d.fract() == 0.0).then_some(d as i64)
}

/// DEX flags for a transaction: precomputed flags first, then a scan of
/// decoded log names when any flag is still unset.
pub fn infer_flags(tx: &RawTransaction) -> DexFlags {
    let mut flags = tx.dex_flags.unwrap_or_default();
    if flags.all_set() {
        return flags;
    }
    let Some(events) = &tx.log_events else {
        return flags;
    };
    for name in events.iter().filter_map(|ev| ev.decoded_name.as_deref()) {
        let name = name.to_lowercase();
        if name.contains("swap") {
            flags.is_swap = true;
        }
        if name.contains("mint") {
            flags.is_liquidity_add = true;
        }
        if name.contains("burn") {
            flags.is_liquidity_remove = true;
        }
        if name.contains("sync") {
            flags.saw_sync = true;
        }
    }
    flags
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Pre-enriched entry was not an object.
    MalformedEntry,
    /// No finite amount could be produced.
    NonFiniteAmount,
}

/// Per-candidate result of transfer extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Kept(TokenTransfer),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    Enriched,
    Logs,
}

/// Every candidate transfer of a transaction with its outcome.
///
/// A non-empty pre-enriched list wins outright, even when all of its
/// entries are dropped; log events are consulted only otherwise, and
/// only `Transfer` events count as candidates there.
pub fn extract_outcomes(tx: &RawTransaction) -> (ExtractionMode, Vec<Extraction>) {
    if let Some(entries) = tx.token_transfers.as_ref().filter(|list| !list.is_empty()) {
        let outcomes = entries
            .iter()
            .map(|entry| match entry {
                TransferEntry::Enriched(t) => from_enriched(t),
                TransferEntry::Malformed => Extraction::Dropped(DropReason::MalformedEntry),
            })
            .collect();
        return (ExtractionMode::Enriched, outcomes);
    }

    let outcomes = tx
        .log_events
        .iter()
        .flatten()
        .filter(|ev| ev.decoded_name.as_deref() == Some("Transfer"))
        .map(from_log_event)
        .collect();
    (ExtractionMode::Logs, outcomes)
}

/// Canonical transfers of a transaction. Never fails; bad candidates are dropped.
pub fn extract_transfers(tx: &RawTransaction) -> Vec<TokenTransfer> {
    extract_outcomes(tx)
        .1
        .into_iter()
        .filter_map(|outcome| match outcome {
            Extraction::Kept(t) => Some(t),
            Extraction::Dropped(_) => None,
        })
        .collect()
}

fn from_enriched(t: &EnrichedTransfer) -> Extraction {
    let direct = t
        .amount
        .as_ref()
        .filter(|a| a.as_str() != Some(""))
        .map(to_number);
    let amount = match direct {
        Some(parsed) => parsed,
        None => normalize_amount(t.amount_raw.as_ref(), t.decimals.as_ref()),
    };
    let Some(amount) = amount.filter(|a| a.is_finite()) else {
        return Extraction::Dropped(DropReason::NonFiniteAmount);
    };

    Extraction::Kept(TokenTransfer {
        token: t.token.clone(),
        contract: t.contract.clone(),
        decimals: decimals_field(t.decimals.as_ref()),
        from: t.from.clone(),
        to: t.to.clone(),
        amount,
    })
}

fn from_log_event(ev: &LogEvent) -> Extraction {
    let param = |name: &str| {
        ev.params
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .and_then(|p| p.value.as_ref())
    };
    let address = |name: &str| {
        param(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let decimals = ev.sender_contract_decimals.as_ref();
    let Some(amount) = normalize_amount(param("value"), decimals) else {
        return Extraction::Dropped(DropReason::NonFiniteAmount);
    };

    Extraction::Kept(TokenTransfer {
        token: ev
            .sender_contract_ticker_symbol
            .clone()
            .or_else(|| ev.sender_name.clone()),
        contract: ev.sender_address.clone(),
        decimals: decimals_field(decimals),
        from: address("from"),
        to: address("to"),
        amount,
    })
}
