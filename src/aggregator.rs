// src/aggregator.rs
use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::ingest::normalize_entry;
use crate::models::{
    DexFlags, FlatTransferRecord, GlobalStats, PerTokenAggregate, RawTransaction, TokenTransfer,
    TransferStats,
};
use crate::parser::{extract_outcomes, infer_flags, Extraction};

/// Everything one aggregation run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    pub global: GlobalStats,
    pub per_token: Vec<PerTokenAggregate>,
    pub flat: Vec<FlatTransferRecord>,
}

impl AggregateReport {
    /// The `transfer_stats.json` document.
    pub fn stats(&self) -> TransferStats {
        TransferStats {
            global: self.global.clone(),
            per_token: self.per_token.clone(),
        }
    }
}

/// Fold state for one run. Owned exclusively by the caller; partitions of
/// a larger input can be folded separately and combined with `merge`.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    global: GlobalStats,
    per_token: HashMap<String, PerTokenAggregate>,
    flat: Vec<FlatTransferRecord>,
    dropped: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transaction(&mut self, tx: &RawTransaction) {
        self.global.total_txs += 1;
        if tx.success {
            self.global.total_successful_txs += 1;
        }

        let flags = infer_flags(tx);
        self.global.total_swaps += u64::from(flags.is_swap);
        self.global.total_liquidity_adds += u64::from(flags.is_liquidity_add);
        self.global.total_liquidity_removes += u64::from(flags.is_liquidity_remove);
        self.global.total_sync_events_seen += u64::from(flags.saw_sync);

        let (mode, outcomes) = extract_outcomes(tx);
        let mut transfers = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Extraction::Kept(t) => transfers.push(t),
                Extraction::Dropped(reason) => {
                    debug!(tx = ?tx.tx_hash, ?mode, ?reason, "dropped transfer");
                    self.dropped += 1;
                }
            }
        }
        self.global.total_token_transfers += transfers.len() as u64;

        for transfer in &transfers {
            self.add_transfer(tx, flags, transfer);
        }
    }

    fn add_transfer(&mut self, tx: &RawTransaction, flags: DexFlags, t: &TokenTransfer) {
        // Unattributable transfers count toward the global total only.
        let Some(contract) = t.contract.as_deref().filter(|c| !c.is_empty()) else {
            return;
        };
        let contract = contract.to_lowercase();
        let ts = tx.timestamp.as_deref();

        let entry = self
            .per_token
            .entry(contract.clone())
            .or_insert_with(|| PerTokenAggregate {
                contract: contract.clone(),
                symbol: t.token.clone(),
                decimals: t.decimals,
                transfer_count: 0,
                total_amount_in: 0.0,
                total_amount_out: 0.0,
                first_seen: ts.map(str::to_string),
                last_seen: ts.map(str::to_string),
            });

        fill_symbol(&mut entry.symbol, t.token.as_deref());
        if entry.decimals.is_none() {
            entry.decimals = t.decimals;
        }

        entry.transfer_count += 1;
        entry.total_amount_in += t.amount;
        entry.total_amount_out += t.amount;

        if let Some(ts) = ts {
            if entry.first_seen.as_deref().map_or(true, |first| ts < first) {
                entry.first_seen = Some(ts.to_string());
            }
            if entry.last_seen.as_deref().map_or(true, |last| ts > last) {
                entry.last_seen = Some(ts.to_string());
            }
        }

        self.flat.push(FlatTransferRecord {
            tx_hash: tx.tx_hash.clone(),
            timestamp: tx.timestamp.clone(),
            token: entry.symbol.clone(),
            contract: entry.contract.clone(),
            decimals: entry.decimals,
            amount: t.amount,
            from: t.from.clone().filter(|s| !s.is_empty()),
            to: t.to.clone().filter(|s| !s.is_empty()),
            is_swap: flags.is_swap,
            is_liquidity_add: flags.is_liquidity_add,
            is_liquidity_remove: flags.is_liquidity_remove,
            saw_sync: flags.saw_sync,
            success: tx.success,
        });
    }

    /// Combine two partial folds. Counters add, timestamps take min/max,
    /// symbol and decimals keep the left side's value when it has one.
    /// Flat rows are concatenated left then right.
    pub fn merge(mut self, other: Accumulator) -> Accumulator {
        let g = &mut self.global;
        g.total_txs += other.global.total_txs;
        g.total_successful_txs += other.global.total_successful_txs;
        g.total_token_transfers += other.global.total_token_transfers;
        g.total_swaps += other.global.total_swaps;
        g.total_liquidity_adds += other.global.total_liquidity_adds;
        g.total_liquidity_removes += other.global.total_liquidity_removes;
        g.total_sync_events_seen += other.global.total_sync_events_seen;

        for (contract, theirs) in other.per_token {
            match self.per_token.get_mut(&contract) {
                None => {
                    self.per_token.insert(contract, theirs);
                }
                Some(ours) => {
                    fill_symbol(&mut ours.symbol, theirs.symbol.as_deref());
                    ours.decimals = ours.decimals.or(theirs.decimals);
                    ours.transfer_count += theirs.transfer_count;
                    ours.total_amount_in += theirs.total_amount_in;
                    ours.total_amount_out += theirs.total_amount_out;
                    ours.first_seen = min_ts(ours.first_seen.take(), theirs.first_seen);
                    ours.last_seen = max_ts(ours.last_seen.take(), theirs.last_seen);
                }
            }
        }

        self.flat.extend(other.flat);
        self.dropped += other.dropped;
        self
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn finish(self) -> AggregateReport {
        let mut per_token: Vec<PerTokenAggregate> = self.per_token.into_values().collect();
        // Contract keys are unique, so this fixes a deterministic starting order
        // before the mixed symbol/contract ordering is applied.
        per_token.sort_by(|a, b| a.contract.cmp(&b.contract));
        let per_token = merge_sort(per_token, compare_tokens);
        AggregateReport {
            global: self.global,
            per_token,
            flat: self.flat,
        }
    }
}

/// An empty symbol counts as unset.
fn fill_symbol(current: &mut Option<String>, candidate: Option<&str>) {
    let unset = current.as_deref().map_or(true, str::is_empty);
    if let Some(candidate) = candidate.filter(|s| !s.is_empty()) {
        if unset {
            *current = Some(candidate.to_string());
        }
    }
}

fn min_ts(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b < a { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn max_ts(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b > a { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Symbol order when both symbols are present and differ, else contract order.
pub fn compare_tokens(a: &PerTokenAggregate, b: &PerTokenAggregate) -> Ordering {
    match (a.symbol.as_deref(), b.symbol.as_deref()) {
        (Some(sa), Some(sb)) if !sa.is_empty() && !sb.is_empty() && sa != sb => sa.cmp(sb),
        _ => a.contract.cmp(&b.contract),
    }
}

/// Stable merge sort that tolerates comparators which are not a total order.
/// `compare_tokens` is not transitive when null and non-null symbols mix,
/// and `slice::sort_by` may panic on such comparators.
fn merge_sort<T, F>(items: Vec<T>, cmp: F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering + Copy,
{
    if items.len() <= 1 {
        return items;
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, cmp);
    let right = merge_sort(right, cmp);

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => cmp(r, l) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        out.extend(next);
    }
    out
}

/// Single forward pass over already-normalized transactions.
pub fn aggregate(transactions: &[RawTransaction]) -> AggregateReport {
    let mut acc = Accumulator::new();
    for tx in transactions {
        acc.add_transaction(tx);
    }
    acc.finish()
}

/// Aggregate raw JSON entries, skipping anything that is not an object.
pub fn aggregate_values(entries: &[Value]) -> AggregateReport {
    let mut acc = Accumulator::new();
    let mut skipped = 0usize;
    for entry in entries {
        match normalize_entry(entry) {
            Some(tx) => acc.add_transaction(&tx),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "skipped non-object entries");
    }
    if acc.dropped() > 0 {
        debug!(dropped = acc.dropped(), "dropped malformed transfers");
    }
    acc.finish()
}
