// src/stats.rs
use std::collections::BTreeMap;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ClassificationResult;

pub const UNKNOWN_TOKEN: &str = "(unknown)";
pub const TOP_N: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Bullish,
    Bearish,
    Neutral,
    Unknown,
}

impl Classification {
    /// Total, case- and whitespace-insensitive mapping of a model label.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("bullish") => Self::Bullish,
            Some("bearish") => Self::Bearish,
            Some("neutral") => Self::Neutral,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "Bullish",
            Self::Bearish => "Bearish",
            Self::Neutral => "Neutral",
            Self::Unknown => "Unknown",
        }
    }
}

/// One value per class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PerClass<T> {
    pub bullish: T,
    pub bearish: T,
    pub neutral: T,
    pub unknown: T,
}

impl<T> PerClass<T> {
    pub fn get_mut(&mut self, class: Classification) -> &mut T {
        match class {
            Classification::Bullish => &mut self.bullish,
            Classification::Bearish => &mut self.bearish,
            Classification::Neutral => &mut self.neutral,
            Classification::Unknown => &mut self.unknown,
        }
    }

    pub fn map<U>(self, f: impl Fn(T) -> U) -> PerClass<U> {
        PerClass {
            bullish: f(self.bullish),
            bearish: f(self.bearish),
            neutral: f(self.neutral),
            unknown: f(self.unknown),
        }
    }
}

/// Per-token class breakdown plus a running total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBucket<T> {
    #[serde(flatten)]
    pub classes: PerClass<T>,
    pub total: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Bullish,
    Bearish,
    Tie,
    #[serde(rename = "No verdict")]
    NoVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBreakdown {
    pub counts: PerClass<u64>,
    pub percentages: PerClass<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub bullish_count: u64,
    pub bearish_count: u64,
    pub bullish_share_pct: f64,
    pub bearish_share_pct: f64,
    pub considered_total: u64,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCount {
    pub token: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: String,
    pub amount: f64,
}

/// The `statistics.json` document. Amounts are rounded to 8 places,
/// percentages to 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationStatistics {
    pub sample_size: u64,
    pub classification: ClassBreakdown,
    pub amounts_by_class: PerClass<f64>,
    pub final_verdict: FinalVerdict,
    pub unique_tokens_seen: BTreeMap<String, u64>,
    pub token_amounts: BTreeMap<String, f64>,
    pub token_classification_counts: BTreeMap<String, TokenBucket<u64>>,
    pub token_classification_amounts: BTreeMap<String, TokenBucket<f64>>,
    pub top_tokens_by_count: Vec<TokenCount>,
    pub top_tokens_by_amount: Vec<TokenAmount>,
    pub notes: Vec<String>,
}

/// Round the exact binary value half away from zero to `dp` places, so
/// 14.375 stored as 14.37499.. rounds down. Values outside the decimal
/// range are returned unchanged.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64_retain(value)
        .or_else(|| Decimal::from_f64(value))
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// `n / d` as a percentage with 2 decimals; 0 for an empty denominator.
pub fn percentage(n: u64, d: u64) -> f64 {
    if d == 0 {
        return 0.0;
    }
    round_dp(n as f64 / d as f64 * 100.0, 2)
}

/// Bullish vs Bearish only; Neutral and Unknown never count.
pub fn verdict(bullish: u64, bearish: u64) -> FinalVerdict {
    let considered = bullish + bearish;
    let bullish_share = percentage(bullish, considered);
    let bearish_share = percentage(bearish, considered);
    let verdict = if considered == 0 {
        Verdict::NoVerdict
    } else if bearish_share > bullish_share {
        Verdict::Bearish
    } else if bullish_share > bearish_share {
        Verdict::Bullish
    } else {
        Verdict::Tie
    };
    FinalVerdict {
        bullish_count: bullish,
        bearish_count: bearish,
        bullish_share_pct: bullish_share,
        bearish_share_pct: bearish_share,
        considered_total: considered,
        verdict,
    }
}

fn token_of(row: &ClassificationResult) -> String {
    row.input_transaction
        .get("token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| row.token.as_deref().filter(|s| !s.is_empty()))
        .unwrap_or(UNKNOWN_TOKEN)
        .to_string()
}

fn amount_of(row: &ClassificationResult) -> f64 {
    row.input_transaction
        .get("amount")
        .and_then(Value::as_f64)
        .filter(|a| a.is_finite())
        .unwrap_or(0.0)
}

/// Tally classified rows into the statistics document.
pub fn summarize(rows: &[ClassificationResult]) -> ClassificationStatistics {
    let mut counts = PerClass::<u64>::default();
    let mut amounts = PerClass::<f64>::default();
    let mut token_counts: BTreeMap<String, TokenBucket<u64>> = BTreeMap::new();
    let mut token_amounts: BTreeMap<String, TokenBucket<f64>> = BTreeMap::new();

    for row in rows {
        let class = Classification::normalize(row.classification());
        let token = token_of(row);
        let amount = amount_of(row);

        *counts.get_mut(class) += 1;
        *amounts.get_mut(class) += amount;

        let bucket = token_counts.entry(token.clone()).or_default();
        *bucket.classes.get_mut(class) += 1;
        bucket.total += 1;

        let bucket = token_amounts.entry(token).or_default();
        *bucket.classes.get_mut(class) += amount;
        bucket.total += amount;
    }

    let n = rows.len() as u64;
    let percentages = PerClass {
        bullish: percentage(counts.bullish, n),
        bearish: percentage(counts.bearish, n),
        neutral: percentage(counts.neutral, n),
        unknown: percentage(counts.unknown, n),
    };

    let unique_tokens_seen: BTreeMap<String, u64> = token_counts
        .iter()
        .map(|(token, bucket)| (token.clone(), bucket.total))
        .collect();

    let mut top_by_count: Vec<TokenCount> = unique_tokens_seen
        .iter()
        .map(|(token, &count)| TokenCount {
            token: token.clone(),
            count,
        })
        .collect();
    top_by_count.sort_by(|a, b| b.count.cmp(&a.count));
    top_by_count.truncate(TOP_N);

    let mut top_by_amount: Vec<TokenAmount> = token_amounts
        .iter()
        .map(|(token, bucket)| TokenAmount {
            token: token.clone(),
            amount: bucket.total,
        })
        .collect();
    top_by_amount.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    top_by_amount.truncate(TOP_N);
    for entry in &mut top_by_amount {
        entry.amount = round_dp(entry.amount, 8);
    }

    ClassificationStatistics {
        sample_size: n,
        classification: ClassBreakdown {
            counts,
            percentages,
        },
        amounts_by_class: amounts.map(|a| round_dp(a, 8)),
        final_verdict: verdict(counts.bullish, counts.bearish),
        unique_tokens_seen,
        token_amounts: token_amounts
            .iter()
            .map(|(token, bucket)| (token.clone(), round_dp(bucket.total, 8)))
            .collect(),
        token_classification_counts: token_counts,
        token_classification_amounts: token_amounts
            .into_iter()
            .map(|(token, bucket)| {
                let rounded = TokenBucket {
                    classes: bucket.classes.map(|a| round_dp(a, 8)),
                    total: round_dp(bucket.total, 8),
                };
                (token, rounded)
            })
            .collect(),
        top_tokens_by_count: top_by_count,
        top_tokens_by_amount: top_by_amount,
        notes: vec![
            "Final verdict compares only Bearish vs Bullish counts; Neutral/Unknown are ignored for this ratio.".into(),
            "Amounts are in native token units (from `input_transaction.amount`).".into(),
            "Percentages in classification are based on total transactions (including Neutral/Unknown).".into(),
        ],
    }
}
