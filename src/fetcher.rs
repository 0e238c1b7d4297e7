// src/fetcher.rs
use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::ingest::normalize_entry;
use crate::models::{DexFlags, TokenTransfer};
use crate::parser::{extract_transfers, infer_flags};

/// transactions_v3 serves fixed-size pages.
pub const TX_PAGE_SIZE: usize = 100;
const MAX_JITTER_MS: u64 = 250;

/// One page of a paginated response, whichever convention it used.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub page_number: Option<u64>,
    has_more: bool,
    next_link: bool,
}

impl Page {
    /// Read a `data` envelope: `{items, pagination: {has_more, page_number}}`
    /// or `{items, links: {next}}`.
    pub fn from_data(data: &Value) -> Self {
        let items = data
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let pagination = data.get("pagination");
        Self {
            items,
            page_number: pagination.and_then(|p| p.get("page_number")).and_then(Value::as_u64),
            has_more: pagination.and_then(|p| p.get("has_more")) == Some(&Value::Bool(true)),
            next_link: data
                .get("links")
                .and_then(|l| l.get("next"))
                .is_some_and(|n| !n.is_null()),
        }
    }

    pub fn has_next(&self) -> bool {
        self.has_more || self.next_link
    }
}

/// Covalent responses nest the payload under `data`.
pub fn unwrap_envelope(resp: Value) -> Value {
    match resp {
        Value::Object(mut obj) if obj.contains_key("data") => obj.remove("data").unwrap_or_default(),
        other => other,
    }
}

/// Delay requested by a `Retry-After` header: delta-seconds or an HTTP date.
pub fn retry_after_delay(header: &str, now: DateTime<Utc>) -> Option<Duration> {
    let header = header.trim();
    if let Ok(secs) = header.parse::<f64>() {
        // Out-of-range values fall back to the regular backoff.
        return Duration::try_from_secs_f64(secs).ok();
    }
    let at = DateTime::parse_from_rfc2822(header).ok()?;
    let wait = at.with_timezone(&Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// `base * 2^attempt + jitter`.
pub fn backoff_delay(base_ms: u64, attempt: u32, jitter_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(20));
    Duration::from_millis(exp.saturating_add(jitter_ms))
}

fn jitter() -> u64 {
    rand::thread_rng().gen_range(0..MAX_JITTER_MS)
}

/// Transaction with precomputed transfers and flags, ready for aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedTransaction {
    pub tx_hash: Value,
    pub block_hash: Value,
    pub block_height: Value,
    pub timestamp: Value,
    pub success: bool,
    pub from_address: Value,
    pub to_address: Value,
    pub to_address_label: Value,
    pub native_value: Value,
    pub value_quote: Value,
    pub gas_offered: Value,
    pub gas_spent: Value,
    pub gas_price: Value,
    pub fees_paid: Value,
    pub signer: Value,
    pub method: Value,
    pub dex_flags: DexFlags,
    pub token_transfers: Vec<TokenTransfer>,
    pub block_explorer_url: Value,
    /// The untouched API item, logs and decoded params included.
    pub raw: Value,
}

/// Attach transfers and DEX flags derived from the item's own log events.
pub fn enrich(tx: Value) -> EnrichedTransaction {
    let field = |key: &str| tx.get(key).cloned().unwrap_or(Value::Null);
    let canonical = normalize_entry(&tx).unwrap_or_default();

    let method = tx
        .get("method")
        .filter(|m| !m.is_null())
        .map(|m| {
            serde_json::json!({
                "name": m.get("name").cloned().unwrap_or(Value::Null),
                "signature": m.get("signature").cloned().unwrap_or(Value::Null),
            })
        })
        .unwrap_or(Value::Null);

    let block_explorer_url = tx
        .get("explorers")
        .and_then(Value::as_array)
        .and_then(|e| e.first())
        .and_then(|e| e.get("url"))
        .cloned()
        .unwrap_or(Value::Null);

    EnrichedTransaction {
        tx_hash: field("tx_hash"),
        block_hash: field("block_hash"),
        block_height: field("block_height"),
        timestamp: field("block_signed_at"),
        success: crate::ingest::is_truthy(tx.get("successful")),
        from_address: field("from_address"),
        to_address: field("to_address"),
        to_address_label: field("to_address_label"),
        native_value: field("value"),
        value_quote: field("value_quote"),
        gas_offered: field("gas_offered"),
        gas_spent: field("gas_spent"),
        gas_price: field("gas_price"),
        fees_paid: field("fees_paid"),
        signer: field("signer"),
        method,
        dex_flags: infer_flags(&canonical),
        token_transfers: extract_transfers(&canonical),
        block_explorer_url,
        raw: tx,
    }
}

pub struct Fetcher {
    client: Client,
    cfg: Config,
}

impl Fetcher {
    pub fn new(cfg: Config) -> Result<Self, PipelineError> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| PipelineError::Config("COVALENT_API_KEY is not set".into()))?;

        let mut headers = HeaderMap::new();
        let auth: HeaderValue = format!("Bearer {api_key}")
            .parse()
            .map_err(|_| PipelineError::Config("COVALENT_API_KEY is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("chain-sentiment/0.1")
            .default_headers(headers)
            .build()?;

        Ok(Self { client, cfg })
    }

    async fn get_once(&self, url: &str) -> Result<Value, (PipelineError, Option<Duration>)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| (PipelineError::from(e), None))?;
        let status = resp.status();

        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| retry_after_delay(h, Utc::now()));
            let body: String = resp.text().await.unwrap_or_default().chars().take(500).collect();
            return Err((
                PipelineError::HttpStatus {
                    status: status.as_u16(),
                    body,
                },
                retry_after,
            ));
        }

        let json: Value = resp.json().await.map_err(|e| (PipelineError::from(e), None))?;
        if crate::ingest::is_truthy(json.get("error")) {
            let msg = json
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Err((PipelineError::Api(msg), None));
        }
        Ok(unwrap_envelope(json))
    }

    /// GET with bounded retries on 429/5xx and network errors.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<Value, PipelineError> {
        let retries = self.cfg.max_retries;
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(data) => return Ok(data),
                Err((e, retry_after)) if e.is_transient() && attempt < retries => {
                    let wait = retry_after
                        .unwrap_or_else(|| backoff_delay(self.cfg.base_delay_ms, attempt, jitter()));
                    warn!(
                        "⚠️ {} on {}. Backing off {}ms (attempt {}/{}).",
                        e,
                        url,
                        wait.as_millis(),
                        attempt + 1,
                        retries
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }

    /// Block headers in the configured date range, deduplicated by height.
    pub async fn fetch_blocks(&self) -> Result<Vec<Value>, PipelineError> {
        let target = self.cfg.target_block_count;
        let mut all: Vec<Value> = Vec::new();
        let mut page_number = 0u64;

        info!(
            "Fetching up to {} block headers from {}..{}",
            target, self.cfg.start_date, self.cfg.end_date
        );
        while all.len() < target {
            let url = format!(
                "{}/{}/block_v2/{}/{}/?page-size={}&page-number={}",
                self.cfg.api_base,
                self.cfg.chain,
                self.cfg.start_date,
                self.cfg.end_date,
                self.cfg.page_size,
                page_number
            );
            let page = Page::from_data(&self.fetch_with_retry(&url).await?);
            if page.items.is_empty() {
                break;
            }
            let has_next = page.has_next();
            page_number = page.page_number.unwrap_or(page_number) + 1;
            all.extend(page.items);
            info!("  Page {}: total blocks {} | has_more={}", page_number, all.len(), has_next);
            if !has_next {
                break;
            }
        }

        let mut seen = HashSet::new();
        let mut unique: Vec<Value> = all
            .into_iter()
            .filter(|b| seen.insert(b.get("height").map(Value::to_string)))
            .collect();
        unique.truncate(target);
        Ok(unique)
    }

    /// Every transaction of one block, logs included.
    pub async fn fetch_block_transactions(&self, height: u64) -> Result<Vec<Value>, PipelineError> {
        let mut all = Vec::new();
        let mut page = 0u64;
        loop {
            let url = format!(
                "{}/{}/block/{}/transactions_v3/page/{}/?no-logs=false&quote-currency=USD",
                self.cfg.api_base, self.cfg.chain, height, page
            );
            let data = Page::from_data(&self.fetch_with_retry(&url).await?);
            if data.items.is_empty() {
                if page == 0 {
                    info!("  ℹ️ Block {} has 0 txs", height);
                }
                break;
            }
            let full = data.items.len() == TX_PAGE_SIZE;
            let has_next = data.has_next() || full;
            all.extend(data.items);
            if !has_next {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    /// Fetch all blocks' transactions with at most `concurrency` blocks in
    /// flight. Output keeps block order; a failed block contributes nothing.
    pub async fn fetch_all(&self, blocks: &[Value]) -> Vec<Value> {
        info!(
            "🚦 Fetching transactions (with logs) with concurrency={} ...",
            self.cfg.concurrency
        );
        let heights: Vec<u64> = blocks
            .iter()
            .filter_map(|b| b.get("height").and_then(Value::as_u64))
            .collect();

        let per_block: Vec<Vec<Value>> = stream::iter(heights)
            .map(|height| async move {
                match self.fetch_block_transactions(height).await {
                    Ok(txs) => txs,
                    Err(e) => {
                        error!("❌ Block {} failed: {}", height, e);
                        Vec::new()
                    }
                }
            })
            .buffered(self.cfg.concurrency.max(1))
            .collect()
            .await;

        per_block.into_iter().flatten().collect()
    }

    /// Blocks → transactions → enriched transactions.
    pub async fn run(&self) -> Result<Vec<EnrichedTransaction>, PipelineError> {
        let blocks = self.fetch_blocks().await?;
        if blocks.is_empty() {
            info!("No blocks in the given date range.");
            return Ok(Vec::new());
        }
        info!("✅ Got {} distinct block headers.", blocks.len());

        let txs = self.fetch_all(&blocks).await;
        Ok(txs.into_iter().map(enrich).collect())
    }
}
