// src/llm.rs
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::ClassificationResult;

const PROMPT_BASE: &str = "Role: You are a blockchain market analyst. Your expertise is in interpreting raw transaction metadata \
and evaluating its potential impact on market sentiment.\n\n\
Task: Analyze the following transaction (all token amounts are in native units unless otherwise noted). \
Classify it into exactly one of: \"bullish\", \"bearish\", or \"neutral\".\n\n\
Output format: Return a single compact JSON object:\n\
{\n\
  \"classification\": \"<bullish|bearish|neutral>\",\n\
  \"reasoning\": \"1–3 sentences explaining the classification based on signals in the metadata\",\n\
  \"market_impact\": \"Brief note on potential effect (e.g., buy pressure, liquidity depth change, negligible)\"\n\
}\n\n\
Guidelines:\n\
- Bullish → large buys, liquidity adds, whale accumulation, exchange withdrawals, stable→volatile rotations.\n\
- Bearish → large sells, liquidity removals, whale distributions, deposits to exchanges, volatile→stable rotations.\n\
- Neutral → small/insignificant transfers, internal shuffles, maintenance, or events unlikely to impact sentiment.\n\n\
The Transaction:\n";

/// Analyst prompt with the row appended as pretty JSON.
pub fn build_prompt(row: &Value) -> String {
    let tx_json = serde_json::to_string_pretty(row).unwrap_or_else(|_| row.to_string());
    format!("{PROMPT_BASE}{tx_json}")
}

/// Best-effort JSON from model text: the whole reply, else the outermost
/// `{...}` span, else the raw text wrapped as `{raw_response}`.
pub fn coerce_to_json(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v;
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return v;
            }
        }
    }
    json!({ "raw_response": trimmed })
}

fn tx_hash_of(row: &Value) -> Option<String> {
    ["tx_hash", "hash"]
        .iter()
        .filter_map(|k| row.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct Classifier {
    client: Client,
    endpoint: String,
    model: String,
}

impl Classifier {
    pub fn new(cfg: &Config) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.ollama_endpoint.clone(),
            model: cfg.ollama_model.clone(),
        })
    }

    /// Raw `response` text for one prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            keep_alive: "30m",
            options: GenerateOptions { temperature: 0.2 },
        };

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let data: Value = resp.json().await?;
        Ok(data
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Classify every row in order. A failing row is recorded with its
    /// error and the run continues.
    pub async fn classify_all(&self, rows: &[Value]) -> Vec<ClassificationResult> {
        info!("Model: {}", self.model);
        info!("Endpoint: {}", self.endpoint);
        info!("Found {} transactions", rows.len());

        let mut results = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let tx_hash = tx_hash_of(row);
            let outcome = self.generate(&build_prompt(row)).await;

            let result = match outcome {
                Ok(text) => {
                    let parsed = coerce_to_json(&text);
                    let label = parsed
                        .get("classification")
                        .and_then(Value::as_str)
                        .unwrap_or("n/a");
                    info!(
                        "[{}/{}] tx_hash: {} | classification: {}",
                        i + 1,
                        rows.len(),
                        tx_hash.as_deref().unwrap_or("(unknown)"),
                        label
                    );
                    ClassificationResult {
                        index: i,
                        tx_hash,
                        token: None,
                        input_transaction: row.clone(),
                        model_output: Some(parsed),
                        error: None,
                    }
                }
                Err(e) => {
                    error!("[{}/{}] Error on item {}: {}", i + 1, rows.len(), i, e);
                    ClassificationResult {
                        index: i,
                        tx_hash,
                        token: None,
                        input_transaction: row.clone(),
                        model_output: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }
        results
    }
}
