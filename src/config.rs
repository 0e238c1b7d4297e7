use chrono::NaiveDate;
use dotenvy::dotenv;
use std::{env, path::PathBuf, str::FromStr};
use tracing::info;

use crate::error::PipelineError;

#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub chain: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub target_block_count: usize,
    pub page_size: usize,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub ollama_model: String,
    pub ollama_endpoint: String,
    pub data_dir: PathBuf,
    pub port: u16,
    pub log_level: String,
}

// Hand-written so the API key never reaches the logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("chain", &self.chain)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("target_block_count", &self.target_block_count)
            .field("page_size", &self.page_size)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("ollama_model", &self.ollama_model)
            .field("ollama_endpoint", &self.ollama_endpoint)
            .field("data_dir", &self.data_dir)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.covalenthq.com/v1".to_string(),
            chain: "hyperevm-mainnet".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 30).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 31).unwrap_or_default(),
            target_block_count: 500,
            page_size: 100,
            concurrency: 5,
            max_retries: 3,
            base_delay_ms: 750,
            ollama_model: "llama3.2:latest".to_string(),
            ollama_endpoint: "http://localhost:11434/api/generate".to_string(),
            data_dir: PathBuf::from("."),
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// Numeric settings fall back to their default when unparseable, like the
/// port and confirmation settings always have.
fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn date_var(key: &str, default: NaiveDate) -> Result<NaiveDate, PipelineError> {
    match env::var(key) {
        Ok(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| PipelineError::Config(format!("{key}={raw:?} is not a YYYY-MM-DD date: {e}"))),
        Err(_) => Ok(default),
    }
}

pub fn load() -> Result<Config, PipelineError> {
    dotenv().ok();

    let defaults = Config::default();

    let api_key = env::var("COVALENT_API_KEY")
        .or_else(|_| env::var("API_KEY")) // alias support
        .ok()
        .filter(|k| !k.trim().is_empty());

    let start_date = date_var("START_DATE", defaults.start_date)?;
    let end_date = date_var("END_DATE", defaults.end_date)?;
    if end_date < start_date {
        return Err(PipelineError::Config(format!(
            "END_DATE {end_date} is before START_DATE {start_date}"
        )));
    }

    let cfg = Config {
        api_key,
        api_base: env::var("COVALENT_API_BASE").unwrap_or(defaults.api_base),
        chain: env::var("CHAIN").unwrap_or(defaults.chain),
        start_date,
        end_date,
        target_block_count: parsed_or("TARGET_BLOCK_COUNT", defaults.target_block_count),
        page_size: parsed_or("PAGE_SIZE", defaults.page_size),
        concurrency: parsed_or("CONCURRENCY", defaults.concurrency).max(1),
        max_retries: parsed_or("MAX_RETRIES", defaults.max_retries),
        base_delay_ms: parsed_or("BASE_DELAY_MS", defaults.base_delay_ms),
        ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
        ollama_endpoint: env::var("OLLAMA_ENDPOINT").unwrap_or(defaults.ollama_endpoint),
        data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        port: parsed_or("PORT", defaults.port),
        log_level: env::var("LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or(defaults.log_level),
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_api_key() {
        let cfg = Config {
            api_key: Some("cqt_secret".to_string()),
            ..Config::default()
        };
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("cqt_secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn data_files_live_under_data_dir() {
        let cfg = Config {
            data_dir: PathBuf::from("/tmp/run"),
            ..Config::default()
        };
        assert_eq!(cfg.data_file("statistics.json"), PathBuf::from("/tmp/run/statistics.json"));
    }
}
