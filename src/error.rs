// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a unit of work: a whole run for input/output
/// problems, a single page or block for acquisition problems.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON (starts with {preview:?}): {source}")]
    InvalidJson {
        path: PathBuf,
        preview: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not write {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Rate limiting and server-side failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Request(_) => true,
            _ => false,
        }
    }
}
