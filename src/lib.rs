pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod parser;
pub mod stats;
pub mod store;
pub mod tokens;

pub use aggregator::{aggregate, aggregate_values, AggregateReport};
pub use error::PipelineError;
pub use parser::{extract_transfers, infer_flags, normalize_amount};
pub use stats::summarize;
