use std::path::{Path, PathBuf};
use std::sync::Arc;

use chain_sentiment::{
    aggregator, api, config, fetcher::Fetcher, ingest, llm::Classifier, models::ClassificationResult,
    stats, store, tokens,
};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Transaction sentiment pipeline: fetch, aggregate, classify, summarize, serve.
#[derive(Parser, Debug)]
#[command(name = "chain-sentiment")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch blocks and their transactions, enriched with transfers and DEX flags
    Fetch {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write transfer_stats.json and transfers_flat.json next to the input
    Aggregate { input: PathBuf },
    /// List distinct token contracts for pricing
    Tokens {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Classify flat transfers with the configured LLM
    Classify {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize classification results into statistics.json
    Stats {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the produced documents over HTTP
    Serve,
}

fn sibling(input: &Path, name: &str) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn run_aggregate(input: &Path) -> eyre::Result<()> {
    let root = store::read_json(input)?;
    let entries = ingest::to_entries(&root);
    info!("Aggregating {} entries from {}", entries.len(), input.display());

    let report = aggregator::aggregate_values(entries);
    info!(
        "{} txs, {} transfers, {} tokens",
        report.global.total_txs,
        report.global.total_token_transfers,
        report.per_token.len()
    );

    // Encode both documents before either file is written.
    let stats_doc = serde_json::to_value(report.stats())?;
    let flat_doc = serde_json::to_value(&report.flat)?;
    store::write_json(&sibling(input, "transfer_stats.json"), &stats_doc)?;
    store::write_json(&sibling(input, "transfers_flat.json"), &flat_doc)?;
    info!("✅ Wrote transfer_stats.json and transfers_flat.json");
    Ok(())
}

fn run_tokens(input: &Path, output: &Path) -> eyre::Result<()> {
    let root = store::read_json(input)?;
    let txs = ingest::normalize_document(&root);
    let list = tokens::list_tokens(&txs);
    info!("Found {} distinct token contracts", list.len());
    store::write_json(output, &list)?;
    Ok(())
}

fn run_stats(input: &Path, output: &Path) -> eyre::Result<()> {
    let rows: Vec<ClassificationResult> = store::read_rows(input)?
        .iter()
        .enumerate()
        .map(|(i, v)| ClassificationResult::from_value_lossy(i, v))
        .collect();
    let summary = stats::summarize(&rows);
    info!(
        "Sample of {} → verdict {:?} ({}% bullish / {}% bearish)",
        summary.sample_size,
        summary.final_verdict.verdict,
        summary.final_verdict.bullish_share_pct,
        summary.final_verdict.bearish_share_pct
    );
    store::write_json(output, &summary)?;
    info!("Wrote statistics -> {}", output.display());
    Ok(())
}

fn load_documents(cfg: &config::Config) -> eyre::Result<api::Documents> {
    let statistics = store::read_json(&cfg.data_file("statistics.json"))?;
    let transfer_stats = store::read_json(&cfg.data_file("transfer_stats.json"))?;
    let transactions = store::read_rows(&cfg.data_file("llm_answers.json"))?
        .iter()
        .enumerate()
        .map(|(i, v)| ClassificationResult::from_value_lossy(i, v))
        .collect();
    Ok(api::Documents {
        statistics,
        transfer_stats,
        transactions,
    })
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into())))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load()?;
    info!("  Chain: {}", cfg.chain);
    info!("  Data dir: {}", cfg.data_dir.display());

    match cli.command {
        Command::Fetch { output } => {
            let output = output.unwrap_or_else(|| {
                cfg.data_file("transaction_blocks_with_logs_and_metadata.json")
            });
            let fetcher = Fetcher::new(cfg.clone())?;
            let txs = fetcher.run().await?;
            store::write_json(&output, &txs)?;
            info!("🎉 Wrote {} transactions to {}", txs.len(), output.display());
        }
        Command::Aggregate { input } => run_aggregate(&input)?,
        Command::Tokens { input, output } => {
            let output = output.unwrap_or_else(|| cfg.data_file("tokens_for_pricing.json"));
            run_tokens(&input, &output)?;
        }
        Command::Classify { input, output } => {
            let input = input.unwrap_or_else(|| cfg.data_file("transfers_flat.json"));
            let output = output.unwrap_or_else(|| cfg.data_file("llm_answers.json"));
            let rows = store::read_rows(&input)?;
            let classifier = Classifier::new(&cfg)?;
            let results = classifier.classify_all(&rows).await;
            store::write_json(&output, &results)?;
            info!("Saved {} results to {}", results.len(), output.display());
        }
        Command::Stats { input, output } => {
            let input = input.unwrap_or_else(|| cfg.data_file("llm_answers.json"));
            let output = output.unwrap_or_else(|| cfg.data_file("statistics.json"));
            run_stats(&input, &output)?;
        }
        Command::Serve => {
            info!("  Port: {}", cfg.port);
            let docs = Arc::new(load_documents(&cfg)?);
            let api_handle = tokio::spawn(api::serve(cfg.clone(), docs));

            tokio::select! {
                res = api_handle => match res {
                    Ok(Ok(_)) => info!("API exited cleanly"),
                    Ok(Err(e)) => error!("API error: {:?}", e),
                    Err(e) => error!("API task panicked: {:?}", e),
                },
                _ = signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping...");
                }
            }
        }
    }

    Ok(())
}
