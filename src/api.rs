use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::models::ClassificationResult;
use crate::stats::Classification;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Documents produced by earlier pipeline stages, loaded once at startup.
#[derive(Debug, Default)]
pub struct Documents {
    pub statistics: Value,
    pub transfer_stats: Value,
    pub transactions: Vec<ClassificationResult>,
}

pub type SharedDocuments = Arc<Documents>;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    /// Exact token symbol; absent or `all` means every token.
    pub token: Option<String>,
    /// Comma-separated class names; absent means every class.
    pub classification: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub items: Vec<ClassificationResult>,
}

/// Capitalize the first character the way the dashboard displays labels.
fn display_label(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn wanted_classes(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(list) => list
            .split(',')
            .map(|s| display_label(s.trim()))
            .filter(|s| !s.is_empty())
            .collect(),
        None => [
            Classification::Bullish,
            Classification::Bearish,
            Classification::Neutral,
        ]
        .iter()
        .map(|c| c.as_str().to_string())
        .collect(),
    }
}

/// Rows with both input and model output, filtered by token and class,
/// then sliced to one page (1-based).
pub fn filter_transactions(rows: &[ClassificationResult], q: &TransactionQuery) -> TransactionPage {
    let classes = wanted_classes(q.classification.as_deref());
    let token = q.token.as_deref().filter(|t| *t != "all");

    let matching: Vec<&ClassificationResult> = rows
        .iter()
        .filter(|r| !r.input_transaction.is_null() && r.model_output.is_some())
        .filter(|r| {
            token.map_or(true, |t| {
                r.input_transaction.get("token").and_then(Value::as_str) == Some(t)
            })
        })
        .filter(|r| {
            let label = display_label(r.classification().unwrap_or_default());
            classes.contains(&label)
        })
        .collect();

    let page_size = q.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let page = q.page.unwrap_or(1).max(1);
    let total = matching.len();
    let items = matching
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    TransactionPage {
        total,
        page,
        total_pages: total.div_ceil(page_size),
        items,
    }
}

pub async fn get_statistics(State(docs): State<SharedDocuments>) -> Json<Value> {
    Json(docs.statistics.clone())
}

pub async fn get_transfer_stats(State(docs): State<SharedDocuments>) -> Json<Value> {
    Json(docs.transfer_stats.clone())
}

pub async fn get_transactions(
    State(docs): State<SharedDocuments>,
    Query(q): Query<TransactionQuery>,
) -> Json<TransactionPage> {
    Json(filter_transactions(&docs.transactions, &q))
}

pub fn router(docs: SharedDocuments) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Chain sentiment API running" }))
        .route("/stats", get(get_statistics))
        .route("/transfer-stats", get(get_transfer_stats))
        .route("/transactions", get(get_transactions))
        .layer(cors)
        .with_state(docs)
}

pub async fn serve(cfg: Config, docs: SharedDocuments) -> eyre::Result<()> {
    let app = router(docs);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(index: usize, token: &str, class: &str) -> ClassificationResult {
        ClassificationResult {
            index,
            tx_hash: Some(format!("0x{index}")),
            token: None,
            input_transaction: json!({"token": token, "amount": 1.0}),
            model_output: Some(json!({"classification": class})),
            error: None,
        }
    }

    fn sample() -> Vec<ClassificationResult> {
        let mut rows: Vec<_> = (0..12).map(|i| row(i, "USDC", "bullish")).collect();
        rows.push(row(12, "WETH", "bearish"));
        rows.push(row(13, "WETH", "neutral"));
        rows.push(row(14, "WETH", "unsure"));
        rows.push(ClassificationResult {
            index: 15,
            input_transaction: json!({"token": "WETH"}),
            error: Some("timeout".into()),
            ..Default::default()
        });
        rows
    }

    #[test]
    fn default_query_pages_known_classes() {
        let page = filter_transactions(&sample(), &TransactionQuery::default());
        assert_eq!(page.total, 14);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), DEFAULT_PAGE_SIZE);
        assert_eq!(page.items[0].index, 0);
    }

    #[test]
    fn filters_by_token_and_class() {
        let q = TransactionQuery {
            token: Some("WETH".into()),
            classification: Some("bearish, Neutral".into()),
            ..Default::default()
        };
        let page = filter_transactions(&sample(), &q);
        let indexes: Vec<_> = page.items.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![12, 13]);
    }

    #[test]
    fn second_page_holds_the_remainder() {
        let q = TransactionQuery {
            token: Some("all".into()),
            page: Some(2),
            ..Default::default()
        };
        let page = filter_transactions(&sample(), &q);
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn huge_page_numbers_yield_an_empty_page() {
        let q = TransactionQuery {
            page: Some(3),
            page_size: Some(usize::MAX),
            ..Default::default()
        };
        let page = filter_transactions(&sample(), &q);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 14);
        assert_eq!(page.total_pages, 1);

        let q = TransactionQuery {
            page: Some(usize::MAX),
            ..Default::default()
        };
        assert!(filter_transactions(&sample(), &q).items.is_empty());
    }

    #[tokio::test]
    async fn handlers_serve_loaded_documents() {
        let docs = Arc::new(Documents {
            statistics: json!({"sample_size": 16}),
            transfer_stats: json!({"global": {"total_txs": 3}}),
            transactions: sample(),
        });

        let Json(stats) = get_statistics(State(docs.clone())).await;
        assert_eq!(stats["sample_size"], 16);

        let Json(transfer) = get_transfer_stats(State(docs.clone())).await;
        assert_eq!(transfer["global"]["total_txs"], 3);

        let q = TransactionQuery {
            classification: Some("bullish".into()),
            page_size: Some(5),
            ..Default::default()
        };
        let Json(page) = get_transactions(State(docs), Query(q)).await;
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages, 3);
    }
}
