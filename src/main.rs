// src/main.rs
mod edinet;
mod extract;
mod markets;
mod pipeline;
mod registry;
mod resilience;
mod store;
mod utils;

use chrono::NaiveDate;
use clap::Parser;
use edinet::client::EdinetClient;
use markets::client::{MarketClient, MarketEndpoints};
use pipeline::{Pipeline, PipelineConfig};
use resilience::{RetryPolicy, UpstreamRegistry};
use std::sync::Arc;
use store::memory::MemoryStore;
use utils::clock::SystemClock;
use utils::AppError;

/// Command line interface for the EDINET filing pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Submission date to process (YYYY-MM-DD)
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Process a single registered document by id (requires --date for registration first)
    #[arg(long)]
    document_id: Option<String>,

    /// Reset failed and half-way documents so the next run retries them
    #[arg(long)]
    reset: bool,

    /// Flag one completed extraction for re-extraction, as "DOC_ID:bs|pl|ns"
    #[arg(long)]
    half_way: Option<String>,

    /// Import stock prices and forecasts for these securities codes
    #[arg(long, value_delimiter = ',')]
    prices: Vec<String>,

    /// Print current quotes for one securities code
    #[arg(long)]
    quote: Option<String>,

    /// Directory for downloaded filing archives
    #[arg(long, default_value = "./data/archive")]
    archive_dir: String,

    /// Directory for decoded filing trees
    #[arg(long, default_value = "./data/decoded")]
    decode_dir: String,

    /// Documents processed concurrently
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Base URL of the filing API
    #[arg(long, default_value = "https://disclosure.edinet-fsa.go.jp")]
    edinet_base_url: String,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting processing for args: {:?}", args);

    let clock = Arc::new(SystemClock);

    // The filing API gets retries and a breaker; the scraped market hosts
    // additionally get a token bucket each.
    let edinet_registry = Arc::new(UpstreamRegistry::new(
        RetryPolicy::default(),
        Default::default(),
        None,
        clock.clone(),
    ));
    let market_registry = Arc::new(UpstreamRegistry::new(
        RetryPolicy::default(),
        Default::default(),
        Some(Default::default()),
        clock.clone(),
    ));

    let api = Arc::new(EdinetClient::new(&args.edinet_base_url, edinet_registry)?);
    let market = MarketClient::new(MarketEndpoints::default(), market_registry, clock.clone())?;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        api,
        store,
        clock,
        PipelineConfig {
            archive_dir: args.archive_dir.into(),
            decode_dir: args.decode_dir.into(),
            concurrency: args.concurrency,
        },
    );

    if args.reset {
        let touched = pipeline.registry().reset_for_retry()?;
        tracing::info!("{} documents reset for retry", touched);
    }

    if let Some(spec) = &args.half_way {
        let (doc_id, kind) = parse_half_way(spec)?;
        if pipeline.registry().mark_half_way(doc_id, kind)? {
            tracing::info!("{} flagged for re-extraction of {}", doc_id, kind.name());
        } else {
            tracing::warn!("{} has no completed {} extraction to flag", doc_id, kind.name());
        }
    }

    if let Some(code) = &args.quote {
        let nikkei = market.nikkei(code).await?;
        tracing::info!("nikkei quote for {}: {:?}", code, nikkei);
        let minkabu = market.minkabu(code).await?;
        tracing::info!("minkabu quote for {}: {:?}", code, minkabu);
    }

    if let Some(date) = args.date {
        let summary = pipeline.process_date(date).await?;
        tracing::info!(
            "done: {} processed, {} skipped, {} excluded, {} failed",
            summary.processed,
            summary.skipped,
            summary.excluded,
            summary.failed
        );

        if let Some(doc_id) = &args.document_id {
            pipeline.process_document_id(doc_id).await?;
        }
    } else if let Some(doc_id) = &args.document_id {
        tracing::warn!(
            "--document-id {} given without --date; the in-memory store has no registered documents",
            doc_id
        );
    }

    if !args.prices.is_empty() {
        let imported = pipeline.import_stock_prices(&market, &args.prices).await?;
        tracing::info!("{} price rows imported", imported);
    }

    Ok(())
}

fn parse_half_way(spec: &str) -> Result<(&str, registry::StatementKind), AppError> {
    let (doc_id, kind) = spec
        .split_once(':')
        .ok_or_else(|| AppError::Config(format!("expected DOC_ID:bs|pl|ns, got '{}'", spec)))?;
    let kind = match kind {
        "bs" => registry::StatementKind::BalanceSheet,
        "pl" => registry::StatementKind::IncomeStatement,
        "ns" => registry::StatementKind::ShareCount,
        other => {
            return Err(AppError::Config(format!(
                "unknown statement kind '{}', expected bs, pl or ns",
                other
            )))
        }
    };
    Ok((doc_id, kind))
}
