//! Command-line driver.
//!
//! Usage:
//!   price-scout compare [--no-cache] <url> [<url>...]
//!   price-scout search  [--no-cache] <query>
//!   price-scout history <url> [limit]
//!
//! Reports are printed as pretty JSON on stdout. Ctrl-C aborts the running
//! batch; items already finished are still reported.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use price_scout::application::Orchestrator;
use price_scout::infrastructure::history_repository::PriceHistory;
use price_scout::infrastructure::{logging, AppConfig, HttpClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(None).context("loading configuration")?;
    logging::init(&config.logging);

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        bail!("usage: price-scout <compare|search|history> [args]");
    }
    let command = args.remove(0);

    let use_cache = if let Some(pos) = args.iter().position(|a| a == "--no-cache") {
        args.remove(pos);
        false
    } else {
        true
    };

    let history = Arc::new(
        PriceHistory::connect(&config.history)
            .await
            .context("opening price history")?,
    );
    let fetcher = Arc::new(HttpClient::new(&config.fetch).context("building http client")?);
    let orchestrator = Arc::new(Orchestrator::new(fetcher, Some(history), &config));

    match command.as_str() {
        "compare" => {
            if args.is_empty() {
                bail!("compare needs at least one url");
            }
            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let report = orchestrator
                .compare_with_cancel(&args, use_cache, cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "search" => {
            let query = args.join(" ");
            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let report = orchestrator
                .search_with_cancel(&query, use_cache, cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "history" => {
            let url = args
                .first()
                .context("history needs a url")?
                .clone();
            let limit = args.get(1).map(|l| l.parse::<usize>()).transpose()
                .context("limit must be a number")?;
            let rows = orchestrator.price_history(&url, limit).await?;
            let report = price_scout::application::HistoryReport::from(rows);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        other => bail!("unknown command: {other}"),
    }

    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling batch");
            cancel.cancel();
        }
    });
}
