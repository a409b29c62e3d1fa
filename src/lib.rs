//! price-scout: concurrent price comparison across Brazilian marketplaces.
//!
//! The pipeline per URL is fetch, extract, normalize: pages are fetched
//! through a rate-limited HTTP client, product data is pulled from embedded
//! JSON first and CSS selectors second, and the raw fields are normalized
//! into canonical snapshots. Around that sit a TTL cache with request
//! coalescing, an append-only SQLite price history, and an orchestrator
//! that fans batches out over a bounded worker pool.
//!
//! ```no_run
//! use std::sync::Arc;
//! use price_scout::application::Orchestrator;
//! use price_scout::infrastructure::{AppConfig, HttpClient};
//!
//! # async fn run() -> Result<(), price_scout::domain::ScrapeError> {
//! let config = AppConfig::load(None)?;
//! let fetcher = Arc::new(HttpClient::new(&config.fetch)?);
//! let orchestrator = Arc::new(Orchestrator::new(fetcher, None, &config));
//!
//! let urls = vec!["https://www.mercadolivre.com.br/p/MLB123".to_string()];
//! let report = orchestrator.compare(&urls, true).await?;
//! println!("{} of {} succeeded", report.successful, report.total);
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{BatchReport, ItemResult, Orchestrator};
pub use domain::{ProductSnapshot, ScrapeError};
pub use infrastructure::{AppConfig, HttpClient};
