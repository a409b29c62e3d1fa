//! Durable price history on SQLite.
//!
//! Append-only snapshots table, deduplicated per URL: a snapshot arriving
//! within the dedup window of the latest stored one for the same URL is
//! dropped. The check-then-insert pair runs under a single writer lock so
//! concurrent batch workers cannot race past the window.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::errors::ScrapeError;
use crate::domain::product::{ParseStatus, PriceSnapshot};

use super::config::HistoryConfig;

pub struct PriceHistory {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    dedup_window: Duration,
    default_limit: usize,
    max_limit: usize,
}

impl PriceHistory {
    pub async fn connect(config: &HistoryConfig) -> Result<Self, ScrapeError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| ScrapeError::History(format!("bad database url: {e}")))?
            .create_if_missing(true);

        // One connection: writes are serialized anyway, and a pooled
        // `sqlite::memory:` would give every connection a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ScrapeError::History(format!("connect: {e}")))?;

        let history = Self {
            pool,
            write_lock: Mutex::new(()),
            dedup_window: Duration::seconds(config.dedup_window_secs),
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        };
        history.migrate().await?;
        info!(url = %config.database_url, "price history ready");
        Ok(history)
    }

    async fn migrate(&self) -> Result<(), ScrapeError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_url TEXT NOT NULL,
                platform TEXT NOT NULL,
                title TEXT,
                price REAL NOT NULL,
                currency TEXT NOT NULL,
                collected_at TEXT NOT NULL,
                parse_status TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScrapeError::History(format!("migrate: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_url_time \
             ON price_snapshots (source_url, collected_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScrapeError::History(format!("migrate index: {e}")))?;

        Ok(())
    }

    /// Appends a snapshot unless an equivalent one landed within the dedup
    /// window. Returns whether a row was written.
    pub async fn append(&self, snapshot: &PriceSnapshot) -> Result<bool, ScrapeError> {
        let _guard = self.write_lock.lock().await;

        let latest: Option<String> = sqlx::query_scalar(
            "SELECT collected_at FROM price_snapshots \
             WHERE source_url = ? ORDER BY collected_at DESC LIMIT 1",
        )
        .bind(&snapshot.source_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ScrapeError::History(format!("dedup lookup: {e}")))?;

        if let Some(latest) = latest.and_then(|t| t.parse::<DateTime<Utc>>().ok()) {
            if snapshot.collected_at - latest < self.dedup_window {
                debug!(url = %snapshot.source_url, "snapshot within dedup window, skipped");
                return Ok(false);
            }
        }

        sqlx::query(
            "INSERT INTO price_snapshots \
             (source_url, platform, title, price, currency, collected_at, parse_status) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&snapshot.source_url)
        .bind(&snapshot.platform)
        .bind(&snapshot.title)
        .bind(snapshot.price)
        .bind(&snapshot.currency)
        .bind(snapshot.collected_at.to_rfc3339())
        .bind(snapshot.parse_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| ScrapeError::History(format!("insert: {e}")))?;

        Ok(true)
    }

    /// Most recent snapshots for a URL, newest first. `limit` falls back to
    /// the configured default and is clamped to the configured maximum.
    pub async fn history(
        &self,
        source_url: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PriceSnapshot>, ScrapeError> {
        let limit = limit.unwrap_or(self.default_limit).min(self.max_limit).max(1);

        let rows = sqlx::query(
            "SELECT source_url, platform, title, price, currency, collected_at, parse_status \
             FROM price_snapshots WHERE source_url = ? \
             ORDER BY collected_at DESC LIMIT ?",
        )
        .bind(source_url)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ScrapeError::History(format!("select: {e}")))?;

        rows.iter().map(row_to_snapshot).collect()
    }
}

fn row_to_snapshot(row: &SqliteRow) -> Result<PriceSnapshot, ScrapeError> {
    let collected_at: String = row
        .try_get("collected_at")
        .map_err(|e| ScrapeError::History(format!("row: {e}")))?;
    let collected_at = collected_at
        .parse::<DateTime<Utc>>()
        .map_err(|e| ScrapeError::History(format!("timestamp: {e}")))?;
    let status: String = row
        .try_get("parse_status")
        .map_err(|e| ScrapeError::History(format!("row: {e}")))?;

    Ok(PriceSnapshot {
        source_url: row
            .try_get("source_url")
            .map_err(|e| ScrapeError::History(format!("row: {e}")))?,
        platform: row
            .try_get("platform")
            .map_err(|e| ScrapeError::History(format!("row: {e}")))?,
        title: row
            .try_get("title")
            .map_err(|e| ScrapeError::History(format!("row: {e}")))?,
        price: row
            .try_get("price")
            .map_err(|e| ScrapeError::History(format!("row: {e}")))?,
        currency: row
            .try_get("currency")
            .map_err(|e| ScrapeError::History(format!("row: {e}")))?,
        collected_at,
        parse_status: ParseStatus::from_label(&status),
    })
}
