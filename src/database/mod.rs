use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::{HistoryEntry, Observation, PublishReason};
use crate::traits::HistorySink;

/// Append-only publish history in SQLite
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// A history row as read back for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub published_at: DateTime<Utc>,
    pub reason: String,
    pub fingerprint: String,
    pub message_id: Option<String>,
    pub snapshot: Observation,
}

/// Parent directory of a file-backed sqlite URL
fn database_dir(db_url: &str) -> Option<&Path> {
    let path = db_url
        .trim_start_matches("sqlite:")
        .trim_start_matches("//")
        .split('?')
        .next()?;
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        let in_memory = db_url.contains(":memory:");

        // Create database file if it doesn't exist
        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating history database {}", db_url);
            if let Some(dir) = database_dir(db_url) {
                tokio::fs::create_dir_all(dir).await?;
            }
            Sqlite::create_database(db_url).await?;
        }

        // An in-memory database lives and dies with its connection
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("History database initialized successfully");
        Ok(Self { pool })
    }

    pub async fn append_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let snapshot = serde_json::to_string(&entry.snapshot)?;

        sqlx::query(
            r"
            INSERT INTO history (published_at, reason, fingerprint, message_id, snapshot)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(entry.published_at)
        .bind(entry.reason.to_string())
        .bind(&entry.fingerprint)
        .bind(&entry.message_id)
        .bind(snapshot)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<HistoryRow>> {
        let rows = sqlx::query(
            r"
            SELECT published_at, reason, fingerprint, message_id, snapshot
            FROM history
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let snapshot: String = row.get("snapshot");
                Ok(HistoryRow {
                    published_at: row.get("published_at"),
                    reason: row.get("reason"),
                    fingerprint: row.get("fingerprint"),
                    message_id: row.get("message_id"),
                    snapshot: serde_json::from_str(&snapshot)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HistorySink for Database {
    async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.append_entry(entry).await
    }
}

impl HistoryRow {
    pub fn is_forced(&self) -> bool {
        self.reason == PublishReason::Forced.to_string()
    }
}
