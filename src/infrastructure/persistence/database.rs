use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Connection handle for the model store, with explicit open/close
/// lifecycle. Owned by the caller and injected where needed; nothing in the
/// crate holds a process-global connection.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal); // Better for concurrency

        // An in-memory database exists per connection; the pool must not
        // fan out over several of them.
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                symbol TEXT NOT NULL,
                end_date TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                architecture TEXT NOT NULL,
                weights TEXT NOT NULL,
                fit_quality REAL NOT NULL,
                lookback INTEGER NOT NULL,
                scaler_min REAL NOT NULL,
                scaler_max REAL NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (symbol, end_date)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create models table")?;

        info!("Database schema initialized.");
        Ok(())
    }

    /// Close the pool and release the storage handle.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed.");
    }
}
