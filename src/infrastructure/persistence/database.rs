use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Database wrapper owning the connection pool and schema.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
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

        let pool = SqlitePoolOptions::new()
            .min_connections(2)
            .max_connections(10)
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
            CREATE TABLE IF NOT EXISTS ualgo_signal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                confidence REAL NOT NULL,
                source_agent TEXT NOT NULL,
                reasoning TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'pending',
                strategy_id TEXT NOT NULL DEFAULT 'default',
                timeframe TEXT NOT NULL DEFAULT '1h',
                entry_price TEXT,
                stop_loss TEXT,
                take_profit TEXT,
                risk_reward REAL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signal table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signal_symbol_created
            ON ualgo_signal (symbol, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signal index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ualgo_consensus_vote (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signal_id INTEGER NOT NULL REFERENCES ualgo_signal(id),
                agent_name TEXT NOT NULL,
                vote TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasoning TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create consensus vote table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_vote_signal
            ON ualgo_consensus_vote (signal_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create vote index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ualgo_position (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                current_price TEXT,
                quantity TEXT NOT NULL,
                unrealized_pnl TEXT NOT NULL DEFAULT '0',
                status TEXT NOT NULL DEFAULT 'open',
                strategy_id TEXT NOT NULL DEFAULT 'default',
                opened_at TEXT,
                closed_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create position table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_position_status
            ON ualgo_position (status, strategy_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create position index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ualgo_portfolio_snapshot (
                snapshot_date TEXT PRIMARY KEY,
                total_value TEXT NOT NULL,
                total_pnl TEXT NOT NULL DEFAULT '0',
                total_pnl_pct REAL NOT NULL DEFAULT 0,
                open_positions INTEGER NOT NULL DEFAULT 0,
                win_rate REAL,
                sharpe_ratio REAL,
                max_drawdown REAL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create portfolio snapshot table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ualgo_agent_heartbeat (
                agent_name TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                last_heartbeat TEXT NOT NULL,
                active_tasks INTEGER NOT NULL DEFAULT 0,
                version TEXT NOT NULL DEFAULT '',
                uptime_seconds INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create heartbeat table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ualgo_agent_memory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name TEXT NOT NULL,
                memory_type TEXT NOT NULL,
                symbol TEXT,
                content TEXT NOT NULL DEFAULT '{}',
                importance REAL NOT NULL DEFAULT 0.5,
                created_at TEXT NOT NULL,
                expires_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create agent memory table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_memory_agent_type
            ON ualgo_agent_memory (agent_name, memory_type);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create memory index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
