//! SQLite storage for evaluation runs, scored accounts and selections

use crate::pipeline::{RunConfig, RunStats, RunStore};
use crate::types::ScoredAccount;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One row of the runs table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub status: RunStatus,
    pub config: RunConfig,
    pub stats: Option<RunStats>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Latest known state of an account across runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAccount {
    pub address: String,
    pub composite_score: f64,
    pub times_seen: i64,
    pub last_run_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// An account selected in a run, with the snapshot taken in that run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedAccount {
    pub rank: i64,
    pub account: ScoredAccount,
}

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Add columns introduced after the first schema
    async fn run_migrations(&self) -> Result<()> {
        let table_info: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as("PRAGMA table_info(accounts)")
                .fetch_all(&self.pool)
                .await
                .unwrap_or_default();

        let has_times_seen = table_info.iter().any(|(_, name, _, _, _, _)| name == "times_seen");
        if !table_info.is_empty() && !has_times_seen {
            info!("Migrating accounts table: adding times_seen column");
            sqlx::query("ALTER TABLE accounts ADD COLUMN times_seen INTEGER NOT NULL DEFAULT 1")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Initialize database schema
    async fn initialize(&self) -> Result<()> {
        self.run_migrations().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                config TEXT NOT NULL,
                stats TEXT,
                error TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Latest metrics per address, overwritten by every run
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                address TEXT PRIMARY KEY,
                composite_score REAL NOT NULL,
                strict_win_rate REAL,
                proxy_win_rate REAL,
                confidence_score REAL NOT NULL,
                total_trades INTEGER NOT NULL,
                total_volume_usd REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                reason_tags TEXT NOT NULL,
                times_seen INTEGER NOT NULL DEFAULT 1,
                last_run_id TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                address TEXT NOT NULL,
                composite_score REAL NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (run_id, address),
                FOREIGN KEY (run_id) REFERENCES runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS selected_accounts (
                run_id TEXT NOT NULL,
                rank INTEGER NOT NULL,
                address TEXT NOT NULL,
                composite_score REAL NOT NULL,
                PRIMARY KEY (run_id, address),
                FOREIGN KEY (run_id) REFERENCES runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_address ON account_snapshots(address)")
            .execute(&self.pool)
            .await?;

        info!("Database initialized");
        Ok(())
    }

    // ==================== RUNS ====================

    /// Most recent runs first
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_run).collect()
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    // ==================== ACCOUNTS ====================

    pub async fn get_account(&self, address: &str) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            r#"
            SELECT address, composite_score, times_seen, last_run_id, first_seen_at, last_seen_at
            FROM accounts WHERE address = ?
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let first_seen_at: String = row.get("first_seen_at");
                let last_seen_at: String = row.get("last_seen_at");
                Ok(Some(StoredAccount {
                    address: row.get("address"),
                    composite_score: row.get("composite_score"),
                    times_seen: row.get("times_seen"),
                    last_run_id: row.get("last_run_id"),
                    first_seen_at: parse_timestamp(&first_seen_at)?,
                    last_seen_at: parse_timestamp(&last_seen_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Selected accounts of a run in rank order
    pub async fn get_selected(&self, run_id: &str) -> Result<Vec<SelectedAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT s.rank, a.data
            FROM selected_accounts s
            JOIN account_snapshots a ON a.run_id = s.run_id AND a.address = s.address
            WHERE s.run_id = ?
            ORDER BY s.rank
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SelectedAccount> {
                let data: String = row.get("data");
                Ok(SelectedAccount {
                    rank: row.get("rank"),
                    account: serde_json::from_str(&data).context("Corrupt account snapshot")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RunStore for Database {
    async fn create_run(&self, config: &RunConfig) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO runs (id, status, config, started_at) VALUES (?, ?, ?, ?)")
            .bind(&run_id)
            .bind(RunStatus::Running.to_string())
            .bind(serde_json::to_string(config)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(run_id)
    }

    async fn upsert_account(&self, run_id: &str, account: &ScoredAccount) -> Result<()> {
        let m = &account.metrics;
        let now = Utc::now().to_rfc3339();
        let tags: Vec<&str> = account.reason_tags.iter().map(|t| t.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO accounts (
                address, composite_score, strict_win_rate, proxy_win_rate, confidence_score,
                total_trades, total_volume_usd, realized_pnl, reason_tags,
                times_seen, last_run_id, first_seen_at, last_seen_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                composite_score = excluded.composite_score,
                strict_win_rate = excluded.strict_win_rate,
                proxy_win_rate = excluded.proxy_win_rate,
                confidence_score = excluded.confidence_score,
                total_trades = excluded.total_trades,
                total_volume_usd = excluded.total_volume_usd,
                realized_pnl = excluded.realized_pnl,
                reason_tags = excluded.reason_tags,
                times_seen = accounts.times_seen + 1,
                last_run_id = excluded.last_run_id,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(account.address())
        .bind(account.composite_score)
        .bind(m.strict_win_rate)
        .bind(m.proxy_win_rate)
        .bind(m.confidence_score)
        .bind(m.total_trades as i64)
        .bind(m.total_volume_usd)
        .bind(m.realized_pnl)
        .bind(serde_json::to_string(&tags)?)
        .bind(run_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_snapshot(&self, run_id: &str, account: &ScoredAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO account_snapshots (run_id, address, composite_score, data, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(account.address())
        .bind(account.composite_score)
        .bind(serde_json::to_string(account)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_selected(&self, run_id: &str, selected: &[ScoredAccount]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (i, account) in selected.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO selected_accounts (run_id, rank, address, composite_score)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(i as i64 + 1)
            .bind(account.address())
            .bind(account.composite_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn complete_run(&self, run_id: &str, stats: &RunStats) -> Result<()> {
        sqlx::query("UPDATE runs SET status = ?, stats = ?, completed_at = ? WHERE id = ?")
            .bind(RunStatus::Completed.to_string())
            .bind(serde_json::to_string(stats)?)
            .bind(Utc::now().to_rfc3339())
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE runs SET status = ?, error = ?, completed_at = ? WHERE id = ?")
            .bind(RunStatus::Failed.to_string())
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn row_to_run(row: &SqliteRow) -> Result<RunRecord> {
    let status_str: String = row.get("status");
    let status = match status_str.as_str() {
        "Running" => RunStatus::Running,
        "Completed" => RunStatus::Completed,
        _ => RunStatus::Failed,
    };

    let config: String = row.get("config");
    let stats: Option<String> = row.get("stats");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(RunRecord {
        id: row.get("id"),
        status,
        config: serde_json::from_str(&config).context("Corrupt run config")?,
        stats: stats.map(|s| serde_json::from_str(&s)).transpose()?,
        error: row.get("error"),
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    })
}
