use crate::domain::memory::{MemoryEntry, MemoryType, NewMemory};
use crate::domain::portfolio::{
    AgentHeartbeat, PortfolioSnapshot, Position, PositionSide, PositionStatus,
};
use crate::domain::ports::Clock;
use crate::domain::repositories::SignalRepository;
use crate::domain::signal::{ConsensusVote, Signal, SignalDirection, SignalStatus, VoteType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Monetary columns are stored as fixed-precision decimal TEXT.
const PRICE_SCALE: u32 = 8;

fn price_to_db(value: f64) -> String {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(PRICE_SCALE)
        .to_string()
}

fn price_from_db(value: &str) -> f64 {
    Decimal::from_str(value)
        .unwrap_or_default()
        .to_f64()
        .unwrap_or(0.0)
}

/// Fixed-width UTC timestamps so TEXT comparisons order correctly.
fn datetime_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn datetime_from_db(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub struct SqliteSignalRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn map_signal_row(row: &sqlx::sqlite::SqliteRow) -> Result<Signal> {
        let direction: String = row.try_get("direction")?;
        let status: String = row.try_get("status")?;
        let reasoning: String = row.try_get("reasoning")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Signal {
            id: Some(row.try_get("id")?),
            symbol: row.try_get("symbol")?,
            direction: SignalDirection::parse(&direction),
            confidence: row.try_get("confidence")?,
            source_agent: row.try_get("source_agent")?,
            reasoning: serde_json::from_str(&reasoning).unwrap_or(serde_json::Value::Null),
            entry_price: row
                .try_get::<Option<String>, _>("entry_price")?
                .map(|v| price_from_db(&v)),
            stop_loss: row
                .try_get::<Option<String>, _>("stop_loss")?
                .map(|v| price_from_db(&v)),
            take_profit: row
                .try_get::<Option<String>, _>("take_profit")?
                .map(|v| price_from_db(&v)),
            risk_reward: row.try_get("risk_reward")?,
            timeframe: row.try_get("timeframe")?,
            strategy_id: row.try_get("strategy_id")?,
            status: SignalStatus::parse(&status),
            created_at: datetime_from_db(&created_at),
        })
    }

    fn map_position_row(row: &sqlx::sqlite::SqliteRow) -> Result<Position> {
        let side: String = row.try_get("side")?;
        let status: String = row.try_get("status")?;

        Ok(Position {
            id: Some(row.try_get("id")?),
            symbol: row.try_get("symbol")?,
            side: if side == "short" {
                PositionSide::Short
            } else {
                PositionSide::Long
            },
            entry_price: price_from_db(&row.try_get::<String, _>("entry_price")?),
            current_price: row
                .try_get::<Option<String>, _>("current_price")?
                .map(|v| price_from_db(&v)),
            quantity: price_from_db(&row.try_get::<String, _>("quantity")?),
            unrealized_pnl: price_from_db(&row.try_get::<String, _>("unrealized_pnl")?),
            status: if status == "closed" {
                PositionStatus::Closed
            } else {
                PositionStatus::Open
            },
            strategy_id: row.try_get("strategy_id")?,
            opened_at: row
                .try_get::<Option<String>, _>("opened_at")?
                .as_deref()
                .and_then(datetime_from_db),
            closed_at: row
                .try_get::<Option<String>, _>("closed_at")?
                .as_deref()
                .and_then(datetime_from_db),
        })
    }

    fn map_snapshot_row(row: &sqlx::sqlite::SqliteRow) -> Result<PortfolioSnapshot> {
        let date: String = row.try_get("snapshot_date")?;
        Ok(PortfolioSnapshot {
            snapshot_date: NaiveDate::from_str(&date)
                .context("Invalid snapshot date in database")?,
            total_value: price_from_db(&row.try_get::<String, _>("total_value")?),
            total_pnl: price_from_db(&row.try_get::<String, _>("total_pnl")?),
            total_pnl_pct: row.try_get("total_pnl_pct")?,
            open_positions: row.try_get("open_positions")?,
            win_rate: row.try_get("win_rate")?,
            sharpe_ratio: row.try_get("sharpe_ratio")?,
            max_drawdown: row.try_get("max_drawdown")?,
        })
    }
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn insert_pending(&self, signal: &Signal) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO ualgo_signal
                (symbol, direction, confidence, source_agent, reasoning, status,
                 strategy_id, timeframe, entry_price, stop_loss, take_profit,
                 risk_reward, created_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.symbol)
        .bind(signal.direction.to_string())
        .bind(signal.confidence)
        .bind(&signal.source_agent)
        .bind(signal.reasoning.to_string())
        .bind(&signal.strategy_id)
        .bind(&signal.timeframe)
        .bind(signal.entry_price.map(price_to_db))
        .bind(signal.stop_loss.map(price_to_db))
        .bind(signal.take_profit.map(price_to_db))
        .bind(signal.risk_reward)
        .bind(datetime_to_db(self.clock.now()))
        .execute(&self.pool)
        .await
        .context("Failed to insert signal")?;

        Ok(result.last_insert_rowid())
    }

    async fn update_status(&self, id: i64, status: SignalStatus) -> Result<()> {
        sqlx::query("UPDATE ualgo_signal SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update signal status")?;
        Ok(())
    }

    async fn list_recent(
        &self,
        symbol: Option<&str>,
        status: Option<SignalStatus>,
        limit: usize,
    ) -> Result<Vec<Signal>> {
        let mut sql = String::from("SELECT * FROM ualgo_signal WHERE 1=1");
        if symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(symbol) = symbol {
            query = query.bind(symbol.to_string());
        }
        if let Some(status) = status {
            query = query.bind(status.to_string());
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::map_signal_row).collect()
    }

    async fn get_closed_positions(
        &self,
        strategy_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM ualgo_position
            WHERE strategy_id = ? AND status = 'closed' AND closed_at >= ?
            ORDER BY closed_at ASC
            "#,
        )
        .bind(strategy_id)
        .bind(datetime_to_db(since))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::map_position_row).collect()
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM ualgo_position WHERE status = 'open'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_position_row).collect()
    }

    async fn count_open_positions(&self, symbol: Option<&str>) -> Result<i64> {
        let row = match symbol {
            Some(symbol) => {
                sqlx::query(
                    "SELECT COUNT(*) AS count FROM ualgo_position WHERE status = 'open' AND symbol = ?",
                )
                .bind(symbol.to_string())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS count FROM ualgo_position WHERE status = 'open'")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.try_get("count")?)
    }

    async fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ualgo_portfolio_snapshot
                (snapshot_date, total_value, total_pnl, total_pnl_pct,
                 open_positions, win_rate, sharpe_ratio, max_drawdown)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(snapshot_date) DO UPDATE SET
                total_value = excluded.total_value,
                total_pnl = excluded.total_pnl,
                total_pnl_pct = excluded.total_pnl_pct,
                open_positions = excluded.open_positions,
                win_rate = excluded.win_rate,
                sharpe_ratio = excluded.sharpe_ratio,
                max_drawdown = excluded.max_drawdown
            "#,
        )
        .bind(snapshot.snapshot_date.to_string())
        .bind(price_to_db(snapshot.total_value))
        .bind(price_to_db(snapshot.total_pnl))
        .bind(snapshot.total_pnl_pct)
        .bind(snapshot.open_positions)
        .bind(snapshot.win_rate)
        .bind(snapshot.sharpe_ratio)
        .bind(snapshot.max_drawdown)
        .execute(&self.pool)
        .await
        .context("Failed to upsert snapshot")?;
        Ok(())
    }

    async fn insert_vote(&self, vote: &ConsensusVote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ualgo_consensus_vote
                (signal_id, agent_name, vote, confidence, reasoning, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(vote.signal_id)
        .bind(&vote.agent_name)
        .bind(vote.vote.to_string())
        .bind(vote.confidence)
        .bind(vote.reasoning.to_string())
        .bind(datetime_to_db(self.clock.now()))
        .execute(&self.pool)
        .await
        .context("Failed to insert vote")?;
        Ok(())
    }

    async fn list_votes(&self, signal_id: i64) -> Result<Vec<ConsensusVote>> {
        let rows =
            sqlx::query("SELECT * FROM ualgo_consensus_vote WHERE signal_id = ? ORDER BY id ASC")
                .bind(signal_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|row| {
                let vote: String = row.try_get("vote")?;
                let reasoning: String = row.try_get("reasoning")?;
                Ok(ConsensusVote {
                    signal_id: row.try_get("signal_id")?,
                    agent_name: row.try_get("agent_name")?,
                    vote: VoteType::parse(&vote),
                    confidence: row.try_get("confidence")?,
                    reasoning: serde_json::from_str(&reasoning)
                        .unwrap_or(serde_json::Value::Null),
                })
            })
            .collect()
    }

    async fn upsert_heartbeat(&self, heartbeat: &AgentHeartbeat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ualgo_agent_heartbeat
                (agent_name, status, last_heartbeat, active_tasks, version, uptime_seconds)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_name) DO UPDATE SET
                status = excluded.status,
                last_heartbeat = excluded.last_heartbeat,
                active_tasks = excluded.active_tasks,
                version = excluded.version,
                uptime_seconds = excluded.uptime_seconds
            "#,
        )
        .bind(&heartbeat.agent_name)
        .bind(heartbeat.status.to_string())
        .bind(datetime_to_db(heartbeat.last_heartbeat))
        .bind(heartbeat.active_tasks)
        .bind(&heartbeat.version)
        .bind(heartbeat.uptime_seconds)
        .execute(&self.pool)
        .await
        .context("Failed to upsert heartbeat")?;
        Ok(())
    }

    async fn insert_memory(&self, memory: &NewMemory) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO ualgo_agent_memory
                (agent_name, memory_type, symbol, content, importance, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&memory.agent_name)
        .bind(memory.memory_type.to_string())
        .bind(&memory.symbol)
        .bind(memory.content.to_string())
        .bind(memory.importance)
        .bind(datetime_to_db(self.clock.now()))
        .bind(memory.expires_at.map(datetime_to_db))
        .execute(&self.pool)
        .await
        .context("Failed to insert memory")?;

        Ok(result.last_insert_rowid())
    }

    async fn list_memory(
        &self,
        agent: &str,
        memory_type: Option<MemoryType>,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let mut sql = String::from(
            "SELECT * FROM ualgo_agent_memory
             WHERE agent_name = ? AND (expires_at IS NULL OR expires_at > ?)",
        );
        if memory_type.is_some() {
            sql.push_str(" AND memory_type = ?");
        }
        if symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        sql.push_str(" ORDER BY importance DESC, created_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql)
            .bind(agent.to_string())
            .bind(datetime_to_db(self.clock.now()));
        if let Some(memory_type) = memory_type {
            query = query.bind(memory_type.to_string());
        }
        if let Some(symbol) = symbol {
            query = query.bind(symbol.to_string());
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let memory_type: String = row.try_get("memory_type")?;
                let content: String = row.try_get("content")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(MemoryEntry {
                    id: row.try_get("id")?,
                    agent_name: row.try_get("agent_name")?,
                    memory_type: MemoryType::parse(&memory_type),
                    symbol: row.try_get("symbol")?,
                    content: serde_json::from_str(&content).unwrap_or(serde_json::Value::Null),
                    importance: row.try_get("importance")?,
                    created_at: datetime_from_db(&created_at).unwrap_or_else(|| self.clock.now()),
                    expires_at: row
                        .try_get::<Option<String>, _>("expires_at")?
                        .as_deref()
                        .and_then(datetime_from_db),
                })
            })
            .collect()
    }

    async fn recent_signal_confidences(&self, symbol: &str, hours: i64) -> Result<Vec<f64>> {
        let cutoff = self.clock.now() - Duration::hours(hours);
        let rows = sqlx::query(
            r#"
            SELECT confidence FROM ualgo_signal
            WHERE symbol = ? AND created_at >= ?
            ORDER BY created_at DESC LIMIT 30
            "#,
        )
        .bind(symbol.to_string())
        .bind(datetime_to_db(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get("confidence")?))
            .collect()
    }

    async fn count_signals_since_today(&self) -> Result<i64> {
        let midnight = self
            .clock
            .now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or_else(|| self.clock.now());
        let row = sqlx::query("SELECT COUNT(*) AS count FROM ualgo_signal WHERE created_at >= ?")
            .bind(datetime_to_db(midnight))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    async fn portfolio_latest_snapshot(&self) -> Result<Option<PortfolioSnapshot>> {
        let row = sqlx::query(
            "SELECT * FROM ualgo_portfolio_snapshot ORDER BY snapshot_date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::map_snapshot_row).transpose()
    }
}
