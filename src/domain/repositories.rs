//! Repository Pattern Abstractions
//!
//! `SignalRepository` is the only persistence boundary the core requires.
//! The SQLite implementation lives in `infrastructure::persistence`; a
//! thread-safe in-memory implementation backs the integration tests.

use crate::domain::memory::{MemoryEntry, MemoryType, NewMemory};
use crate::domain::portfolio::{AgentHeartbeat, PortfolioSnapshot, Position};
use crate::domain::signal::{ConsensusVote, Signal, SignalStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Insert a candidate signal with status `pending`, returning its id.
    async fn insert_pending(&self, signal: &Signal) -> Result<i64>;

    async fn update_status(&self, id: i64, status: SignalStatus) -> Result<()>;

    /// Most recent signals, newest first, optionally filtered.
    async fn list_recent(
        &self,
        symbol: Option<&str>,
        status: Option<SignalStatus>,
        limit: usize,
    ) -> Result<Vec<Signal>>;

    async fn get_closed_positions(
        &self,
        strategy_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>>;

    async fn get_open_positions(&self) -> Result<Vec<Position>>;

    async fn count_open_positions(&self, symbol: Option<&str>) -> Result<i64>;

    /// Insert or replace the snapshot for its date.
    async fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()>;

    async fn insert_vote(&self, vote: &ConsensusVote) -> Result<()>;

    /// Votes for a signal in insertion order.
    async fn list_votes(&self, signal_id: i64) -> Result<Vec<ConsensusVote>>;

    async fn upsert_heartbeat(&self, heartbeat: &AgentHeartbeat) -> Result<()>;

    async fn insert_memory(&self, memory: &NewMemory) -> Result<i64>;

    /// Recall memory rows: expired rows excluded, ordered by importance then
    /// recency.
    async fn list_memory(
        &self,
        agent: &str,
        memory_type: Option<MemoryType>,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>>;

    /// Confidences of signals for a symbol created within the last `hours`.
    async fn recent_signal_confidences(&self, symbol: &str, hours: i64) -> Result<Vec<f64>>;

    /// Signals created since UTC midnight.
    async fn count_signals_since_today(&self) -> Result<i64>;

    async fn portfolio_latest_snapshot(&self) -> Result<Option<PortfolioSnapshot>>;
}
