//! Thread-safe in-memory `SignalRepository`. Backs the integration tests and
//! storage-free runs; honors the same ordering and expiry contracts as the
//! SQLite implementation.

use crate::domain::memory::{MemoryEntry, MemoryType, NewMemory};
use crate::domain::portfolio::{AgentHeartbeat, PortfolioSnapshot, Position, PositionStatus};
use crate::domain::ports::Clock;
use crate::domain::repositories::SignalRepository;
use crate::domain::signal::{ConsensusVote, Signal, SignalStatus};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Store {
    signals: Vec<Signal>,
    votes: Vec<ConsensusVote>,
    positions: Vec<Position>,
    snapshots: HashMap<chrono::NaiveDate, PortfolioSnapshot>,
    heartbeats: HashMap<String, AgentHeartbeat>,
    memories: Vec<MemoryEntry>,
    next_signal_id: i64,
    next_memory_id: i64,
}

pub struct InMemorySignalRepository {
    store: Mutex<Store>,
    clock: Arc<dyn Clock>,
}

impl InMemorySignalRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(Store {
                next_signal_id: 1,
                next_memory_id: 1,
                ..Store::default()
            }),
            clock,
        }
    }

    /// Seed a position row; tests stand in for the external execution layer.
    pub fn insert_position(&self, position: Position) {
        let mut store = self.store.lock().expect("repository poisoned");
        store.positions.push(position);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Store>> {
        self.store.lock().map_err(|_| anyhow!("repository poisoned"))
    }
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn insert_pending(&self, signal: &Signal) -> Result<i64> {
        let mut store = self.lock()?;
        let id = store.next_signal_id;
        store.next_signal_id += 1;

        let mut row = signal.clone();
        row.id = Some(id);
        row.status = SignalStatus::Pending;
        row.created_at = Some(self.clock.now());
        store.signals.push(row);
        Ok(id)
    }

    async fn update_status(&self, id: i64, status: SignalStatus) -> Result<()> {
        let mut store = self.lock()?;
        let signal = store
            .signals
            .iter_mut()
            .find(|s| s.id == Some(id))
            .ok_or_else(|| anyhow!("signal {id} not found"))?;
        signal.status = status;
        Ok(())
    }

    async fn list_recent(
        &self,
        symbol: Option<&str>,
        status: Option<SignalStatus>,
        limit: usize,
    ) -> Result<Vec<Signal>> {
        let store = self.lock()?;
        let mut matching: Vec<Signal> = store
            .signals
            .iter()
            .filter(|s| symbol.is_none_or(|sym| s.symbol == sym))
            .filter(|s| status.is_none_or(|st| s.status == st))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn get_closed_positions(
        &self,
        strategy_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>> {
        let store = self.lock()?;
        let mut rows: Vec<Position> = store
            .positions
            .iter()
            .filter(|p| p.strategy_id == strategy_id && p.status == PositionStatus::Closed)
            .filter(|p| p.closed_at.is_some_and(|c| c >= since))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.closed_at);
        Ok(rows)
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let store = self.lock()?;
        Ok(store
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn count_open_positions(&self, symbol: Option<&str>) -> Result<i64> {
        let store = self.lock()?;
        Ok(store
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .filter(|p| symbol.is_none_or(|s| p.symbol == s))
            .count() as i64)
    }

    async fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        let mut store = self.lock()?;
        store
            .snapshots
            .insert(snapshot.snapshot_date, snapshot.clone());
        Ok(())
    }

    async fn insert_vote(&self, vote: &ConsensusVote) -> Result<()> {
        let mut store = self.lock()?;
        store.votes.push(vote.clone());
        Ok(())
    }

    async fn list_votes(&self, signal_id: i64) -> Result<Vec<ConsensusVote>> {
        let store = self.lock()?;
        Ok(store
            .votes
            .iter()
            .filter(|v| v.signal_id == signal_id)
            .cloned()
            .collect())
    }

    async fn upsert_heartbeat(&self, heartbeat: &AgentHeartbeat) -> Result<()> {
        let mut store = self.lock()?;
        store
            .heartbeats
            .insert(heartbeat.agent_name.clone(), heartbeat.clone());
        Ok(())
    }

    async fn insert_memory(&self, memory: &NewMemory) -> Result<i64> {
        let mut store = self.lock()?;
        let id = store.next_memory_id;
        store.next_memory_id += 1;
        store.memories.push(MemoryEntry {
            id,
            agent_name: memory.agent_name.clone(),
            memory_type: memory.memory_type,
            symbol: memory.symbol.clone(),
            content: memory.content.clone(),
            importance: memory.importance,
            created_at: self.clock.now(),
            expires_at: memory.expires_at,
        });
        Ok(id)
    }

    async fn list_memory(
        &self,
        agent: &str,
        memory_type: Option<MemoryType>,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let now = self.clock.now();
        let store = self.lock()?;
        let mut rows: Vec<MemoryEntry> = store
            .memories
            .iter()
            .filter(|m| m.agent_name == agent)
            .filter(|m| memory_type.is_none_or(|t| m.memory_type == t))
            .filter(|m| symbol.is_none_or(|s| m.symbol.as_deref() == Some(s)))
            .filter(|m| m.expires_at.is_none_or(|e| e > now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_signal_confidences(&self, symbol: &str, hours: i64) -> Result<Vec<f64>> {
        let cutoff = self.clock.now() - Duration::hours(hours);
        let store = self.lock()?;
        Ok(store
            .signals
            .iter()
            .filter(|s| s.symbol == symbol)
            .filter(|s| s.created_at.is_some_and(|c| c >= cutoff))
            .map(|s| s.confidence)
            .collect())
    }

    async fn count_signals_since_today(&self) -> Result<i64> {
        let midnight = self
            .clock
            .now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or_else(|| self.clock.now());
        let store = self.lock()?;
        Ok(store
            .signals
            .iter()
            .filter(|s| s.created_at.is_some_and(|c| c >= midnight))
            .count() as i64)
    }

    async fn portfolio_latest_snapshot(&self) -> Result<Option<PortfolioSnapshot>> {
        let store = self.lock()?;
        Ok(store
            .snapshots
            .iter()
            .max_by_key(|(date, _)| **date)
            .map(|(_, snap)| snap.clone()))
    }
}
