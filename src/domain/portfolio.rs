use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A position owned by the external execution layer. The core only reads
/// these: closed rows for performance analysis, open rows for risk checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Option<i64>,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub current_price: Option<f64>,
    pub quantity: f64,
    pub unrealized_pnl: f64,
    pub status: PositionStatus,
    pub strategy_id: String,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Daily portfolio snapshot, upserted by date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub snapshot_date: NaiveDate,
    pub total_value: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub open_positions: i64,
    pub win_rate: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Alive,
    Degraded,
    Dead,
}

impl fmt::Display for HeartbeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::Degraded => write!(f, "degraded"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// Per-agent liveness row, one per agent name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    pub agent_name: String,
    pub status: HeartbeatStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub active_tasks: i64,
    pub version: String,
    pub uptime_seconds: i64,
}
