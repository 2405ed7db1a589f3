use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Decision,
    Learning,
    Pattern,
    Error,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Learning => write!(f, "learning"),
            Self::Pattern => write!(f, "pattern"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl MemoryType {
    pub fn parse(s: &str) -> Self {
        match s {
            "learning" => Self::Learning,
            "pattern" => Self::Pattern,
            "error" => Self::Error,
            _ => Self::Decision,
        }
    }
}

/// Payload for a new memory row. `expires_at` is resolved from the TTL at
/// store time; expiry is logical (filtered on recall).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub agent_name: String,
    pub memory_type: MemoryType,
    pub symbol: Option<String>,
    pub content: serde_json::Value,
    pub importance: f64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A recalled memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub agent_name: String,
    pub memory_type: MemoryType,
    pub symbol: Option<String>,
    pub content: serde_json::Value,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagCount {
    pub flag: String,
    pub count: usize,
}

/// Distillation of recent decisions for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub symbol: String,
    pub count: usize,
    pub approved: usize,
    pub rejected: usize,
    pub approval_rate: f64,
    pub avg_confidence: f64,
    pub top_risk_flags: Vec<FlagCount>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}
