//! Per-agent durable memory over the signal repository.

use crate::domain::memory::{DecisionSummary, FlagCount, MemoryEntry, MemoryType, NewMemory};
use crate::domain::ports::Clock;
use crate::domain::repositories::SignalRepository;
use anyhow::Result;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

const LEARNING_TTL_HOURS: i64 = 168; // one week
const ERROR_TTL_HOURS: i64 = 72;

pub struct MemoryCore {
    agent_name: String,
    repo: Arc<dyn SignalRepository>,
    clock: Arc<dyn Clock>,
}

impl MemoryCore {
    pub fn new(agent_name: &str, repo: Arc<dyn SignalRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            repo,
            clock,
        }
    }

    /// Store a memory entry, resolving the TTL into an absolute expiry.
    pub async fn store(
        &self,
        memory_type: MemoryType,
        content: serde_json::Value,
        symbol: Option<&str>,
        importance: f64,
        ttl_hours: Option<i64>,
    ) -> Result<i64> {
        let expires_at = ttl_hours.map(|h| self.clock.now() + Duration::hours(h));
        self.repo
            .insert_memory(&NewMemory {
                agent_name: self.agent_name.clone(),
                memory_type,
                symbol: symbol.map(str::to_string),
                content,
                importance,
                expires_at,
            })
            .await
    }

    /// Recall recent memories; expired rows never surface.
    pub async fn recall(
        &self,
        memory_type: Option<MemoryType>,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        self.repo
            .list_memory(&self.agent_name, memory_type, symbol, limit)
            .await
    }

    pub async fn store_decision(
        &self,
        symbol: &str,
        decision: serde_json::Value,
        importance: f64,
    ) -> Result<i64> {
        self.store(MemoryType::Decision, decision, Some(symbol), importance, None)
            .await
    }

    pub async fn store_learning(&self, content: serde_json::Value) -> Result<i64> {
        self.store(
            MemoryType::Learning,
            content,
            None,
            0.5,
            Some(LEARNING_TTL_HOURS),
        )
        .await
    }

    pub async fn store_error(&self, error: serde_json::Value) -> Result<i64> {
        self.store(MemoryType::Error, error, None, 0.3, Some(ERROR_TTL_HOURS))
            .await
    }

    pub async fn recent_decisions(&self, symbol: &str, limit: usize) -> Result<Vec<MemoryEntry>> {
        self.recall(Some(MemoryType::Decision), Some(symbol), limit)
            .await
    }

    /// Distill recent decisions for a symbol into approval rate, confidence,
    /// and the most frequent risk flags.
    pub async fn summarize_decisions(&self, symbol: &str, limit: usize) -> Result<DecisionSummary> {
        let decisions = self.recent_decisions(symbol, limit).await?;
        if decisions.is_empty() {
            return Ok(DecisionSummary {
                symbol: symbol.to_string(),
                count: 0,
                approved: 0,
                rejected: 0,
                approval_rate: 0.0,
                avg_confidence: 0.0,
                top_risk_flags: Vec::new(),
                period_start: None,
                period_end: None,
            });
        }

        let mut approved = 0usize;
        let mut rejected = 0usize;
        let mut confidences = Vec::new();
        let mut flag_counts: HashMap<String, usize> = HashMap::new();

        for entry in &decisions {
            let content = &entry.content;
            if content
                .get("approved")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                approved += 1;
            } else {
                rejected += 1;
            }
            if let Some(conf) = content.get("weighted_confidence").and_then(|v| v.as_f64()) {
                confidences.push(conf);
            }
            if let Some(flags) = content.get("risk_flags").and_then(|v| v.as_array()) {
                for flag in flags.iter().filter_map(|f| f.as_str()) {
                    // Group by flag name, dropping the parenthesized detail.
                    let prefix = flag.split('(').next().unwrap_or(flag).trim().to_string();
                    *flag_counts.entry(prefix).or_insert(0) += 1;
                }
            }
        }

        let total = approved + rejected;
        let avg_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        let mut top_risk_flags: Vec<FlagCount> = flag_counts
            .into_iter()
            .map(|(flag, count)| FlagCount { flag, count })
            .collect();
        top_risk_flags.sort_by(|a, b| b.count.cmp(&a.count).then(a.flag.cmp(&b.flag)));
        top_risk_flags.truncate(3);

        Ok(DecisionSummary {
            symbol: symbol.to_string(),
            count: total,
            approved,
            rejected,
            approval_rate: if total > 0 {
                approved as f64 / total as f64
            } else {
                0.0
            },
            avg_confidence,
            top_risk_flags,
            period_start: decisions.last().map(|d| d.created_at),
            period_end: decisions.first().map(|d| d.created_at),
        })
    }
}
