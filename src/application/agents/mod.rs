//! The agent swarm: shared agent plumbing plus the five agents.

pub mod alpha_scout;
pub mod orchestrator;
pub mod quant_lab;
pub mod risk_sentinel;
pub mod technical_analyst;

use crate::application::context::AgentContext;
use crate::application::memory::MemoryCore;
use crate::domain::portfolio::{AgentHeartbeat, HeartbeatStatus};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;
use tracing::{error, warn};

/// Canonical agent names, used for vote weights and heartbeat rows.
pub mod names {
    pub const ALPHA_SCOUT: &str = "alpha_scout";
    pub const TECHNICAL_ANALYST: &str = "technical_analyst";
    pub const RISK_SENTINEL: &str = "risk_sentinel";
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const QUANT_LAB: &str = "quant_lab";
}

/// Minimal contract every swarm member satisfies. Analysis entry points are
/// typed per agent; callers hold concrete handles.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    fn role(&self) -> &'static str;
    fn version(&self) -> &'static str;
    async fn heartbeat(&self) -> Result<()>;
}

/// Shared agent state: identity, memory, task gauge, uptime.
pub struct AgentCore {
    name: &'static str,
    role: &'static str,
    version: &'static str,
    ctx: AgentContext,
    memory: MemoryCore,
    started_at: Instant,
    active_tasks: AtomicI64,
}

impl AgentCore {
    pub fn new(name: &'static str, role: &'static str, version: &'static str, ctx: AgentContext) -> Self {
        let memory = MemoryCore::new(name, ctx.repo.clone(), ctx.clock.clone());
        Self {
            name,
            role,
            version,
            ctx,
            memory,
            started_at: Instant::now(),
            active_tasks: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn ctx(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn memory(&self) -> &MemoryCore {
        &self.memory
    }

    /// Persist this agent's liveness row.
    pub async fn heartbeat(&self) -> Result<()> {
        let heartbeat = AgentHeartbeat {
            agent_name: self.name.to_string(),
            status: HeartbeatStatus::Alive,
            last_heartbeat: self.ctx.clock.now(),
            active_tasks: self.active_tasks.load(Ordering::SeqCst),
            version: self.version.to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs() as i64,
        };
        self.ctx.repo.upsert_heartbeat(&heartbeat).await
    }

    /// Run one analysis with tracking: bump the task gauge, heartbeat,
    /// broadcast the result, and memoize failures. No error escapes without
    /// being recorded first.
    pub async fn track<T, F>(&self, symbol: &str, analysis: F) -> Result<T>
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.heartbeat().await {
            warn!("[{}] heartbeat failed: {e:#}", self.name);
        }

        let result = analysis.await;
        self.active_tasks.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(value) => {
                let payload = serde_json::json!({
                    "symbol": symbol,
                    "result": serde_json::to_value(&value).unwrap_or(serde_json::Value::Null),
                });
                self.ctx
                    .bus
                    .broadcast(self.name, &format!("analysis.{}", self.name), payload)
                    .await;
                Ok(value)
            }
            Err(e) => {
                error!("[{}] analysis error for {symbol}: {e:#}", self.name);
                let _ = self
                    .memory
                    .store_error(serde_json::json!({
                        "symbol": symbol,
                        "error": e.to_string(),
                    }))
                    .await;
                Err(e)
            }
        }
    }
}
