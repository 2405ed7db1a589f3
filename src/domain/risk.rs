use crate::domain::signal::{SignalDirection, VoteType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide latch owned by the Risk Sentinel. While active, every cycle
/// is rejected before votes are collected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Trade proposal passed to the Risk Sentinel for per-trade checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedTrade {
    pub direction: SignalDirection,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub quantity: f64,
}

/// Portfolio metrics the sentinel evaluates against its limits. Defaults are
/// the safe fallbacks used when the database is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub open_positions: i64,
    pub total_value: f64,
    pub unrealized_pnl: f64,
    pub daily_pnl_pct: f64,
    pub max_drawdown_pct: f64,
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self {
            open_positions: 0,
            total_value: 10_000.0,
            unrealized_pnl: 0.0,
            daily_pnl_pct: 0.0,
            max_drawdown_pct: 0.0,
        }
    }
}

/// Signal-confidence dispersion over the last 24h, used as a volatility
/// proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolatilityCheck {
    pub value: f64,
    pub is_extreme: bool,
    pub sample_size: usize,
}

/// Risk Sentinel verdict for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub symbol: String,
    pub direction: SignalDirection,
    pub confidence: f64,
    pub vote: VoteType,
    pub risk_score: f64,
    pub risk_flags: Vec<String>,
    pub kill_switch_active: bool,
    pub kill_switch_reason: Option<String>,
    pub portfolio: PortfolioState,
    pub volatility: VolatilityCheck,
}

/// Risk thresholds. Sourced from configuration with the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_open_positions: i64,
    pub max_risk_per_trade: f64,
    pub max_concentration_pct: f64,
    pub volatility_threshold: f64,
    pub max_daily_trades: u32,
    pub cool_down_after_loss_seconds: i64,
    pub max_single_asset_ratio: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 0.03,
            max_drawdown_pct: 0.10,
            max_open_positions: 5,
            max_risk_per_trade: 0.02,
            max_concentration_pct: 0.40,
            volatility_threshold: 0.30,
            max_daily_trades: 10,
            cool_down_after_loss_seconds: 3600,
            max_single_asset_ratio: 0.25,
        }
    }
}

/// Snapshot of the sentinel's state for operators and the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    pub kill_switch: KillSwitchState,
    pub daily_trade_count: u32,
    pub cool_down_active: bool,
    pub signals_today: i64,
    pub limits: RiskLimits,
}
