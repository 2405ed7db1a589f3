//! Risk Sentinel: portfolio guardrails, the kill switch, and the veto vote.
//! Last line of defense before any signal is approved.

use crate::application::agents::{Agent, AgentCore, names};
use crate::application::context::AgentContext;
use crate::domain::risk::{
    KillSwitchState, PortfolioState, ProposedTrade, RiskAssessment, RiskLimits, RiskSummary,
    VolatilityCheck,
};
use crate::domain::signal::{SignalDirection, VoteType};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use statrs::statistics::Statistics;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// A final score at or above this rejects the signal.
const REJECT_THRESHOLD: f64 = 0.50;
const VOLATILITY_MIN_SAMPLES: usize = 3;

struct SentinelState {
    kill_switch: KillSwitchState,
    last_loss_at: Option<chrono::DateTime<chrono::Utc>>,
    daily_trade_count: u32,
    daily_reset_date: Option<NaiveDate>,
}

pub struct RiskSentinel {
    core: AgentCore,
    limits: RiskLimits,
    state: Mutex<SentinelState>,
}

impl RiskSentinel {
    pub fn new(ctx: AgentContext) -> Self {
        let limits = ctx.config.risk.clone();
        Self {
            core: AgentCore::new(
                names::RISK_SENTINEL,
                "Risk Guardian: portfolio protection, kill switch, trade veto",
                "1.2.0",
                ctx,
            ),
            limits,
            state: Mutex::new(SentinelState {
                kill_switch: KillSwitchState::default(),
                last_loss_at: None,
                daily_trade_count: 0,
                daily_reset_date: None,
            }),
        }
    }

    pub async fn run_with_tracking(
        &self,
        symbol: &str,
        proposed: Option<ProposedTrade>,
    ) -> Result<RiskAssessment> {
        self.core
            .track(symbol, self.analyze(symbol, proposed))
            .await
    }

    /// Evaluate the check ladder for a proposed trade (or the portfolio
    /// alone). Each tripped check raises the score to at least its severity
    /// and appends a flag.
    pub async fn analyze(
        &self,
        symbol: &str,
        proposed: Option<ProposedTrade>,
    ) -> Result<RiskAssessment> {
        let now = self.core.ctx().clock.now();
        let portfolio = self.portfolio_state().await;
        let volatility = self.check_volatility(symbol).await;
        let concentration = if proposed.is_some() {
            Some(self.check_concentration(symbol).await)
        } else {
            None
        };

        let mut risk_flags: Vec<String> = Vec::new();
        let mut risk_score: f64 = 0.0;
        let mut activation_reasons: Vec<String> = Vec::new();

        // 1: switch already latched before this evaluation.
        let (switch_was_active, prior_reason, daily_trade_count, cool_down_remaining) = {
            let mut state = self.state.lock().expect("sentinel state poisoned");
            Self::roll_daily_counter(&mut state, now.date_naive());

            let remaining = state.last_loss_at.and_then(|at| {
                let elapsed = (now - at).num_seconds();
                (elapsed < self.limits.cool_down_after_loss_seconds)
                    .then(|| self.limits.cool_down_after_loss_seconds - elapsed)
            });

            (
                state.kill_switch.active,
                state.kill_switch.reason.clone(),
                state.daily_trade_count,
                remaining,
            )
        };

        if switch_was_active {
            risk_flags.push(format!(
                "KILL_SWITCH_ACTIVE (reason: {})",
                prior_reason.as_deref().unwrap_or("unknown")
            ));
            risk_score = 1.0;
        }

        // 2: daily loss limit.
        if portfolio.daily_pnl_pct < -self.limits.max_daily_loss_pct {
            risk_flags.push(format!(
                "DAILY_LOSS_EXCEEDED ({:.2}% < -{:.2}% limit)",
                portfolio.daily_pnl_pct * 100.0,
                self.limits.max_daily_loss_pct * 100.0
            ));
            risk_score = risk_score.max(0.90);
            activation_reasons.push(format!(
                "Daily loss limit exceeded: {:.2}%",
                portfolio.daily_pnl_pct * 100.0
            ));
        }

        // 3: max drawdown.
        if portfolio.max_drawdown_pct < -self.limits.max_drawdown_pct {
            risk_flags.push(format!(
                "MAX_DRAWDOWN_EXCEEDED ({:.2}% < -{:.2}% limit)",
                portfolio.max_drawdown_pct * 100.0,
                self.limits.max_drawdown_pct * 100.0
            ));
            risk_score = risk_score.max(0.95);
            activation_reasons.push(format!(
                "Max drawdown exceeded: {:.2}%",
                portfolio.max_drawdown_pct * 100.0
            ));
        }

        // 4: position count.
        if portfolio.open_positions >= self.limits.max_open_positions {
            risk_flags.push(format!(
                "MAX_POSITIONS_REACHED ({}/{})",
                portfolio.open_positions, self.limits.max_open_positions
            ));
            risk_score = risk_score.max(0.75);
        }

        // 4a: daily trade budget.
        if daily_trade_count >= self.limits.max_daily_trades {
            risk_flags.push(format!(
                "DAILY_TRADE_LIMIT ({}/{})",
                daily_trade_count, self.limits.max_daily_trades
            ));
            risk_score = risk_score.max(0.70);
        }

        // 4b: cool-down after a realized loss.
        if let Some(remaining) = cool_down_remaining {
            risk_flags.push(format!(
                "COOL_DOWN_ACTIVE ({remaining}s remaining after last loss)"
            ));
            risk_score = risk_score.max(0.65);
        }

        // 4c: single-asset exposure by value.
        if let Some(trade) = proposed.as_ref()
            && portfolio.total_value > 0.0
        {
            let position_value = trade.entry_price.unwrap_or(0.0) * trade.quantity;
            let asset_ratio = position_value / portfolio.total_value;
            if asset_ratio > self.limits.max_single_asset_ratio {
                risk_flags.push(format!(
                    "SINGLE_ASSET_OVERWEIGHT ({:.0}% > {:.0}% max)",
                    asset_ratio * 100.0,
                    self.limits.max_single_asset_ratio * 100.0
                ));
                risk_score = risk_score.max(0.70);
            }
        }

        // 5: volatility regime from recent signal dispersion.
        if volatility.is_extreme {
            risk_flags.push(format!(
                "EXTREME_VOLATILITY (signal_std={:.3} > {:.2})",
                volatility.value, self.limits.volatility_threshold
            ));
            risk_score = risk_score.max(0.55);
        }

        // 6: per-trade risk as a share of the portfolio.
        if let Some(trade) = proposed.as_ref() {
            let trade_risk = Self::compute_trade_risk(trade, &portfolio);
            if trade_risk > self.limits.max_risk_per_trade {
                risk_flags.push(format!(
                    "TRADE_RISK_EXCEEDED ({:.2}% > {:.2}% max per trade)",
                    trade_risk * 100.0,
                    self.limits.max_risk_per_trade * 100.0
                ));
                risk_score = risk_score.max(0.80);
            }
        }

        // 7: repeat-symbol concentration across open positions. Only fires
        // when the symbol is already held; a first entry is not
        // concentration.
        if let Some((symbol_open, ratio)) = concentration
            && symbol_open > 0
            && ratio > self.limits.max_concentration_pct
        {
            risk_flags.push(format!(
                "CONCENTRATION_RISK ({symbol}: {:.0}% of open positions)",
                ratio * 100.0
            ));
            risk_score = risk_score.max(0.60);
        }

        for reason in activation_reasons {
            self.activate_kill_switch(&reason).await;
        }

        let vote = if risk_score >= REJECT_THRESHOLD {
            VoteType::Reject
        } else {
            VoteType::Approve
        };
        let direction = if vote == VoteType::Approve {
            proposed
                .as_ref()
                .map(|t| t.direction)
                .unwrap_or(SignalDirection::Neutral)
        } else {
            SignalDirection::Neutral
        };
        let confidence = if vote == VoteType::Approve {
            1.0 - risk_score
        } else {
            risk_score
        };

        let kill_switch = self.kill_switch();
        let assessment = RiskAssessment {
            symbol: symbol.to_string(),
            direction,
            confidence,
            vote,
            risk_score,
            risk_flags: risk_flags.clone(),
            kill_switch_active: kill_switch.active,
            kill_switch_reason: kill_switch.reason,
            portfolio,
            volatility,
        };

        if let Err(e) = self
            .core
            .memory()
            .store_decision(
                symbol,
                serde_json::json!({
                    "vote": vote,
                    "risk_score": risk_score,
                    "flags": &assessment.risk_flags,
                    "kill_switch": assessment.kill_switch_active,
                }),
                0.7,
            )
            .await
        {
            warn!("[{}] decision memory store failed: {e:#}", self.core.name());
        }

        if assessment.risk_flags.is_empty() {
            info!("[{}] {symbol}: {vote} with no risk flags", self.core.name());
        } else {
            warn!(
                "[{}] {symbol}: {vote} ({})",
                self.core.name(),
                assessment.risk_flags.join(", ")
            );
        }

        Ok(assessment)
    }

    /// Pure query of the latch; readers never mutate.
    pub fn kill_switch(&self) -> KillSwitchState {
        self.state
            .lock()
            .expect("sentinel state poisoned")
            .kill_switch
            .clone()
    }

    /// Latch the kill switch. Idempotent: re-activation while active is a
    /// no-op and broadcasts nothing.
    pub async fn activate_kill_switch(&self, reason: &str) -> bool {
        let activated_at = {
            let mut state = self.state.lock().expect("sentinel state poisoned");
            if state.kill_switch.active {
                return false;
            }
            let at = self.core.ctx().clock.now();
            state.kill_switch = KillSwitchState {
                active: true,
                reason: Some(reason.to_string()),
                activated_at: Some(at),
            };
            at
        };

        error!("KILL SWITCH ACTIVATED: {reason}");

        self.core
            .ctx()
            .bus
            .broadcast(
                self.core.name(),
                "risk.kill_switch",
                serde_json::json!({
                    "active": true,
                    "reason": reason,
                    "activated_at": activated_at,
                }),
            )
            .await;

        // Stored at maximum importance; this must never be forgotten.
        if let Err(e) = self
            .core
            .memory()
            .store(
                crate::domain::memory::MemoryType::Pattern,
                serde_json::json!({
                    "event": "kill_switch_activated",
                    "reason": reason,
                    "activated_at": activated_at,
                }),
                None,
                1.0,
                None,
            )
            .await
        {
            warn!("[{}] kill switch memory store failed: {e:#}", self.core.name());
        }

        true
    }

    /// Manual operator release with attribution.
    pub async fn deactivate_kill_switch(&self, operator: &str) {
        let previous_reason = {
            let mut state = self.state.lock().expect("sentinel state poisoned");
            let prev = state.kill_switch.reason.take();
            state.kill_switch = KillSwitchState::default();
            prev
        };

        info!(
            "Kill switch deactivated by {operator} (was: {})",
            previous_reason.as_deref().unwrap_or("unknown")
        );

        self.core
            .ctx()
            .bus
            .broadcast(
                self.core.name(),
                "risk.kill_switch",
                serde_json::json!({
                    "active": false,
                    "operator": operator,
                    "previous_reason": previous_reason,
                    "deactivated_at": self.core.ctx().clock.now(),
                }),
            )
            .await;
    }

    /// Called by the orchestrator after each approved signal.
    pub fn record_trade_executed(&self) {
        let today = self.core.ctx().clock.now().date_naive();
        let mut state = self.state.lock().expect("sentinel state poisoned");
        Self::roll_daily_counter(&mut state, today);
        state.daily_trade_count += 1;
    }

    /// The trade budget resets at the UTC day boundary.
    fn roll_daily_counter(state: &mut SentinelState, today: NaiveDate) {
        if state.daily_reset_date != Some(today) {
            state.daily_trade_count = 0;
            state.daily_reset_date = Some(today);
        }
    }

    /// Called when a realized loss lands; starts the cool-down clock.
    pub fn record_loss(&self) {
        let mut state = self.state.lock().expect("sentinel state poisoned");
        state.last_loss_at = Some(self.core.ctx().clock.now());
    }

    pub async fn risk_summary(&self) -> RiskSummary {
        let signals_today = self
            .core
            .ctx()
            .repo
            .count_signals_since_today()
            .await
            .unwrap_or(0);
        let now = self.core.ctx().clock.now();
        let state = self.state.lock().expect("sentinel state poisoned");
        RiskSummary {
            kill_switch: state.kill_switch.clone(),
            daily_trade_count: state.daily_trade_count,
            cool_down_active: state.last_loss_at.is_some_and(|at| {
                (now - at).num_seconds() < self.limits.cool_down_after_loss_seconds
            }),
            signals_today,
            limits: self.limits.clone(),
        }
    }

    /// Portfolio metrics with safe defaults when the database is down.
    async fn portfolio_state(&self) -> PortfolioState {
        match self.try_portfolio_state().await {
            Ok(state) => state,
            Err(e) => {
                error!("[{}] portfolio query failed: {e:#}", self.core.name());
                PortfolioState::default()
            }
        }
    }

    async fn try_portfolio_state(&self) -> Result<PortfolioState> {
        let repo = &self.core.ctx().repo;
        let open_positions = repo.count_open_positions(None).await?;
        let unrealized_pnl: f64 = repo
            .get_open_positions()
            .await?
            .iter()
            .map(|p| p.unrealized_pnl)
            .sum();
        let snapshot = repo.portfolio_latest_snapshot().await?;

        let total_value = snapshot
            .as_ref()
            .map(|s| s.total_value)
            .unwrap_or(10_000.0);
        let daily_pnl_pct = if total_value > 0.0 {
            unrealized_pnl / total_value
        } else {
            0.0
        };
        let max_drawdown_pct = snapshot.and_then(|s| s.max_drawdown).unwrap_or(0.0);

        Ok(PortfolioState {
            open_positions,
            total_value,
            unrealized_pnl,
            daily_pnl_pct,
            max_drawdown_pct,
        })
    }

    /// Dispersion of recent signal confidence as a volatility proxy.
    async fn check_volatility(&self, symbol: &str) -> VolatilityCheck {
        let confidences = match self
            .core
            .ctx()
            .repo
            .recent_signal_confidences(symbol, 24)
            .await
        {
            Ok(values) => values,
            Err(e) => {
                error!("[{}] volatility check failed: {e:#}", self.core.name());
                return VolatilityCheck::default();
            }
        };

        if confidences.len() < VOLATILITY_MIN_SAMPLES {
            return VolatilityCheck {
                value: 0.0,
                is_extreme: false,
                sample_size: confidences.len(),
            };
        }

        let value = confidences.iter().population_std_dev();
        VolatilityCheck {
            value,
            is_extreme: value > self.limits.volatility_threshold,
            sample_size: confidences.len(),
        }
    }

    /// Open-position count for the symbol, plus the share of open positions
    /// it would hold if the proposal executed (the +1 terms count the
    /// proposed trade itself).
    async fn check_concentration(&self, symbol: &str) -> (i64, f64) {
        let repo = &self.core.ctx().repo;
        let total_open = repo.count_open_positions(None).await.unwrap_or(0);
        let symbol_open = repo.count_open_positions(Some(symbol)).await.unwrap_or(0);
        let ratio = (symbol_open + 1) as f64 / (total_open + 1).max(1) as f64;
        (symbol_open, ratio)
    }

    /// Risk = |entry - stop| * quantity / total portfolio value.
    fn compute_trade_risk(trade: &ProposedTrade, portfolio: &PortfolioState) -> f64 {
        let entry = trade.entry_price.unwrap_or(0.0);
        let stop = trade.stop_loss.unwrap_or(0.0);
        let total_value = if portfolio.total_value > 0.0 {
            portfolio.total_value
        } else {
            10_000.0
        };

        if entry == 0.0 || stop == 0.0 || trade.quantity == 0.0 {
            return 0.0;
        }

        (entry - stop).abs() * trade.quantity / total_value
    }
}

#[async_trait]
impl Agent for RiskSentinel {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn role(&self) -> &'static str {
        self.core.role()
    }

    fn version(&self) -> &'static str {
        self.core.version()
    }

    async fn heartbeat(&self) -> Result<()> {
        self.core.heartbeat().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::portfolio::{PortfolioSnapshot, Position, PositionSide, PositionStatus};
    use crate::domain::ports::ManualClock;
    use crate::domain::repositories::SignalRepository;
    use crate::domain::signal::{Signal, SignalStatus};
    use crate::infrastructure::message_bus::MessageBus;
    use crate::infrastructure::repositories::in_memory::InMemorySignalRepository;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    struct Harness {
        clock: Arc<ManualClock>,
        repo: Arc<InMemorySignalRepository>,
        bus: MessageBus,
        sentinel: RiskSentinel,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let repo = Arc::new(InMemorySignalRepository::new(clock.clone()));
        let bus = MessageBus::new();
        let sentinel = RiskSentinel::new(AgentContext::new(
            repo.clone(),
            bus.clone(),
            clock.clone(),
            Arc::new(Config::default()),
        ));
        Harness {
            clock,
            repo,
            bus,
            sentinel,
        }
    }

    fn open_position(symbol: &str, unrealized_pnl: f64) -> Position {
        Position {
            id: None,
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            entry_price: 100.0,
            current_price: Some(100.0),
            quantity: 1.0,
            unrealized_pnl,
            status: PositionStatus::Open,
            strategy_id: "default".to_string(),
            opened_at: None,
            closed_at: None,
        }
    }

    fn snapshot(total_value: f64, max_drawdown: Option<f64>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            snapshot_date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            total_value,
            total_pnl: 0.0,
            total_pnl_pct: 0.0,
            open_positions: 0,
            win_rate: None,
            sharpe_ratio: None,
            max_drawdown,
        }
    }

    fn long_proposal(quantity: f64) -> ProposedTrade {
        ProposedTrade {
            direction: SignalDirection::Long,
            entry_price: Some(100.0),
            stop_loss: Some(97.0),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_clean_portfolio_approves() {
        let h = harness();
        let assessment = h
            .sentinel
            .analyze("BTCUSDT", Some(long_proposal(0.01)))
            .await
            .unwrap();
        assert_eq!(assessment.vote, VoteType::Approve);
        assert_eq!(assessment.risk_score, 0.0);
        assert_eq!(assessment.confidence, 1.0);
        assert_eq!(assessment.direction, SignalDirection::Long);
        assert!(assessment.risk_flags.is_empty());
    }

    #[tokio::test]
    async fn test_max_positions_rejects() {
        let h = harness();
        for i in 0..5 {
            h.repo.insert_position(open_position(&format!("SYM{i}"), 0.0));
        }
        let assessment = h
            .sentinel
            .analyze("BTCUSDT", Some(long_proposal(0.01)))
            .await
            .unwrap();
        assert_eq!(assessment.vote, VoteType::Reject);
        assert_eq!(assessment.risk_score, 0.75);
        assert_eq!(assessment.confidence, 0.75);
        assert_eq!(assessment.direction, SignalDirection::Neutral);
        assert!(
            assessment
                .risk_flags
                .iter()
                .any(|f| f.contains("MAX_POSITIONS_REACHED (5/5)"))
        );
    }

    #[tokio::test]
    async fn test_drawdown_breach_latches_kill_switch() {
        let h = harness();
        h.repo
            .upsert_snapshot(&snapshot(10_000.0, Some(-0.12)))
            .await
            .unwrap();

        let first = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert_eq!(first.vote, VoteType::Reject);
        assert_eq!(first.risk_score, 0.95);
        assert!(first.kill_switch_active);
        assert!(
            first
                .risk_flags
                .iter()
                .any(|f| f.starts_with("MAX_DRAWDOWN_EXCEEDED"))
        );

        // Event broadcast exactly once.
        let events = h.bus.get_recent_messages(Some("risk.kill_switch"), 10).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["active"], true);

        // The next evaluation sees the latch at full severity, and the
        // repeated breach does not re-broadcast.
        let second = h.sentinel.analyze("ETHUSDT", None).await.unwrap();
        assert_eq!(second.risk_score, 1.0);
        assert!(
            second
                .risk_flags
                .iter()
                .any(|f| f.starts_with("KILL_SWITCH_ACTIVE"))
        );
        let events = h.bus.get_recent_messages(Some("risk.kill_switch"), 10).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_deactivation_clears_latch() {
        let h = harness();
        h.sentinel.activate_kill_switch("test breach").await;
        assert!(h.sentinel.kill_switch().active);

        h.sentinel.deactivate_kill_switch("operator-7").await;
        let state = h.sentinel.kill_switch();
        assert!(!state.active);
        assert!(state.reason.is_none());
        assert!(state.activated_at.is_none());

        let events = h.bus.get_recent_messages(Some("risk.kill_switch"), 10).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload["operator"], "operator-7");
    }

    #[tokio::test]
    async fn test_daily_loss_activates_kill_switch() {
        let h = harness();
        h.repo.upsert_snapshot(&snapshot(10_000.0, None)).await.unwrap();
        h.repo.insert_position(open_position("BTCUSDT", -400.0));

        let assessment = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert!(assessment.kill_switch_active);
        assert!(
            assessment
                .risk_flags
                .iter()
                .any(|f| f.starts_with("DAILY_LOSS_EXCEEDED"))
        );
    }

    #[tokio::test]
    async fn test_cool_down_after_loss() {
        let h = harness();
        h.sentinel.record_loss();

        let during = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert!(
            during
                .risk_flags
                .iter()
                .any(|f| f.starts_with("COOL_DOWN_ACTIVE"))
        );
        assert_eq!(during.vote, VoteType::Reject);

        h.clock.advance(Duration::seconds(3601));
        let after = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert!(after.risk_flags.is_empty());
    }

    #[tokio::test]
    async fn test_trade_risk_limit() {
        let h = harness();
        // |100 - 97| * 100 / 10,000 = 3% > 2% cap.
        let assessment = h
            .sentinel
            .analyze("BTCUSDT", Some(long_proposal(100.0)))
            .await
            .unwrap();
        assert!(
            assessment
                .risk_flags
                .iter()
                .any(|f| f.starts_with("TRADE_RISK_EXCEEDED"))
        );
        assert_eq!(assessment.risk_score, 0.80);
    }

    #[tokio::test]
    async fn test_single_asset_overweight() {
        let h = harness();
        // 100 * 30 = 3,000 on a 10,000 book: 30% > 25%.
        let assessment = h
            .sentinel
            .analyze("BTCUSDT", Some(long_proposal(30.0)))
            .await
            .unwrap();
        assert!(
            assessment
                .risk_flags
                .iter()
                .any(|f| f.starts_with("SINGLE_ASSET_OVERWEIGHT"))
        );
    }

    #[tokio::test]
    async fn test_daily_trade_budget_resets_at_utc_midnight() {
        let h = harness();
        for _ in 0..10 {
            h.sentinel.record_trade_executed();
        }

        let maxed = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert!(
            maxed
                .risk_flags
                .iter()
                .any(|f| f.contains("DAILY_TRADE_LIMIT (10/10)"))
        );

        h.clock.advance(Duration::days(1));
        let fresh = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert!(fresh.risk_flags.is_empty());
    }

    #[tokio::test]
    async fn test_extreme_signal_volatility_flags() {
        let h = harness();
        for confidence in [0.05, 0.95, 0.05, 0.95] {
            h.repo
                .insert_pending(&Signal {
                    id: None,
                    symbol: "BTCUSDT".to_string(),
                    direction: SignalDirection::Neutral,
                    confidence,
                    source_agent: "orchestrator".to_string(),
                    reasoning: serde_json::json!({}),
                    entry_price: None,
                    stop_loss: None,
                    take_profit: None,
                    risk_reward: None,
                    timeframe: "1h".to_string(),
                    strategy_id: "default".to_string(),
                    status: SignalStatus::Pending,
                    created_at: None,
                })
                .await
                .unwrap();
        }

        let assessment = h.sentinel.analyze("BTCUSDT", None).await.unwrap();
        assert!(assessment.volatility.is_extreme);
        assert!(
            assessment
                .risk_flags
                .iter()
                .any(|f| f.starts_with("EXTREME_VOLATILITY"))
        );
    }

    #[tokio::test]
    async fn test_concentration_on_repeat_symbol() {
        let h = harness();
        h.repo.insert_position(open_position("BTCUSDT", 0.0));
        // (1 + 1) / (1 + 1) = 100% of open positions in one symbol.
        let assessment = h
            .sentinel
            .analyze("BTCUSDT", Some(long_proposal(0.01)))
            .await
            .unwrap();
        assert!(
            assessment
                .risk_flags
                .iter()
                .any(|f| f.starts_with("CONCENTRATION_RISK"))
        );
    }

    #[tokio::test]
    async fn test_risk_summary_reports_state() {
        let h = harness();
        h.sentinel.record_trade_executed();
        h.sentinel.record_loss();
        let summary = h.sentinel.risk_summary().await;
        assert_eq!(summary.daily_trade_count, 1);
        assert!(summary.cool_down_active);
        assert!(!summary.kill_switch.active);
        assert_eq!(summary.limits.max_open_positions, 5);
    }
}
