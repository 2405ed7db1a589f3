//! Quant Lab: nightly performance analysis, agent accuracy scoring, and
//! rule-based tuning recommendations. Closes the feedback loop on weights
//! and risk parameters.

use crate::application::agents::{Agent, AgentCore, names};
use crate::application::context::AgentContext;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::signal::{SignalDirection, SignalStatus, VoteType};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};

const ACCURACY_LOOKBACK_DAYS: i64 = 7;
/// Query caps for the analysis joins.
const SIGNAL_SCAN_LIMIT: usize = 1_000;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
    pub avg_win: Option<f64>,
    pub avg_loss: Option<f64>,
    pub profit_factor: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub calmar_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub avg_holding_period_hours: Option<f64>,
}

impl PerformanceReport {
    fn empty() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            avg_pnl: 0.0,
            best_trade: None,
            worst_trade: None,
            avg_win: None,
            avg_loss: None,
            profit_factor: None,
            sharpe_ratio: None,
            calmar_ratio: None,
            max_drawdown: None,
            avg_holding_period_hours: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAccuracy {
    pub total_votes: usize,
    pub correct_votes: usize,
    pub accuracy: Option<f64>,
    pub avg_confidence: Option<f64>,
    /// Fraction of votes cast above 0.8 confidence.
    pub overconfident: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopSymbol {
    pub symbol: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalHealth {
    pub total_signals: usize,
    pub long_count: usize,
    pub short_count: usize,
    pub neutral_count: usize,
    /// LONG share of all signals; balanced is near 0.5.
    pub direction_balance: f64,
    pub approval_rate: f64,
    pub execution_rate: f64,
    pub avg_confidence: Option<f64>,
    pub confidence_std: Option<f64>,
    pub top_symbol: Option<TopSymbol>,
    pub unique_symbols: usize,
}

impl SignalHealth {
    fn empty() -> Self {
        Self {
            total_signals: 0,
            long_count: 0,
            short_count: 0,
            neutral_count: 0,
            direction_balance: 0.5,
            approval_rate: 0.0,
            execution_rate: 0.0,
            avg_confidence: None,
            confidence_std: None,
            top_symbol: None,
            unique_symbols: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceRegime {
    TrendingFavorable,
    Stable,
    Unfavorable,
    Ranging,
    Mixed,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub strategy_id: String,
    pub lookback_days: i64,
    pub optimization_number: u64,
    pub performance: PerformanceReport,
    pub agent_accuracy: BTreeMap<String, AgentAccuracy>,
    pub signal_health: SignalHealth,
    pub regime: PerformanceRegime,
    pub recommendations: Vec<String>,
    pub snapshot_created: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

pub struct QuantLab {
    core: AgentCore,
    optimization_count: AtomicU64,
}

impl QuantLab {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            core: AgentCore::new(
                names::QUANT_LAB,
                "Optimizer: performance analysis, Sharpe/Calmar metrics, agent calibration",
                "1.2.0",
                ctx,
            ),
            optimization_count: AtomicU64::new(0),
        }
    }

    /// Full optimization cycle: performance, accuracy, health, regime,
    /// recommendations, snapshot, learning memory.
    pub async fn run_optimization(
        &self,
        strategy_id: &str,
        lookback_days: i64,
    ) -> Result<OptimizationReport> {
        let optimization_number = self.optimization_count.fetch_add(1, Ordering::SeqCst) + 1;
        let started = self.core.ctx().clock.now();
        let timer = Instant::now();
        info!(
            "[{}] optimization #{optimization_number} (strategy={strategy_id}, lookback={lookback_days}d)",
            self.core.name()
        );

        let performance = self.compute_performance(strategy_id, lookback_days).await;
        let agent_accuracy = self.analyze_agent_accuracy(ACCURACY_LOOKBACK_DAYS).await;
        let signal_health = self.analyze_signal_health(lookback_days).await;
        let regime = Self::classify_regime(&performance);
        let recommendations =
            Self::generate_recommendations(&performance, &agent_accuracy, &signal_health);
        let snapshot_created = self.create_snapshot(&performance).await;

        let learning = serde_json::json!({
            "strategy_id": strategy_id,
            "lookback_days": lookback_days,
            "optimization_number": optimization_number,
            "performance": &performance,
            "agent_accuracy": &agent_accuracy,
            "signal_health": &signal_health,
            "regime": regime,
            "recommendations": &recommendations,
        });
        if let Err(e) = self.core.memory().store_learning(learning).await {
            warn!("[{}] learning memory store failed: {e:#}", self.core.name());
        }

        let report = OptimizationReport {
            strategy_id: strategy_id.to_string(),
            lookback_days,
            optimization_number,
            performance,
            agent_accuracy,
            signal_health,
            regime,
            recommendations,
            snapshot_created,
            duration_ms: timer.elapsed().as_millis() as u64,
            timestamp: started,
        };

        info!(
            "[{}] optimization complete: win_rate={:.1}%, regime={regime:?}, {} recommendations",
            self.core.name(),
            report.performance.win_rate * 100.0,
            report.recommendations.len()
        );
        Ok(report)
    }

    /// Trading performance from closed positions in the lookback window.
    async fn compute_performance(&self, strategy_id: &str, lookback_days: i64) -> PerformanceReport {
        let since = self.core.ctx().clock.now() - Duration::days(lookback_days);
        let positions = match self
            .core
            .ctx()
            .repo
            .get_closed_positions(strategy_id, since)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("[{}] performance query failed: {e:#}", self.core.name());
                Vec::new()
            }
        };

        if positions.is_empty() {
            return PerformanceReport::empty();
        }

        let pnls: Vec<f64> = positions.iter().map(|p| p.unrealized_pnl).collect();
        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p <= 0.0).collect();
        let total = pnls.len();
        let total_pnl: f64 = pnls.iter().sum();

        let sharpe_ratio = if pnls.len() >= 2 {
            let std = pnls.iter().population_std_dev();
            if std > 0.0 {
                Some(pnls.iter().mean() / std * TRADING_DAYS_PER_YEAR.sqrt())
            } else {
                None
            }
        } else {
            None
        };

        // Max drawdown from the cumulative equity curve.
        let mut cumulative = 0.0;
        let mut running_max = f64::NEG_INFINITY;
        let mut max_drawdown: f64 = 0.0;
        for pnl in &pnls {
            cumulative += pnl;
            running_max = running_max.max(cumulative);
            max_drawdown = max_drawdown.min(cumulative - running_max);
        }
        let max_drawdown = Some(max_drawdown);

        let calmar_ratio = match max_drawdown {
            Some(dd) if dd < 0.0 && total_pnl != 0.0 => {
                let annualized_return = total_pnl * (365.0 / lookback_days as f64);
                Some(annualized_return / dd.abs())
            }
            _ => None,
        };

        let holds: Vec<f64> = positions
            .iter()
            .filter_map(|p| match (p.opened_at, p.closed_at) {
                (Some(opened), Some(closed)) => {
                    Some((closed - opened).num_seconds() as f64 / 3600.0)
                }
                _ => None,
            })
            .collect();
        let avg_holding_period_hours = if holds.is_empty() {
            None
        } else {
            Some(holds.iter().sum::<f64>() / holds.len() as f64)
        };

        let loss_sum: f64 = losses.iter().sum();
        PerformanceReport {
            total_trades: total,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / total as f64,
            total_pnl,
            avg_pnl: total_pnl / total as f64,
            best_trade: pnls.iter().copied().fold(None, fold_max),
            worst_trade: pnls.iter().copied().fold(None, fold_min),
            avg_win: mean_of(&wins),
            avg_loss: mean_of(&losses),
            profit_factor: if !losses.is_empty() && loss_sum != 0.0 {
                Some(wins.iter().sum::<f64>().abs() / loss_sum.abs())
            } else {
                None
            },
            sharpe_ratio,
            calmar_ratio,
            max_drawdown,
            avg_holding_period_hours,
        }
    }

    /// How well each agent's votes predicted the signals' final status.
    async fn analyze_agent_accuracy(&self, lookback_days: i64) -> BTreeMap<String, AgentAccuracy> {
        let cutoff = self.core.ctx().clock.now() - Duration::days(lookback_days);
        let signals = match self
            .core
            .ctx()
            .repo
            .list_recent(None, None, SIGNAL_SCAN_LIMIT)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("[{}] accuracy query failed: {e:#}", self.core.name());
                Vec::new()
            }
        };

        let mut tallies: BTreeMap<String, Vec<(VoteType, f64, SignalStatus)>> = BTreeMap::new();
        for agent in [
            names::ALPHA_SCOUT,
            names::TECHNICAL_ANALYST,
            names::RISK_SENTINEL,
        ] {
            tallies.insert(agent.to_string(), Vec::new());
        }

        for signal in signals
            .iter()
            .filter(|s| s.created_at.is_some_and(|c| c >= cutoff))
        {
            let Some(signal_id) = signal.id else { continue };
            let votes = match self.core.ctx().repo.list_votes(signal_id).await {
                Ok(votes) => votes,
                Err(e) => {
                    error!("[{}] vote query failed: {e:#}", self.core.name());
                    continue;
                }
            };
            for vote in votes {
                if let Some(bucket) = tallies.get_mut(&vote.agent_name) {
                    bucket.push((vote.vote, vote.confidence, signal.status));
                }
            }
        }

        tallies
            .into_iter()
            .map(|(agent, votes)| {
                let total = votes.len();
                if total == 0 {
                    return (
                        agent,
                        AgentAccuracy {
                            total_votes: 0,
                            correct_votes: 0,
                            accuracy: None,
                            avg_confidence: None,
                            overconfident: 0.0,
                        },
                    );
                }

                let correct = votes
                    .iter()
                    .filter(|(vote, _, status)| {
                        matches!(
                            (*vote, *status),
                            (
                                VoteType::Approve,
                                SignalStatus::Approved | SignalStatus::Executed
                            ) | (VoteType::Reject, SignalStatus::Rejected)
                        )
                    })
                    .count();
                let confidences: Vec<f64> = votes.iter().map(|(_, c, _)| *c).collect();
                let overconfident =
                    confidences.iter().filter(|c| **c > 0.8).count() as f64 / total as f64;

                (
                    agent,
                    AgentAccuracy {
                        total_votes: total,
                        correct_votes: correct,
                        accuracy: Some(correct as f64 / total as f64),
                        avg_confidence: mean_of(&confidences),
                        overconfident,
                    },
                )
            })
            .collect()
    }

    /// Signal generation patterns: volume, balance, approval, confidence.
    async fn analyze_signal_health(&self, lookback_days: i64) -> SignalHealth {
        let cutoff = self.core.ctx().clock.now() - Duration::days(lookback_days);
        let signals = match self
            .core
            .ctx()
            .repo
            .list_recent(None, None, SIGNAL_SCAN_LIMIT)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("[{}] signal health query failed: {e:#}", self.core.name());
                return SignalHealth::empty();
            }
        };

        let windowed: Vec<_> = signals
            .into_iter()
            .filter(|s| s.created_at.is_some_and(|c| c >= cutoff))
            .collect();
        if windowed.is_empty() {
            return SignalHealth::empty();
        }

        let total = windowed.len();
        let long_count = windowed
            .iter()
            .filter(|s| s.direction == SignalDirection::Long)
            .count();
        let short_count = windowed
            .iter()
            .filter(|s| s.direction == SignalDirection::Short)
            .count();
        let approved = windowed
            .iter()
            .filter(|s| s.status == SignalStatus::Approved)
            .count();
        let executed = windowed
            .iter()
            .filter(|s| s.status == SignalStatus::Executed)
            .count();
        let confidences: Vec<f64> = windowed.iter().map(|s| s.confidence).collect();

        let mut symbol_counts: HashMap<&str, usize> = HashMap::new();
        for signal in &windowed {
            *symbol_counts.entry(signal.symbol.as_str()).or_insert(0) += 1;
        }
        let top_symbol = symbol_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(symbol, count)| TopSymbol {
                symbol: symbol.to_string(),
                count: *count,
            });

        SignalHealth {
            total_signals: total,
            long_count,
            short_count,
            neutral_count: total - long_count - short_count,
            direction_balance: long_count as f64 / total as f64,
            approval_rate: approved as f64 / total as f64,
            execution_rate: executed as f64 / total as f64,
            avg_confidence: mean_of(&confidences),
            confidence_std: if confidences.is_empty() {
                None
            } else {
                Some(confidences.iter().population_std_dev())
            },
            top_symbol,
            unique_symbols: symbol_counts.len(),
        }
    }

    fn classify_regime(performance: &PerformanceReport) -> PerformanceRegime {
        let win_rate = performance.win_rate;
        let sharpe = performance.sharpe_ratio;
        let max_dd = performance.max_drawdown.unwrap_or(0.0);

        if performance.total_trades == 0 {
            return PerformanceRegime::Unknown;
        }
        if win_rate >= 0.6 && sharpe.is_none_or(|s| s >= 1.0) {
            return PerformanceRegime::TrendingFavorable;
        }
        if win_rate >= 0.5 && max_dd > -0.05 {
            return PerformanceRegime::Stable;
        }
        if win_rate < 0.4 || max_dd < -0.10 {
            return PerformanceRegime::Unfavorable;
        }
        if max_dd.abs() < 0.03 && win_rate < 0.55 {
            return PerformanceRegime::Ranging;
        }
        PerformanceRegime::Mixed
    }

    /// Prioritized, actionable parameter recommendations.
    fn generate_recommendations(
        performance: &PerformanceReport,
        agent_accuracy: &BTreeMap<String, AgentAccuracy>,
        signal_health: &SignalHealth,
    ) -> Vec<String> {
        let mut recs: Vec<String> = Vec::new();

        let win_rate = performance.win_rate;
        let max_dd = performance.max_drawdown.unwrap_or(0.0);

        if performance.total_trades == 0 {
            recs.push(
                "🔴 No closed trades in lookback window; verify database connectivity and position status updates"
                    .to_string(),
            );
        } else if win_rate < 0.35 {
            recs.push(format!(
                "🔴 Win rate critically low ({:.1}%); increase min_consensus_confidence to >=0.65 and review indicator weights",
                win_rate * 100.0
            ));
        } else if win_rate < 0.45 {
            recs.push(format!(
                "🟡 Win rate below target ({:.1}%); tighten consensus threshold by +5% and review RSI/Bollinger weights",
                win_rate * 100.0
            ));
        } else if win_rate > 0.72 {
            recs.push(format!(
                "🟢 Win rate strong ({:.1}%); consider lowering consensus threshold by 3-5% to capture more opportunities",
                win_rate * 100.0
            ));
        }

        if max_dd < -0.10 {
            recs.push(format!(
                "🔴 Max drawdown severe ({:.1}%); reduce position sizes by 30% and tighten stop-loss multiplier from 1.5 to 1.2 ATR",
                max_dd * 100.0
            ));
        } else if max_dd < -0.05 {
            recs.push(format!(
                "🟡 Drawdown elevated ({:.1}%); tighten stop-loss and reduce leverage for next 5 trades",
                max_dd * 100.0
            ));
        }

        if let Some(sharpe) = performance.sharpe_ratio {
            if sharpe < 0.3 {
                recs.push(format!(
                    "🔴 Sharpe ratio very low ({sharpe:.2}); strategy is not generating risk-adjusted returns, consider pausing and reviewing"
                ));
            } else if sharpe < 0.8 {
                recs.push(format!(
                    "🟡 Sharpe ratio below target ({sharpe:.2}); improve entry timing or reduce position size variance"
                ));
            } else if sharpe > 2.0 {
                recs.push(format!(
                    "🟢 Excellent Sharpe ({sharpe:.2}); current parameters well-calibrated"
                ));
            }
        }

        if let Some(profit_factor) = performance.profit_factor {
            if profit_factor < 1.0 {
                recs.push(format!(
                    "🔴 Profit factor < 1.0 ({profit_factor:.2}); losing strategy, halt live trading until resolved"
                ));
            } else if profit_factor < 1.3 {
                recs.push(format!(
                    "🟡 Profit factor marginal ({profit_factor:.2}); target >=1.5 by improving TP/SL ratio"
                ));
            }
        }

        if signal_health.total_signals > 0 {
            let balance = signal_health.direction_balance;
            if balance < 0.30 {
                recs.push(format!(
                    "🟡 SHORT bias detected ({:.0}% LONG); check if sentiment agent is over-calibrated bearish",
                    balance * 100.0
                ));
            } else if balance > 0.70 {
                recs.push(format!(
                    "🟡 LONG bias detected ({:.0}% LONG); alpha_scout bias_correction may need negative adjustment",
                    balance * 100.0
                ));
            }

            let approval_rate = signal_health.approval_rate;
            if approval_rate < 0.20 {
                recs.push(format!(
                    "🟡 Low approval rate ({:.0}%); risk_sentinel may be too conservative, review volatility_threshold",
                    approval_rate * 100.0
                ));
            } else if approval_rate > 0.80 {
                recs.push(format!(
                    "🟡 High approval rate ({:.0}%); risk_sentinel may be too permissive, tighten risk_score threshold",
                    approval_rate * 100.0
                ));
            }
        }

        for (agent, accuracy) in agent_accuracy {
            if let Some(value) = accuracy.accuracy {
                if value < 0.45 {
                    recs.push(format!(
                        "🟡 Agent '{agent}' vote accuracy low ({:.1}%); reduce its consensus weight or review its signal logic",
                        value * 100.0
                    ));
                } else if value > 0.70 {
                    recs.push(format!(
                        "🟢 Agent '{agent}' performing well ({:.1}%); consider increasing its consensus vote weight",
                        value * 100.0
                    ));
                }
            }
        }

        if let Some(avg_hold) = performance.avg_holding_period_hours {
            if avg_hold < 1.0 {
                recs.push(format!(
                    "🟡 Very short avg hold ({avg_hold:.1}h); signals may be closing too early, widen TP by 20%"
                ));
            } else if avg_hold > 72.0 {
                recs.push(format!(
                    "🟡 Long avg hold ({avg_hold:.1}h); consider time-based exits for stale positions"
                ));
            }
        }

        if recs.is_empty() {
            recs.push(
                "🟢 All metrics within target ranges; no parameter changes recommended".to_string(),
            );
        }

        recs
    }

    /// Upsert today's portfolio snapshot. Returns whether the write landed.
    async fn create_snapshot(&self, performance: &PerformanceReport) -> bool {
        let repo = &self.core.ctx().repo;

        let open_positions = match repo.get_open_positions().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("[{}] snapshot query failed: {e:#}", self.core.name());
                Vec::new()
            }
        };

        let total_value = if open_positions.is_empty() {
            10_000.0
        } else {
            open_positions
                .iter()
                .map(|p| p.quantity * p.current_price.unwrap_or(p.entry_price))
                .sum()
        };
        let total_pnl = performance.total_pnl;
        let total_pnl_pct = if total_value > 0.0 {
            total_pnl / total_value * 100.0
        } else {
            0.0
        };

        let snapshot = PortfolioSnapshot {
            snapshot_date: self.core.ctx().clock.now().date_naive(),
            total_value,
            total_pnl,
            total_pnl_pct,
            open_positions: open_positions.len() as i64,
            win_rate: Some(performance.win_rate),
            sharpe_ratio: performance.sharpe_ratio,
            max_drawdown: performance.max_drawdown,
        };

        match repo.upsert_snapshot(&snapshot).await {
            Ok(()) => true,
            Err(e) => {
                error!("[{}] snapshot creation failed: {e:#}", self.core.name());
                false
            }
        }
    }
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn fold_max(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(acc.map_or(value, |a| a.max(value)))
}

fn fold_min(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(acc.map_or(value, |a| a.min(value)))
}

#[async_trait]
impl Agent for QuantLab {
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
