//! The Brain: runs the full scan cycle, blends the analyses, collects the
//! consensus votes, and writes the audited decision.

use crate::application::agents::alpha_scout::AlphaScout;
use crate::application::agents::risk_sentinel::RiskSentinel;
use crate::application::agents::technical_analyst::TechnicalAnalyst;
use crate::application::agents::{Agent, AgentCore, names};
use crate::application::context::AgentContext;
use crate::application::decision_engine::DecisionEngine;
use crate::application::position_sizer::PositionSizer;
use crate::domain::ports::CandleProvider;
use crate::domain::risk::ProposedTrade;
use crate::domain::sentiment::{MarketRegime, SentimentReport};
use crate::domain::signal::{ConsensusVote, Signal, SignalDirection, SignalStatus, VoteType};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};

/// Floor applied after the decision engine approves; the stricter of this
/// and the engine's own threshold wins.
const ORCHESTRATOR_MIN_CONFIDENCE: f64 = 0.55;
const CANDLE_FETCH_LIMIT: usize = 100;
const TASK_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleAction {
    Execute,
    Reject,
    Skip,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusSummary {
    pub approved: bool,
    pub approve_count: usize,
    pub reject_count: usize,
    pub weighted_confidence: f64,
    pub min_required: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskOutcome {
    pub score: f64,
    pub flags: Vec<String>,
    pub kill_switch: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentOutcome {
    pub direction: SignalDirection,
    pub score: f64,
    pub regime: MarketRegime,
    pub agreement: bool,
}

/// Full record of one scan cycle, returned to the caller and logged for
/// audit.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<SignalDirection>,
    pub action: CycleAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blended_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_reward: Option<f64>,
    pub timeframe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentOutcome>,
    pub cycle: u64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskLogEntry {
    pub cycle: u64,
    pub symbol: String,
    pub direction: SignalDirection,
    pub action: CycleAction,
    pub confidence: f64,
    pub risk_score: f64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleStats {
    pub cycles_run: u64,
    pub signals_approved: u64,
    pub signals_rejected: u64,
    pub approval_rate: f64,
    pub min_consensus_confidence: f64,
}

pub struct Orchestrator {
    core: AgentCore,
    candles: Arc<dyn CandleProvider>,
    alpha_scout: Arc<AlphaScout>,
    technical_analyst: Arc<TechnicalAnalyst>,
    risk_sentinel: Arc<RiskSentinel>,
    decision_engine: DecisionEngine,
    position_sizer: Arc<dyn PositionSizer>,
    cycles_run: AtomicU64,
    signals_approved: AtomicU64,
    signals_rejected: AtomicU64,
    task_log: Mutex<VecDeque<TaskLogEntry>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: AgentContext,
        candles: Arc<dyn CandleProvider>,
        alpha_scout: Arc<AlphaScout>,
        technical_analyst: Arc<TechnicalAnalyst>,
        risk_sentinel: Arc<RiskSentinel>,
        position_sizer: Arc<dyn PositionSizer>,
    ) -> Self {
        let decision_engine =
            DecisionEngine::new(ctx.config.min_consensus_confidence, ctx.repo.clone());
        Self {
            core: AgentCore::new(
                names::ORCHESTRATOR,
                "The Brain: consensus voting, signal aggregation, final decision",
                "1.3.0",
                ctx,
            ),
            candles,
            alpha_scout,
            technical_analyst,
            risk_sentinel,
            decision_engine,
            position_sizer,
            cycles_run: AtomicU64::new(0),
            signals_approved: AtomicU64::new(0),
            signals_rejected: AtomicU64::new(0),
            task_log: Mutex::new(VecDeque::new()),
        }
    }

    /// One full orchestration cycle for a symbol. Never panics and never
    /// returns an `Err` to the scheduler; failures come back embedded in
    /// the outcome record.
    pub async fn run_scan_cycle(
        &self,
        symbol: &str,
        strategy_id: &str,
        timeframe: &str,
    ) -> CycleOutcome {
        let cycle = self.cycles_run.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle_start = self.core.ctx().clock.now();
        let timer = Instant::now();
        info!(
            "[{}] cycle #{cycle}: {symbol} (strategy={strategy_id}, tf={timeframe})",
            self.core.name()
        );

        // Step 1: candles. A failed fetch degrades to an empty list and is
        // caught by the analyst's minimum-length check.
        let candles = self
            .candles
            .get_recent_candles(symbol, timeframe, CANDLE_FETCH_LIMIT)
            .await;

        // Step 2: sentiment and technicals in parallel.
        let (alpha_result, tech_result) = tokio::join!(
            self.alpha_scout.run_with_tracking(symbol, true),
            self.technical_analyst
                .run_with_tracking(symbol, candles, timeframe),
        );

        let tech = match tech_result {
            Ok(report) => report,
            Err(e) => {
                return self.skip(
                    symbol,
                    timeframe,
                    cycle,
                    cycle_start,
                    timer,
                    format!("Technical analysis error: {e}"),
                );
            }
        };
        if let Some(tech_error) = tech.error.as_deref() {
            return self.skip(
                symbol,
                timeframe,
                cycle,
                cycle_start,
                timer,
                format!("Technical analysis error: {tech_error}"),
            );
        }

        let alpha = alpha_result.unwrap_or_else(|e| {
            warn!("[{}] sentiment unavailable for {symbol}: {e:#}", self.core.name());
            let mut fallback = SentimentReport::empty(symbol, 0, cycle_start);
            fallback.confidence = 0.3;
            fallback
        });

        // Step 3: neutral low-conviction reads are not worth a vote.
        let direction = tech.direction;
        let tech_confidence = tech.confidence;
        if direction == SignalDirection::Neutral && tech_confidence < 0.4 {
            return self.skip(
                symbol,
                timeframe,
                cycle,
                cycle_start,
                timer,
                format!(
                    "No clear direction (direction={direction}, confidence={:.1}%)",
                    tech_confidence * 100.0
                ),
            );
        }

        // Step 4: confidence blend. Sentiment confirms or penalizes.
        let sentiment_agreement = alpha.direction == direction;
        let blended_confidence = if sentiment_agreement || alpha.direction == SignalDirection::Neutral
        {
            tech_confidence * 0.70 + alpha.confidence * 0.30
        } else {
            tech_confidence * 0.70 - alpha.confidence * 0.15
        }
        .clamp(0.0, 0.95);

        // Step 5: candidate signal.
        let mut signal = Signal {
            id: None,
            symbol: symbol.to_string(),
            direction,
            confidence: blended_confidence,
            source_agent: self.core.name().to_string(),
            reasoning: serde_json::json!({
                "technical": tech.reasoning.iter().take(5).collect::<Vec<_>>(),
                "sentiment": {
                    "score": alpha.sentiment_score,
                    "direction": alpha.direction,
                    "regime": alpha.market_regime,
                    "summary": &alpha.summary,
                },
                "confidence_blend": {
                    "technical": tech_confidence,
                    "sentiment": alpha.confidence,
                    "blended": blended_confidence,
                    "sentiment_agreement": sentiment_agreement,
                },
            }),
            entry_price: tech.entry_price,
            stop_loss: tech.stop_loss,
            take_profit: tech.take_profit,
            risk_reward: tech.risk_reward,
            timeframe: timeframe.to_string(),
            strategy_id: strategy_id.to_string(),
            status: SignalStatus::Pending,
            created_at: None,
        };

        if let Err(violation) = signal.validate() {
            error!(
                "[{}] invariant violation for {symbol}: {violation}",
                self.core.name()
            );
            let _ = self
                .core
                .memory()
                .store_error(serde_json::json!({
                    "symbol": symbol,
                    "error": violation.to_string(),
                    "cycle": cycle,
                }))
                .await;
            let mut outcome = self.skip(
                symbol,
                timeframe,
                cycle,
                cycle_start,
                timer,
                "Signal invariant violation".to_string(),
            );
            outcome.error = Some(violation.to_string());
            return outcome;
        }

        // Step 6: persist the candidate as pending.
        let signal_id = match self.core.ctx().repo.insert_pending(&signal).await {
            Ok(id) => id,
            Err(e) => {
                error!("[{}] signal persist failed: {e:#}", self.core.name());
                let mut outcome = self.skip(
                    symbol,
                    timeframe,
                    cycle,
                    cycle_start,
                    timer,
                    "Signal persistence failed".to_string(),
                );
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        signal.id = Some(signal_id);

        // Step 7: position size for the risk check. Micro-sized until a
        // portfolio-aware policy is wired in.
        let quantity = self.position_sizer.position_size(&signal);

        // Step 8: risk evaluation with hard veto authority.
        let risk = match self
            .risk_sentinel
            .run_with_tracking(
                symbol,
                Some(ProposedTrade {
                    direction,
                    entry_price: signal.entry_price,
                    stop_loss: signal.stop_loss,
                    quantity,
                }),
            )
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                // The sentinel degrades to safe defaults internally; an
                // error here is a tracking failure, not a risk verdict.
                warn!("[{}] risk evaluation failed: {e:#}", self.core.name());
                crate::domain::risk::RiskAssessment {
                    symbol: symbol.to_string(),
                    direction,
                    confidence: 0.5,
                    vote: VoteType::Approve,
                    risk_score: 0.0,
                    risk_flags: Vec::new(),
                    kill_switch_active: false,
                    kill_switch_reason: None,
                    portfolio: Default::default(),
                    volatility: Default::default(),
                }
            }
        };

        // Kill switch short-circuits the vote entirely.
        if risk.kill_switch_active {
            if let Err(e) = self
                .core
                .ctx()
                .repo
                .update_status(signal_id, SignalStatus::Rejected)
                .await
            {
                error!("[{}] status update failed: {e:#}", self.core.name());
            }
            self.signals_rejected.fetch_add(1, Ordering::SeqCst);

            let outcome = CycleOutcome {
                symbol: symbol.to_string(),
                signal_id: Some(signal_id),
                direction: Some(direction),
                action: CycleAction::Reject,
                reason: Some("Kill switch active".to_string()),
                confidence: None,
                blended_confidence: Some(blended_confidence),
                entry_price: signal.entry_price,
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
                risk_reward: signal.risk_reward,
                timeframe: timeframe.to_string(),
                consensus: None,
                risk: Some(RiskOutcome {
                    score: risk.risk_score,
                    flags: risk.risk_flags.clone(),
                    kill_switch: true,
                }),
                sentiment: Some(SentimentOutcome {
                    direction: alpha.direction,
                    score: alpha.sentiment_score,
                    regime: alpha.market_regime,
                    agreement: sentiment_agreement,
                }),
                cycle,
                duration_ms: timer.elapsed().as_millis() as u64,
                timestamp: cycle_start,
                error: None,
            };
            return outcome;
        }

        // Step 9: the three votes.
        let votes = vec![
            ConsensusVote {
                signal_id,
                agent_name: names::ALPHA_SCOUT.to_string(),
                vote: if sentiment_agreement {
                    VoteType::Approve
                } else {
                    VoteType::Abstain
                },
                confidence: alpha.confidence,
                reasoning: serde_json::json!({
                    "sentiment_score": alpha.sentiment_score,
                    "market_regime": alpha.market_regime,
                }),
            },
            ConsensusVote {
                signal_id,
                agent_name: names::TECHNICAL_ANALYST.to_string(),
                vote: VoteType::Approve,
                confidence: tech_confidence,
                reasoning: serde_json::json!({
                    "indicators": tech.reasoning.iter().take(3).collect::<Vec<_>>(),
                    "atr": tech.atr,
                    "signal_count": tech.signal_count,
                }),
            },
            ConsensusVote {
                signal_id,
                agent_name: names::RISK_SENTINEL.to_string(),
                vote: risk.vote,
                confidence: risk.confidence,
                reasoning: serde_json::json!({
                    "risk_score": risk.risk_score,
                    "flags": &risk.risk_flags,
                }),
            },
        ];

        // Step 10: consensus arithmetic plus the stricter orchestrator
        // floor.
        let mut consensus = match self.decision_engine.collect_votes(&signal, &votes).await {
            Ok(result) => result,
            Err(e) => {
                error!("[{}] consensus persistence failed: {e:#}", self.core.name());
                let _ = self
                    .core
                    .ctx()
                    .repo
                    .update_status(signal_id, SignalStatus::Rejected)
                    .await;
                self.signals_rejected.fetch_add(1, Ordering::SeqCst);
                let mut outcome = self.skip(
                    symbol,
                    timeframe,
                    cycle,
                    cycle_start,
                    timer,
                    "Consensus collection failed".to_string(),
                );
                outcome.signal_id = Some(signal_id);
                outcome.action = CycleAction::Reject;
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        let min_required = self
            .decision_engine
            .min_confidence()
            .max(ORCHESTRATOR_MIN_CONFIDENCE);
        if consensus.approved && consensus.weighted_confidence < min_required {
            consensus.approved = false;
            info!(
                "[{}] signal {signal_id} overridden: confidence {:.1}% under the {:.1}% floor",
                self.core.name(),
                consensus.weighted_confidence * 100.0,
                min_required * 100.0
            );
        }

        // Step 11: final status.
        let new_status = if consensus.approved {
            SignalStatus::Approved
        } else {
            SignalStatus::Rejected
        };
        if let Err(e) = self
            .core
            .ctx()
            .repo
            .update_status(signal_id, new_status)
            .await
        {
            error!("[{}] status update failed: {e:#}", self.core.name());
        }

        if consensus.approved {
            self.signals_approved.fetch_add(1, Ordering::SeqCst);
            self.risk_sentinel.record_trade_executed();
        } else {
            self.signals_rejected.fetch_add(1, Ordering::SeqCst);
        }

        // Step 12: decision memory for the audit trail.
        if let Err(e) = self
            .core
            .memory()
            .store_decision(
                symbol,
                serde_json::json!({
                    "signal_id": signal_id,
                    "direction": direction,
                    "approved": consensus.approved,
                    "weighted_confidence": consensus.weighted_confidence,
                    "blended_confidence": blended_confidence,
                    "risk_flags": &risk.risk_flags,
                    "sentiment_agreement": sentiment_agreement,
                    "cycle": cycle,
                }),
                0.8,
            )
            .await
        {
            warn!("[{}] decision memory store failed: {e:#}", self.core.name());
        }

        let duration_ms = timer.elapsed().as_millis() as u64;
        let outcome = CycleOutcome {
            symbol: symbol.to_string(),
            signal_id: Some(signal_id),
            direction: Some(direction),
            action: if consensus.approved {
                CycleAction::Execute
            } else {
                CycleAction::Reject
            },
            reason: None,
            confidence: Some(consensus.weighted_confidence),
            blended_confidence: Some(blended_confidence),
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            risk_reward: signal.risk_reward,
            timeframe: timeframe.to_string(),
            consensus: Some(ConsensusSummary {
                approved: consensus.approved,
                approve_count: consensus.approve_count,
                reject_count: consensus.reject_count,
                weighted_confidence: consensus.weighted_confidence,
                min_required,
            }),
            risk: Some(RiskOutcome {
                score: risk.risk_score,
                flags: risk.risk_flags.clone(),
                kill_switch: false,
            }),
            sentiment: Some(SentimentOutcome {
                direction: alpha.direction,
                score: alpha.sentiment_score,
                regime: alpha.market_regime,
                agreement: sentiment_agreement,
            }),
            cycle,
            duration_ms,
            timestamp: cycle_start,
            error: None,
        };

        info!(
            "[{}] {symbol}: {:?} (confidence={:.1}%, risk_score={:.2}, {duration_ms}ms)",
            self.core.name(),
            outcome.action,
            consensus.weighted_confidence * 100.0,
            risk.risk_score
        );

        self.push_task_log(
            &outcome,
            direction,
            consensus.weighted_confidence,
            risk.risk_score,
        );
        outcome
    }

    /// Run a cycle for each symbol; one symbol's failure never aborts the
    /// sweep.
    pub async fn run_full_scan(
        &self,
        symbols: Option<Vec<String>>,
        strategy_id: &str,
    ) -> Vec<CycleOutcome> {
        let config = &self.core.ctx().config;
        let targets = symbols.unwrap_or_else(|| config.default_symbols.clone());
        let timeframe = config.timeframe.clone();

        let mut results = Vec::with_capacity(targets.len());
        for symbol in targets {
            results.push(self.run_scan_cycle(&symbol, strategy_id, &timeframe).await);
        }
        results
    }

    pub fn cycle_stats(&self) -> CycleStats {
        let approved = self.signals_approved.load(Ordering::SeqCst);
        let rejected = self.signals_rejected.load(Ordering::SeqCst);
        let total = approved + rejected;
        CycleStats {
            cycles_run: self.cycles_run.load(Ordering::SeqCst),
            signals_approved: approved,
            signals_rejected: rejected,
            approval_rate: if total > 0 {
                approved as f64 / total as f64
            } else {
                0.0
            },
            min_consensus_confidence: self
                .decision_engine
                .min_confidence()
                .max(ORCHESTRATOR_MIN_CONFIDENCE),
        }
    }

    pub fn task_log(&self, limit: usize) -> Vec<TaskLogEntry> {
        let log = self.task_log.lock().expect("task log poisoned");
        let start = log.len().saturating_sub(limit);
        log.iter().skip(start).cloned().collect()
    }

    fn skip(
        &self,
        symbol: &str,
        timeframe: &str,
        cycle: u64,
        cycle_start: DateTime<Utc>,
        timer: Instant,
        reason: String,
    ) -> CycleOutcome {
        info!("[{}] {symbol}: SKIP ({reason})", self.core.name());
        CycleOutcome {
            symbol: symbol.to_string(),
            signal_id: None,
            direction: None,
            action: CycleAction::Skip,
            reason: Some(reason),
            confidence: None,
            blended_confidence: None,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            risk_reward: None,
            timeframe: timeframe.to_string(),
            consensus: None,
            risk: None,
            sentiment: None,
            cycle,
            duration_ms: timer.elapsed().as_millis() as u64,
            timestamp: cycle_start,
            error: None,
        }
    }

    fn push_task_log(
        &self,
        outcome: &CycleOutcome,
        direction: SignalDirection,
        confidence: f64,
        risk_score: f64,
    ) {
        let mut log = self.task_log.lock().expect("task log poisoned");
        log.push_back(TaskLogEntry {
            cycle: outcome.cycle,
            symbol: outcome.symbol.clone(),
            direction,
            action: outcome.action,
            confidence,
            risk_score,
            duration_ms: outcome.duration_ms,
            timestamp: outcome.timestamp,
        });
        while log.len() > TASK_LOG_CAPACITY {
            log.pop_front();
        }
    }
}

#[async_trait]
impl Agent for Orchestrator {
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
