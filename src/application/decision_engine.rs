//! Weighted consensus voting with risk-sentinel veto.

use crate::application::agents::names;
use crate::domain::repositories::SignalRepository;
use crate::domain::signal::{ConsensusResult, ConsensusVote, Signal, VoteType};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Confidence an agent must carry on a reject for it to count as a veto.
const VETO_CONFIDENCE: f64 = 0.8;
/// Weight for agents outside the known set.
const DEFAULT_WEIGHT: f64 = 0.1;

fn agent_weight(agent_name: &str) -> f64 {
    match agent_name {
        names::ALPHA_SCOUT => 0.20,
        names::TECHNICAL_ANALYST => 0.35,
        names::RISK_SENTINEL => 0.30,
        names::ORCHESTRATOR => 0.15,
        _ => DEFAULT_WEIGHT,
    }
}

pub struct DecisionEngine {
    min_confidence: f64,
    repo: Arc<dyn SignalRepository>,
}

impl DecisionEngine {
    pub fn new(min_confidence: f64, repo: Arc<dyn SignalRepository>) -> Self {
        Self {
            min_confidence,
            repo,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Tally the votes, apply the veto rule, persist each vote, and decide.
    ///
    /// Abstentions carry no weight. Approve scores count the voter's
    /// confidence; reject scores count its complement, so a confident
    /// rejection drags the weighted confidence down.
    pub async fn collect_votes(
        &self,
        signal: &Signal,
        votes: &[ConsensusVote],
    ) -> Result<ConsensusResult> {
        let approve_count = votes.iter().filter(|v| v.vote == VoteType::Approve).count();
        let reject_count = votes.iter().filter(|v| v.vote == VoteType::Reject).count();
        let abstain_count = votes.iter().filter(|v| v.vote == VoteType::Abstain).count();

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for vote in votes {
            if vote.vote == VoteType::Abstain {
                continue;
            }
            let weight = agent_weight(&vote.agent_name);
            let score = if vote.vote == VoteType::Approve {
                vote.confidence
            } else {
                1.0 - vote.confidence
            };
            weighted_sum += score * weight;
            weight_total += weight;
        }
        let weighted_confidence = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let risk_veto = votes.iter().any(|v| {
            v.agent_name == names::RISK_SENTINEL
                && v.vote == VoteType::Reject
                && v.confidence > VETO_CONFIDENCE
        });

        let approved = weighted_confidence >= self.min_confidence
            && approve_count > reject_count
            && !risk_veto;

        if signal.id.is_some() {
            for vote in votes {
                self.repo.insert_vote(vote).await?;
            }
        }

        info!(
            "Consensus for {}: {} (confidence={:.2}, veto={risk_veto})",
            signal.symbol,
            if approved { "APPROVED" } else { "REJECTED" },
            weighted_confidence
        );

        Ok(ConsensusResult {
            signal_id: signal.id.unwrap_or(0),
            approved,
            total_votes: votes.len(),
            approve_count,
            reject_count,
            abstain_count,
            weighted_confidence,
            votes: votes.to_vec(),
        })
    }
}
