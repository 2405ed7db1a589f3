use crate::domain::errors::SignalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Long,
    Short,
    Neutral,
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl SignalDirection {
    pub fn parse(s: &str) -> Self {
        match s {
            "LONG" => Self::Long,
            "SHORT" => Self::Short,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Executed => write!(f, "executed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl SignalStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "executed" => Self::Executed,
            "expired" => Self::Expired,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Approve,
    Reject,
    Abstain,
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Abstain => write!(f, "abstain"),
        }
    }
}

impl VoteType {
    pub fn parse(s: &str) -> Self {
        match s {
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            _ => Self::Abstain,
        }
    }
}

/// A candidate trade decision, the central artifact of a scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Option<i64>,
    pub symbol: String,
    pub direction: SignalDirection,
    pub confidence: f64,
    pub source_agent: String,
    pub reasoning: serde_json::Value,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_reward: Option<f64>,
    pub timeframe: String,
    pub strategy_id: String,
    pub status: SignalStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Check structural invariants before persistence.
    ///
    /// A directional signal must carry entry/stop/target levels on the
    /// correct sides of the entry, and the stated risk/reward must match the
    /// level arithmetic to within 1e-6.
    pub fn validate(&self) -> Result<(), SignalError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SignalError::ConfidenceOutOfRange {
                value: self.confidence,
            });
        }

        if self.direction == SignalDirection::Neutral {
            return Ok(());
        }

        let (entry, stop, target) = match (self.entry_price, self.stop_loss, self.take_profit) {
            (Some(e), Some(s), Some(t)) => (e, s, t),
            _ => {
                return Err(SignalError::MissingLevels {
                    direction: self.direction,
                });
            }
        };

        let levels_ok = match self.direction {
            SignalDirection::Long => stop < entry && entry < target,
            SignalDirection::Short => target < entry && entry < stop,
            SignalDirection::Neutral => true,
        };
        if !levels_ok {
            return Err(SignalError::InconsistentLevels {
                direction: self.direction,
                entry_price: entry,
                stop_loss: stop,
                take_profit: target,
            });
        }

        if let Some(rr) = self.risk_reward {
            let sl_dist = (entry - stop).abs();
            if sl_dist > 0.0 {
                let expected = (target - entry).abs() / sl_dist;
                if (expected - rr).abs() > 1e-6 {
                    return Err(SignalError::RiskRewardMismatch {
                        expected,
                        actual: rr,
                    });
                }
            }
        }

        Ok(())
    }
}

/// One agent's judgement of a candidate signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub signal_id: i64,
    pub agent_name: String,
    pub vote: VoteType,
    pub confidence: f64,
    pub reasoning: serde_json::Value,
}

/// Outcome of one consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub signal_id: i64,
    pub approved: bool,
    pub total_votes: usize,
    pub approve_count: usize,
    pub reject_count: usize,
    pub abstain_count: usize,
    pub weighted_confidence: f64,
    pub votes: Vec<ConsensusVote>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_signal() -> Signal {
        Signal {
            id: None,
            symbol: "BTCUSDT".to_string(),
            direction: SignalDirection::Long,
            confidence: 0.7,
            source_agent: "orchestrator".to_string(),
            reasoning: serde_json::json!({}),
            entry_price: Some(100.0),
            stop_loss: Some(97.0),
            take_profit: Some(105.0),
            risk_reward: Some(5.0 / 3.0),
            timeframe: "1h".to_string(),
            strategy_id: "default".to_string(),
            status: SignalStatus::Pending,
            created_at: None,
        }
    }

    #[test]
    fn test_valid_long_signal() {
        assert!(long_signal().validate().is_ok());
    }

    #[test]
    fn test_levels_must_straddle_entry() {
        let mut signal = long_signal();
        signal.stop_loss = Some(101.0); // stop above entry on a long
        assert!(matches!(
            signal.validate(),
            Err(SignalError::InconsistentLevels { .. })
        ));
    }

    #[test]
    fn test_short_levels_are_mirrored() {
        let mut signal = long_signal();
        signal.direction = SignalDirection::Short;
        signal.stop_loss = Some(103.0);
        signal.take_profit = Some(95.0);
        signal.risk_reward = Some(5.0 / 3.0);
        assert!(signal.validate().is_ok());
    }

    #[test]
    fn test_directional_signal_requires_levels() {
        let mut signal = long_signal();
        signal.take_profit = None;
        assert!(matches!(
            signal.validate(),
            Err(SignalError::MissingLevels { .. })
        ));
    }

    #[test]
    fn test_risk_reward_must_match_levels() {
        let mut signal = long_signal();
        signal.risk_reward = Some(3.0);
        assert!(matches!(
            signal.validate(),
            Err(SignalError::RiskRewardMismatch { .. })
        ));
    }

    #[test]
    fn test_neutral_signal_needs_no_levels() {
        let mut signal = long_signal();
        signal.direction = SignalDirection::Neutral;
        signal.entry_price = None;
        signal.stop_loss = None;
        signal.take_profit = None;
        signal.risk_reward = None;
        assert!(signal.validate().is_ok());
    }

    #[test]
    fn test_direction_wire_format() {
        assert_eq!(
            serde_json::to_string(&SignalDirection::Long).unwrap(),
            "\"LONG\""
        );
        assert_eq!(SignalStatus::Approved.to_string(), "approved");
        assert_eq!(VoteType::parse("reject"), VoteType::Reject);
        assert_eq!(VoteType::parse("garbage"), VoteType::Abstain);
    }
}
