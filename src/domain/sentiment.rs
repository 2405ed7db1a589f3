use crate::domain::signal::SignalDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse market mood derived from aggregate sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    RiskOn,
    RiskOff,
    Neutral,
    Unknown,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RiskOn => write!(f, "RISK_ON"),
            Self::RiskOff => write!(f, "RISK_OFF"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// How well the adaptive bias correction tracks realized outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationQuality {
    InsufficientData,
    WellCalibrated,
    Moderate,
    NeedsRecalibration,
}

/// A news article as parsed from an RSS feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Alpha Scout output for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReport {
    pub symbol: String,
    pub sentiment_score: f64,
    pub raw_score: f64,
    pub confidence: f64,
    pub direction: SignalDirection,
    pub article_count: usize,
    pub bias_correction: f64,
    pub macro_overlay: Option<f64>,
    pub market_regime: MarketRegime,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl SentimentReport {
    /// The contract for an empty feed sweep: neutral, low confidence, never
    /// an error.
    pub fn empty(symbol: &str, consecutive_failures: u32, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            sentiment_score: 0.0,
            raw_score: 0.0,
            confidence: 0.2,
            direction: SignalDirection::Neutral,
            article_count: 0,
            bias_correction: 0.0,
            macro_overlay: None,
            market_regime: MarketRegime::Unknown,
            summary: format!(
                "No articles found for {symbol} (consecutive failures: {consecutive_failures})"
            ),
            timestamp: now,
        }
    }
}
