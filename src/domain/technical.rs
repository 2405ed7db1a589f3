use crate::domain::signal::SignalDirection;
use crate::indicators::bollinger::BollingerBands;
use crate::indicators::elliott_wave::ElliottWave;
use crate::indicators::rsi::RsiOutput;
use crate::indicators::support_resistance::SupportResistance;
use serde::{Deserialize, Serialize};

/// Counts exposed in the indicator snapshot instead of full zone lists;
/// the zones themselves only matter inside the synthesis step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneCounts {
    pub bullish_count: usize,
    pub bearish_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: RsiOutput,
    pub bollinger: BollingerBands,
    pub support_resistance: SupportResistance,
    pub order_blocks: ZoneCounts,
    pub fvg: ZoneCounts,
    pub elliott_wave: ElliottWave,
}

/// Technical Analyst output for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub symbol: String,
    pub timeframe: String,
    pub direction: SignalDirection,
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_reward: Option<f64>,
    pub atr: Option<f64>,
    pub indicators: Option<IndicatorSnapshot>,
    pub reasoning: Vec<String>,
    pub signal_count: usize,
    pub error: Option<String>,
}

impl TechnicalReport {
    /// Report emitted when the candle series is too short to analyze.
    pub fn insufficient(symbol: &str, timeframe: &str, have: usize, need: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            direction: SignalDirection::Neutral,
            confidence: 0.0,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            risk_reward: None,
            atr: None,
            indicators: None,
            reasoning: Vec::new(),
            signal_count: 0,
            error: Some(format!("Insufficient candle data: {have} < {need} required")),
        }
    }
}
