//! Technical Analyst: multi-indicator weighted synthesis with Smart Money
//! Concepts, producing a direction with ATR-derived levels.

use crate::application::agents::{Agent, AgentCore, names};
use crate::application::context::AgentContext;
use crate::domain::market::Candle;
use crate::domain::signal::SignalDirection;
use crate::domain::technical::{IndicatorSnapshot, TechnicalReport, ZoneCounts};
use crate::indicators::{atr, bollinger, elliott_wave, rsi, smc, support_resistance};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Minimum candles required for a reliable read.
pub const MIN_CANDLES: usize = 50;
/// Above this the indicator math moves to a blocking worker.
const OFFLOAD_THRESHOLD: usize = 1_000;

const ATR_MULTIPLIER_SL: f64 = 1.5;
const ATR_MULTIPLIER_TP: f64 = 2.5;
/// Winning side must lead by this share of the total score, otherwise the
/// read is noise and the analyst stays NEUTRAL.
const MIN_LEAD: f64 = 0.15;

/// Indicator weights in the synthesis. Order blocks carry the most weight;
/// they mark institutional interest.
const WEIGHT_RSI: f64 = 0.20;
const WEIGHT_BOLLINGER: f64 = 0.18;
const WEIGHT_ORDER_BLOCK: f64 = 0.22;
const WEIGHT_FVG: f64 = 0.15;
const WEIGHT_SUPPORT_RESISTANCE: f64 = 0.15;
const WEIGHT_ELLIOTT: f64 = 0.10;

struct SubSignal {
    direction: SignalDirection,
    confidence: f64,
    weight: f64,
    label: String,
}

impl SubSignal {
    fn new(direction: SignalDirection, confidence: f64, weight: f64, label: String) -> Self {
        Self {
            direction,
            confidence,
            weight,
            label,
        }
    }
}

struct IndicatorBundle {
    rsi: rsi::RsiOutput,
    bollinger: bollinger::BollingerBands,
    sr: support_resistance::SupportResistance,
    order_blocks: smc::OrderBlocks,
    fvg: smc::FairValueGaps,
    elliott: elliott_wave::ElliottWave,
    atr: f64,
    current_price: f64,
}

pub struct TechnicalAnalyst {
    core: AgentCore,
}

impl TechnicalAnalyst {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            core: AgentCore::new(
                names::TECHNICAL_ANALYST,
                "Technical Analysis: SMC, RSI, Bollinger, Elliott, S/R",
                "1.3.0",
                ctx,
            ),
        }
    }

    pub async fn run_with_tracking(
        &self,
        symbol: &str,
        candles: Vec<Candle>,
        timeframe: &str,
    ) -> Result<TechnicalReport> {
        self.core
            .track(symbol, self.analyze(symbol, candles, timeframe))
            .await
    }

    /// Run the full indicator stack and synthesize one conviction.
    pub async fn analyze(
        &self,
        symbol: &str,
        candles: Vec<Candle>,
        timeframe: &str,
    ) -> Result<TechnicalReport> {
        if candles.len() < MIN_CANDLES {
            return Ok(TechnicalReport::insufficient(
                symbol,
                timeframe,
                candles.len(),
                MIN_CANDLES,
            ));
        }

        let bundle = if candles.len() > OFFLOAD_THRESHOLD {
            // Large series: run the math off the event loop.
            match tokio::task::spawn_blocking(move || Self::run_indicators(&candles)).await {
                Ok(bundle) => bundle,
                Err(e) => return Err(anyhow::anyhow!("indicator worker failed: {e}")),
            }
        } else {
            Self::run_indicators(&candles)
        };

        let sub_signals = Self::collect_sub_signals(&bundle);
        let (direction, confidence, reasoning) = Self::synthesize_weighted(&sub_signals);

        let current_price = bundle.current_price;
        let (entry_price, stop_loss, take_profit, risk_reward) = match direction {
            SignalDirection::Long => {
                let sl = current_price - ATR_MULTIPLIER_SL * bundle.atr;
                let tp = current_price + ATR_MULTIPLIER_TP * bundle.atr;
                (Some(current_price), Some(sl), Some(tp), level_rr(current_price, sl, tp))
            }
            SignalDirection::Short => {
                let sl = current_price + ATR_MULTIPLIER_SL * bundle.atr;
                let tp = current_price - ATR_MULTIPLIER_TP * bundle.atr;
                (Some(current_price), Some(sl), Some(tp), level_rr(current_price, sl, tp))
            }
            SignalDirection::Neutral => (None, None, None, None),
        };

        let report = TechnicalReport {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            direction,
            confidence,
            entry_price,
            stop_loss,
            take_profit,
            risk_reward,
            atr: Some(bundle.atr),
            indicators: Some(IndicatorSnapshot {
                rsi: bundle.rsi,
                bollinger: bundle.bollinger,
                support_resistance: bundle.sr,
                order_blocks: ZoneCounts {
                    bullish_count: bundle.order_blocks.bullish.len(),
                    bearish_count: bundle.order_blocks.bearish.len(),
                },
                fvg: ZoneCounts {
                    bullish_count: bundle.fvg.bullish.len(),
                    bearish_count: bundle.fvg.bearish.len(),
                },
                elliott_wave: bundle.elliott,
            }),
            reasoning,
            signal_count: sub_signals.len(),
            error: None,
        };

        if let Err(e) = self
            .core
            .memory()
            .store_decision(
                symbol,
                serde_json::json!({
                    "direction": direction,
                    "confidence": confidence,
                    "entry_price": current_price,
                    "timeframe": timeframe,
                }),
                0.7,
            )
            .await
        {
            warn!("[{}] decision memory store failed: {e:#}", self.core.name());
        }

        info!(
            "[{}] {symbol} ({timeframe}): {direction} at {confidence:.2} from {} sub-signals",
            self.core.name(),
            sub_signals.len()
        );

        Ok(report)
    }

    fn run_indicators(candles: &[Candle]) -> IndicatorBundle {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

        IndicatorBundle {
            rsi: rsi::compute_rsi(&closes, rsi::DEFAULT_PERIOD),
            bollinger: bollinger::compute_bollinger(
                &closes,
                bollinger::DEFAULT_PERIOD,
                bollinger::DEFAULT_STD_DEV,
            ),
            sr: support_resistance::detect_support_resistance(
                &highs,
                &lows,
                &closes,
                support_resistance::DEFAULT_LOOKBACK,
            ),
            order_blocks: smc::detect_order_blocks(candles, smc::DEFAULT_LOOKBACK),
            fvg: smc::detect_fvg(candles, smc::DEFAULT_LOOKBACK),
            elliott: elliott_wave::detect_elliott_wave(&closes, elliott_wave::DEFAULT_MIN_WAVE_PCT),
            atr: atr::compute_atr(&highs, &lows, &closes, atr::DEFAULT_PERIOD),
            current_price: closes.last().copied().unwrap_or(0.0),
        }
    }

    fn collect_sub_signals(bundle: &IndicatorBundle) -> Vec<SubSignal> {
        let mut signals = Vec::new();
        let price = bundle.current_price;

        // RSI momentum bands.
        let current_rsi = bundle.rsi.current;
        if current_rsi < 30.0 {
            signals.push(SubSignal::new(
                SignalDirection::Long,
                0.80,
                WEIGHT_RSI,
                format!("RSI oversold ({current_rsi:.1})"),
            ));
        } else if current_rsi < 40.0 {
            signals.push(SubSignal::new(
                SignalDirection::Long,
                0.50,
                WEIGHT_RSI,
                format!("RSI approaching oversold ({current_rsi:.1})"),
            ));
        } else if current_rsi > 70.0 {
            signals.push(SubSignal::new(
                SignalDirection::Short,
                0.80,
                WEIGHT_RSI,
                format!("RSI overbought ({current_rsi:.1})"),
            ));
        } else if current_rsi > 60.0 {
            signals.push(SubSignal::new(
                SignalDirection::Short,
                0.50,
                WEIGHT_RSI,
                format!("RSI approaching overbought ({current_rsi:.1})"),
            ));
        } else {
            signals.push(SubSignal::new(
                SignalDirection::Neutral,
                0.30,
                WEIGHT_RSI,
                format!("RSI neutral ({current_rsi:.1})"),
            ));
        }

        // Bollinger band position.
        let bb = &bundle.bollinger;
        if price <= bb.lower {
            signals.push(SubSignal::new(
                SignalDirection::Long,
                0.75,
                WEIGHT_BOLLINGER,
                "Price at/below lower Bollinger, mean reversion likely".to_string(),
            ));
        } else if price >= bb.upper {
            signals.push(SubSignal::new(
                SignalDirection::Short,
                0.75,
                WEIGHT_BOLLINGER,
                "Price at/above upper Bollinger, mean reversion likely".to_string(),
            ));
        } else if price > bb.middle && bb.bandwidth < 0.02 {
            signals.push(SubSignal::new(
                SignalDirection::Long,
                0.35,
                WEIGHT_BOLLINGER,
                "Bollinger squeeze, breakout pending".to_string(),
            ));
        } else {
            signals.push(SubSignal::new(
                SignalDirection::Neutral,
                0.20,
                WEIGHT_BOLLINGER,
                "Price within Bollinger bands".to_string(),
            ));
        }

        // Support / resistance proximity.
        if let Some(support) = bundle.sr.nearest_support
            && price <= support * 1.008
        {
            let proximity = (price - support).abs() / price;
            let confidence = (0.70 - proximity * 10.0).max(0.40);
            signals.push(SubSignal::new(
                SignalDirection::Long,
                confidence,
                WEIGHT_SUPPORT_RESISTANCE,
                format!("Near support {support:.4} ({:.2}% away)", proximity * 100.0),
            ));
        } else if let Some(resistance) = bundle.sr.nearest_resistance
            && price >= resistance * 0.992
        {
            let proximity = (price - resistance).abs() / price;
            let confidence = (0.70 - proximity * 10.0).max(0.40);
            signals.push(SubSignal::new(
                SignalDirection::Short,
                confidence,
                WEIGHT_SUPPORT_RESISTANCE,
                format!(
                    "Near resistance {resistance:.4} ({:.2}% away)",
                    proximity * 100.0
                ),
            ));
        }

        // Order blocks: institutional zones near price.
        if let Some(last_bull) = bundle.order_blocks.bullish.last()
            && price <= last_bull.high * 1.005
        {
            signals.push(SubSignal::new(
                SignalDirection::Long,
                0.75,
                WEIGHT_ORDER_BLOCK,
                format!("Bullish OB at {:.4}-{:.4}", last_bull.low, last_bull.high),
            ));
        }
        if let Some(last_bear) = bundle.order_blocks.bearish.last()
            && price >= last_bear.low * 0.995
        {
            signals.push(SubSignal::new(
                SignalDirection::Short,
                0.75,
                WEIGHT_ORDER_BLOCK,
                format!("Bearish OB at {:.4}-{:.4}", last_bear.low, last_bear.high),
            ));
        }

        // Fair value gaps pull price toward the imbalance.
        if !bundle.fvg.bullish.is_empty() {
            signals.push(SubSignal::new(
                SignalDirection::Long,
                0.60,
                WEIGHT_FVG,
                format!(
                    "{} bullish FVG(s), price likely to fill gap upward",
                    bundle.fvg.bullish.len()
                ),
            ));
        }
        if !bundle.fvg.bearish.is_empty() {
            signals.push(SubSignal::new(
                SignalDirection::Short,
                0.60,
                WEIGHT_FVG,
                format!(
                    "{} bearish FVG(s), price likely to fill gap downward",
                    bundle.fvg.bearish.len()
                ),
            ));
        }

        // Elliott wave position in the cycle.
        match bundle.elliott.wave_count {
            2 | 4 => signals.push(SubSignal::new(
                SignalDirection::Long,
                0.55,
                WEIGHT_ELLIOTT,
                format!(
                    "Elliott wave {} (corrective end, impulse expected)",
                    bundle.elliott.wave_count
                ),
            )),
            3 => signals.push(SubSignal::new(
                SignalDirection::Short,
                0.45,
                WEIGHT_ELLIOTT,
                "Elliott wave 3 (impulse peak region)".to_string(),
            )),
            5 => signals.push(SubSignal::new(
                SignalDirection::Short,
                0.60,
                WEIGHT_ELLIOTT,
                "Elliott wave 5 (terminal impulse, reversal likely)".to_string(),
            )),
            _ => {}
        }

        signals
    }

    /// Weighted vote across sub-signals. Requires a clear lead before
    /// committing to a direction.
    fn synthesize_weighted(signals: &[SubSignal]) -> (SignalDirection, f64, Vec<String>) {
        if signals.is_empty() {
            return (SignalDirection::Neutral, 0.0, Vec::new());
        }

        let reasoning: Vec<String> = signals.iter().map(|s| s.label.clone()).collect();

        let long_score: f64 = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Long)
            .map(|s| s.confidence * s.weight)
            .sum();
        let short_score: f64 = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Short)
            .map(|s| s.confidence * s.weight)
            .sum();
        let total = long_score + short_score;

        if total == 0.0 {
            return (SignalDirection::Neutral, 0.25, reasoning);
        }

        let (winner, winning_score) = if long_score > short_score {
            (SignalDirection::Long, long_score)
        } else if short_score > long_score {
            (SignalDirection::Short, short_score)
        } else {
            return (SignalDirection::Neutral, 0.50, reasoning);
        };

        let lead = (long_score - short_score).abs() / total;
        if lead < MIN_LEAD {
            return (SignalDirection::Neutral, 0.35, reasoning);
        }

        (winner, (winning_score / total).min(0.95), reasoning)
    }
}

fn level_rr(entry: f64, stop: f64, target: f64) -> Option<f64> {
    let sl_dist = (entry - stop).abs();
    if sl_dist > 0.0 {
        Some((target - entry).abs() / sl_dist)
    } else {
        None
    }
}

#[async_trait]
impl Agent for TechnicalAnalyst {
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
    use crate::domain::ports::ManualClock;
    use crate::infrastructure::message_bus::MessageBus;
    use crate::infrastructure::repositories::in_memory::InMemorySignalRepository;
    use chrono::Utc;
    use std::sync::Arc;

    fn analyst() -> TechnicalAnalyst {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        TechnicalAnalyst::new(AgentContext::new(
            Arc::new(InMemorySignalRepository::new(clock.clone())),
            MessageBus::new(),
            clock,
            Arc::new(Config::default()),
        ))
    }

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume: 1_000.0,
            close_time: 0,
        }
    }

    /// A long grind lower into oversold territory ending near the lows:
    /// RSI deep, price at the lower band.
    fn oversold_series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 200.0 - i as f64 * 1.5;
                candle(base + 1.0, base + 2.0, base - 2.0, base)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insufficient_candles_is_an_explicit_error_report() {
        let report = analyst()
            .analyze("BTCUSDT", oversold_series(49), "1h")
            .await
            .unwrap();
        assert_eq!(report.direction, SignalDirection::Neutral);
        assert_eq!(report.confidence, 0.0);
        assert!(report.entry_price.is_none());
        let error = report.error.expect("expected error string");
        assert!(error.contains("49 < 50"));
    }

    #[tokio::test]
    async fn test_oversold_series_goes_long_with_atr_levels() {
        let report = analyst()
            .analyze("BTCUSDT", oversold_series(100), "1h")
            .await
            .unwrap();
        assert_eq!(report.direction, SignalDirection::Long);
        assert!(report.confidence > 0.5);

        let entry = report.entry_price.unwrap();
        let sl = report.stop_loss.unwrap();
        let tp = report.take_profit.unwrap();
        let atr = report.atr.unwrap();
        assert!((entry - sl - ATR_MULTIPLIER_SL * atr).abs() < 1e-9);
        assert!((tp - entry - ATR_MULTIPLIER_TP * atr).abs() < 1e-9);

        let rr = report.risk_reward.unwrap();
        assert!((rr - ATR_MULTIPLIER_TP / ATR_MULTIPLIER_SL).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_overbought_series_goes_short_with_mirrored_levels() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let base = 100.0 + i as f64 * 1.5;
                candle(base - 1.0, base + 2.0, base - 2.0, base)
            })
            .collect();
        let report = analyst().analyze("BTCUSDT", candles, "1h").await.unwrap();
        assert_eq!(report.direction, SignalDirection::Short);

        let entry = report.entry_price.unwrap();
        assert!(report.stop_loss.unwrap() > entry);
        assert!(report.take_profit.unwrap() < entry);
    }

    #[tokio::test]
    async fn test_choppy_series_stays_neutral_without_levels() {
        // Mild alternation: RSI hovers at 50, price sits inside the bands,
        // and no structure (OB/FVG/pivot proximity) is near price.
        let candles: Vec<Candle> = (0..101)
            .map(|i| {
                if i % 2 == 0 {
                    candle(100.3, 101.5, 98.5, 100.0)
                } else {
                    candle(100.0, 101.5, 98.5, 100.3)
                }
            })
            .collect();
        let report = analyst().analyze("BTCUSDT", candles, "1h").await.unwrap();
        assert_eq!(report.direction, SignalDirection::Neutral);
        assert!(report.entry_price.is_none());
        assert!(report.risk_reward.is_none());
    }

    #[test]
    fn test_synthesis_requires_a_clear_lead() {
        let near_tie = vec![
            SubSignal::new(SignalDirection::Long, 0.60, 0.30, "l".to_string()),
            SubSignal::new(SignalDirection::Short, 0.55, 0.30, "s".to_string()),
        ];
        let (direction, confidence, _) = TechnicalAnalyst::synthesize_weighted(&near_tie);
        assert_eq!(direction, SignalDirection::Neutral);
        assert_eq!(confidence, 0.35);
    }

    #[test]
    fn test_synthesis_confidence_is_capped() {
        let one_sided = vec![SubSignal::new(
            SignalDirection::Long,
            0.90,
            0.50,
            "l".to_string(),
        )];
        let (direction, confidence, _) = TechnicalAnalyst::synthesize_weighted(&one_sided);
        assert_eq!(direction, SignalDirection::Long);
        assert_eq!(confidence, 0.95);
    }

    #[test]
    fn test_all_neutral_sub_signals() {
        let neutral = vec![
            SubSignal::new(SignalDirection::Neutral, 0.30, 0.20, "rsi".to_string()),
            SubSignal::new(SignalDirection::Neutral, 0.20, 0.18, "bb".to_string()),
        ];
        let (direction, confidence, reasoning) = TechnicalAnalyst::synthesize_weighted(&neutral);
        assert_eq!(direction, SignalDirection::Neutral);
        assert_eq!(confidence, 0.25);
        assert_eq!(reasoning.len(), 2);
    }
}
