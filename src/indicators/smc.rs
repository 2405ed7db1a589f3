//! Smart Money Concepts: order blocks and fair value gaps.

use crate::domain::market::Candle;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOOKBACK: usize = 50;
/// The impulsive successor must outweigh the opposing candle's body by this
/// factor for it to qualify as an order block.
const IMPULSE_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderBlock {
    pub high: f64,
    pub low: f64,
    pub index: usize,
    /// Successor body magnitude over the block's own body magnitude.
    pub strength: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBlocks {
    pub bullish: Vec<OrderBlock>,
    pub bearish: Vec<OrderBlock>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FairValueGap {
    pub top: f64,
    pub bottom: f64,
    pub gap_size: f64,
    pub index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FairValueGaps {
    pub bullish: Vec<FairValueGap>,
    pub bearish: Vec<FairValueGap>,
}

/// Detect order blocks: the last opposing candle before a strong impulsive
/// move. Keeps the most recent five per side.
pub fn detect_order_blocks(candles: &[Candle], lookback: usize) -> OrderBlocks {
    if candles.len() < 3 {
        return OrderBlocks::default();
    }

    let start = candles.len().saturating_sub(lookback);
    let recent = &candles[start..];

    let mut blocks = OrderBlocks::default();
    for i in 1..recent.len() - 1 {
        let curr = &recent[i];
        let next = &recent[i + 1];

        let curr_body = curr.body();
        let next_body = next.body();
        let strength = if curr_body.abs() > 0.0 {
            next_body.abs() / curr_body.abs()
        } else {
            0.0
        };

        // Bullish OB: bearish candle swallowed by a strong bullish move.
        if curr_body < 0.0 && next_body > 0.0 && next_body.abs() > curr_body.abs() * IMPULSE_FACTOR
        {
            blocks.bullish.push(OrderBlock {
                high: curr.high,
                low: curr.low,
                index: i,
                strength,
            });
        }

        // Bearish OB: bullish candle swallowed by a strong bearish move.
        if curr_body > 0.0 && next_body < 0.0 && next_body.abs() > curr_body.abs() * IMPULSE_FACTOR
        {
            blocks.bearish.push(OrderBlock {
                high: curr.high,
                low: curr.low,
                index: i,
                strength,
            });
        }
    }

    trim_to_last(&mut blocks.bullish, 5);
    trim_to_last(&mut blocks.bearish, 5);
    blocks
}

/// Detect three-candle fair value gaps: the outer candles do not overlap,
/// leaving an unfilled imbalance. Keeps the most recent five per side.
pub fn detect_fvg(candles: &[Candle], lookback: usize) -> FairValueGaps {
    if candles.len() < 3 {
        return FairValueGaps::default();
    }

    let start = candles.len().saturating_sub(lookback);
    let recent = &candles[start..];

    let mut gaps = FairValueGaps::default();
    for i in 2..recent.len() {
        let c1 = &recent[i - 2];
        let c3 = &recent[i];

        // Bullish FVG: gap up, candle 3 low clears candle 1 high.
        if c3.low > c1.high {
            gaps.bullish.push(FairValueGap {
                top: c3.low,
                bottom: c1.high,
                gap_size: c3.low - c1.high,
                index: i,
            });
        }

        // Bearish FVG: gap down, candle 3 high stays under candle 1 low.
        if c3.high < c1.low {
            gaps.bearish.push(FairValueGap {
                top: c1.low,
                bottom: c3.high,
                gap_size: c1.low - c3.high,
                index: i,
            });
        }
    }

    trim_to_last(&mut gaps.bullish, 5);
    trim_to_last(&mut gaps.bearish, 5);
    gaps
}

fn trim_to_last<T>(items: &mut Vec<T>, keep: usize) {
    if items.len() > keep {
        items.drain(..items.len() - keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn flat_run(n: usize) -> Vec<Candle> {
        (0..n).map(|_| candle(100.0, 101.0, 99.0, 100.0)).collect()
    }

    #[test]
    fn test_bullish_order_block() {
        let mut candles = flat_run(10);
        // Bearish candle with a 1.0 body...
        candles.push(candle(101.0, 101.5, 99.5, 100.0));
        // ...followed by a 4.0-body bullish impulse.
        candles.push(candle(100.0, 104.5, 100.0, 104.0));

        let obs = detect_order_blocks(&candles, DEFAULT_LOOKBACK);
        assert_eq!(obs.bullish.len(), 1);
        assert!(obs.bearish.is_empty());
        let ob = &obs.bullish[0];
        assert_eq!(ob.high, 101.5);
        assert_eq!(ob.low, 99.5);
        assert!((ob.strength - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_weak_impulse_is_not_an_order_block() {
        let mut candles = flat_run(10);
        candles.push(candle(101.0, 101.5, 99.5, 100.0)); // body 1.0
        candles.push(candle(100.0, 101.5, 100.0, 101.2)); // body 1.2 < 1.5x

        let obs = detect_order_blocks(&candles, DEFAULT_LOOKBACK);
        assert!(obs.bullish.is_empty());
    }

    #[test]
    fn test_bearish_order_block() {
        let mut candles = flat_run(10);
        candles.push(candle(100.0, 101.5, 99.5, 101.0)); // bullish, body 1.0
        candles.push(candle(101.0, 101.0, 96.0, 97.0)); // bearish, body 4.0

        let obs = detect_order_blocks(&candles, DEFAULT_LOOKBACK);
        assert_eq!(obs.bearish.len(), 1);
        assert_eq!(obs.bearish[0].high, 101.5);
    }

    #[test]
    fn test_bullish_fvg() {
        let mut candles = flat_run(5);
        candles.push(candle(100.0, 102.0, 99.0, 101.0)); // c1, high 102
        candles.push(candle(101.0, 110.0, 101.0, 109.0)); // c2 impulse
        candles.push(candle(109.0, 112.0, 105.0, 111.0)); // c3, low 105 > 102

        let gaps = detect_fvg(&candles, DEFAULT_LOOKBACK);
        assert_eq!(gaps.bullish.len(), 1);
        let gap = &gaps.bullish[0];
        assert_eq!(gap.bottom, 102.0);
        assert_eq!(gap.top, 105.0);
        assert!((gap.gap_size - 3.0).abs() < 1e-9);
        assert!(gaps.bearish.is_empty());
    }

    #[test]
    fn test_bearish_fvg() {
        let mut candles = flat_run(5);
        candles.push(candle(100.0, 101.0, 98.0, 99.0)); // c1, low 98
        candles.push(candle(99.0, 99.0, 90.0, 91.0)); // c2 impulse down
        candles.push(candle(91.0, 95.0, 89.0, 90.0)); // c3, high 95 < 98

        let gaps = detect_fvg(&candles, DEFAULT_LOOKBACK);
        assert_eq!(gaps.bearish.len(), 1);
        let gap = &gaps.bearish[0];
        assert_eq!(gap.top, 98.0);
        assert_eq!(gap.bottom, 95.0);
    }

    #[test]
    fn test_overlapping_candles_leave_no_gap() {
        let gaps = detect_fvg(&flat_run(20), DEFAULT_LOOKBACK);
        assert!(gaps.bullish.is_empty());
        assert!(gaps.bearish.is_empty());
    }

    #[test]
    fn test_zone_lists_keep_last_five() {
        let mut candles = flat_run(3);
        // Stack eight consecutive gap-ups.
        let mut base = 100.0;
        for _ in 0..8 {
            candles.push(candle(base, base + 1.0, base - 1.0, base + 0.5));
            candles.push(candle(base + 4.0, base + 6.0, base + 3.0, base + 5.0));
            base += 8.0;
        }
        let gaps = detect_fvg(&candles, 100);
        assert!(gaps.bullish.len() <= 5);
    }
}
