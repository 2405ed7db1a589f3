use serde::{Deserialize, Serialize};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STD_DEV: f64 = 2.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle
    pub bandwidth: f64,
    /// Position of the last close inside the band, 0 at lower, 1 at upper.
    pub percent_b: f64,
}

/// SMA-centred Bollinger bands over the last `period` closes.
///
/// A series shorter than `period` collapses all three bands onto the current
/// price with percent_b pinned at 0.5.
pub fn compute_bollinger(closes: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if closes.len() < period {
        let price = closes.last().copied().unwrap_or(0.0);
        return BollingerBands {
            upper: price,
            middle: price,
            lower: price,
            bandwidth: 0.0,
            percent_b: 0.5,
        };
    }

    let window = &closes[closes.len() - period..];
    let sma = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|c| (c - sma).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();

    let upper = sma + std_dev * std;
    let lower = sma - std_dev * std;
    let current = closes[closes.len() - 1];

    let bandwidth = if sma > 0.0 { (upper - lower) / sma } else { 0.0 };
    let percent_b = if upper - lower > 0.0 {
        (current - lower) / (upper - lower)
    } else {
        0.5
    };

    BollingerBands {
        upper,
        middle: sma,
        lower,
        bandwidth,
        percent_b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series_collapses_to_price() {
        let bb = compute_bollinger(&[101.0, 102.0], DEFAULT_PERIOD, DEFAULT_STD_DEV);
        assert_eq!(bb.upper, 102.0);
        assert_eq!(bb.middle, 102.0);
        assert_eq!(bb.lower, 102.0);
        assert_eq!(bb.percent_b, 0.5);
        assert_eq!(bb.bandwidth, 0.0);
    }

    #[test]
    fn test_flat_series_has_zero_width() {
        let closes = vec![100.0; 30];
        let bb = compute_bollinger(&closes, DEFAULT_PERIOD, DEFAULT_STD_DEV);
        assert_eq!(bb.middle, 100.0);
        assert_eq!(bb.upper, bb.lower);
        assert_eq!(bb.percent_b, 0.5);
    }

    #[test]
    fn test_bands_straddle_the_mean() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i % 5) as f64)).collect();
        let bb = compute_bollinger(&closes, DEFAULT_PERIOD, DEFAULT_STD_DEV);
        assert!(bb.lower < bb.middle && bb.middle < bb.upper);
        assert!(bb.bandwidth > 0.0);
        assert!((0.0..=1.0).contains(&bb.percent_b));
    }
}
