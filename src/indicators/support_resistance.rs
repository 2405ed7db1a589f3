use serde::{Deserialize, Serialize};

pub const DEFAULT_LOOKBACK: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportResistance {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
}

impl SupportResistance {
    fn empty() -> Self {
        Self {
            supports: Vec::new(),
            resistances: Vec::new(),
            nearest_support: None,
            nearest_resistance: None,
        }
    }
}

/// Local-pivot support/resistance detection.
///
/// A bar is a pivot when it is the extreme of its +-lookback window. The
/// nearest levels are taken relative to the last close; the level lists keep
/// up to five distinct recent pivots.
pub fn detect_support_resistance(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    lookback: usize,
) -> SupportResistance {
    let n = highs.len().min(lows.len()).min(closes.len());
    if n < lookback * 2 + 1 {
        return SupportResistance::empty();
    }

    let mut supports = Vec::new();
    let mut resistances = Vec::new();

    for i in lookback..n - lookback {
        let low_window = &lows[i - lookback..=i + lookback];
        if lows[i] == low_window.iter().cloned().fold(f64::INFINITY, f64::min) {
            supports.push(lows[i]);
        }

        let high_window = &highs[i - lookback..=i + lookback];
        if highs[i]
            == high_window
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max)
        {
            resistances.push(highs[i]);
        }
    }

    let current_price = closes[n - 1];

    let nearest_support = supports
        .iter()
        .copied()
        .filter(|s| *s < current_price)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));
    let nearest_resistance = resistances
        .iter()
        .copied()
        .filter(|r| *r > current_price)
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.min(r))));

    SupportResistance {
        supports: distinct_levels(&supports),
        resistances: distinct_levels(&resistances),
        nearest_support,
        nearest_resistance,
    }
}

/// Last 10 pivots, deduplicated, sorted ascending, capped at 5.
fn distinct_levels(levels: &[f64]) -> Vec<f64> {
    let tail_start = levels.len().saturating_sub(10);
    let mut out: Vec<f64> = levels[tail_start..]
        .iter()
        .map(|v| (v * 1e8).round() / 1e8)
        .collect();
    out.sort_by(|a, b| a.partial_cmp(b).expect("pivot levels are finite"));
    out.dedup();
    out.truncate(5);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short_series() {
        let sr = detect_support_resistance(&[1.0; 5], &[1.0; 5], &[1.0; 5], DEFAULT_LOOKBACK);
        assert!(sr.supports.is_empty());
        assert!(sr.nearest_support.is_none());
    }

    #[test]
    fn test_v_shape_finds_support_below_price() {
        // Price dips to 90 in the middle and recovers to 100.
        let mut lows = Vec::new();
        let mut highs = Vec::new();
        let mut closes = Vec::new();
        for i in 0..21 {
            let dist = (i as f64 - 10.0).abs();
            let base = 90.0 + dist; // V with minimum 90 at i=10
            lows.push(base - 0.5);
            highs.push(base + 0.5);
            closes.push(base);
        }
        let sr = detect_support_resistance(&highs, &lows, &closes, DEFAULT_LOOKBACK);
        assert_eq!(sr.nearest_support, Some(89.5));
        assert!(sr.supports.contains(&89.5));
    }

    #[test]
    fn test_peak_becomes_resistance_above_price() {
        // Price spikes to 110 in the middle and falls back to 100.
        let mut lows = Vec::new();
        let mut highs = Vec::new();
        let mut closes = Vec::new();
        for i in 0..21 {
            let dist = (i as f64 - 10.0).abs();
            let base = 110.0 - dist;
            lows.push(base - 0.5);
            highs.push(base + 0.5);
            closes.push(base);
        }
        let sr = detect_support_resistance(&highs, &lows, &closes, DEFAULT_LOOKBACK);
        assert_eq!(sr.nearest_resistance, Some(110.5));
    }

    #[test]
    fn test_level_lists_are_bounded() {
        let mut highs = Vec::new();
        let mut lows = Vec::new();
        let mut closes = Vec::new();
        // Sawtooth with many pivots.
        for i in 0..120 {
            let phase = (i % 12) as f64;
            let base = 100.0 + if phase < 6.0 { phase } else { 12.0 - phase };
            highs.push(base + 0.25 + (i / 12) as f64 * 0.01);
            lows.push(base - 0.25 - (i / 12) as f64 * 0.01);
            closes.push(base);
        }
        let sr = detect_support_resistance(&highs, &lows, &closes, DEFAULT_LOOKBACK);
        assert!(sr.supports.len() <= 5);
        assert!(sr.resistances.len() <= 5);
    }
}
