pub const DEFAULT_PERIOD: usize = 14;

/// Average true range over the last `period` bars.
///
/// Short series fall back to the mean high-low range, which keeps stop
/// distances sane even on thin history.
pub fn compute_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> f64 {
    let n = highs.len().min(lows.len()).min(closes.len());
    if n == 0 {
        return 0.0;
    }

    if n < period + 1 {
        let sum: f64 = (0..n).map(|i| highs[i] - lows[i]).sum();
        return sum / n as f64;
    }

    let mut true_ranges = Vec::with_capacity(n - 1);
    for i in 1..n {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        true_ranges.push(hl.max(hc).max(lc));
    }

    let tail = &true_ranges[true_ranges.len() - period..];
    tail.iter().sum::<f64>() / period as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series_uses_range_mean() {
        let highs = vec![102.0, 104.0];
        let lows = vec![100.0, 100.0];
        let closes = vec![101.0, 103.0];
        assert_eq!(compute_atr(&highs, &lows, &closes, DEFAULT_PERIOD), 3.0);
    }

    #[test]
    fn test_constant_range() {
        let n = 40;
        let highs: Vec<f64> = (0..n).map(|i| 102.0 + i as f64).collect();
        let lows: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let closes: Vec<f64> = (0..n).map(|i| 101.0 + i as f64).collect();
        // True range dominated by high[i] - close[i-1] = 2.0 each bar.
        let atr = compute_atr(&highs, &lows, &closes, DEFAULT_PERIOD);
        assert!((atr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(compute_atr(&[], &[], &[], DEFAULT_PERIOD), 0.0);
    }
}
