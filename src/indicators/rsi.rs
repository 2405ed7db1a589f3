use serde::{Deserialize, Serialize};

pub const DEFAULT_PERIOD: usize = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiOutput {
    /// Tail of the RSI series (last 20 values).
    pub values: Vec<f64>,
    pub current: f64,
    pub overbought: bool,
    pub oversold: bool,
}

/// Wilder's smoothed RSI.
///
/// Series shorter than `period + 1` yield a neutral 50.0 with empty values
/// and both flags false.
pub fn compute_rsi(closes: &[f64], period: usize) -> RsiOutput {
    if closes.len() < period + 1 {
        return RsiOutput {
            values: Vec::new(),
            current: 50.0,
            overbought: false,
            oversold: false,
        };
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = deltas.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|d| (-d).max(0.0)).collect();

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(deltas.len() - period);
    for i in period..deltas.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;

        if avg_loss == 0.0 {
            values.push(100.0);
        } else {
            let rs = avg_gain / avg_loss;
            values.push(100.0 - 100.0 / (1.0 + rs));
        }
    }

    let current = values.last().copied().unwrap_or(50.0);
    let tail_start = values.len().saturating_sub(20);

    RsiOutput {
        values: values[tail_start..].to_vec(),
        current,
        overbought: current > 70.0,
        oversold: current < 30.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series_is_neutral() {
        let out = compute_rsi(&[1.0, 2.0, 3.0], DEFAULT_PERIOD);
        assert_eq!(out.current, 50.0);
        assert!(out.values.is_empty());
        assert!(!out.overbought);
        assert!(!out.oversold);
    }

    #[test]
    fn test_monotonic_rally_is_overbought() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = compute_rsi(&closes, DEFAULT_PERIOD);
        assert_eq!(out.current, 100.0); // no losses at all
        assert!(out.overbought);
        assert!(!out.oversold);
    }

    #[test]
    fn test_monotonic_selloff_is_oversold() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let out = compute_rsi(&closes, DEFAULT_PERIOD);
        assert!(out.current < 30.0);
        assert!(out.oversold);
    }

    #[test]
    fn test_values_tail_is_bounded() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + ((i % 7) as f64 - 3.0))
            .collect();
        let out = compute_rsi(&closes, DEFAULT_PERIOD);
        assert!(out.values.len() <= 20);
        for v in &out.values {
            assert!((0.0..=100.0).contains(v));
        }
    }
}
