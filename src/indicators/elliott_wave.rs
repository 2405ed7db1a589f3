use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_WAVE_PCT: f64 = 0.02;
const PIVOT_LOOKBACK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveType {
    Impulse,
    Correction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElliottWave {
    /// 1..=5 during impulse phases, 1..=3 (A/B/C) during corrections, 0 when
    /// no structure was found.
    pub wave_count: u32,
    pub total_waves_detected: usize,
    /// Last 10 pivots, oldest first.
    pub pivots: Vec<Pivot>,
    pub trend: Trend,
    pub current_wave_type: Option<WaveType>,
}

/// Simplified Elliott wave counting: find swing pivots, keep alternating
/// moves of at least `min_wave_pct`, and label the cycle position on a
/// 5-impulse + 3-correction cadence.
pub fn detect_elliott_wave(closes: &[f64], min_wave_pct: f64) -> ElliottWave {
    if closes.len() < 20 {
        return ElliottWave {
            wave_count: 0,
            total_waves_detected: 0,
            pivots: Vec::new(),
            trend: Trend::Unknown,
            current_wave_type: None,
        };
    }

    let pivots = find_pivots(closes, PIVOT_LOOKBACK);
    if pivots.len() < 3 {
        return ElliottWave {
            wave_count: 0,
            total_waves_detected: 0,
            pivots,
            trend: Trend::Unknown,
            current_wave_type: None,
        };
    }

    let mut wave_total = 0usize;
    for pair in pivots.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if prev.price == 0.0 {
            continue;
        }
        let move_pct = (curr.price - prev.price).abs() / prev.price;
        if move_pct >= min_wave_pct {
            wave_total += 1;
        }
    }

    // 5 impulse waves + 3 corrective waves = one 8-wave cycle.
    let raw = (wave_total % 8) as u32;
    let (wave_count, current_wave_type) = if raw > 5 {
        (raw - 5, Some(WaveType::Correction)) // 1=A, 2=B, 3=C
    } else {
        (raw, Some(WaveType::Impulse))
    };

    let trend = {
        let last = pivots[pivots.len() - 1].price;
        let prev = pivots[pivots.len() - 2].price;
        if last > prev { Trend::Bullish } else { Trend::Bearish }
    };

    let tail_start = pivots.len().saturating_sub(10);
    ElliottWave {
        wave_count,
        total_waves_detected: wave_total,
        pivots: pivots[tail_start..].to_vec(),
        trend,
        current_wave_type,
    }
}

fn find_pivots(closes: &[f64], lookback: usize) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    if closes.len() < lookback * 2 + 1 {
        return pivots;
    }

    for i in lookback..closes.len() - lookback {
        let window = &closes[i - lookback..=i + lookback];
        let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = window.iter().cloned().fold(f64::INFINITY, f64::min);

        if closes[i] == max {
            pivots.push(Pivot {
                index: i,
                price: closes[i],
                kind: PivotKind::High,
            });
        } else if closes[i] == min {
            pivots.push(Pivot {
                index: i,
                price: closes[i],
                kind: PivotKind::Low,
            });
        }
    }

    pivots
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Zig-zag series with swings of `amplitude` around 100 every
    /// `half_cycle` bars.
    fn zigzag(cycles: usize, half_cycle: usize, amplitude: f64) -> Vec<f64> {
        let mut closes = Vec::new();
        for c in 0..cycles * 2 {
            let (from, to) = if c % 2 == 0 {
                (100.0 - amplitude, 100.0 + amplitude)
            } else {
                (100.0 + amplitude, 100.0 - amplitude)
            };
            for i in 0..half_cycle {
                closes.push(from + (to - from) * i as f64 / half_cycle as f64);
            }
        }
        closes
    }

    #[test]
    fn test_short_series_has_no_waves() {
        let out = detect_elliott_wave(&[100.0; 10], DEFAULT_MIN_WAVE_PCT);
        assert_eq!(out.wave_count, 0);
        assert_eq!(out.trend, Trend::Unknown);
        assert!(out.current_wave_type.is_none());
    }

    #[test]
    fn test_zigzag_counts_waves() {
        let closes = zigzag(4, 10, 10.0);
        let out = detect_elliott_wave(&closes, DEFAULT_MIN_WAVE_PCT);
        assert!(out.total_waves_detected >= 3);
        assert!(out.wave_count <= 5);
        assert!(out.current_wave_type.is_some());
        assert!(out.pivots.len() <= 10);
    }

    #[test]
    fn test_flat_series_detects_nothing() {
        let closes = vec![100.0; 60];
        let out = detect_elliott_wave(&closes, DEFAULT_MIN_WAVE_PCT);
        // Every point ties the window extreme; moves are all below the
        // threshold, so no waves accumulate.
        assert_eq!(out.total_waves_detected, 0);
        assert_eq!(out.wave_count, 0);
    }

    #[test]
    fn test_correction_phase_labelling() {
        // 6 qualifying swings → raw count 6 → wave 1 of a correction (A).
        let closes = zigzag(4, 8, 10.0);
        let out = detect_elliott_wave(&closes, DEFAULT_MIN_WAVE_PCT);
        if out.total_waves_detected % 8 > 5 {
            assert_eq!(out.current_wave_type, Some(WaveType::Correction));
            assert!(out.wave_count <= 3);
        } else {
            assert_eq!(out.current_wave_type, Some(WaveType::Impulse));
        }
    }
}
