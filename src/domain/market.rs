use serde::{Deserialize, Serialize};

/// One OHLCV bar as returned by the candle provider.
///
/// Prices are plain f64, sufficient for signal-generation math. The
/// persistence layer is responsible for fixed-precision storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl Candle {
    /// Signed candle body: positive for bullish candles, negative for bearish.
    pub fn body(&self) -> f64 {
        self.close - self.open
    }
}
