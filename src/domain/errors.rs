use crate::domain::signal::SignalDirection;
use thiserror::Error;

/// Structural violations in a candidate signal. These are programmer errors:
/// the cycle fails with a structured result instead of persisting bad data.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Confidence out of range: {value}")]
    ConfidenceOutOfRange { value: f64 },

    #[error("Directional signal ({direction}) is missing entry/stop/target levels")]
    MissingLevels { direction: SignalDirection },

    #[error(
        "Levels inconsistent with {direction}: entry={entry_price}, stop={stop_loss}, target={take_profit}"
    )]
    InconsistentLevels {
        direction: SignalDirection,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
    },

    #[error("Risk/reward mismatch: levels imply {expected:.6}, signal says {actual:.6}")]
    RiskRewardMismatch { expected: f64, actual: f64 },
}

/// Errors from the candle provider boundary. Callers treat these as
/// transient: log, fall back to cache, continue the cycle.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Kline fetch failed for {symbol}: {reason}")]
    FetchFailed { symbol: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_error_formatting() {
        let err = SignalError::InconsistentLevels {
            direction: SignalDirection::Long,
            entry_price: 100.0,
            stop_loss: 103.0,
            take_profit: 105.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("LONG"));
        assert!(msg.contains("103"));
    }
}
