//! Risk threshold parsing from environment variables.

use crate::config::{parse_f64, parse_i64, parse_u64};
use crate::domain::risk::RiskLimits;
use anyhow::Result;

pub fn risk_limits_from_env() -> Result<RiskLimits> {
    let defaults = RiskLimits::default();
    Ok(RiskLimits {
        max_daily_loss_pct: parse_f64("MAX_DAILY_LOSS_PCT", defaults.max_daily_loss_pct)?,
        max_drawdown_pct: parse_f64("KILL_SWITCH_DRAWDOWN", defaults.max_drawdown_pct)?,
        max_open_positions: parse_i64("MAX_OPEN_POSITIONS", defaults.max_open_positions)?,
        max_risk_per_trade: parse_f64("MAX_RISK_PER_TRADE", defaults.max_risk_per_trade)?,
        max_concentration_pct: parse_f64("MAX_CONCENTRATION_PCT", defaults.max_concentration_pct)?,
        volatility_threshold: parse_f64("VOLATILITY_THRESHOLD", defaults.volatility_threshold)?,
        max_daily_trades: parse_u64("MAX_DAILY_TRADES", defaults.max_daily_trades as u64)? as u32,
        cool_down_after_loss_seconds: parse_i64(
            "COOL_DOWN_AFTER_LOSS_SECONDS",
            defaults.cool_down_after_loss_seconds,
        )?,
        max_single_asset_ratio: parse_f64(
            "MAX_SINGLE_ASSET_RATIO",
            defaults.max_single_asset_ratio,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_limits_defaults() {
        let limits = risk_limits_from_env().expect("Should parse with defaults");
        assert_eq!(limits.max_open_positions, 5);
        assert_eq!(limits.max_daily_trades, 10);
        assert_eq!(limits.cool_down_after_loss_seconds, 3600);
        assert!((limits.max_drawdown_pct - 0.10).abs() < 1e-9);
    }
}
