//! Configuration loading from environment variables, prefix `U2ALGO_`.

mod risk_env_config;

pub use risk_env_config::risk_limits_from_env;

use crate::domain::risk::RiskLimits;
use anyhow::{Context, Result};
use std::env;

pub const ENV_PREFIX: &str = "U2ALGO_";

/// Engine configuration. Defaults match the documented deployment values, so
/// tests can use `Config::default()` without touching the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub default_symbols: Vec<String>,
    pub timeframe: String,
    pub scan_interval_seconds: u64,
    pub risk_check_interval_seconds: u64,
    /// Decision engine approval threshold. The orchestrator applies its own
    /// 0.55 floor after blending; the stricter of the two wins.
    pub min_consensus_confidence: f64,
    pub ws_bind_addr: String,
    pub risk: RiskLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/ualgotrade.db".to_string(),
            default_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframe: "1h".to_string(),
            scan_interval_seconds: 60,
            risk_check_interval_seconds: 5,
            min_consensus_confidence: 0.70,
            ws_bind_addr: "127.0.0.1:8765".to_string(),
            risk: RiskLimits::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let symbols_raw =
            env::var(key("DEFAULT_SYMBOLS")).unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string());
        let default_symbols: Vec<String> = symbols_raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url: env::var(key("DATABASE_URL")).unwrap_or(defaults.database_url),
            default_symbols,
            timeframe: env::var(key("TIMEFRAME")).unwrap_or(defaults.timeframe),
            scan_interval_seconds: parse_u64("SCAN_INTERVAL_SECONDS", 60)?,
            risk_check_interval_seconds: parse_u64("RISK_CHECK_INTERVAL_SECONDS", 5)?,
            min_consensus_confidence: parse_f64("MIN_CONSENSUS_CONFIDENCE", 0.70)?,
            ws_bind_addr: env::var(key("WS_BIND_ADDR")).unwrap_or(defaults.ws_bind_addr),
            risk: risk_limits_from_env()?,
        })
    }
}

fn key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

pub(crate) fn parse_f64(name: &str, default: f64) -> Result<f64> {
    env::var(key(name))
        .unwrap_or_else(|_| default.to_string())
        .parse::<f64>()
        .context(format!("Failed to parse {}{}", ENV_PREFIX, name))
}

pub(crate) fn parse_u64(name: &str, default: u64) -> Result<u64> {
    env::var(key(name))
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .context(format!("Failed to parse {}{}", ENV_PREFIX, name))
}

pub(crate) fn parse_i64(name: &str, default: i64) -> Result<i64> {
    env::var(key(name))
        .unwrap_or_else(|_| default.to_string())
        .parse::<i64>()
        .context(format!("Failed to parse {}{}", ENV_PREFIX, name))
}
