//! Binance market data: public kline REST fetcher with a per-key cache.

use crate::domain::errors::MarketDataError;
use crate::domain::market::Candle;
use crate::domain::ports::CandleProvider;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Cache cap per (symbol, timeframe) key.
const MAX_CACHED_CANDLES: usize = 500;
const PRICE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BinanceCandleProvider {
    client: ClientWithMiddleware,
    base_url: String,
    cache: RwLock<HashMap<String, Vec<Candle>>>,
    /// Per-key fetch guards so concurrent cycles for the same key do not
    /// stampede the API.
    fetch_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BinanceCandleProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cache: RwLock::new(HashMap::new()),
            fetch_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn cached_tail(&self, key: &str, limit: usize) -> Option<Vec<Candle>> {
        let cache = self.cache.read().ok()?;
        let cached = cache.get(key)?;
        if cached.is_empty() {
            return None;
        }
        let start = cached.len().saturating_sub(limit);
        Some(cached[start..].to_vec())
    }

    async fn fetch_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit_str = limit.to_string();
        let url_with_query = build_url_with_query(
            &url,
            &[
                ("symbol", symbol),
                ("interval", timeframe),
                ("limit", limit_str.as_str()),
            ],
        );

        let response = self
            .client
            .get(&url_with_query)
            .send()
            .await
            .context("Failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(MarketDataError::FetchFailed {
                symbol: symbol.to_string(),
                reason,
            }
            .into());
        }

        // Kline rows: [open_time, open, high, low, close, volume, close_time, ...]
        let klines: Vec<serde_json::Value> = response
            .json()
            .await
            .context("Failed to parse Binance klines response")?;

        let candles: Vec<Candle> = klines
            .into_iter()
            .filter_map(|k| {
                let arr = k.as_array()?;
                if arr.len() < 7 {
                    return None;
                }
                Some(Candle {
                    open_time: arr[0].as_i64()?,
                    open: arr[1].as_str()?.parse::<f64>().ok()?,
                    high: arr[2].as_str()?.parse::<f64>().ok()?,
                    low: arr[3].as_str()?.parse::<f64>().ok()?,
                    close: arr[4].as_str()?.parse::<f64>().ok()?,
                    volume: arr[5].as_str()?.parse::<f64>().ok()?,
                    close_time: arr[6].as_i64()?,
                })
            })
            .collect();

        debug!("Fetched {} bars for {symbol} ({timeframe})", candles.len());
        Ok(candles)
    }
}

#[async_trait]
impl CandleProvider for BinanceCandleProvider {
    async fn get_recent_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Vec<Candle> {
        let key = format!("{symbol}_{timeframe}");

        if let Some(cached) = self.cached_tail(&key, limit)
            && cached.len() >= limit
        {
            return cached;
        }

        let lock = self.fetch_lock(&key).await;
        let _guard = lock.lock().await;

        // A concurrent cycle may have filled the cache while we waited.
        if let Some(cached) = self.cached_tail(&key, limit)
            && cached.len() >= limit
        {
            return cached;
        }

        match self.fetch_klines(symbol, timeframe, limit).await {
            Ok(candles) => {
                if let Ok(mut cache) = self.cache.write() {
                    let start = candles.len().saturating_sub(MAX_CACHED_CANDLES);
                    cache.insert(key, candles[start..].to_vec());
                }
                candles
            }
            Err(e) => {
                warn!("Candle fetch failed for {symbol}: {e:#}");
                self.cached_tail(&key, limit).unwrap_or_default()
            }
        }
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        let url = build_url_with_query(
            &format!("{}/api/v3/ticker/price", self.base_url),
            &[("symbol", symbol)],
        );

        let request = self.client.get(&url).send();
        let response = match tokio::time::timeout(PRICE_PROBE_TIMEOUT, request).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!("Price probe failed for {symbol}: {e:#}");
                return None;
            }
            Err(_) => {
                warn!("Price probe timed out for {symbol}");
                return None;
            }
        };

        let body: serde_json::Value = response.json().await.ok()?;
        body.get("price")?.as_str()?.parse::<f64>().ok()
    }
}
