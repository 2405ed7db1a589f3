//! Deterministic provider doubles for tests.

use crate::domain::market::Candle;
use crate::domain::ports::{CandleProvider, FeedProvider};
use crate::domain::sentiment::Article;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Candle provider serving pre-seeded series per (symbol, timeframe).
pub struct MockCandleProvider {
    series: Mutex<HashMap<String, Vec<Candle>>>,
    current_price: Option<f64>,
}

impl MockCandleProvider {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            current_price: None,
        }
    }

    pub fn with_series(self, symbol: &str, timeframe: &str, candles: Vec<Candle>) -> Self {
        self.series
            .lock()
            .expect("mock poisoned")
            .insert(format!("{symbol}_{timeframe}"), candles);
        self
    }

    pub fn set_series(&self, symbol: &str, timeframe: &str, candles: Vec<Candle>) {
        self.series
            .lock()
            .expect("mock poisoned")
            .insert(format!("{symbol}_{timeframe}"), candles);
    }
}

impl Default for MockCandleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleProvider for MockCandleProvider {
    async fn get_recent_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Vec<Candle> {
        let series = self.series.lock().expect("mock poisoned");
        let candles = series
            .get(&format!("{symbol}_{timeframe}"))
            .cloned()
            .unwrap_or_default();
        let start = candles.len().saturating_sub(limit);
        candles[start..].to_vec()
    }

    async fn get_current_price(&self, _symbol: &str) -> Option<f64> {
        self.current_price
    }
}

/// Feed provider serving canned articles per URL.
pub struct MockFeedProvider {
    responses: HashMap<String, Vec<Article>>,
}

impl MockFeedProvider {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    pub fn with_feed(mut self, url: &str, articles: Vec<Article>) -> Self {
        self.responses.insert(url.to_string(), articles);
        self
    }
}

impl Default for MockFeedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedProvider for MockFeedProvider {
    async fn fetch(&self, url: &str) -> Vec<Article> {
        self.responses.get(url).cloned().unwrap_or_default()
    }
}
