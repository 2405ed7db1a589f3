use crate::domain::market::Candle;
use crate::domain::sentiment::Article;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Read-only OHLCV source. Network failures degrade to cached or empty
/// slices; callers never see an error from this boundary.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    async fn get_recent_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Vec<Candle>;

    /// Single ticker probe. `None` on any failure.
    async fn get_current_price(&self, symbol: &str) -> Option<f64>;
}

/// Read-only RSS source. Errors degrade to an empty article list.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch(&self, url: &str) -> Vec<Article>;
}

/// Injectable wall clock so time-dependent behavior (memory expiry, UTC day
/// rollover, cool-downs) is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock poisoned")
    }
}
