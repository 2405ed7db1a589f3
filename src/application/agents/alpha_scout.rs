//! Alpha Scout: sentiment aggregation from RSS feeds with adaptive bias
//! correction and market regime classification.

use crate::application::agents::{Agent, AgentCore, names};
use crate::application::context::AgentContext;
use crate::domain::ports::FeedProvider;
use crate::domain::sentiment::{Article, CalibrationQuality, MarketRegime, SentimentReport};
use crate::domain::signal::SignalDirection;
use crate::infrastructure::news::sentiment_analyzer::SentimentAnalyzer;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const PRIMARY_FEEDS: &[&str] = &[
    "https://cointelegraph.com/rss",
    "https://coindesk.com/arc/outboundfeeds/rss/",
    "https://cryptonews.com/news/feed/",
];

const FALLBACK_FEEDS: &[&str] = &["https://decrypt.co/feed", "https://thedefiant.io/api/feed"];

const MACRO_FEED: &str = "https://feeds.reuters.com/reuters/businessNews";

/// Macro risk-off indicators that drag on all crypto markets.
const RISK_OFF_MACRO: &[&str] = &[
    "inflation",
    "rate hike",
    "fed",
    "recession",
    "geopolitical",
    "war",
    "crisis",
    "bank run",
    "contagion",
    "systemic",
];

const MAX_ARTICLES: usize = 25;
const PER_FEED_LIMIT: usize = 15;
const LEARNING_RATE: f64 = 0.03;
const BIAS_CLAMP: f64 = 0.3;
const FEEDBACK_WINDOW: usize = 100;

struct ScoutState {
    bias_correction: f64,
    feedback_history: VecDeque<f64>,
    consecutive_failures: u32,
}

pub struct AlphaScout {
    core: AgentCore,
    feeds: Arc<dyn FeedProvider>,
    analyzer: SentimentAnalyzer,
    state: Mutex<ScoutState>,
}

impl AlphaScout {
    pub fn new(ctx: AgentContext, feeds: Arc<dyn FeedProvider>) -> Self {
        Self {
            core: AgentCore::new(
                names::ALPHA_SCOUT,
                "Sentiment Hunter: RSS aggregation, NLP, market regime detection",
                "1.2.0",
                ctx,
            ),
            feeds,
            analyzer: SentimentAnalyzer::new(),
            state: Mutex::new(ScoutState {
                bias_correction: 0.0,
                feedback_history: VecDeque::new(),
                consecutive_failures: 0,
            }),
        }
    }

    /// Analysis entry point with heartbeat, broadcast, and error memoization.
    pub async fn run_with_tracking(
        &self,
        symbol: &str,
        include_macro: bool,
    ) -> Result<SentimentReport> {
        self.core
            .track(symbol, self.analyze(symbol, include_macro))
            .await
    }

    /// Scan the feeds and compute blended sentiment for one symbol.
    ///
    /// Never fails the cycle: an empty sweep yields a NEUTRAL report at
    /// confidence 0.2.
    pub async fn analyze(&self, symbol: &str, include_macro: bool) -> Result<SentimentReport> {
        let now = self.core.ctx().clock.now();
        let use_fallback = {
            let state = self.state.lock().expect("scout state poisoned");
            state.consecutive_failures >= 2
        };

        let mut articles = self.fetch_from_feeds(symbol, PRIMARY_FEEDS).await;
        if articles.is_empty() && use_fallback {
            warn!("[{}] falling back to secondary feeds for {symbol}", self.core.name());
            articles = self.fetch_from_feeds(symbol, FALLBACK_FEEDS).await;
        }

        if articles.is_empty() {
            let (failures, bias) = {
                let mut state = self.state.lock().expect("scout state poisoned");
                state.consecutive_failures += 1;
                (state.consecutive_failures, state.bias_correction)
            };
            let mut report = SentimentReport::empty(symbol, failures, now);
            report.bias_correction = bias;
            return Ok(report);
        }

        let bias = {
            let mut state = self.state.lock().expect("scout state poisoned");
            state.consecutive_failures = 0;
            state.bias_correction
        };

        let scores: Vec<f64> = articles
            .iter()
            .map(|a| self.analyzer.score_article(&a.title, &a.summary))
            .collect();
        let raw_score = scores.iter().sum::<f64>() / scores.len() as f64;
        let mut corrected = (raw_score + bias).clamp(-1.0, 1.0);

        let macro_overlay = if include_macro {
            let overlay = self.compute_macro_overlay().await;
            if overlay < -0.3 {
                // Risk-off macro drags the signal toward negative.
                corrected = corrected * 0.6 + overlay * 0.4;
            }
            Some(overlay)
        } else {
            None
        };

        let volume_boost = (articles.len() as f64 / 10.0).min(0.3);
        let confidence = (corrected.abs() * 0.6 + volume_boost + 0.15).min(0.95);

        // Asymmetric thresholds: bearish news travels faster.
        let direction = if corrected > 0.25 {
            SignalDirection::Long
        } else if corrected < -0.20 {
            SignalDirection::Short
        } else {
            SignalDirection::Neutral
        };

        let market_regime = if corrected > 0.4 {
            MarketRegime::RiskOn
        } else if corrected < -0.35 {
            MarketRegime::RiskOff
        } else {
            MarketRegime::Neutral
        };

        let report = SentimentReport {
            symbol: symbol.to_string(),
            sentiment_score: corrected,
            raw_score,
            confidence,
            direction,
            article_count: articles.len(),
            bias_correction: bias,
            macro_overlay,
            market_regime,
            summary: format!(
                "Analyzed {} articles for {symbol}: sentiment={corrected:+.2}, regime={market_regime}",
                articles.len()
            ),
            timestamp: now,
        };

        if let Err(e) = self
            .core
            .memory()
            .store_decision(symbol, serde_json::to_value(&report)?, 0.7)
            .await
        {
            warn!("[{}] decision memory store failed: {e:#}", self.core.name());
        }

        info!(
            "[{}] {symbol}: {direction} (score={corrected:+.2}, articles={}, regime={market_regime})",
            self.core.name(),
            articles.len()
        );

        Ok(report)
    }

    /// Fetch and filter articles relevant to the symbol from a feed list.
    async fn fetch_from_feeds(&self, symbol: &str, feed_urls: &[&str]) -> Vec<Article> {
        let stem = symbol
            .to_lowercase()
            .replace("usdt", "")
            .replace("busd", "")
            .replace("usdc", "");

        let batches = join_all(feed_urls.iter().map(|url| self.feeds.fetch(url))).await;

        let mut articles = Vec::new();
        for batch in batches {
            for article in batch.into_iter().take(PER_FEED_LIMIT) {
                let title = article.title.to_lowercase();
                let summary = article.summary.to_lowercase();
                if title.contains(&stem) || summary.contains(&stem) || title.contains("crypto") {
                    articles.push(article);
                }
            }
        }

        articles.truncate(MAX_ARTICLES);
        articles
    }

    /// Count risk-off keywords in recent macro headlines, normalized to
    /// [-1, 0].
    async fn compute_macro_overlay(&self) -> f64 {
        let articles = self.feeds.fetch(MACRO_FEED).await;
        if articles.is_empty() {
            return 0.0;
        }

        let risk_off_count = articles
            .iter()
            .take(10)
            .map(|a| a.title.to_lowercase())
            .filter(|title| RISK_OFF_MACRO.iter().any(|term| title.contains(term)))
            .count();

        -((risk_off_count as f64 / 5.0).min(1.0))
    }

    /// Online learning: nudge the bias correction toward realized outcomes.
    pub fn apply_feedback(&self, actual_outcome: f64, symbol: Option<&str>) {
        let mut state = self.state.lock().expect("scout state poisoned");
        let error = actual_outcome - state.bias_correction;
        state.bias_correction =
            (state.bias_correction + LEARNING_RATE * error).clamp(-BIAS_CLAMP, BIAS_CLAMP);

        state.feedback_history.push_back(actual_outcome);
        while state.feedback_history.len() > FEEDBACK_WINDOW {
            state.feedback_history.pop_front();
        }

        info!(
            "[{}] feedback applied{}: outcome={actual_outcome:+.2}, new_bias={:+.4}",
            self.core.name(),
            symbol.map(|s| format!(" for {s}")).unwrap_or_default(),
            state.bias_correction
        );
    }

    pub fn bias_correction(&self) -> f64 {
        self.state.lock().expect("scout state poisoned").bias_correction
    }

    /// How well the bias tracks the mean of recent outcomes.
    pub fn bias_calibration_quality(&self) -> CalibrationQuality {
        let state = self.state.lock().expect("scout state poisoned");
        if state.feedback_history.len() < 10 {
            return CalibrationQuality::InsufficientData;
        }

        let tail_start = state.feedback_history.len().saturating_sub(20);
        let recent: Vec<f64> = state.feedback_history.iter().skip(tail_start).copied().collect();
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let avg_error = (mean - state.bias_correction).abs();

        if avg_error < 0.05 {
            CalibrationQuality::WellCalibrated
        } else if avg_error < 0.15 {
            CalibrationQuality::Moderate
        } else {
            CalibrationQuality::NeedsRecalibration
        }
    }
}

#[async_trait]
impl Agent for AlphaScout {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn role(&self) -> &'static str {
        self.core.role()
    }

    fn version(&self) -> &'static str {
        self.core.version()
    }

    async fn heartbeat(&self) -> Result<()> {
        self.core.heartbeat().await
    }
}
