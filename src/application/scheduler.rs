//! Periodic cycle driver: scan, risk sweep, heartbeats, nightly
//! optimization. Jobs are fire-and-log; one job's failure never crashes a
//! sibling.

use crate::application::agents::Agent;
use crate::application::agents::orchestrator::Orchestrator;
use crate::application::agents::quant_lab::QuantLab;
use crate::application::agents::risk_sentinel::RiskSentinel;
use crate::config::Config;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const NIGHTLY_LOOKBACK_DAYS: i64 = 30;
const DEFAULT_STRATEGY: &str = "default";

pub struct Scheduler {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    risk_sentinel: Arc<RiskSentinel>,
    quant_lab: Arc<QuantLab>,
    agents: Vec<Arc<dyn Agent>>,
}

impl Scheduler {
    pub fn new(
        config: Arc<Config>,
        orchestrator: Arc<Orchestrator>,
        risk_sentinel: Arc<RiskSentinel>,
        quant_lab: Arc<QuantLab>,
        agents: Vec<Arc<dyn Agent>>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            risk_sentinel,
            quant_lab,
            agents,
        }
    }

    /// Spawn the four background jobs. They run until the shutdown channel
    /// flips to true.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Scheduler starting: scan every {}s, risk sweep every {}s, heartbeats every {}s, optimization at 00:00 UTC",
            self.config.scan_interval_seconds,
            self.config.risk_check_interval_seconds,
            HEARTBEAT_INTERVAL.as_secs()
        );

        vec![
            self.spawn_scan_job(shutdown.clone()),
            self.spawn_risk_job(shutdown.clone()),
            self.spawn_heartbeat_job(shutdown.clone()),
            self.spawn_nightly_job(shutdown),
        ]
    }

    fn spawn_scan_job(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(config.scan_interval_seconds));
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for symbol in &config.default_symbols {
                            let outcome = orchestrator
                                .run_scan_cycle(symbol, DEFAULT_STRATEGY, &config.timeframe)
                                .await;
                            if let Some(e) = outcome.error {
                                error!("Scan cycle error for {symbol}: {e}");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Scan job stopping");
                        return;
                    }
                }
            }
        })
    }

    fn spawn_risk_job(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sentinel = self.risk_sentinel.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker =
                time::interval(Duration::from_secs(config.risk_check_interval_seconds));
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for symbol in &config.default_symbols {
                            // Portfolio-only sweep, no trade proposal.
                            if let Err(e) = sentinel.run_with_tracking(symbol, None).await {
                                error!("Risk check error for {symbol}: {e:#}");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Risk job stopping");
                        return;
                    }
                }
            }
        })
    }

    fn spawn_heartbeat_job(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let agents = self.agents.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(HEARTBEAT_INTERVAL);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for agent in &agents {
                            if let Err(e) = agent.heartbeat().await {
                                error!("Heartbeat error for {}: {e:#}", agent.name());
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Heartbeat job stopping");
                        return;
                    }
                }
            }
        })
    }

    fn spawn_nightly_job(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let quant = self.quant_lab.clone();
        tokio::spawn(async move {
            loop {
                let sleep_duration = duration_until_utc_midnight();
                tokio::select! {
                    _ = time::sleep(sleep_duration) => {
                        info!("Nightly optimization starting");
                        match quant
                            .run_optimization(DEFAULT_STRATEGY, NIGHTLY_LOOKBACK_DAYS)
                            .await
                        {
                            Ok(report) => info!(
                                "Nightly optimization done: regime={:?}, {} recommendations",
                                report.regime,
                                report.recommendations.len()
                            ),
                            Err(e) => error!("Optimization error: {e:#}"),
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Nightly job stopping");
                        return;
                    }
                }
            }
        })
    }
}

/// Wall-clock wait until the next 00:00 UTC.
fn duration_until_utc_midnight() -> Duration {
    let now = Utc::now();
    let next_midnight = (now + ChronoDuration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now + ChronoDuration::days(1));
    (next_midnight - now)
        .to_std()
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}
