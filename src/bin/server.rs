//! uAlgoTrade engine server - headless agent swarm
//!
//! Runs the scheduler-driven scan/risk/heartbeat/optimization loops and the
//! WebSocket event fan-out. No GUI, no inbound HTTP; the API layer is a
//! separate thin adapter.
//!
//! # Usage
//! ```sh
//! U2ALGO_DEFAULT_SYMBOLS=BTCUSDT,ETHUSDT cargo run --bin server
//! ```

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;
use ualgotrade::application::agents::alpha_scout::AlphaScout;
use ualgotrade::application::agents::orchestrator::Orchestrator;
use ualgotrade::application::agents::quant_lab::QuantLab;
use ualgotrade::application::agents::risk_sentinel::RiskSentinel;
use ualgotrade::application::agents::technical_analyst::TechnicalAnalyst;
use ualgotrade::application::agents::Agent;
use ualgotrade::application::context::AgentContext;
use ualgotrade::application::position_sizer::FixedPositionSizer;
use ualgotrade::application::scheduler::Scheduler;
use ualgotrade::config::Config;
use ualgotrade::domain::ports::SystemClock;
use ualgotrade::infrastructure::binance::market_data::BinanceCandleProvider;
use ualgotrade::infrastructure::message_bus::MessageBus;
use ualgotrade::infrastructure::news::rss::RssFeedProvider;
use ualgotrade::infrastructure::persistence::database::Database;
use ualgotrade::infrastructure::persistence::repositories::SqliteSignalRepository;
use ualgotrade::infrastructure::ws_server::WsServer;

const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("uAlgoTrade engine {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env()?);
    info!(
        "Scanning {:?} on {} (scan {}s, risk {}s)",
        config.default_symbols,
        config.timeframe,
        config.scan_interval_seconds,
        config.risk_check_interval_seconds
    );

    let database = Database::new(&config.database_url).await?;
    let clock = Arc::new(SystemClock);
    let repo = Arc::new(SqliteSignalRepository::new(database.pool.clone(), clock.clone()));
    let bus = MessageBus::new();

    let ctx = AgentContext::new(repo, bus.clone(), clock, config.clone());

    let alpha_scout = Arc::new(AlphaScout::new(
        ctx.clone(),
        Arc::new(RssFeedProvider::new()),
    ));
    let technical_analyst = Arc::new(TechnicalAnalyst::new(ctx.clone()));
    let risk_sentinel = Arc::new(RiskSentinel::new(ctx.clone()));
    let quant_lab = Arc::new(QuantLab::new(ctx.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        ctx.clone(),
        Arc::new(BinanceCandleProvider::new(None)),
        alpha_scout.clone(),
        technical_analyst.clone(),
        risk_sentinel.clone(),
        Arc::new(FixedPositionSizer::default()),
    ));

    let agents: Vec<Arc<dyn Agent>> = vec![
        alpha_scout.clone(),
        technical_analyst,
        risk_sentinel.clone(),
        orchestrator.clone(),
        quant_lab.clone(),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ws_server = WsServer::new(&config.ws_bind_addr, bus.clone());
    let ws_handle = tokio::spawn(ws_server.run(shutdown_rx.clone()));

    let scheduler = Scheduler::new(
        config.clone(),
        orchestrator,
        risk_sentinel,
        quant_lab,
        agents,
    );
    let job_handles = scheduler.start(shutdown_rx);

    info!("Engine running. Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining jobs...");

    shutdown_tx.send(true).ok();
    let drain = async {
        for handle in job_handles {
            let _ = handle.await;
        }
        let _ = ws_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Grace window elapsed with jobs still in flight, exiting anyway");
    }

    info!("Engine stopped.");
    Ok(())
}
