//! Kill-switch short-circuit behavior across scan cycles.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use ualgotrade::application::agents::alpha_scout::AlphaScout;
use ualgotrade::application::agents::orchestrator::{CycleAction, Orchestrator};
use ualgotrade::application::agents::risk_sentinel::RiskSentinel;
use ualgotrade::application::agents::technical_analyst::TechnicalAnalyst;
use ualgotrade::application::context::AgentContext;
use ualgotrade::application::position_sizer::FixedPositionSizer;
use ualgotrade::config::Config;
use ualgotrade::domain::market::Candle;
use ualgotrade::domain::portfolio::PortfolioSnapshot;
use ualgotrade::domain::ports::ManualClock;
use ualgotrade::domain::repositories::SignalRepository;
use ualgotrade::domain::signal::SignalStatus;
use ualgotrade::infrastructure::message_bus::MessageBus;
use ualgotrade::infrastructure::mock::{MockCandleProvider, MockFeedProvider};
use ualgotrade::infrastructure::repositories::in_memory::InMemorySignalRepository;

struct Harness {
    repo: Arc<InMemorySignalRepository>,
    bus: MessageBus,
    sentinel: Arc<RiskSentinel>,
    orchestrator: Orchestrator,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let repo = Arc::new(InMemorySignalRepository::new(clock.clone()));
    let bus = MessageBus::new();
    let config = Arc::new(Config {
        min_consensus_confidence: 0.55,
        ..Config::default()
    });
    let ctx = AgentContext::new(repo.clone(), bus.clone(), clock, config);

    let candles = MockCandleProvider::new()
        .with_series("BTCUSDT", "1h", oversold_series())
        .with_series("ETHUSDT", "1h", oversold_series());
    let sentinel = Arc::new(RiskSentinel::new(ctx.clone()));
    let orchestrator = Orchestrator::new(
        ctx.clone(),
        Arc::new(candles),
        Arc::new(AlphaScout::new(ctx.clone(), Arc::new(MockFeedProvider::new()))),
        Arc::new(TechnicalAnalyst::new(ctx.clone())),
        sentinel.clone(),
        Arc::new(FixedPositionSizer::default()),
    );

    Harness {
        repo,
        bus,
        sentinel,
        orchestrator,
    }
}

fn oversold_series() -> Vec<Candle> {
    (0..100)
        .map(|i| {
            let base = 200.0 - i as f64 * 1.5;
            Candle {
                open_time: 0,
                open: base + 1.0,
                high: base + 2.0,
                low: base - 2.0,
                close: base,
                volume: 1_000.0,
                close_time: 0,
            }
        })
        .collect()
}

fn snapshot(max_drawdown: f64) -> PortfolioSnapshot {
    PortfolioSnapshot {
        snapshot_date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        total_value: 10_000.0,
        total_pnl: 0.0,
        total_pnl_pct: 0.0,
        open_positions: 0,
        win_rate: None,
        sharpe_ratio: None,
        max_drawdown: Some(max_drawdown),
    }
}

#[tokio::test]
async fn test_drawdown_breach_short_circuits_every_cycle() {
    let h = harness();
    h.repo.upsert_snapshot(&snapshot(-0.12)).await.unwrap();

    // First cycle trips the switch: the signal is rejected with no votes.
    let first = h.orchestrator.run_scan_cycle("BTCUSDT", "default", "1h").await;
    assert_eq!(first.action, CycleAction::Reject);
    assert_eq!(first.reason.as_deref(), Some("Kill switch active"));
    let risk = first.risk.as_ref().unwrap();
    assert!(risk.kill_switch);
    assert!(first.consensus.is_none());

    let first_id = first.signal_id.unwrap();
    assert!(h.repo.list_votes(first_id).await.unwrap().is_empty());
    let rejected = h
        .repo
        .list_recent(None, Some(SignalStatus::Rejected), 10)
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);

    // The activation event went out on the bus exactly once.
    let events = h.bus.get_recent_messages(Some("risk.kill_switch"), 10).await;
    assert_eq!(events.len(), 1);

    // Any other symbol hits the latch the same way, still without votes.
    let second = h.orchestrator.run_scan_cycle("ETHUSDT", "default", "1h").await;
    assert_eq!(second.action, CycleAction::Reject);
    assert!(second.risk.as_ref().unwrap().kill_switch);
    assert!(
        h.repo
            .list_votes(second.signal_id.unwrap())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_operator_deactivation_restores_normal_cycles() {
    let h = harness();
    h.repo.upsert_snapshot(&snapshot(-0.12)).await.unwrap();

    let tripped = h.orchestrator.run_scan_cycle("BTCUSDT", "default", "1h").await;
    assert!(tripped.risk.as_ref().unwrap().kill_switch);

    // Operator releases the latch after the drawdown recovers.
    h.repo.upsert_snapshot(&snapshot(-0.01)).await.unwrap();
    h.sentinel.deactivate_kill_switch("operator-7").await;
    assert!(!h.sentinel.kill_switch().active);

    let restored = h.orchestrator.run_scan_cycle("BTCUSDT", "default", "1h").await;
    assert_eq!(restored.action, CycleAction::Execute);
    assert_eq!(
        h.repo
            .list_votes(restored.signal_id.unwrap())
            .await
            .unwrap()
            .len(),
        3
    );
}
