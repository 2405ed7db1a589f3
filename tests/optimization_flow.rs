//! Nightly optimization: performance metrics, regime, recommendations,
//! snapshot upsert, learning memory.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use ualgotrade::application::agents::quant_lab::{PerformanceRegime, QuantLab};
use ualgotrade::application::context::AgentContext;
use ualgotrade::config::Config;
use ualgotrade::domain::memory::MemoryType;
use ualgotrade::domain::ports::Clock;
use ualgotrade::domain::portfolio::{Position, PositionSide, PositionStatus};
use ualgotrade::domain::ports::ManualClock;
use ualgotrade::domain::repositories::SignalRepository;
use ualgotrade::infrastructure::message_bus::MessageBus;
use ualgotrade::infrastructure::repositories::in_memory::InMemorySignalRepository;

struct Harness {
    clock: Arc<ManualClock>,
    repo: Arc<InMemorySignalRepository>,
    quant: QuantLab,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap(),
    ));
    let repo = Arc::new(InMemorySignalRepository::new(clock.clone()));
    let ctx = AgentContext::new(
        repo.clone(),
        MessageBus::new(),
        clock.clone(),
        Arc::new(Config::default()),
    );
    Harness {
        clock,
        repo,
        quant: QuantLab::new(ctx),
    }
}

fn closed_position(
    pnl: f64,
    closed_at: chrono::DateTime<Utc>,
    holding_hours: i64,
) -> Position {
    Position {
        id: None,
        symbol: "BTCUSDT".to_string(),
        side: PositionSide::Long,
        entry_price: 100.0,
        current_price: Some(100.0 + pnl),
        quantity: 1.0,
        unrealized_pnl: pnl,
        status: PositionStatus::Closed,
        strategy_id: "default".to_string(),
        opened_at: Some(closed_at - Duration::hours(holding_hours)),
        closed_at: Some(closed_at),
    }
}

/// 30 closed trades: 10 small wins followed by 20 slow losses. Win rate
/// one third, cumulative equity peaks at +0.10 then bleeds to -0.08 below
/// the peak.
fn seed_unfavorable_history(h: &Harness) {
    let base = h.clock.now() - Duration::days(10);
    for i in 0..10i64 {
        h.repo
            .insert_position(closed_position(0.01, base + Duration::minutes(i), 24));
    }
    for i in 0..20i64 {
        h.repo.insert_position(closed_position(
            -0.004,
            base + Duration::minutes(10 + i),
            24,
        ));
    }
}

#[tokio::test]
async fn test_unfavorable_history_drives_recommendations() {
    let h = harness();
    seed_unfavorable_history(&h);

    let report = h.quant.run_optimization("default", 30).await.unwrap();

    let perf = &report.performance;
    assert_eq!(perf.total_trades, 30);
    assert_eq!(perf.winning_trades, 10);
    assert_eq!(perf.losing_trades, 20);
    assert!((perf.win_rate - 1.0 / 3.0).abs() < 1e-9);
    assert!((perf.max_drawdown.unwrap() + 0.08).abs() < 1e-9);
    assert!((perf.profit_factor.unwrap() - 1.25).abs() < 1e-9);
    assert!((perf.avg_holding_period_hours.unwrap() - 24.0).abs() < 1e-9);

    assert_eq!(report.regime, PerformanceRegime::Unfavorable);
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.starts_with("🔴 Win rate critically low"))
    );
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.starts_with("🟡 Drawdown elevated"))
    );

    // Snapshot upserted for today with the computed metrics.
    assert!(report.snapshot_created);
    let snapshot = h.repo.portfolio_latest_snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.snapshot_date, h.clock.now().date_naive());
    assert_eq!(snapshot.total_value, 10_000.0); // no open positions
    assert_eq!(snapshot.win_rate, Some(perf.win_rate));

    // Learning memory recorded with the full payload.
    let learnings = h
        .repo
        .list_memory("quant_lab", Some(MemoryType::Learning), None, 10)
        .await
        .unwrap();
    assert_eq!(learnings.len(), 1);
    assert_eq!(learnings[0].content["regime"], "UNFAVORABLE");
}

#[tokio::test]
async fn test_snapshot_upsert_is_idempotent_per_day() {
    let h = harness();
    seed_unfavorable_history(&h);

    h.quant.run_optimization("default", 30).await.unwrap();
    h.quant.run_optimization("default", 30).await.unwrap();

    // Two runs on the same date leave exactly one snapshot row.
    let latest = h.repo.portfolio_latest_snapshot().await.unwrap().unwrap();
    assert_eq!(latest.snapshot_date, h.clock.now().date_naive());
}

#[tokio::test]
async fn test_empty_history_reports_unknown_regime() {
    let h = harness();
    let report = h.quant.run_optimization("default", 30).await.unwrap();

    assert_eq!(report.regime, PerformanceRegime::Unknown);
    assert_eq!(report.performance.total_trades, 0);
    assert!(report.recommendations[0].contains("No closed trades"));
}

#[tokio::test]
async fn test_lookback_window_excludes_old_trades() {
    let h = harness();
    // One winner well outside the 30-day window, one loser inside it.
    let old = h.clock.now() - Duration::days(45);
    let recent = h.clock.now() - Duration::days(3);
    h.repo.insert_position(closed_position(5.0, old, 24));
    h.repo.insert_position(closed_position(-1.0, recent, 24));

    let report = h.quant.run_optimization("default", 30).await.unwrap();
    assert_eq!(report.performance.total_trades, 1);
    assert_eq!(report.performance.winning_trades, 0);
}
