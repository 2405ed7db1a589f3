//! Round-trip laws against the real SQLite schema.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use ualgotrade::domain::memory::{MemoryType, NewMemory};
use ualgotrade::domain::portfolio::{AgentHeartbeat, HeartbeatStatus, PortfolioSnapshot};
use ualgotrade::domain::ports::{Clock, ManualClock};
use ualgotrade::domain::repositories::SignalRepository;
use ualgotrade::domain::signal::{
    ConsensusVote, Signal, SignalDirection, SignalStatus, VoteType,
};
use ualgotrade::infrastructure::persistence::database::Database;
use ualgotrade::infrastructure::persistence::repositories::SqliteSignalRepository;

static DB_SEQ: AtomicU32 = AtomicU32::new(0);

async fn repo() -> (Arc<ManualClock>, Database, SqliteSignalRepository) {
    let path = std::env::temp_dir().join(format!(
        "ualgotrade_test_{}_{}.db",
        std::process::id(),
        DB_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&path);
    let url = format!("sqlite://{}", path.display());

    let database = Database::new(&url).await.expect("schema init");
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let repo = SqliteSignalRepository::new(database.pool.clone(), clock.clone());
    (clock, database, repo)
}

fn long_signal(symbol: &str) -> Signal {
    Signal {
        id: None,
        symbol: symbol.to_string(),
        direction: SignalDirection::Long,
        confidence: 0.8,
        source_agent: "orchestrator".to_string(),
        reasoning: serde_json::json!({"technical": ["RSI oversold (22.0)"]}),
        entry_price: Some(42_123.123456789),
        stop_loss: Some(42_000.0),
        take_profit: Some(42_350.0),
        risk_reward: Some(1.84),
        timeframe: "1h".to_string(),
        strategy_id: "default".to_string(),
        status: SignalStatus::Pending,
        created_at: None,
    }
}

#[tokio::test]
async fn test_signal_insert_update_list_round_trip() {
    let (_clock, _db, repo) = repo().await;

    let id = repo.insert_pending(&long_signal("BTCUSDT")).await.unwrap();
    repo.update_status(id, SignalStatus::Approved).await.unwrap();

    let approved = repo
        .list_recent(Some("BTCUSDT"), Some(SignalStatus::Approved), 10)
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);

    let signal = &approved[0];
    assert_eq!(signal.id, Some(id));
    assert_eq!(signal.direction, SignalDirection::Long);
    assert!(signal.created_at.is_some());
    // Prices survive the fixed-precision TEXT round trip at 8 decimals.
    assert!((signal.entry_price.unwrap() - 42_123.12345679).abs() < 1e-8);
    assert_eq!(signal.reasoning["technical"][0], "RSI oversold (22.0)");
}

#[tokio::test]
async fn test_three_votes_come_back_in_insertion_order() {
    let (_clock, _db, repo) = repo().await;
    let id = repo.insert_pending(&long_signal("BTCUSDT")).await.unwrap();

    for (agent, vote) in [
        ("alpha_scout", VoteType::Approve),
        ("technical_analyst", VoteType::Approve),
        ("risk_sentinel", VoteType::Reject),
    ] {
        repo.insert_vote(&ConsensusVote {
            signal_id: id,
            agent_name: agent.to_string(),
            vote,
            confidence: 0.7,
            reasoning: serde_json::json!({}),
        })
        .await
        .unwrap();
    }

    let votes = repo.list_votes(id).await.unwrap();
    assert_eq!(votes.len(), 3);
    assert_eq!(votes[0].agent_name, "alpha_scout");
    assert_eq!(votes[1].agent_name, "technical_analyst");
    assert_eq!(votes[2].agent_name, "risk_sentinel");
    assert_eq!(votes[2].vote, VoteType::Reject);
}

#[tokio::test]
async fn test_snapshot_upsert_keeps_one_row_per_date() {
    let (_clock, _db, repo) = repo().await;
    let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    let mut snapshot = PortfolioSnapshot {
        snapshot_date: date,
        total_value: 10_000.0,
        total_pnl: 12.5,
        total_pnl_pct: 0.125,
        open_positions: 2,
        win_rate: Some(0.5),
        sharpe_ratio: Some(1.1),
        max_drawdown: Some(-0.02),
    };
    repo.upsert_snapshot(&snapshot).await.unwrap();

    snapshot.total_value = 11_250.0;
    snapshot.open_positions = 3;
    repo.upsert_snapshot(&snapshot).await.unwrap();

    let latest = repo.portfolio_latest_snapshot().await.unwrap().unwrap();
    assert_eq!(latest.snapshot_date, date);
    assert_eq!(latest.total_value, 11_250.0);
    assert_eq!(latest.open_positions, 3);
}

#[tokio::test]
async fn test_heartbeat_upsert_is_single_row_per_agent() {
    let (clock, db, repo) = repo().await;

    for (status, uptime) in [
        (HeartbeatStatus::Alive, 10),
        (HeartbeatStatus::Alive, 40),
        (HeartbeatStatus::Degraded, 70),
    ] {
        repo.upsert_heartbeat(&AgentHeartbeat {
            agent_name: "alpha_scout".to_string(),
            status,
            last_heartbeat: clock.now(),
            active_tasks: 0,
            version: "1.2.0".to_string(),
            uptime_seconds: uptime,
        })
        .await
        .unwrap();
    }

    let row = sqlx::query("SELECT COUNT(*) AS count, MAX(uptime_seconds) AS uptime FROM ualgo_agent_heartbeat")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    let count: i64 = sqlx::Row::try_get(&row, "count").unwrap();
    let uptime: i64 = sqlx::Row::try_get(&row, "uptime").unwrap();
    assert_eq!(count, 1);
    assert_eq!(uptime, 70);
}

#[tokio::test]
async fn test_memory_expiry_is_honored_on_recall() {
    let (clock, _db, repo) = repo().await;

    repo.insert_memory(&NewMemory {
        agent_name: "risk_sentinel".to_string(),
        memory_type: MemoryType::Pattern,
        symbol: None,
        content: serde_json::json!({"event": "kill_switch_activated"}),
        importance: 1.0,
        expires_at: None,
    })
    .await
    .unwrap();
    repo.insert_memory(&NewMemory {
        agent_name: "risk_sentinel".to_string(),
        memory_type: MemoryType::Error,
        symbol: Some("BTCUSDT".to_string()),
        content: serde_json::json!({"error": "transient"}),
        importance: 0.3,
        expires_at: Some(clock.now() + Duration::hours(72)),
    })
    .await
    .unwrap();

    let all = repo.list_memory("risk_sentinel", None, None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    // Importance ordering: the kill-switch pattern outranks the error.
    assert_eq!(all[0].memory_type, MemoryType::Pattern);

    clock.advance(Duration::hours(73));
    let after = repo.list_memory("risk_sentinel", None, None, 10).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].memory_type, MemoryType::Pattern);
}

#[tokio::test]
async fn test_recent_confidences_and_daily_count() {
    let (clock, _db, repo) = repo().await;

    repo.insert_pending(&long_signal("BTCUSDT")).await.unwrap();
    clock.advance(Duration::hours(30));
    repo.insert_pending(&long_signal("BTCUSDT")).await.unwrap();
    repo.insert_pending(&long_signal("ETHUSDT")).await.unwrap();

    let confidences = repo.recent_signal_confidences("BTCUSDT", 24).await.unwrap();
    assert_eq!(confidences.len(), 1);

    // 30h later is the next UTC day; only the two fresh signals count.
    assert_eq!(repo.count_signals_since_today().await.unwrap(), 2);
}
