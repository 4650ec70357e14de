//! End-to-end engine behavior under paused tokio time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskwatch_core::debounce::IdlePhase;
use taskwatch_core::event::ChangeReason;
use taskwatch_core::types::{Detector, HeartbeatStatus, Signal, TabId, TabPing, TabUpdate};
use taskwatch_runtime::aggregator::Aggregator;
use taskwatch_runtime::clock::SystemClock;
use taskwatch_runtime::config::{EngineConfig, Settings};
use taskwatch_runtime::store::MemoryStore;

const LISTING_ALL: &str = "https://chatgpt.com/codex";
const LISTING_PLAN: &str = "https://chatgpt.com/plan";
const DETAIL: &str = "https://chatgpt.com/codex/tasks/task_e_123";
const OTHER: &str = "https://chatgpt.com/settings";

fn update(tab_id: TabId, origin: &str, count: i64) -> TabUpdate {
    TabUpdate {
        tab_id,
        origin: origin.to_owned(),
        title: format!("tab {tab_id}"),
        count,
        active: count > 0,
        signals: Vec::new(),
        ts: 0,
    }
}

fn ping(tab_id: TabId, ts: i64, interval_ms: i64) -> TabPing {
    TabPing {
        tab_id,
        origin: LISTING_ALL.to_owned(),
        title: String::new(),
        ts,
        last_update_ts: 0,
        interval_ms,
    }
}

async fn start(start_ms: u64, debounce_ms: u64) -> Aggregator {
    let config = EngineConfig {
        settings: Settings::new(debounce_ms),
        ..EngineConfig::default()
    };
    let engine = Aggregator::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock::starting_at(start_ms)),
    );
    engine.init().await.expect("init");
    engine
}

fn count_idle(engine: &Aggregator) -> Arc<AtomicU32> {
    let hits = Arc::new(AtomicU32::new(0));
    let h = Arc::clone(&hits);
    engine.on_idle_settled(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

async fn total(engine: &Aggregator) -> u32 {
    engine.snapshot().await.last_total
}

// ─── Total derivation through the engine ─────────────────────────

#[tokio::test(start_paused = true)]
async fn duplicate_listing_tabs_take_the_max() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 2)).await.expect("update");
    engine
        .handle_tab_update(update(2, "https://chatgpt.com/codex/", 5))
        .await
        .expect("update");
    assert_eq!(total(&engine).await, 5);
}

#[tokio::test(start_paused = true)]
async fn distinct_listing_views_are_additive() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 2)).await.expect("update");
    engine.handle_tab_update(update(2, LISTING_PLAN, 3)).await.expect("update");
    assert_eq!(total(&engine).await, 5);
}

#[tokio::test(start_paused = true)]
async fn detail_tab_takes_precedence_over_listings() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(2, LISTING_PLAN, 1)).await.expect("update");
    engine.handle_tab_update(update(3, DETAIL, 5)).await.expect("update");
    assert_eq!(total(&engine).await, 5);
}

#[tokio::test(start_paused = true)]
async fn navigating_away_evicts_and_opens_idle_window() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 2)).await.expect("update");

    let reasons = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&reasons);
    engine.on_change(move |ev| r.lock().expect("lock").push((ev.reason, ev.tab_id)));

    tokio::time::advance(Duration::from_millis(500)).await;
    engine.handle_tab_update(update(1, OTHER, 0)).await.expect("update");

    let state = engine.snapshot().await;
    assert!(state.tabs.is_empty());
    assert_eq!(state.last_total, 0);
    assert_eq!(state.debounce.since, 1_500);
    assert_eq!(
        *reasons.lock().expect("lock"),
        vec![(ChangeReason::TabNavigated, Some(1))]
    );
}

#[tokio::test(start_paused = true)]
async fn untracked_url_is_never_recorded() {
    let engine = start(1_000, 12_000).await;
    assert!(!engine.handle_tab_update(update(9, OTHER, 4)).await.expect("update"));
    assert!(!engine.handle_tab_heartbeat(TabPing {
        origin: "not a url".into(),
        ..ping(9, 1_000, 15_000)
    })
    .await
    .expect("ping"));
    assert!(engine.tracked_tab_ids().await.is_empty());
}

// ─── Debounce / idle ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn idle_settles_exactly_once() {
    let engine = start(0, 12_000).await;
    let idle = count_idle(&engine);

    engine.handle_tab_update(update(1, LISTING_ALL, 3)).await.expect("update");
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");
    assert_eq!(
        engine.idle_phase().await,
        IdlePhase::IdlePending {
            since: 2_000,
            deadline: 14_000
        }
    );

    tokio::time::sleep(Duration::from_millis(11_999)).await;
    assert_eq!(idle.load(Ordering::SeqCst), 0);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(idle.load(Ordering::SeqCst), 1);

    // More zero reports and a long wait never produce a second event.
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");
    engine.handle_tab_heartbeat(ping(1, 20_000, 15_000)).await.expect("ping");
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(idle.load(Ordering::SeqCst), 1);
    assert_eq!(engine.idle_phase().await, IdlePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn repeated_zero_updates_keep_the_anchor() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");
    let since = engine.snapshot().await.debounce.since;
    assert_eq!(since, 1_000);

    for _ in 0..3 {
        tokio::time::advance(Duration::from_millis(1_000)).await;
        engine.handle_tab_update(update(2, LISTING_PLAN, 0)).await.expect("update");
        assert_eq!(engine.snapshot().await.debounce.since, since);
    }
}

#[tokio::test(start_paused = true)]
async fn activity_during_window_cancels_settlement() {
    let engine = start(1_000, 12_000).await;
    let idle = count_idle(&engine);

    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");
    tokio::time::sleep(Duration::from_millis(6_000)).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 2)).await.expect("update");
    assert_eq!(engine.snapshot().await.debounce.since, 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(idle.load(Ordering::SeqCst), 0);
    assert_eq!(engine.idle_phase().await, IdlePhase::Active);
}

#[tokio::test(start_paused = true)]
async fn zero_window_settles_inline() {
    let engine = start(1_000, 0).await;
    let idle = count_idle(&engine);
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&reasons);
    engine.on_change(move |ev| r.lock().expect("lock").push(ev.reason));

    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");

    assert_eq!(idle.load(Ordering::SeqCst), 1);
    assert_eq!(
        *reasons.lock().expect("lock"),
        vec![
            ChangeReason::TasksUpdate,
            ChangeReason::TasksUpdate,
            ChangeReason::DebounceCleared
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn reconfiguring_window_keeps_anchor_and_moves_deadline() {
    let engine = start(1_000, 12_000).await;
    let idle = count_idle(&engine);
    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(engine.update_settings(Settings::new(30_000)).await.expect("settings"));
    assert_eq!(
        engine.idle_phase().await,
        IdlePhase::IdlePending {
            since: 1_000,
            deadline: 31_000
        }
    );

    // The original 13s deadline no longer fires.
    tokio::time::sleep(Duration::from_millis(20_000)).await;
    assert_eq!(idle.load(Ordering::SeqCst), 0);
    tokio::time::sleep(Duration::from_millis(8_001)).await;
    assert_eq!(idle.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn idle_event_carries_settled_snapshot() {
    let engine = start(1_000, 5_000).await;
    let settled = Arc::new(Mutex::new(None));
    let s = Arc::clone(&settled);
    engine.on_idle_settled(move |ev| *s.lock().expect("lock") = Some(ev.clone()));

    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(1, LISTING_ALL, 0)).await.expect("update");
    tokio::time::sleep(Duration::from_millis(5_001)).await;

    let event = settled.lock().expect("lock").clone().expect("settled");
    assert_eq!(event.settled_at, 6_000);
    assert_eq!(event.state.debounce.since, 0);
    assert_eq!(event.state, engine.snapshot().await);
}

// ─── Heartbeats ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_tab_goes_stale_once_per_cycle() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_heartbeat(ping(1, 1_000, 10_000)).await.expect("ping");

    assert!(engine.evaluate_heartbeat_statuses(60_000).await.expect("eval").is_empty());
    assert_eq!(engine.evaluate_heartbeat_statuses(62_000).await.expect("eval"), vec![1]);
    let hb = engine.snapshot().await.tabs[&1].heartbeat.clone();
    assert_eq!(hb.status, HeartbeatStatus::Stale);
    assert_eq!(hb.missed_count, 1);

    assert_eq!(engine.evaluate_heartbeat_statuses(122_000).await.expect("eval"), vec![1]);
    assert_eq!(engine.snapshot().await.tabs[&1].heartbeat.missed_count, 2);

    // Any contact clears the flag.
    engine.handle_tab_heartbeat(ping(1, 123_000, 10_000)).await.expect("ping");
    let hb = engine.snapshot().await.tabs[&1].heartbeat.clone();
    assert_eq!(hb.status, HeartbeatStatus::Ok);
    assert_eq!(hb.missed_count, 0);
}

#[tokio::test(start_paused = true)]
async fn short_interval_is_protected_by_the_floor() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_heartbeat(ping(1, 1_000, 5_000)).await.expect("ping");
    assert!(engine.evaluate_heartbeat_statuses(46_000).await.expect("eval").is_empty());
    assert_eq!(
        engine.snapshot().await.tabs[&1].heartbeat.status,
        HeartbeatStatus::Ok
    );
}

#[tokio::test(start_paused = true)]
async fn heartbeat_never_changes_count() {
    let engine = start(1_000, 12_000).await;
    engine.handle_tab_update(update(1, LISTING_ALL, 4)).await.expect("update");
    engine.handle_tab_heartbeat(ping(1, 5_000, 20_000)).await.expect("ping");
    let state = engine.snapshot().await;
    assert_eq!(state.tabs[&1].count, 4);
    assert_eq!(state.tabs[&1].heartbeat.expected_interval_ms, 20_000);
    assert_eq!(state.last_total, 4);
}

// ─── Listeners and reads ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn panicking_listener_does_not_starve_others() {
    let engine = start(1_000, 12_000).await;
    engine.on_change(|_| panic!("listener failure"));
    let seen = Arc::new(AtomicU32::new(0));
    let s = Arc::clone(&seen);
    let id = engine.on_change(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    engine.handle_tab_update(update(1, LISTING_ALL, 1)).await.expect("update");
    engine.handle_tab_update(update(1, LISTING_ALL, 2)).await.expect("update");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(total(&engine).await, 2);

    assert!(engine.unsubscribe(id));
    engine.handle_tab_update(update(1, LISTING_ALL, 3)).await.expect("update");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn snapshots_are_independent_copies() {
    let engine = start(1_000, 12_000).await;
    engine
        .handle_tab_update(TabUpdate {
            signals: vec![Signal {
                detector: Detector::RunningIndicator,
                evidence: "spinner".into(),
                task_key: Some("task_e_1".into()),
            }],
            ..update(1, LISTING_ALL, 1)
        })
        .await
        .expect("update");

    let mut copy = engine.snapshot().await;
    copy.tabs.clear();
    copy.last_total = 99;

    let fresh = engine.snapshot().await;
    assert_eq!(fresh.last_total, 1);
    assert_eq!(fresh.tabs[&1].signals.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn events_carry_previous_and_current_in_commit_order() {
    let engine = start(1_000, 12_000).await;
    let totals = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&totals);
    engine.on_change(move |ev| {
        t.lock()
            .expect("lock")
            .push((ev.previous.last_total, ev.current.last_total))
    });

    let mut handles = Vec::new();
    for count in 1..=5 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.handle_tab_update(update(count, LISTING_ALL, count)).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("update");
    }

    let totals = totals.lock().expect("lock").clone();
    assert_eq!(totals.len(), 5);
    for pair in totals.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
    assert_eq!(totals.last().map(|t| t.1), Some(5));
}
