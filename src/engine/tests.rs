use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use super::*;

const LATENCY: Duration = Duration::from_millis(40);

fn config(rows: u32, cols: u32, latency: Duration) -> EngineConfig {
    EngineConfig {
        rows,
        cols,
        workers: 4,
        latency,
        max_attempts: 3,
        pacing: Duration::ZERO,
        strategy: Strategy::Optimistic,
    }
}

fn engine_with(config: EngineConfig) -> Arc<Engine> {
    Arc::new(Engine::new(config, Arc::new(NotifyHub::new())).unwrap())
}

fn request(who: &str, seat: u32) -> BookingRequest {
    BookingRequest::new(who, SeatId(seat))
}

// ── Construction & submission ────────────────────────────

#[test]
fn engine_rejects_invalid_config() {
    let result = Engine::new(config(0, 4, LATENCY), Arc::new(NotifyHub::new()));
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn submit_rejects_out_of_range_seat() {
    let engine = engine_with(config(2, 2, LATENCY));
    let err = engine.submit("User1", SeatId(4)).unwrap_err();
    assert_eq!(err, EngineError::InvalidResource { seat: SeatId(4), seats: 4 });
    assert!(engine.queue.is_empty());
}

#[test]
fn submit_rejects_bad_requester_names() {
    let engine = engine_with(config(2, 2, LATENCY));
    assert!(matches!(engine.submit("", SeatId(0)), Err(EngineError::LimitExceeded(_))));
    let long = "x".repeat(crate::limits::MAX_REQUESTER_LEN + 1);
    assert!(matches!(engine.submit(&long, SeatId(0)), Err(EngineError::LimitExceeded(_))));
    assert!(engine.queue.is_empty());
}

#[test]
fn submit_at_maps_row_col_and_checks_bounds() {
    let engine = engine_with(config(3, 4, LATENCY));
    assert_ok!(engine.submit_at("User1", 2, 3));
    assert_eq!(engine.pending()[0].seat, SeatId(11));

    // col beyond the row must not alias into the next row
    assert_err!(engine.submit_at("User2", 0, 4));
    assert_err!(engine.submit_at("User2", 3, 0));
    assert_eq!(engine.queue.len(), 1);
}

#[test]
fn seat_labels_parse_one_based() {
    let engine = engine_with(config(10, 10, LATENCY));
    assert_eq!(engine.seat_from_label("1").unwrap(), SeatId(0));
    assert_eq!(engine.seat_from_label(" 100 ").unwrap(), SeatId(99));
    assert!(matches!(engine.seat_from_label("0"), Err(EngineError::InvalidSeatLabel(_))));
    assert!(matches!(engine.seat_from_label("abc"), Err(EngineError::InvalidSeatLabel(_))));
    assert!(matches!(
        engine.seat_from_label("101"),
        Err(EngineError::InvalidResource { .. })
    ));
}

#[test]
fn strategy_toggle_returns_previous() {
    let engine = engine_with(config(1, 1, LATENCY));
    assert_eq!(engine.strategy(), Strategy::Optimistic);
    assert_eq!(engine.set_strategy(Strategy::Pessimistic), Strategy::Optimistic);
    assert_eq!(engine.strategy(), Strategy::Pessimistic);
    assert_eq!(engine.set_strategy(Strategy::Pessimistic), Strategy::Pessimistic);
}

// ── Optimistic ───────────────────────────────────────────

#[tokio::test]
async fn optimistic_books_free_seat() {
    let engine = engine_with(config(1, 2, Duration::ZERO));
    let outcome = engine.process(&request("User1", 1)).await.unwrap();
    assert_eq!(outcome, Outcome::Booked { seat: SeatId(1), requester: "User1".into() });
    assert_eq!(engine.seat(SeatId(1)).unwrap(), SeatState { occupied: true, version: 1 });
}

#[tokio::test]
async fn optimistic_conflicts_immediately_on_occupied_seat() {
    let engine = engine_with(config(1, 1, Duration::from_secs(5)));
    assert!(engine.grid.commit(SeatId(0), 0).unwrap());

    // Would take 5s per attempt if it slept; an occupied seat must not.
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        engine.process(&request("User2", 0)),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Conflict { reason: ConflictReason::Occupied, .. }
    ));
}

#[tokio::test]
async fn optimistic_retries_after_version_moves_under_it() {
    let engine = engine_with(config(1, 1, LATENCY));
    let e = engine.clone();
    let attempt = tokio::spawn(async move { e.process(&request("User1", 0)).await });

    // Book and cancel inside the first work window: seat is free again but
    // the version moved 0 -> 2, so the first commit must fail and retry.
    tokio::time::sleep(LATENCY / 4).await;
    assert!(engine.grid.commit(SeatId(0), 0).unwrap());
    assert!(engine.grid.release(SeatId(0)).unwrap());

    let outcome = attempt.await.unwrap().unwrap();
    assert!(outcome.is_booked());
    assert_eq!(engine.seat(SeatId(0)).unwrap(), SeatState { occupied: true, version: 3 });
}

#[tokio::test]
async fn optimistic_gives_up_after_max_attempts() {
    let mut cfg = config(1, 1, LATENCY);
    cfg.max_attempts = 2;
    let engine = engine_with(cfg);
    let e = engine.clone();
    let attempt = tokio::spawn(async move { e.process(&request("User1", 0)).await });

    // Churn the seat so every commit sees a stale version.
    let churn = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                let s = engine.grid.read(SeatId(0)).unwrap();
                if !s.occupied {
                    engine.grid.commit(SeatId(0), s.version).unwrap();
                }
                engine.grid.release(SeatId(0)).unwrap();
                tokio::time::sleep(LATENCY / 8).await;
            }
        })
    };

    let outcome = attempt.await.unwrap().unwrap();
    churn.await.unwrap();
    assert!(matches!(
        outcome,
        Outcome::Conflict { reason: ConflictReason::RetriesExhausted, .. }
    ));
    assert_eq!(engine.stats().conflicts, 1);
}

#[tokio::test]
async fn optimistic_stop_after_lost_commit_is_not_exhaustion() {
    let engine = engine_with(config(1, 1, LATENCY));
    let stop = CancellationToken::new();
    let e = engine.clone();
    let token = stop.clone();
    let attempt = tokio::spawn(async move {
        e.process_with(&request("User1", 0), Strategy::Optimistic, &token)
            .await
    });

    // Move the version under the first attempt, leave the seat free, then
    // stop: the lost commit is final but only one of three attempts ran.
    tokio::time::sleep(LATENCY / 4).await;
    assert!(engine.grid.commit(SeatId(0), 0).unwrap());
    assert!(engine.grid.release(SeatId(0)).unwrap());
    stop.cancel();

    let outcome = attempt.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        Outcome::Conflict { reason: ConflictReason::Stopped, .. }
    ));
    assert_eq!(engine.seat(SeatId(0)).unwrap(), SeatState { occupied: false, version: 2 });
}

// ── Pessimistic ──────────────────────────────────────────

#[tokio::test]
async fn pessimistic_books_and_releases_lock() {
    let engine = engine_with(config(1, 1, Duration::ZERO));
    engine.set_strategy(Strategy::Pessimistic);
    let outcome = engine.process(&request("User1", 0)).await.unwrap();
    assert!(outcome.is_booked());
    assert!(!engine.locks.is_held(SeatId(0)));
    assert_eq!(engine.seat(SeatId(0)).unwrap().version, 1);
}

#[tokio::test]
async fn pessimistic_busy_lock_is_conflict_without_waiting() {
    let engine = engine_with(config(1, 1, Duration::ZERO));
    engine.set_strategy(Strategy::Pessimistic);
    let held = engine.locks.try_acquire(SeatId(0)).unwrap().unwrap();

    let outcome = engine.process(&request("User2", 0)).await.unwrap();
    assert!(matches!(
        outcome,
        Outcome::Conflict { reason: ConflictReason::LockBusy, .. }
    ));
    // Nothing was written.
    assert_eq!(engine.seat(SeatId(0)).unwrap().version, 0);
    drop(held);
}

#[tokio::test]
async fn pessimistic_occupied_seat_releases_lock() {
    let engine = engine_with(config(1, 1, LATENCY));
    engine.set_strategy(Strategy::Pessimistic);
    assert!(engine.grid.commit(SeatId(0), 0).unwrap());

    let outcome = engine.process(&request("User2", 0)).await.unwrap();
    assert!(matches!(
        outcome,
        Outcome::Conflict { reason: ConflictReason::Occupied, .. }
    ));
    assert!(!engine.locks.is_held(SeatId(0)));
}

#[tokio::test]
async fn pessimistic_lock_released_when_attempt_aborted() {
    let engine = engine_with(config(1, 1, Duration::from_secs(30)));
    engine.set_strategy(Strategy::Pessimistic);
    let e = engine.clone();
    let attempt = tokio::spawn(async move { e.process(&request("User1", 0)).await });

    while !engine.locks.is_held(SeatId(0)) {
        tokio::task::yield_now().await;
    }
    attempt.abort();
    let _ = attempt.await;

    assert!(!engine.locks.is_held(SeatId(0)));
    assert_eq!(engine.seat(SeatId(0)).unwrap(), SeatState { occupied: false, version: 0 });
    assert_eq!(engine.stats().processed(), 0);
}

#[tokio::test]
async fn pessimistic_commit_is_version_checked_against_lock_free_writer() {
    let engine = engine_with(config(1, 1, LATENCY));
    let e = engine.clone();
    let locked = tokio::spawn(async move {
        e.process_with(&request("User1", 0), Strategy::Pessimistic, &CancellationToken::new())
            .await
    });

    while !engine.locks.is_held(SeatId(0)) {
        tokio::task::yield_now().await;
    }
    // An optimistic writer never consults the lock table.
    assert!(engine.grid.commit(SeatId(0), 0).unwrap());

    let outcome = locked.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        Outcome::Conflict { reason: ConflictReason::VersionMoved, .. }
    ));
    assert_eq!(engine.seat(SeatId(0)).unwrap().version, 1);
}

#[tokio::test]
async fn stop_during_pessimistic_latency_still_commits() {
    let engine = engine_with(config(1, 1, Duration::from_secs(30)));
    let stop = CancellationToken::new();
    let e = engine.clone();
    let s = stop.clone();
    let attempt = tokio::spawn(async move {
        e.process_with(&request("User1", 0), Strategy::Pessimistic, &s).await
    });
    while !engine.locks.is_held(SeatId(0)) {
        tokio::task::yield_now().await;
    }
    stop.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), attempt)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(outcome.is_booked());
    assert!(!engine.locks.is_held(SeatId(0)));
}

// ── Cancellation ─────────────────────────────────────────

#[tokio::test]
async fn cancel_frees_and_bumps_version() {
    let engine = engine_with(config(1, 1, Duration::ZERO));
    engine.process(&request("User1", 0)).await.unwrap();

    assert_eq!(engine.cancel(SeatId(0)).unwrap(), CancelOutcome::Released);
    assert_eq!(engine.seat(SeatId(0)).unwrap(), SeatState { occupied: false, version: 2 });

    let log = engine.log();
    let last = log.last().unwrap();
    assert_eq!(last.key.requester, CANCEL_REQUESTER);
    assert_eq!(last.outcome, Outcome::Released { seat: SeatId(0) });
    assert_eq!(last.message, "Cancelled seat 1");
    assert_eq!(engine.stats().released, 1);
}

#[test]
fn cancel_free_seat_is_not_booked_and_changes_nothing() {
    let engine = engine_with(config(1, 2, LATENCY));
    let mut rx = engine.notify.subscribe();

    assert_eq!(engine.cancel(SeatId(1)).unwrap(), CancelOutcome::NotBooked);
    assert_eq!(engine.seat(SeatId(1)).unwrap().version, 0);
    assert!(engine.log().is_empty());
    assert_eq!(engine.stats(), StatsSnapshot::default());
    assert_eq!(
        rx.try_recv().unwrap(),
        Notification::Notice { notice: Notice::NotBooked { seat: SeatId(1) } }
    );
}

#[test]
fn cancel_out_of_range_is_invalid_resource() {
    let engine = engine_with(config(1, 2, LATENCY));
    assert!(matches!(
        engine.cancel(SeatId(2)),
        Err(EngineError::InvalidResource { .. })
    ));
}

// ── Dispatcher ───────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pass_drains_queue_and_exits() {
    let engine = engine_with(config(4, 4, Duration::from_millis(5)));
    for i in 0..16 {
        engine.submit(&format!("User{i}"), SeatId(i)).unwrap();
    }
    assert!(engine.start_processing());
    engine.drain().await;

    assert!(!engine.is_processing());
    assert!(engine.queue.is_empty());
    let stats = engine.stats();
    assert_eq!(stats.booked, 16);
    assert_eq!(stats.processed(), 16);
    assert_eq!(engine.snapshot().occupied_count(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_while_running_is_noop() {
    let engine = engine_with(config(2, 2, Duration::from_millis(50)));
    for i in 0..4 {
        engine.submit("User", SeatId(i)).unwrap();
    }
    assert!(engine.start_processing());
    assert!(!engine.start_processing());
    engine.drain().await;
    // Previous pass is done, a new one may start (and exits at once).
    assert!(engine.start_processing());
    engine.drain().await;
    assert_eq!(engine.stats().processed(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_leaves_unprocessed_requests_queued() {
    let mut cfg = config(1, 20, Duration::from_millis(20));
    cfg.workers = 1;
    cfg.pacing = Duration::from_millis(200);
    let engine = engine_with(cfg);
    for i in 0..10 {
        engine.submit(&format!("User{i}"), SeatId(i)).unwrap();
    }

    assert!(engine.start_processing());
    tokio::time::sleep(Duration::from_millis(60)).await;
    engine.stop_processing().await;

    assert!(!engine.is_processing());
    let processed = engine.stats().processed() as usize;
    assert!(processed >= 1 && processed < 10, "processed {processed}");
    assert_eq!(processed + engine.queue.len(), 10);

    // A fresh pass picks up where the last one stopped.
    assert!(engine.start_processing());
    tokio::time::timeout(Duration::from_secs(10), engine.drain()).await.unwrap();
    assert_eq!(engine.stats().processed(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strategy_switch_applies_to_next_dequeue() {
    let mut cfg = config(1, 2, Duration::ZERO);
    cfg.workers = 1;
    let engine = engine_with(cfg);
    engine.set_strategy(Strategy::Pessimistic);

    // Holding seat 0's lock makes a pessimistic attempt observable as LockBusy;
    // an optimistic attempt ignores the lock and books.
    let held = engine.locks.try_acquire(SeatId(0)).unwrap().unwrap();
    engine.submit("User1", SeatId(0)).unwrap();
    assert!(engine.start_processing());
    engine.drain().await;
    assert!(matches!(
        engine.log()[0].outcome,
        Outcome::Conflict { reason: ConflictReason::LockBusy, .. }
    ));

    engine.set_strategy(Strategy::Optimistic);
    engine.submit("User2", SeatId(0)).unwrap();
    assert!(engine.start_processing());
    engine.drain().await;
    drop(held);
    assert!(engine.log()[1].outcome.is_booked());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strategy_switch_leaves_in_flight_attempt_alone() {
    let mut cfg = config(1, 2, Duration::from_millis(200));
    cfg.workers = 1;
    let engine = engine_with(cfg);
    engine.set_strategy(Strategy::Pessimistic);

    // Seat 1's lock is held throughout, so only an optimistic attempt can
    // book it.
    let held = engine.locks.try_acquire(SeatId(1)).unwrap().unwrap();
    engine.submit("User1", SeatId(0)).unwrap();
    engine.submit("User2", SeatId(1)).unwrap();
    assert!(engine.start_processing());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !engine.locks.is_held(SeatId(0)) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(engine.set_strategy(Strategy::Optimistic), Strategy::Pessimistic);
    // The pessimistic attempt keeps its lease through the switch.
    assert!(engine.locks.is_held(SeatId(0)));

    tokio::time::timeout(Duration::from_secs(5), engine.drain())
        .await
        .unwrap();
    drop(held);

    let log = engine.log();
    assert_eq!(log.len(), 2);
    assert_eq!(
        log[0].outcome,
        Outcome::Booked { seat: SeatId(0), requester: "User1".into() }
    );
    assert!(!engine.locks.is_held(SeatId(0)));
    assert_eq!(engine.locks.peak_holders(SeatId(0)), 1);
    assert_eq!(engine.seat(SeatId(0)).unwrap(), SeatState { occupied: true, version: 1 });
    // Dequeued after the switch: booked past the held lock.
    assert_eq!(
        log[1].outcome,
        Outcome::Booked { seat: SeatId(1), requester: "User2".into() }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_valid_submissions_reach_the_queue() {
    let engine = engine_with(config(2, 2, Duration::ZERO));
    assert_err!(engine.submit("User1", SeatId(4)));
    assert_err!(engine.submit_at("User2", 2, 0));
    assert_err!(engine.submit("", SeatId(0)));
    assert_eq!(engine.pending_len(), 0);

    for i in 0..4 {
        assert_ok!(engine.submit(&format!("User{i}"), SeatId(i)));
    }
    assert_eq!(engine.pending_len(), 4);
    assert!(engine.start_processing());
    engine.drain().await;

    // Every dequeued request produced exactly one recorded outcome.
    assert_eq!(engine.pending_len(), 0);
    assert_eq!(engine.stats().processed(), 4);
    assert_eq!(engine.log().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stats_always_match_dequeued_requests() {
    let engine = engine_with(config(2, 2, Duration::from_millis(2)));
    for i in 0..40 {
        engine.submit(&format!("User{i}"), SeatId(i % 4)).unwrap();
    }
    assert!(engine.start_processing());
    engine.drain().await;

    let stats = engine.stats();
    assert_eq!(stats.processed(), 40);
    assert_eq!(stats.booked, 4);
    assert_eq!(stats.conflicts, 36);
    let booked_entries = engine.log().iter().filter(|e| e.outcome.is_booked()).count();
    assert_eq!(booked_entries, 4);
}

#[tokio::test]
async fn observers_get_log_and_state() {
    let engine = engine_with(config(1, 2, Duration::ZERO));
    let mut rx = engine.notify.subscribe();

    engine.submit("User1", SeatId(1)).unwrap();
    match rx.recv().await.unwrap() {
        Notification::StateChanged { pending, .. } => assert_eq!(pending.len(), 1),
        other => panic!("unexpected {other:?}"),
    }

    let req = engine.queue.pop().unwrap();
    engine.process(&req).await.unwrap();
    match rx.recv().await.unwrap() {
        Notification::LogAppended { entry } => assert_eq!(entry.message, "Booked seat 2"),
        other => panic!("unexpected {other:?}"),
    }
    match rx.recv().await.unwrap() {
        Notification::StateChanged { grid, pending, .. } => {
            assert!(grid.get(SeatId(1)).unwrap().occupied);
            assert!(pending.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
}
