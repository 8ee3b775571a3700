//! Batch execution, backoff and the worker loop

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use calbridge_core::config::ConfigBuilder;
use calbridge_core::domain::{PropertyType, TargetSchema};
use calbridge_sync::BatchOutcome;
use tokio_util::sync::CancellationToken;

use crate::common::{pair, since_forever, Harness};

fn ran(outcome: BatchOutcome) -> calbridge_sync::BatchReport {
    match outcome {
        BatchOutcome::Ran(report) => report,
        other => panic!("expected a batch to run, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_activation_backfills_from_sentinel() {
    let h = Harness::new();
    let p = pair(1);
    h.calendar.seed(&p.calendar_id, "Standup", "2024-01-10", "2024-01-11");
    let engine = h.engine();

    engine.activate_pair(&p).await.unwrap();
    assert_eq!(engine.connection_time(&p).await.unwrap(), Some(since_forever()));
    assert_eq!(engine.active_pairs().await.unwrap(), vec![p.clone()]);

    let report = ran(engine.run_pending().await.unwrap());
    assert!(!report.aborted);
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.totals().created_targets, 1);
    assert_eq!(h.records.live().len(), 1);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.total, 1);
    assert!(stats.last_synced_at(&p).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_nothing_pending_is_idle() {
    let h = Harness::new();
    let engine = h.engine();
    assert!(matches!(engine.run_pending().await.unwrap(), BatchOutcome::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_local_change_burst_is_one_job() {
    let h = Harness::new();
    let engine = h.engine();
    engine.activate_pair(&pair(1)).await.unwrap();
    ran(engine.run_pending().await.unwrap());

    for _ in 0..5 {
        engine.on_local_change(pair(1)).await;
    }
    assert_eq!(engine.pending_jobs().await, 1);
    assert_eq!(engine.recently_active(Duration::from_secs(60)).await, vec![pair(1)]);

    let report = ran(engine.run_pending().await.unwrap());
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(engine.stats().await.unwrap().succeeded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_full_poll_and_pair_job_reconcile_once() {
    let h = Harness::new();
    let engine = h.engine();
    engine.activate_pair(&pair(1)).await.unwrap();
    engine.activate_pair(&pair(2)).await.unwrap();
    engine.request_full_sync().await;

    let report = ran(engine.run_pending().await.unwrap());
    let mut keys: Vec<_> = report.pairs.iter().map(|r| r.pair.clone()).collect();
    keys.sort();
    assert_eq!(keys, vec![pair(1), pair(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_deactivated_pair_is_skipped() {
    let h = Harness::new();
    let p = pair(1);
    h.calendar.seed(&p.calendar_id, "Standup", "2024-01-10", "2024-01-11");
    let engine = h.engine();

    engine.activate_pair(&p).await.unwrap();
    engine.deactivate_pair(&p).await.unwrap();

    let report = ran(engine.run_pending().await.unwrap());
    assert!(report.pairs.is_empty());
    assert!(h.records.live().is_empty());
    // reactivation keeps the original connection time
    engine.activate_pair(&p).await.unwrap();
    assert_eq!(engine.connection_time(&p).await.unwrap(), Some(since_forever()));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_requeues_and_backs_off() {
    let h = Harness::new();
    let p = pair(1);
    h.calendar.seed(&p.calendar_id, "Standup", "2024-01-10", "2024-01-11");
    h.records.fail("query_records", "503 Service Unavailable");
    let engine = h.engine();
    engine.activate_pair(&p).await.unwrap();

    let report = ran(engine.run_pending().await.unwrap());
    assert!(report.aborted);
    assert_eq!(report.requeued, 1);
    assert_eq!(report.next_retry_in, Some(Duration::from_secs(1)));
    assert_eq!(engine.pending_jobs().await, 1);

    match engine.run_pending().await.unwrap() {
        BatchOutcome::Deferred { remaining } => assert!(remaining <= Duration::from_secs(1)),
        other => panic!("expected deferral, got {other:?}"),
    }

    // second failure doubles the delay
    tokio::time::advance(Duration::from_secs(1)).await;
    let report = ran(engine.run_pending().await.unwrap());
    assert_eq!(report.next_retry_in, Some(Duration::from_secs(2)));

    h.records.heal();
    tokio::time::advance(Duration::from_secs(2)).await;
    let report = ran(engine.run_pending().await.unwrap());
    assert!(!report.aborted);
    assert_eq!(h.records.live().len(), 1);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.total, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failure_requeues_whole_batch() {
    let h = Harness::new();
    let engine = h.engine();
    engine.activate_pair(&pair(1)).await.unwrap();
    engine.activate_pair(&pair(2)).await.unwrap();
    h.calendar.fail("list_events", "connection reset by peer");

    let report = ran(engine.run_pending().await.unwrap());
    assert!(report.aborted);
    // fail-fast: the first failing pair stops the batch
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.requeued, 2);
    assert_eq!(engine.pending_jobs().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_schema_error_does_not_abort_batch() {
    let h = Harness::new();
    let mut properties = BTreeMap::new();
    properties.insert("Name".to_string(), PropertyType::Title);
    h.records
        .set_schema(&pair(1).database_id, TargetSchema { properties });
    h.calendar
        .seed(&pair(2).calendar_id, "Standup", "2024-01-10", "2024-01-11");

    let engine = h.engine();
    engine.activate_pair(&pair(1)).await.unwrap();
    engine.activate_pair(&pair(2)).await.unwrap();

    let report = ran(engine.run_pending().await.unwrap());
    assert!(!report.aborted);
    assert_eq!(report.requeued, 0);
    assert_eq!(report.pairs.len(), 2);
    let failed: Vec<_> = report.pairs.iter().filter(|r| r.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].pair, pair(1));
    assert_eq!(h.records.live().len(), 1);

    // no backoff hold after a schema error
    engine.request_full_sync().await;
    ran(engine.run_pending().await.unwrap());

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_stats() {
    let h = Harness::new();
    let engine = h.engine();
    engine.activate_pair(&pair(1)).await.unwrap();
    ran(engine.run_pending().await.unwrap());
    assert_eq!(engine.stats().await.unwrap().succeeded, 1);

    engine.reset_stats().await.unwrap();
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(stats.last_synced.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fixed_interval_ignores_focus() {
    let h = Harness::new();
    let engine = h.engine();
    engine.set_window_focused(false).await;
    assert_eq!(engine.next_poll_interval().await, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_worker_loop_syncs_and_polls() {
    let h = Harness::new();
    let p = pair(1);
    h.calendar.seed(&p.calendar_id, "Standup", "2024-01-10", "2024-01-11");

    let config = ConfigBuilder::new().poll_interval_secs(30).build();
    let engine = Arc::new(h.engine_with(&config));
    engine.activate_pair(&p).await.unwrap();

    let cancel = CancellationToken::new();
    let worker = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.records.live().len(), 1);

    // a calendar edit is picked up by the next scheduled poll
    h.calendar
        .seed(&p.calendar_id, "Retro", "2024-01-12", "2024-01-13");
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.records.live().len(), 2);

    cancel.cancel();
    worker.await.unwrap();
    assert!(!engine.is_busy());
}
