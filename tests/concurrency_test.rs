mod common;

use common::{in_memory_reconciler, payload, reconciler_with, seed, status_of};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use webhook_reconciler::application::events::EventJournal;
use webhook_reconciler::config::LockConfig;
use webhook_reconciler::domain::status::CollectionStatus;
use webhook_reconciler::infrastructure::in_memory::{InMemoryCoordinator, InMemoryEventStore};
use webhook_reconciler::infrastructure::lock::CoordinatedLockProvider;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_record_or_fetch_stores_one_row() {
    let journal = Arc::new(EventJournal::new(
        Arc::new(InMemoryEventStore::new()),
        Duration::from_secs(300),
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let journal = Arc::clone(&journal);
        tasks.spawn(async move {
            journal
                .record_or_fetch(payload("evt_race", "req_1", "SUCCESS"))
                .await
                .unwrap()
        });
    }

    let mut ids = Vec::new();
    let mut fresh = 0;
    while let Some(joined) = tasks.join_next().await {
        let (event, is_new) = joined.unwrap();
        if is_new {
            fresh += 1;
        }
        ids.push(event.id);
    }

    assert_eq!(fresh, 1);
    assert!(ids.iter().all(|id| *id == ids[0]));
    let stored = journal.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_key.as_deref(), Some("evt_race"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeliveries_apply_once() {
    let coordinator = InMemoryCoordinator::new();
    let locks = Arc::new(CoordinatedLockProvider::new(
        Arc::new(coordinator.clone()),
        &LockConfig::default(),
    ));
    let reconciler = Arc::new(reconciler_with(locks));
    seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Initiated).await;

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let reconciler = Arc::clone(&reconciler);
        tasks.spawn(async move {
            reconciler
                .process(payload("evt_1", "req_1", "SUCCESS"))
                .await
                .unwrap()
        });
    }

    let mut applied = 0;
    while let Some(outcome) = tasks.join_next().await {
        let outcome = outcome.unwrap();
        if outcome.applied() {
            applied += 1;
        } else {
            assert!(matches!(outcome.reason(), "duplicate" | "in_progress"));
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(reconciler.journal().list().await.unwrap().len(), 1);
    assert_eq!(status_of(&reconciler, "req_1").await, CollectionStatus::Success);
    assert_eq!(coordinator.holder("lock:collection:req_1").await, None);
}

#[tokio::test]
async fn test_out_of_order_deliveries_converge() {
    let mut rng = rand::thread_rng();
    for _ in 0..10 {
        let reconciler = in_memory_reconciler();
        seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Initiated).await;

        let mut statuses = vec!["INITIATED", "PENDING", "PROCESSING", "SUCCESS"];
        statuses.shuffle(&mut rng);
        for (i, status) in statuses.iter().enumerate() {
            let outcome = reconciler
                .process(payload(&format!("evt_{}", i), "req_1", status))
                .await
                .unwrap();
            assert!(matches!(outcome.reason(), "applied" | "regression_blocked"));
        }

        assert_eq!(status_of(&reconciler, "req_1").await, CollectionStatus::Success);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_appliers_without_locks_never_regress() {
    for _ in 0..10 {
        let reconciler = Arc::new(in_memory_reconciler());
        seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Initiated).await;

        let mut statuses = vec!["PENDING", "PROCESSING", "SUCCESS", "PENDING", "PROCESSING"];
        statuses.shuffle(&mut rand::thread_rng());

        let mut tasks = JoinSet::new();
        for (i, status) in statuses.into_iter().enumerate() {
            let reconciler = Arc::clone(&reconciler);
            tasks.spawn(async move {
                reconciler
                    .process(payload(&format!("evt_{}", i), "req_1", status))
                    .await
                    .unwrap()
            });
        }
        while let Some(outcome) = tasks.join_next().await {
            outcome.unwrap();
        }

        assert_eq!(status_of(&reconciler, "req_1").await, CollectionStatus::Success);
    }
}
