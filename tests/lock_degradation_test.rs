mod common;

use async_trait::async_trait;
use common::{payload, seed, status_of};
use std::sync::Arc;
use std::time::{Duration, Instant};
use webhook_reconciler::application::reconciler::Reconciler;
use webhook_reconciler::config::ReconcilerConfig;
use webhook_reconciler::domain::ports::CoordinationBackend;
use webhook_reconciler::error::Result;
use webhook_reconciler::domain::status::CollectionStatus;
use webhook_reconciler::infrastructure::in_memory::{
    InMemoryCollectionStore, InMemoryCoordinator, InMemoryEventStore,
};
use webhook_reconciler::infrastructure::lock::CoordinatedLockProvider;

/// A coordination backend that accepts calls and never answers them.
struct SilentBackend;

#[async_trait]
impl CoordinationBackend for SilentBackend {
    async fn set_if_absent(&self, _key: &str, _token: &str, _ttl: Duration) -> Result<bool> {
        std::future::pending().await
    }

    async fn delete_if_owner(&self, _key: &str, _token: &str) -> Result<bool> {
        std::future::pending().await
    }
}

fn coordinated(coordinator: &InMemoryCoordinator, config: ReconcilerConfig) -> Reconciler {
    let locks = CoordinatedLockProvider::new(Arc::new(coordinator.clone()), &config.lock);
    Reconciler::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryCollectionStore::new()),
        Arc::new(locks),
        config,
    )
}

#[tokio::test]
async fn test_unreachable_backend_still_processes() {
    let coordinator = InMemoryCoordinator::new();
    let reconciler = coordinated(&coordinator, ReconcilerConfig::default());
    seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Initiated).await;
    coordinator.set_offline(true);

    let outcome = reconciler
        .process(payload("evt_1", "req_1", "SUCCESS"))
        .await
        .unwrap();
    assert!(outcome.applied());
    assert_eq!(status_of(&reconciler, "req_1").await, CollectionStatus::Success);
}

#[tokio::test]
async fn test_contended_lock_times_out_and_proceeds() {
    let coordinator = InMemoryCoordinator::new();
    let config = ReconcilerConfig::default()
        .with_lock_timeouts(Duration::from_secs(30), Duration::from_millis(150));
    let reconciler = coordinated(&coordinator, config);
    seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Pending).await;

    coordinator
        .set_if_absent("lock:collection:req_1", "stuck-worker", Duration::from_secs(30))
        .await
        .unwrap();

    let started = Instant::now();
    let outcome = reconciler
        .process(payload("evt_1", "req_1", "FAILED"))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(outcome.applied());
    assert_eq!(status_of(&reconciler, "req_1").await, CollectionStatus::Failed);

    // The other holder's lock is left untouched
    assert_eq!(
        coordinator.holder("lock:collection:req_1").await.as_deref(),
        Some("stuck-worker")
    );
}

#[tokio::test]
async fn test_lock_is_released_after_processing() {
    let coordinator = InMemoryCoordinator::new();
    let reconciler = coordinated(&coordinator, ReconcilerConfig::default());
    seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Initiated).await;

    reconciler
        .process(payload("evt_1", "req_1", "PENDING"))
        .await
        .unwrap();
    assert_eq!(coordinator.holder("lock:collection:req_1").await, None);

    // Not found still releases
    reconciler
        .process(payload("evt_2", "req_2", "PENDING"))
        .await
        .unwrap();
    assert_eq!(coordinator.holder("lock:collection:req_2").await, None);
}

#[tokio::test]
async fn test_silent_backend_does_not_hold_up_processing() {
    let config = ReconcilerConfig::default()
        .with_lock_timeouts(Duration::from_secs(30), Duration::from_millis(200));
    let locks = CoordinatedLockProvider::new(Arc::new(SilentBackend), &config.lock);
    let reconciler = Reconciler::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryCollectionStore::new()),
        Arc::new(locks),
        config,
    );
    seed(reconciler.collections().as_ref(), "req_1", CollectionStatus::Initiated).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        reconciler.process(payload("evt_1", "req_1", "SUCCESS")),
    )
    .await
    .expect("processing must finish even when the lock backend hangs")
    .unwrap();

    assert!(outcome.applied());
    assert_eq!(status_of(&reconciler, "req_1").await, CollectionStatus::Success);
}
