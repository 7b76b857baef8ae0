use crate::application::events::EventJournal;
use crate::config::ReconcilerConfig;
use crate::domain::collection::{Collection, Transition};
use crate::domain::event::{
    FailReason, ProcessingOutcome, ProcessingState, Resolution, SkipReason, WebhookEvent,
};
use crate::domain::normalize::{GenericNormalizer, NormalizedPayload, PayloadNormalizer};
use crate::domain::ports::{
    Commit, SharedCollectionStore, SharedEventStore, SharedLockProvider, StatusChange,
};
use crate::error::{ReconcileError, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Takes raw provider payloads to safely applied collection status changes.
///
/// The only component that mutates collections and ledger rows in response
/// to a webhook. Business outcomes (duplicate, blocked regression, missing
/// collection) come back as [`ProcessingOutcome`]s; only infrastructure
/// failures are returned as errors, for the caller to retry.
pub struct Reconciler {
    journal: EventJournal,
    collections: SharedCollectionStore,
    locks: SharedLockProvider,
    normalizer: Arc<dyn PayloadNormalizer>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Creates a reconciler using the [`GenericNormalizer`].
    ///
    /// # Arguments
    ///
    /// * `events` - The store for received webhook events.
    /// * `collections` - The store for collections and their ledger rows.
    /// * `locks` - Coordinated or degraded lock provider, chosen at startup.
    pub fn new(
        events: SharedEventStore,
        collections: SharedCollectionStore,
        locks: SharedLockProvider,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            journal: EventJournal::new(events, config.stale_after),
            collections,
            locks,
            normalizer: Arc::new(GenericNormalizer),
            config,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn PayloadNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn collections(&self) -> &SharedCollectionStore {
        &self.collections
    }

    /// Processes one webhook delivery.
    pub async fn process(&self, payload: Value) -> Result<ProcessingOutcome> {
        let (event, is_new) = self.journal.record_or_fetch(payload).await?;
        if !is_new
            && self.journal.is_final(&event)
            && let Some(outcome) = &event.outcome
        {
            info!(event_id = %event.id, reason = outcome.reason(), "returning stored outcome");
            return Ok(outcome.as_duplicate());
        }
        self.run(event, false).await
    }

    /// Re-runs a stored event that has not been processed, regardless of why
    /// it failed. Operator tooling; never called on the automatic path.
    pub async fn reprocess(&self, event_id: Uuid) -> Result<ProcessingOutcome> {
        let event = self.journal.get(event_id).await?.ok_or_else(|| {
            ReconcileError::ValidationError(format!("Unknown webhook event: {}", event_id))
        })?;
        if event.state == ProcessingState::Processed
            && let Some(outcome) = &event.outcome
        {
            return Ok(outcome.as_duplicate());
        }
        info!(event_id = %event.id, state = %event.state, "reprocessing webhook event");
        self.run(event, true).await
    }

    async fn run(&self, event: WebhookEvent, force: bool) -> Result<ProcessingOutcome> {
        let normalized = self.normalizer.normalize(&event.raw_payload);

        let Some(event) = self
            .journal
            .claim(&event, normalized.request_ref.as_deref(), force)
            .await?
        else {
            return self.in_flight_outcome(event).await;
        };

        let Some(key) = normalized.correlation_key().map(str::to_owned) else {
            warn!(event_id = %event.id, "webhook payload carries no collection reference");
            let outcome = failed(&event, FailReason::MissingReference);
            self.journal
                .mark_failed(&event, outcome.clone(), "no request or provider reference in payload")
                .await?;
            return Ok(outcome);
        };

        let lock_key = format!("lock:collection:{}", key);
        let lock = self
            .locks
            .acquire(&lock_key, self.config.lock.hold_timeout, self.config.lock.wait_timeout)
            .await;
        if !lock.is_exclusive() {
            info!(
                event_id = %event.id,
                key = %key,
                lock = lock.label(),
                "reconciling without exclusive lock"
            );
        }

        let result = self.reconcile(&event, &normalized).await;
        lock.release().await;

        match result {
            Ok(outcome) => {
                match outcome.resolution {
                    Resolution::Failed { .. } => {
                        let reason = format!("{} for {}", outcome.reason(), key);
                        self.journal.mark_failed(&event, outcome.clone(), reason).await?;
                    }
                    Resolution::Applied | Resolution::Skipped { .. } => {
                        self.journal.mark_processed(&event, outcome.clone()).await?;
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                error!(event_id = %event.id, key = %key, error = %e, "reconciliation failed");
                let outcome = failed(&event, FailReason::StorageFailure);
                let marked = self.journal.mark_failed(&event, outcome, e.to_string()).await;
                if let Err(mark_err) = marked {
                    error!(event_id = %event.id, error = %mark_err, "could not record failure");
                }
                Err(e)
            }
        }
    }

    /// Outcome for a delivery whose event another worker owns or already settled.
    async fn in_flight_outcome(&self, event: WebhookEvent) -> Result<ProcessingOutcome> {
        let current = self.journal.get(event.id).await?.unwrap_or(event);
        if current.is_settled()
            && let Some(outcome) = &current.outcome
        {
            return Ok(outcome.as_duplicate());
        }
        debug!(event_id = %current.id, state = %current.state, "webhook event already in flight");
        Ok(ProcessingOutcome::new(
            &current,
            None,
            Resolution::Skipped {
                reason: SkipReason::InProgress,
            },
        ))
    }

    async fn find_collection(&self, normalized: &NormalizedPayload) -> Result<Option<Collection>> {
        match (&normalized.request_ref, &normalized.provider_ref) {
            (Some(request_ref), _) => self.collections.find_by_request_ref(request_ref).await,
            (None, Some(provider_ref)) => self.collections.find_by_provider_ref(provider_ref).await,
            (None, None) => Ok(None),
        }
    }

    /// Applies the reported status under whatever exclusivity the caller got.
    ///
    /// The commit is compare-and-set on the status the decision was made
    /// against; a concurrent writer forces a re-read and a fresh decision.
    async fn reconcile(
        &self,
        event: &WebhookEvent,
        normalized: &NormalizedPayload,
    ) -> Result<ProcessingOutcome> {
        let Some(mut collection) = self.find_collection(normalized).await? else {
            warn!(
                event_id = %event.id,
                request_ref = ?normalized.request_ref,
                provider_ref = ?normalized.provider_ref,
                "no matching collection"
            );
            return Ok(failed(event, FailReason::CollectionNotFound));
        };

        loop {
            let now = Utc::now();
            let expected = collection.status();
            let mut updated = collection.clone();

            let to = match updated.propose(normalized.status, false, now) {
                Transition::Blocked { current, proposed } => {
                    info!(
                        event_id = %event.id,
                        request_ref = %collection.request_ref,
                        from = %current,
                        to = %proposed,
                        "status regression blocked"
                    );
                    return Ok(ProcessingOutcome::new(
                        event,
                        Some(current),
                        Resolution::Skipped {
                            reason: SkipReason::RegressionBlocked,
                        },
                    ));
                }
                Transition::Applied { to, .. } => to,
            };

            updated.record_provider_ref(normalized.provider_ref.as_deref());
            updated.remember_payload(&event.raw_payload);
            let mut ledger = self.collections.ledger_for(&collection.request_ref).await?;
            ledger.retain_mut(|row| row.mirror(to, now));
            let mirrored = ledger.len();

            let change = StatusChange {
                collection: updated,
                expected,
                ledger,
            };
            match self.collections.commit(change).await? {
                Commit::Committed => {
                    info!(
                        event_id = %event.id,
                        request_ref = %collection.request_ref,
                        from = %expected,
                        to = %to,
                        ledger_rows = mirrored,
                        needs_validation = normalized.needs_validation,
                        "collection status applied"
                    );
                    return Ok(ProcessingOutcome::new(event, Some(to), Resolution::Applied));
                }
                Commit::Stale(fresh) => {
                    debug!(
                        request_ref = %fresh.request_ref,
                        status = %fresh.status(),
                        "collection changed concurrently, deciding again"
                    );
                    collection = fresh;
                }
            }
        }
    }
}

fn failed(event: &WebhookEvent, reason: FailReason) -> ProcessingOutcome {
    ProcessingOutcome::new(event, None, Resolution::Failed { reason })
}
