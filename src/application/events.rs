use crate::domain::event::{ProcessingOutcome, ProcessingState, Resolution, WebhookEvent};
use crate::domain::payload::extract_event_key;
use crate::domain::ports::{Insertion, SharedEventStore};
use crate::error::{ReconcileError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Aggregates over stored webhook events for operational tooling.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct EventStats {
    pub total: u64,
    pub received: u64,
    pub processing: u64,
    pub processed: u64,
    pub failed: u64,
    pub applied: u64,
    pub skipped: u64,
    pub duplicate_deliveries: u64,
}

impl EventStats {
    /// Share of all deliveries that were recognised as duplicates.
    pub fn duplicate_rate(&self) -> f64 {
        let deliveries = self.total + self.duplicate_deliveries;
        if deliveries == 0 {
            return 0.0;
        }
        self.duplicate_deliveries as f64 / deliveries as f64
    }

    /// Share of processed events acknowledged without a status change.
    pub fn skip_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.skipped as f64 / self.processed as f64
    }
}

/// Durable record of every received webhook and its processing outcome.
///
/// All state changes are compare-and-set against the stored version; a
/// lost race re-reads the event and re-evaluates.
pub struct EventJournal {
    store: SharedEventStore,
    stale_after: chrono::Duration,
}

impl EventJournal {
    pub fn new(store: SharedEventStore, stale_after: Duration) -> Self {
        Self {
            store,
            stale_after: chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Stores a newly received payload, or returns the event already stored
    /// under the same key with `false`.
    ///
    /// Payloads without an extractable key cannot be deduplicated and always
    /// produce a new event.
    pub async fn record_or_fetch(&self, payload: Value) -> Result<(WebhookEvent, bool)> {
        let event_key = extract_event_key(&payload);
        let event = WebhookEvent::received(payload, event_key, None);

        match self.store.insert(&event).await? {
            Insertion::Inserted => {
                debug!(
                    event_id = %event.id,
                    event_key = ?event.event_key,
                    "webhook event recorded"
                );
                Ok((event, true))
            }
            Insertion::KeyTaken => {
                let key = event.event_key.as_deref().ok_or_else(|| {
                    ReconcileError::StorageUnavailable(
                        "store reported a key conflict for a keyless event".to_string(),
                    )
                })?;
                let existing = self.store.get_by_key(key).await?.ok_or_else(|| {
                    ReconcileError::StorageUnavailable(format!(
                        "event key {} conflicted but cannot be read back",
                        key
                    ))
                })?;
                info!(
                    event_id = %existing.id,
                    event_key = key,
                    state = %existing.state,
                    "duplicate webhook delivery"
                );
                Ok((self.note_duplicate(existing).await, false))
            }
        }
    }

    /// Best-effort delivery counter; losing it never fails the delivery.
    async fn note_duplicate(&self, existing: WebhookEvent) -> WebhookEvent {
        let mut counted = existing.clone();
        counted.duplicate_deliveries += 1;
        match self.store.update(&counted).await {
            Ok(Some(stored)) => stored,
            Ok(None) => self
                .store
                .get(existing.id)
                .await
                .ok()
                .flatten()
                .unwrap_or(existing),
            Err(e) => {
                warn!(event_id = %existing.id, error = %e, "failed to count duplicate delivery");
                existing
            }
        }
    }

    /// Settled and not eligible for another attempt: its stored outcome stands.
    pub fn is_final(&self, event: &WebhookEvent) -> bool {
        event.is_settled() && !event.is_claimable(Utc::now(), self.stale_after)
    }

    /// Moves the event into `Processing` for the calling worker.
    ///
    /// Returns `None` when the event is not claimable (another worker holds
    /// it, or it already settled). `force` lets an operator re-run any event
    /// that is not `Processed`.
    pub async fn claim(
        &self,
        event: &WebhookEvent,
        request_ref: Option<&str>,
        force: bool,
    ) -> Result<Option<WebhookEvent>> {
        let mut current = event.clone();
        loop {
            let now = Utc::now();
            let claimable = current.is_claimable(now, self.stale_after)
                || (force && current.state != ProcessingState::Processed);
            if !claimable {
                return Ok(None);
            }

            let mut next = current.clone();
            next.begin_processing(now)?;
            if let Some(request_ref) = request_ref {
                next.request_ref = Some(request_ref.to_string());
            }
            match self.store.update(&next).await? {
                Some(stored) => return Ok(Some(stored)),
                None => current = self.reload(current.id).await?,
            }
        }
    }

    /// Marks the event `Processed`. Re-marking is a no-op.
    pub async fn mark_processed(
        &self,
        event: &WebhookEvent,
        outcome: ProcessingOutcome,
    ) -> Result<WebhookEvent> {
        self.settle(event, |event, now| event.complete(outcome.clone(), now))
            .await
    }

    /// Marks the event `Failed`. Re-marking is a no-op.
    pub async fn mark_failed(
        &self,
        event: &WebhookEvent,
        outcome: ProcessingOutcome,
        error: impl Into<String>,
    ) -> Result<WebhookEvent> {
        let error = error.into();
        self.settle(event, |event, now| event.fail(outcome.clone(), error.clone(), now))
            .await
    }

    async fn settle<F>(&self, event: &WebhookEvent, transition: F) -> Result<WebhookEvent>
    where
        F: Fn(&mut WebhookEvent, DateTime<Utc>) -> Result<bool> + Send + Sync,
    {
        let mut current = event.clone();
        loop {
            let mut next = current.clone();
            if !transition(&mut next, Utc::now())? {
                return Ok(current);
            }
            match self.store.update(&next).await? {
                Some(stored) => return Ok(stored),
                None => current = self.reload(current.id).await?,
            }
        }
    }

    async fn reload(&self, id: Uuid) -> Result<WebhookEvent> {
        self.store.get(id).await?.ok_or_else(|| {
            ReconcileError::StorageUnavailable(format!("webhook event {} disappeared", id))
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<WebhookEvent>> {
        self.store.get(id).await
    }

    /// Looks up an event by its deduplication key, for status-query endpoints.
    pub async fn fetch_existing(&self, event_key: &str) -> Result<Option<WebhookEvent>> {
        self.store.get_by_key(event_key).await
    }

    pub async fn list(&self) -> Result<Vec<WebhookEvent>> {
        self.store.list().await
    }

    pub async fn stats(&self) -> Result<EventStats> {
        let events = self.store.list().await?;
        let mut stats = EventStats::default();
        for event in &events {
            stats.total += 1;
            stats.duplicate_deliveries += u64::from(event.duplicate_deliveries);
            match event.state {
                ProcessingState::Received => stats.received += 1,
                ProcessingState::Processing => stats.processing += 1,
                ProcessingState::Processed => stats.processed += 1,
                ProcessingState::Failed => stats.failed += 1,
            }
            match event.outcome.as_ref().map(|outcome| outcome.resolution) {
                Some(Resolution::Applied) => stats.applied += 1,
                Some(Resolution::Skipped { .. }) => stats.skipped += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}
