use super::collection::Collection;
use super::event::WebhookEvent;
use super::ledger::LedgerTransaction;
use super::lock::Acquisition;
use super::status::CollectionStatus;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of inserting a webhook event.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Insertion {
    Inserted,
    /// Another event already owns the same `event_key`.
    KeyTaken,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts `event`. When it carries an `event_key` the uniqueness check and
    /// the write happen atomically with respect to concurrent inserts.
    async fn insert(&self, event: &WebhookEvent) -> Result<Insertion>;
    async fn get(&self, id: Uuid) -> Result<Option<WebhookEvent>>;
    async fn get_by_key(&self, event_key: &str) -> Result<Option<WebhookEvent>>;
    /// Replaces the stored event if its version still equals `event.version`.
    /// Returns the stored copy (with the bumped version), or `None` on a lost race.
    async fn update(&self, event: &WebhookEvent) -> Result<Option<WebhookEvent>>;
    async fn list(&self) -> Result<Vec<WebhookEvent>>;
}

/// A collection status change and the ledger rows that mirror it.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub collection: Collection,
    /// Status the change was decided against.
    pub expected: CollectionStatus,
    pub ledger: Vec<LedgerTransaction>,
}

#[derive(Debug, Clone)]
pub enum Commit {
    Committed,
    /// The stored status moved since it was read; carries the fresh row.
    Stale(Collection),
}

#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Creates a collection with its initial ledger rows. Rejects a duplicate `request_ref`.
    async fn create(&self, collection: Collection, ledger: Vec<LedgerTransaction>) -> Result<()>;
    async fn find_by_request_ref(&self, request_ref: &str) -> Result<Option<Collection>>;
    async fn find_by_provider_ref(&self, provider_ref: &str) -> Result<Option<Collection>>;
    async fn ledger_for(&self, request_ref: &str) -> Result<Vec<LedgerTransaction>>;
    /// Writes the collection and its ledger rows in one atomic step, provided
    /// the stored status still equals `change.expected`.
    async fn commit(&self, change: StatusChange) -> Result<Commit>;
    async fn all(&self) -> Result<Vec<Collection>>;
}

/// Shared key/value service used for cross-worker mutual exclusion.
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Sets `key` to `token` with expiry `ttl` unless it exists.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;
    /// Deletes `key` only while it still holds `token`.
    async fn delete_if_owner(&self, key: &str, token: &str) -> Result<bool>;
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Never fails: contention and backend trouble degrade to running without exclusivity.
    async fn acquire(
        &self,
        key: &str,
        hold_timeout: Duration,
        wait_timeout: Duration,
    ) -> Acquisition;
}

pub type SharedEventStore = Arc<dyn EventStore>;
pub type SharedCollectionStore = Arc<dyn CollectionStore>;
pub type SharedCoordinationBackend = Arc<dyn CoordinationBackend>;
pub type SharedLockProvider = Arc<dyn LockProvider>;
