use crate::domain::collection::Collection;
use crate::domain::event::WebhookEvent;
use crate::domain::ledger::LedgerTransaction;
use crate::domain::ports::{
    CollectionStore, Commit, CoordinationBackend, EventStore, Insertion, StatusChange,
};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Default)]
struct EventTables {
    events: HashMap<Uuid, WebhookEvent>,
    /// Unique index over `event_key`.
    keys: HashMap<String, Uuid>,
}

/// A thread-safe in-memory webhook event store.
///
/// Insert and the key-uniqueness check run under one write lock, which makes
/// the key index the linearization point for deduplication.
#[derive(Default, Clone)]
pub struct InMemoryEventStore {
    tables: Arc<RwLock<EventTables>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: &WebhookEvent) -> Result<Insertion> {
        let mut tables = self.tables.write().await;
        if let Some(key) = &event.event_key {
            if tables.keys.contains_key(key) {
                return Ok(Insertion::KeyTaken);
            }
            tables.keys.insert(key.clone(), event.id);
        }
        tables.events.insert(event.id, event.clone());
        Ok(Insertion::Inserted)
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookEvent>> {
        let tables = self.tables.read().await;
        Ok(tables.events.get(&id).cloned())
    }

    async fn get_by_key(&self, event_key: &str) -> Result<Option<WebhookEvent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .keys
            .get(event_key)
            .and_then(|id| tables.events.get(id))
            .cloned())
    }

    async fn update(&self, event: &WebhookEvent) -> Result<Option<WebhookEvent>> {
        let mut tables = self.tables.write().await;
        let stored = tables.events.get_mut(&event.id).ok_or_else(|| {
            ReconcileError::ValidationError(format!("Unknown webhook event: {}", event.id))
        })?;
        if stored.version != event.version {
            return Ok(None);
        }
        let mut next = event.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(Some(next))
    }

    async fn list(&self) -> Result<Vec<WebhookEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<WebhookEvent> = tables.events.values().cloned().collect();
        events.sort_by_key(|event| event.received_at);
        Ok(events)
    }
}

#[derive(Default)]
struct CollectionTables {
    /// Keyed by `request_ref`.
    collections: HashMap<String, Collection>,
    /// `provider_ref` -> `request_ref`.
    provider_refs: HashMap<String, String>,
    ledger: HashMap<String, Vec<LedgerTransaction>>,
}

/// A thread-safe in-memory store for collections and their ledger rows.
///
/// Both live behind the same lock so a status change and its ledger rows
/// become visible together.
#[derive(Default, Clone)]
pub struct InMemoryCollectionStore {
    tables: Arc<RwLock<CollectionTables>>,
}

impl InMemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CollectionStore for InMemoryCollectionStore {
    async fn create(&self, collection: Collection, ledger: Vec<LedgerTransaction>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.collections.contains_key(&collection.request_ref) {
            return Err(ReconcileError::ValidationError(format!(
                "Collection already exists: {}",
                collection.request_ref
            )));
        }
        if let Some(provider_ref) = &collection.provider_ref {
            tables
                .provider_refs
                .insert(provider_ref.clone(), collection.request_ref.clone());
        }
        tables
            .ledger
            .insert(collection.request_ref.clone(), ledger);
        tables
            .collections
            .insert(collection.request_ref.clone(), collection);
        Ok(())
    }

    async fn find_by_request_ref(&self, request_ref: &str) -> Result<Option<Collection>> {
        let tables = self.tables.read().await;
        Ok(tables.collections.get(request_ref).cloned())
    }

    async fn find_by_provider_ref(&self, provider_ref: &str) -> Result<Option<Collection>> {
        let tables = self.tables.read().await;
        Ok(tables
            .provider_refs
            .get(provider_ref)
            .and_then(|request_ref| tables.collections.get(request_ref))
            .cloned())
    }

    async fn ledger_for(&self, request_ref: &str) -> Result<Vec<LedgerTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables.ledger.get(request_ref).cloned().unwrap_or_default())
    }

    async fn commit(&self, change: StatusChange) -> Result<Commit> {
        let mut tables = self.tables.write().await;
        let request_ref = change.collection.request_ref.clone();
        let stored = tables.collections.get(&request_ref).ok_or_else(|| {
            ReconcileError::ValidationError(format!("Unknown collection: {}", request_ref))
        })?;
        if stored.status() != change.expected {
            return Ok(Commit::Stale(stored.clone()));
        }

        let rows = tables.ledger.entry(request_ref.clone()).or_default();
        for updated in change.ledger {
            let row = rows.iter_mut().find(|row| row.id == updated.id).ok_or_else(|| {
                ReconcileError::ValidationError(format!(
                    "Ledger row {} does not belong to {}",
                    updated.id, request_ref
                ))
            })?;
            *row = updated;
        }

        if let Some(provider_ref) = &change.collection.provider_ref {
            tables
                .provider_refs
                .insert(provider_ref.clone(), request_ref.clone());
        }
        tables.collections.insert(request_ref, change.collection);
        Ok(Commit::Committed)
    }

    async fn all(&self) -> Result<Vec<Collection>> {
        let tables = self.tables.read().await;
        let mut collections: Vec<Collection> = tables.collections.values().cloned().collect();
        collections.sort_by(|a, b| a.request_ref.cmp(&b.request_ref));
        Ok(collections)
    }
}

/// Process-local coordination backend with per-key expiry.
///
/// Shares one keyspace between every clone, so it coordinates all workers
/// of a process. `set_offline` simulates an unreachable backend.
#[derive(Default, Clone)]
pub struct InMemoryCoordinator {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Token of the live holder of `key`, if any.
    pub async fn holder(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(token, _)| token.clone())
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ReconcileError::LockBackendError(
                "coordination backend unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationBackend for InMemoryCoordinator {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.ensure_online()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        // Sweep lapsed leases
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        if let Some((_, expires_at)) = entries.get(key)
            && *expires_at > now
        {
            return Ok(false);
        }
        entries.insert(key.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    async fn delete_if_owner(&self, key: &str, token: &str) -> Result<bool> {
        self.ensure_online()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some((owner, expires_at)) if owner == token && *expires_at > now => {
                entries.remove(key);
                Ok(true)
            }
            Some((_, expires_at)) if *expires_at <= now => {
                entries.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}
