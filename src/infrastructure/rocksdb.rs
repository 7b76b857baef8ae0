use crate::domain::collection::Collection;
use crate::domain::event::WebhookEvent;
use crate::domain::ledger::LedgerTransaction;
use crate::domain::ports::{CollectionStore, Commit, EventStore, Insertion, StatusChange};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for webhook events, keyed by event id.
pub const CF_EVENTS: &str = "events";
/// Column Family for the unique `event_key` -> event id index.
pub const CF_EVENT_KEYS: &str = "event_keys";
/// Column Family for collections, keyed by `request_ref`.
pub const CF_COLLECTIONS: &str = "collections";
/// Column Family for the `provider_ref` -> `request_ref` index.
pub const CF_COLLECTION_REFS: &str = "collection_refs";
/// Column Family for ledger rows, keyed by the owning `request_ref`.
pub const CF_LEDGER: &str = "ledger";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_EVENTS,
    CF_EVENT_KEYS,
    CF_COLLECTIONS,
    CF_COLLECTION_REFS,
    CF_LEDGER,
];

/// A persistent store implementation using RocksDB.
///
/// Implements both [`EventStore`] and [`CollectionStore`]. Every
/// read-check-write sequence (unique insert, versioned update, status
/// commit) runs under a process-wide writer mutex and lands as a single
/// `WriteBatch`, so index and row are always written together.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ReconcileError::StorageUnavailable(format!("{} column family not found", name))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl EventStore for RocksDBStore {
    async fn insert(&self, event: &WebhookEvent) -> Result<Insertion> {
        let _guard = self.writer.lock().await;
        let mut batch = WriteBatch::default();
        if let Some(key) = &event.event_key {
            if self.exists(CF_EVENT_KEYS, key.as_bytes())? {
                return Ok(Insertion::KeyTaken);
            }
            let cf = self.cf(CF_EVENT_KEYS)?;
            batch.put_cf(cf, key.as_bytes(), event.id.as_bytes());
        }
        self.put(&mut batch, CF_EVENTS, event.id.as_bytes(), event)?;
        self.db.write(batch)?;
        Ok(Insertion::Inserted)
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookEvent>> {
        self.read(CF_EVENTS, id.as_bytes())
    }

    async fn get_by_key(&self, event_key: &str) -> Result<Option<WebhookEvent>> {
        let cf = self.cf(CF_EVENT_KEYS)?;
        let Some(id) = self.db.get_pinned_cf(cf, event_key.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id).map_err(|e| {
            ReconcileError::StorageUnavailable(format!("Corrupt event key index: {}", e))
        })?;
        self.read(CF_EVENTS, id.as_bytes())
    }

    async fn update(&self, event: &WebhookEvent) -> Result<Option<WebhookEvent>> {
        let _guard = self.writer.lock().await;
        let stored: WebhookEvent = self.read(CF_EVENTS, event.id.as_bytes())?.ok_or_else(|| {
            ReconcileError::ValidationError(format!("Unknown webhook event: {}", event.id))
        })?;
        if stored.version != event.version {
            return Ok(None);
        }
        let mut next = event.clone();
        next.version += 1;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_EVENTS, next.id.as_bytes(), &next)?;
        self.db.write(batch)?;
        Ok(Some(next))
    }

    async fn list(&self) -> Result<Vec<WebhookEvent>> {
        let mut events: Vec<WebhookEvent> = self.scan(CF_EVENTS)?;
        events.sort_by_key(|event| event.received_at);
        Ok(events)
    }
}

#[async_trait]
impl CollectionStore for RocksDBStore {
    async fn create(&self, collection: Collection, ledger: Vec<LedgerTransaction>) -> Result<()> {
        let _guard = self.writer.lock().await;
        let key = collection.request_ref.as_bytes();
        if self.exists(CF_COLLECTIONS, key)? {
            return Err(ReconcileError::ValidationError(format!(
                "Collection already exists: {}",
                collection.request_ref
            )));
        }
        let mut batch = WriteBatch::default();
        if let Some(provider_ref) = &collection.provider_ref {
            let cf = self.cf(CF_COLLECTION_REFS)?;
            batch.put_cf(cf, provider_ref.as_bytes(), key);
        }
        self.put(&mut batch, CF_LEDGER, key, &ledger)?;
        self.put(&mut batch, CF_COLLECTIONS, key, &collection)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_by_request_ref(&self, request_ref: &str) -> Result<Option<Collection>> {
        self.read(CF_COLLECTIONS, request_ref.as_bytes())
    }

    async fn find_by_provider_ref(&self, provider_ref: &str) -> Result<Option<Collection>> {
        let cf = self.cf(CF_COLLECTION_REFS)?;
        match self.db.get_pinned_cf(cf, provider_ref.as_bytes())? {
            Some(request_ref) => self.read(CF_COLLECTIONS, &request_ref),
            None => Ok(None),
        }
    }

    async fn ledger_for(&self, request_ref: &str) -> Result<Vec<LedgerTransaction>> {
        Ok(self
            .read(CF_LEDGER, request_ref.as_bytes())?
            .unwrap_or_default())
    }

    async fn commit(&self, change: StatusChange) -> Result<Commit> {
        let _guard = self.writer.lock().await;
        let request_ref = change.collection.request_ref.clone();
        let key = request_ref.as_bytes();
        let stored: Collection = self.read(CF_COLLECTIONS, key)?.ok_or_else(|| {
            ReconcileError::ValidationError(format!("Unknown collection: {}", request_ref))
        })?;
        if stored.status() != change.expected {
            return Ok(Commit::Stale(stored));
        }

        let mut rows: Vec<LedgerTransaction> = self.read(CF_LEDGER, key)?.unwrap_or_default();
        for updated in change.ledger {
            let row = rows.iter_mut().find(|row| row.id == updated.id).ok_or_else(|| {
                ReconcileError::ValidationError(format!(
                    "Ledger row {} does not belong to {}",
                    updated.id, request_ref
                ))
            })?;
            *row = updated;
        }

        let mut batch = WriteBatch::default();
        if let Some(provider_ref) = &change.collection.provider_ref {
            let cf = self.cf(CF_COLLECTION_REFS)?;
            batch.put_cf(cf, provider_ref.as_bytes(), key);
        }
        self.put(&mut batch, CF_LEDGER, key, &rows)?;
        self.put(&mut batch, CF_COLLECTIONS, key, &change.collection)?;
        self.db.write(batch)?;
        Ok(Commit::Committed)
    }

    async fn all(&self) -> Result<Vec<Collection>> {
        // Keys are request refs, so the scan is already ordered by them
        self.scan(CF_COLLECTIONS)
    }
}
