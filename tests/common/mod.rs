#![allow(dead_code)]

use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;
use webhook_reconciler::application::reconciler::Reconciler;
use webhook_reconciler::config::ReconcilerConfig;
use webhook_reconciler::domain::collection::Collection;
use webhook_reconciler::domain::ledger::{Amount, LedgerEntryType, LedgerTransaction};
use webhook_reconciler::domain::ports::{CollectionStore, SharedLockProvider};
use webhook_reconciler::domain::status::CollectionStatus;
use webhook_reconciler::infrastructure::in_memory::{InMemoryCollectionStore, InMemoryEventStore};
use webhook_reconciler::infrastructure::lock::DegradedLockProvider;

pub fn payload(event_id: &str, request_ref: &str, status: &str) -> Value {
    json!({
        "event_id": event_id,
        "data": {"request_ref": request_ref, "status": status}
    })
}

pub async fn seed(store: &dyn CollectionStore, request_ref: &str, status: CollectionStatus) {
    let amount = Amount::new(dec!(1000.00)).unwrap();
    let collection = Collection::new(request_ref, amount, "NGN").with_initial_status(status);
    let credit = LedgerTransaction::new(request_ref, LedgerEntryType::Credit, amount, "NGN");
    store.create(collection, vec![credit]).await.unwrap();
}

pub fn reconciler_with(locks: SharedLockProvider) -> Reconciler {
    Reconciler::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryCollectionStore::new()),
        locks,
        ReconcilerConfig::default(),
    )
}

pub fn in_memory_reconciler() -> Reconciler {
    reconciler_with(Arc::new(DegradedLockProvider))
}

pub async fn status_of(reconciler: &Reconciler, request_ref: &str) -> CollectionStatus {
    reconciler
        .collections()
        .find_by_request_ref(request_ref)
        .await
        .unwrap()
        .unwrap()
        .status()
}

pub fn write_collections_csv(path: &Path, rows: &[(&str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["request_ref", "provider_ref", "status", "amount_total", "currency", "fee"])?;
    for (request_ref, status) in rows {
        wtr.write_record([*request_ref, "", *status, "1000.00", "NGN", "15.00"])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_webhooks_jsonl(path: &Path, payloads: &[Value]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for payload in payloads {
        writeln!(file, "{}", payload)?;
    }
    Ok(())
}
