use crate::domain::event::ProcessingState;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Lock backend error: {0}")]
    LockBackendError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Webhook event {id} cannot move from {from} to {to}")]
    EventConflict {
        id: Uuid,
        from: ProcessingState,
        to: ProcessingState,
    },
}

impl ReconcileError {
    /// Infrastructure failures the caller may retry (and the provider should
    /// see as a non-2xx response).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::IoError(_) | Self::StorageUnavailable(_) | Self::LockBackendError(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDbError(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "lock-redis")]
impl From<redis::RedisError> for ReconcileError {
    fn from(err: redis::RedisError) -> Self {
        Self::LockBackendError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
