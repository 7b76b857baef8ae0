//! Adapters behind the domain ports: storage backends, coordination
//! backends and the lock providers built on them.

pub mod in_memory;
pub mod lock;
#[cfg(feature = "lock-redis")]
pub mod redis;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
