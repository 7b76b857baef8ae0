//! Pure domain types and rules. Storage, locking and transport live behind
//! the traits in [`ports`].

pub mod collection;
pub mod event;
pub mod ledger;
pub mod lock;
pub mod normalize;
pub mod payload;
pub mod ports;
pub mod status;
