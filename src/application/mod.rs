//! Application layer orchestrating webhook ingestion and reconciliation.
//!
//! [`events::EventJournal`] owns the lifecycle of stored webhook events and
//! [`reconciler::Reconciler`] drives a payload from receipt to an applied (or
//! refused) collection status change.

pub mod events;
pub mod reconciler;
