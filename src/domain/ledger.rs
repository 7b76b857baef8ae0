use crate::domain::status::CollectionStatus;
use crate::error::ReconcileError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A strictly positive monetary amount.
///
/// Wraps `rust_decimal::Decimal` so a ledger row can never carry a zero or
/// negative movement; direction is expressed by [`LedgerEntryType`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ReconcileError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ReconcileError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ReconcileError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerEntryType {
    Credit,
    Debit,
    Fee,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl LedgerStatus {
    /// The ledger status that mirrors a collection status. Only terminal
    /// collection outcomes settle money movement.
    pub fn mirroring(status: CollectionStatus) -> Self {
        match status {
            CollectionStatus::Success => Self::Success,
            CollectionStatus::Failed => Self::Failed,
            CollectionStatus::Initiated
            | CollectionStatus::Pending
            | CollectionStatus::Processing => Self::Pending,
        }
    }
}

/// Append-only record of money movement tied to a collection.
///
/// Rows are never deleted or rewritten; the only mutation is a status
/// transition out of `Pending`, stamped with `updated_at`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerTransaction {
    pub id: Uuid,
    /// `request_ref` of the owning collection.
    pub collection_ref: String,
    pub entry_type: LedgerEntryType,
    pub amount: Amount,
    pub currency: String,
    pub status: LedgerStatus,
    pub occurred_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(
        collection_ref: impl Into<String>,
        entry_type: LedgerEntryType,
        amount: Amount,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            collection_ref: collection_ref.into(),
            entry_type,
            amount,
            currency: currency.into(),
            status: LedgerStatus::Pending,
            occurred_at: now,
            updated_at: now,
        }
    }

    /// Moves a pending row to the status mirroring `collection_status`.
    /// Returns whether the row changed.
    pub fn mirror(&mut self, collection_status: CollectionStatus, now: DateTime<Utc>) -> bool {
        let target = LedgerStatus::mirroring(collection_status);
        if self.status != LedgerStatus::Pending || target == LedgerStatus::Pending {
            return false;
        }
        self.status = target;
        self.updated_at = now;
        true
    }
}
