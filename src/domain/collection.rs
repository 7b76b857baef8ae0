use crate::domain::ledger::Amount;
use crate::domain::status::{self, CollectionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Result of proposing a new status to a collection.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Transition {
    /// The status was written. `from == to` for an idempotent redelivery.
    Applied {
        from: CollectionStatus,
        to: CollectionStatus,
    },
    /// The change would regress the collection or leave a terminal status.
    Blocked {
        current: CollectionStatus,
        proposed: CollectionStatus,
    },
}

/// A tracked request to pull funds, reconciled by provider callbacks.
///
/// `status` is private: after creation it only moves through
/// [`Collection::propose`], which defers to [`status::should_apply`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Collection {
    pub id: Uuid,
    /// Correlation key chosen by us when the collection was initiated.
    pub request_ref: String,
    /// Correlation key assigned by the provider once it acknowledges.
    pub provider_ref: Option<String>,
    status: CollectionStatus,
    pub amount_total: Amount,
    pub currency: String,
    /// First webhook payload that touched this collection, kept for audit.
    pub webhook_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(
        request_ref: impl Into<String>,
        amount_total: Amount,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_ref: request_ref.into(),
            provider_ref: None,
            status: CollectionStatus::Initiated,
            amount_total,
            currency: currency.into(),
            webhook_payload: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the status a collection is created with. Only meaningful at
    /// initiation time, before any webhook has been reconciled against it.
    pub fn with_initial_status(mut self, status: CollectionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_provider_ref(mut self, provider_ref: impl Into<String>) -> Self {
        self.provider_ref = Some(provider_ref.into());
        self
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    /// Applies `proposed` if the transition authority admits it.
    pub fn propose(
        &mut self,
        proposed: CollectionStatus,
        allow_override: bool,
        now: DateTime<Utc>,
    ) -> Transition {
        let current = self.status;
        if !status::should_apply(current, proposed, allow_override) {
            return Transition::Blocked { current, proposed };
        }
        self.status = proposed;
        self.updated_at = now;
        Transition::Applied {
            from: current,
            to: proposed,
        }
    }

    /// Records the provider's reference the first time one is seen.
    pub fn record_provider_ref(&mut self, provider_ref: Option<&str>) {
        if self.provider_ref.is_none()
            && let Some(reference) = provider_ref
        {
            self.provider_ref = Some(reference.to_string());
        }
    }

    pub fn remember_payload(&mut self, payload: &Value) {
        if self.webhook_payload.is_none() {
            self.webhook_payload = Some(payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn collection() -> Collection {
        Collection::new("req_1", Amount::new(dec!(5000.00)).unwrap(), "NGN")
    }

    #[test]
    fn test_new_collection_is_initiated() {
        let collection = collection();
        assert_eq!(collection.status(), CollectionStatus::Initiated);
        assert!(collection.provider_ref.is_none());
    }

    #[test]
    fn test_propose_forward() {
        let mut collection = collection();
        let transition = collection.propose(CollectionStatus::Success, false, Utc::now());
        assert_eq!(
            transition,
            Transition::Applied {
                from: CollectionStatus::Initiated,
                to: CollectionStatus::Success
            }
        );
        assert_eq!(collection.status(), CollectionStatus::Success);
    }

    #[test]
    fn test_propose_regression_is_blocked() {
        let mut collection = collection().with_initial_status(CollectionStatus::Success);
        let before = collection.updated_at;

        let transition = collection.propose(CollectionStatus::Pending, false, Utc::now());
        assert!(matches!(transition, Transition::Blocked { .. }));
        assert_eq!(collection.status(), CollectionStatus::Success);
        assert_eq!(collection.updated_at, before);
    }

    #[test]
    fn test_override_allows_regression() {
        let mut collection = collection().with_initial_status(CollectionStatus::Failed);
        let transition = collection.propose(CollectionStatus::Pending, true, Utc::now());
        assert!(matches!(transition, Transition::Applied { .. }));
        assert_eq!(collection.status(), CollectionStatus::Pending);
    }

    #[test]
    fn test_provider_ref_is_set_once() {
        let mut collection = collection();
        collection.record_provider_ref(Some("prov_1"));
        collection.record_provider_ref(Some("prov_2"));
        assert_eq!(collection.provider_ref.as_deref(), Some("prov_1"));
    }

    #[test]
    fn test_first_payload_is_kept() {
        let mut collection = collection();
        collection.remember_payload(&json!({"n": 1}));
        collection.remember_payload(&json!({"n": 2}));
        assert_eq!(collection.webhook_payload, Some(json!({"n": 1})));
    }
}
