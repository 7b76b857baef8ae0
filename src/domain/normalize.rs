//! Translation of provider payloads into correlation keys and a status.

use crate::domain::payload::{KeyPath, first_non_empty};
use crate::domain::status::CollectionStatus;
use serde_json::Value;

const REQUEST_REF_PATHS: &[KeyPath] = &[
    &["request_ref"],
    &["requestRef"],
    &["request_reference"],
    &["requestReference"],
    &["ref"],
    &["transaction", "request_ref"],
    &["transaction", "requestRef"],
    &["data", "request_ref"],
    &["data", "requestRef"],
    &["meta", "request_ref"],
    &["meta", "requestRef"],
    &["event", "request_ref"],
    &["event", "requestRef"],
    &["payload", "request_ref"],
    &["payload", "requestRef"],
];

const PROVIDER_REF_PATHS: &[KeyPath] = &[
    &["provider_ref"],
    &["providerRef"],
    &["transaction_ref"],
    &["transactionRef"],
    &["txRef"],
    &["tx_ref"],
    &["reference"],
    &["flutterwave_ref"],
    &["paystack_ref"],
    &["monnify_ref"],
    &["transaction", "reference"],
    &["transaction", "transaction_ref"],
    &["transaction", "transactionRef"],
    &["data", "reference"],
    &["data", "transaction_ref"],
    &["data", "transactionRef"],
    &["data", "txRef"],
    &["meta", "provider_ref"],
    &["meta", "providerRef"],
    &["event", "reference"],
];

const STATUS_PATHS: &[KeyPath] = &[
    &["status"],
    &["transaction_status"],
    &["transactionStatus"],
    &["payment_status"],
    &["paymentStatus"],
    &["state"],
    &["transaction", "status"],
    &["transaction", "state"],
    &["data", "status"],
    &["data", "transaction_status"],
    &["data", "transactionStatus"],
    &["event", "status"],
    &["event", "state"],
    &["meta", "status"],
    &["response", "status"],
];

/// Business fields extracted from a payload.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NormalizedPayload {
    pub request_ref: Option<String>,
    pub provider_ref: Option<String>,
    pub status: CollectionStatus,
    /// The provider is waiting on an OTP or similar challenge.
    pub needs_validation: bool,
}

impl NormalizedPayload {
    /// The key the collection is looked up and locked by.
    pub fn correlation_key(&self) -> Option<&str> {
        self.request_ref.as_deref().or(self.provider_ref.as_deref())
    }
}

/// Provider-specific payload knowledge lives behind this seam.
pub trait PayloadNormalizer: Send + Sync {
    fn normalize(&self, payload: &Value) -> NormalizedPayload;
}

/// Tolerant normalizer covering the common provider payload layouts.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericNormalizer;

impl PayloadNormalizer for GenericNormalizer {
    fn normalize(&self, payload: &Value) -> NormalizedPayload {
        let (status, needs_validation) =
            normalize_status(first_non_empty(payload, STATUS_PATHS).as_deref());
        NormalizedPayload {
            request_ref: first_non_empty(payload, REQUEST_REF_PATHS),
            provider_ref: first_non_empty(payload, PROVIDER_REF_PATHS),
            status,
            needs_validation,
        }
    }
}

/// Maps a raw provider status onto the collection hierarchy.
///
/// Matching is case-insensitive. Missing and unknown values are treated as
/// still pending, which can never regress a collection past `Pending`.
pub fn normalize_status(raw: Option<&str>) -> (CollectionStatus, bool) {
    let Some(raw) = raw else {
        return (CollectionStatus::Pending, false);
    };
    match raw.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" | "SUCCESSFUL" | "COMPLETED" | "APPROVED" | "CONFIRMED" | "SETTLED" | "PAID"
        | "PROCESSED" => (CollectionStatus::Success, false),
        "FAILED" | "ERROR" | "DECLINED" | "REJECTED" | "CANCELLED" | "TIMEOUT" | "EXPIRED"
        | "ABORTED" | "INVALID" => (CollectionStatus::Failed, false),
        "PROCESSING" | "IN_PROGRESS" => (CollectionStatus::Processing, false),
        "INITIATED" => (CollectionStatus::Initiated, false),
        "WAITINGFOROTP" | "WAITING_FOR_OTP" | "OTP_PENDING" | "PENDINGVALIDATION"
        | "PENDING_VALIDATION" | "VALIDATION_REQUIRED" | "AWAITING_VALIDATION" | "REQUIRES_OTP"
        | "OTP_REQUIRED" => (CollectionStatus::Pending, true),
        _ => (CollectionStatus::Pending, false),
    }
}
