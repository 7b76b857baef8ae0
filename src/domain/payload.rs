//! Lookups over provider payloads of unknown shape.
//!
//! Providers disagree on where they put identifiers, so every lookup is a
//! fixed, ordered list of key paths. The first path that resolves to a
//! non-empty scalar wins; later paths are never consulted. That keeps
//! ambiguous payloads deterministic.

use serde_json::Value;

/// Object keys leading from the payload root to a candidate field.
pub type KeyPath = &'static [&'static str];

/// Candidate locations of the provider's event identifier, highest priority first.
pub const EVENT_KEY_PATHS: &[KeyPath] = &[
    &["event_id"],
    &["eventId"],
    &["event"],
    &["id"],
    &["webhook_id"],
    &["webhookId"],
    &["event_key"],
    &["eventKey"],
    &["flutterwave_event_id"],
    &["flutterwaveEventId"],
    &["paystack_reference"],
    &["monnify_transaction_ref"],
    &["event", "id"],
    &["event", "event_id"],
    &["data", "event_id"],
    &["data", "eventId"],
    &["data", "id"],
    &["meta", "event_id"],
    &["meta", "eventId"],
    &["payload", "event_id"],
    &["payload", "id"],
];

/// Walks `path` through nested objects. Nulls count as missing.
pub fn value_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(payload, |node, key| node.as_object()?.get(*key))
        .filter(|value| !value.is_null())
}

/// Renders a scalar as a string. Containers and blank strings yield `None`.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Returns the first non-empty scalar found along `paths`, in order.
pub fn first_non_empty(payload: &Value, paths: &[KeyPath]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| value_at(payload, path).and_then(scalar_string))
}

/// Derives the deduplication key of a webhook payload.
///
/// `None` is not an error: the event simply cannot be deduplicated and is
/// processed every time it arrives.
pub fn extract_event_key(payload: &Value) -> Option<String> {
    first_non_empty(payload, EVENT_KEY_PATHS)
}
