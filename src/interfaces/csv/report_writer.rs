use crate::domain::collection::Collection;
use crate::domain::event::{ProcessingOutcome, ProcessingState, WebhookEvent};
use crate::domain::status::CollectionStatus;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct OutcomeRow<'a> {
    event_id: Uuid,
    event_key: Option<&'a str>,
    applied: bool,
    reason: &'static str,
    final_status: Option<CollectionStatus>,
}

#[derive(Serialize)]
struct CollectionRow<'a> {
    request_ref: &'a str,
    provider_ref: Option<&'a str>,
    status: CollectionStatus,
    amount_total: Decimal,
    currency: &'a str,
}

#[derive(Serialize)]
struct EventRow<'a> {
    event_id: Uuid,
    event_key: Option<&'a str>,
    request_ref: Option<&'a str>,
    state: ProcessingState,
    reason: Option<&'static str>,
    duplicate_deliveries: u32,
    error: Option<&'a str>,
}

/// Writes processing reports as CSV, one header line followed by one row
/// per item in the order given.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcomes(&mut self, outcomes: &[ProcessingOutcome]) -> Result<()> {
        for outcome in outcomes {
            self.writer.serialize(OutcomeRow {
                event_id: outcome.event_id,
                event_key: outcome.event_key.as_deref(),
                applied: outcome.applied(),
                reason: outcome.reason(),
                final_status: outcome.final_status,
            })?;
        }
        self.flush()
    }

    /// Collections are written sorted by `request_ref`.
    pub fn write_collections(&mut self, collections: &[Collection]) -> Result<()> {
        let mut sorted: Vec<&Collection> = collections.iter().collect();
        sorted.sort_by(|a, b| a.request_ref.cmp(&b.request_ref));
        for collection in sorted {
            self.writer.serialize(CollectionRow {
                request_ref: &collection.request_ref,
                provider_ref: collection.provider_ref.as_deref(),
                status: collection.status(),
                amount_total: collection.amount_total.value(),
                currency: &collection.currency,
            })?;
        }
        self.flush()
    }

    /// Events are written in the order they were received.
    pub fn write_events(&mut self, events: &[WebhookEvent]) -> Result<()> {
        let mut sorted: Vec<&WebhookEvent> = events.iter().collect();
        sorted.sort_by_key(|event| event.received_at);
        for event in sorted {
            self.writer.serialize(EventRow {
                event_id: event.id,
                event_key: event.event_key.as_deref(),
                request_ref: event.request_ref.as_deref(),
                state: event.state,
                reason: event.outcome.as_ref().map(ProcessingOutcome::reason),
                duplicate_deliveries: event.duplicate_deliveries,
                error: event.error.as_deref(),
            })?;
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{Resolution, SkipReason};
    use crate::domain::ledger::Amount;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_write_outcomes() {
        let event =
            WebhookEvent::received(json!({"event_id": "evt_1"}), Some("evt_1".into()), None);
        let applied =
            ProcessingOutcome::new(&event, Some(CollectionStatus::Success), Resolution::Applied);
        let duplicate = applied.as_duplicate();

        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer)
            .write_outcomes(&[applied, duplicate])
            .unwrap();
        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "event_id,event_key,applied,reason,final_status");
        assert_eq!(lines[1], format!("{},evt_1,true,applied,SUCCESS", event.id));
        assert_eq!(lines[2], format!("{},evt_1,false,duplicate,SUCCESS", event.id));
    }

    #[test]
    fn test_write_collections_sorted() {
        let amount = Amount::new(dec!(10.50)).unwrap();
        let b = Collection::new("req_b", amount, "NGN");
        let a = Collection::new("req_a", amount, "NGN").with_provider_ref("prov_a");

        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer).write_collections(&[b, a]).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert_eq!(
            output,
            "request_ref,provider_ref,status,amount_total,currency\n\
             req_a,prov_a,INITIATED,10.50,NGN\n\
             req_b,,INITIATED,10.50,NGN\n"
        );
    }

    #[test]
    fn test_write_events_includes_reason() {
        let mut event = WebhookEvent::received(json!({}), None, Some("req_1".into()));
        let outcome = ProcessingOutcome::new(
            &event,
            Some(CollectionStatus::Success),
            Resolution::Skipped {
                reason: SkipReason::RegressionBlocked,
            },
        );
        event.complete(outcome, chrono::Utc::now()).unwrap();

        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer).write_events(&[event]).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains(",req_1,PROCESSED,regression_blocked,0,"));
    }
}
