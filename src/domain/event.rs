use crate::domain::status::CollectionStatus;
use crate::error::{ReconcileError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingState {
    Received,
    Processing,
    Processed,
    Failed,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Why an event was acknowledged without changing the collection.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
    RegressionBlocked,
    InProgress,
}

/// Why an event could not be reconciled.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    CollectionNotFound,
    MissingReference,
    StorageFailure,
}

impl FailReason {
    /// Infrastructure failures may heal; a redelivery of the event reclaims it.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::StorageFailure)
    }
}

/// Closed result type returned by every layer of the reconciler.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Applied,
    Skipped { reason: SkipReason },
    Failed { reason: FailReason },
}

impl Resolution {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped { reason } => match reason {
                SkipReason::Duplicate => "duplicate",
                SkipReason::RegressionBlocked => "regression_blocked",
                SkipReason::InProgress => "in_progress",
            },
            Self::Failed { reason } => match reason {
                FailReason::CollectionNotFound => "collection_not_found",
                FailReason::MissingReference => "missing_reference",
                FailReason::StorageFailure => "storage_failure",
            },
        }
    }
}

/// What the ingestion endpoint gets back for one delivery.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ProcessingOutcome {
    pub event_id: Uuid,
    pub event_key: Option<String>,
    /// Collection status after processing, when a collection was found.
    pub final_status: Option<CollectionStatus>,
    pub resolution: Resolution,
}

impl ProcessingOutcome {
    pub fn new(
        event: &WebhookEvent,
        final_status: Option<CollectionStatus>,
        resolution: Resolution,
    ) -> Self {
        Self {
            event_id: event.id,
            event_key: event.event_key.clone(),
            final_status,
            resolution,
        }
    }

    pub fn applied(&self) -> bool {
        self.resolution == Resolution::Applied
    }

    pub fn reason(&self) -> &'static str {
        self.resolution.reason()
    }

    /// The view handed to a redelivery of an already settled event.
    pub fn as_duplicate(&self) -> Self {
        Self {
            resolution: Resolution::Skipped {
                reason: SkipReason::Duplicate,
            },
            ..self.clone()
        }
    }
}

/// One received provider callback. Never deleted; it is the audit trail.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WebhookEvent {
    pub id: Uuid,
    /// Deduplication key; unique across the store when present.
    pub event_key: Option<String>,
    pub request_ref: Option<String>,
    pub raw_payload: Value,
    pub received_at: DateTime<Utc>,
    pub state: ProcessingState,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub outcome: Option<ProcessingOutcome>,
    pub error: Option<String>,
    pub duplicate_deliveries: u32,
    /// Bumped by the store on every write; updates are compare-and-set on it.
    pub version: u64,
}

impl WebhookEvent {
    pub fn received(
        raw_payload: Value,
        event_key: Option<String>,
        request_ref: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_key,
            request_ref,
            raw_payload,
            received_at: Utc::now(),
            state: ProcessingState::Received,
            processing_started_at: None,
            processed_at: None,
            outcome: None,
            error: None,
            duplicate_deliveries: 0,
            version: 0,
        }
    }

    /// Whether a worker may take this event into `Processing`.
    ///
    /// Fresh events are claimable, as are events that failed for a retryable
    /// reason and events whose processing started more than `stale_after` ago.
    pub fn is_claimable(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match self.state {
            ProcessingState::Received => true,
            ProcessingState::Processing => self
                .processing_started_at
                .is_none_or(|started| now - started >= stale_after),
            ProcessingState::Failed => self.failure().is_some_and(FailReason::is_retryable),
            ProcessingState::Processed => false,
        }
    }

    pub fn failure(&self) -> Option<FailReason> {
        match self.outcome.as_ref().map(|outcome| outcome.resolution) {
            Some(Resolution::Failed { reason }) => Some(reason),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, ProcessingState::Processed | ProcessingState::Failed)
    }

    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state == ProcessingState::Processed {
            return Err(self.conflict(ProcessingState::Processing));
        }
        self.state = ProcessingState::Processing;
        self.processing_started_at = Some(now);
        self.error = None;
        Ok(())
    }

    /// Moves to `Processed`. Returns `false` if the event already was.
    pub fn complete(&mut self, outcome: ProcessingOutcome, now: DateTime<Utc>) -> Result<bool> {
        match self.state {
            ProcessingState::Processed => Ok(false),
            ProcessingState::Failed => Err(self.conflict(ProcessingState::Processed)),
            ProcessingState::Received | ProcessingState::Processing => {
                self.state = ProcessingState::Processed;
                self.outcome = Some(outcome);
                self.processed_at = Some(now);
                Ok(true)
            }
        }
    }

    /// Moves to `Failed`. Returns `false` if the event already was.
    pub fn fail(
        &mut self,
        outcome: ProcessingOutcome,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.state {
            ProcessingState::Failed => Ok(false),
            ProcessingState::Processed => Err(self.conflict(ProcessingState::Failed)),
            ProcessingState::Received | ProcessingState::Processing => {
                self.state = ProcessingState::Failed;
                self.outcome = Some(outcome);
                self.error = Some(error);
                self.processed_at = Some(now);
                Ok(true)
            }
        }
    }

    fn conflict(&self, to: ProcessingState) -> ReconcileError {
        ReconcileError::EventConflict {
            id: self.id,
            from: self.state,
            to,
        }
    }
}
