use crate::domain::collection::Collection;
use crate::domain::ledger::{Amount, LedgerEntryType, LedgerTransaction};
use crate::domain::status::CollectionStatus;
use crate::error::{ReconcileError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One initiated collection as listed in a seed file.
///
/// Columns: `request_ref, provider_ref, status, amount_total, currency, fee`.
/// `provider_ref`, `status` and `fee` may be left empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CollectionRecord {
    pub request_ref: String,
    pub provider_ref: Option<String>,
    pub status: Option<String>,
    /// Parsed from the cell text so the listed scale is kept exactly.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_total: Decimal,
    pub currency: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub fee: Option<Decimal>,
}

impl CollectionRecord {
    /// Builds the collection with a pending credit row for the full amount,
    /// plus a fee row when a non-zero fee is listed.
    pub fn into_collection(self) -> Result<(Collection, Vec<LedgerTransaction>)> {
        if self.request_ref.is_empty() {
            return Err(ReconcileError::ValidationError(
                "Collection row without request_ref".to_string(),
            ));
        }
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse()?,
            None => CollectionStatus::Initiated,
        };
        let amount = Amount::new(self.amount_total)?;

        let mut ledger = vec![LedgerTransaction::new(
            &self.request_ref,
            LedgerEntryType::Credit,
            amount,
            &self.currency,
        )];
        if let Some(fee) = self.fee.filter(|fee| !fee.is_zero()) {
            ledger.push(LedgerTransaction::new(
                &self.request_ref,
                LedgerEntryType::Fee,
                Amount::new(fee)?,
                &self.currency,
            ));
        }

        let mut collection =
            Collection::new(self.request_ref, amount, self.currency).with_initial_status(status);
        if let Some(provider_ref) = self.provider_ref.filter(|r| !r.is_empty()) {
            collection = collection.with_provider_ref(provider_ref);
        }
        Ok((collection, ledger))
    }
}

/// Reads collection seed rows from a CSV source, trimming whitespace and
/// tolerating a missing trailing `fee` column.
pub struct CollectionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CollectionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed row yields an error without
    /// stopping the stream.
    pub fn records(self) -> impl Iterator<Item = Result<CollectionRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(ReconcileError::from))
    }
}
