use crate::error::{ReconcileError, Result};
use serde_json::Value;
use std::io::BufRead;

/// Reads webhook payloads from newline-delimited JSON, one delivery per line.
///
/// Blank lines are skipped. A line that is not a JSON object yields an error
/// carrying its line number; the stream continues after it.
pub struct PayloadReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> PayloadReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn payloads(self) -> impl Iterator<Item = Result<Value>> {
        self.source
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|(index, line)| -> Result<Value> {
                let value: Value = serde_json::from_str(&line?)?;
                if value.is_object() {
                    Ok(value)
                } else {
                    Err(ReconcileError::ValidationError(format!(
                        "Line {}: webhook payload must be a JSON object",
                        index + 1
                    )))
                }
            })
    }
}
