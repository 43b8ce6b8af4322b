use crate::domain::task::Task;
use crate::error::{LedgerError, Result};
use std::io::Read;

/// Reads tasks from a CSV source.
///
/// Expects the columns `type, user, counterparty, amount` with optional `priority` and `id`.
/// Whitespace is trimmed and rows may omit trailing optional columns.
pub struct TaskReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TaskReader<R> {
    /// Creates a new `TaskReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes tasks.
    pub fn tasks(self) -> impl Iterator<Item = Result<Task>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
