// Builds the numbered output table

use crate::document_processing::schemas::{FieldRecord, Row, RowTable};
use crate::{Error, Result};

pub struct TableAssembler;

impl TableAssembler {
    /// Number records `1..=N` in the order given. Never reorders.
    pub fn assemble(records: Vec<FieldRecord>) -> Result<RowTable> {
        if records.is_empty() {
            return Err(Error::EmptyExtraction);
        }

        let rows = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| Row {
                number: index + 1,
                key: record.key,
                value: record.value,
                comment: record.comment,
            })
            .collect::<Vec<_>>();

        // Validation drops empty keys; a blank one here is a programming error
        debug_assert!(rows.iter().all(|row| !row.key.trim().is_empty()));

        tracing::info!(rows = rows.len(), "assembled row table");
        Ok(RowTable::from_rows(rows))
    }
}
