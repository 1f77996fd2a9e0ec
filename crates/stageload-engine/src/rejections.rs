//! Rejected-record capture for completed loads.

use std::sync::Arc;

use anyhow::anyhow;
use stageload_state::AuditStore;
use stageload_types::event::RejectedRecord;
use stageload_types::run::EventId;
use stageload_types::value::{column_i64, column_str, column_text, Row};

use crate::errors::IngestError;
use crate::sql::{quote_literal, TableRef};
use crate::warehouse::{LoadValidator, RejectedRow, Session};

/// Fetch the rows rejected by load `load_id` and persist them against
/// `event_id`. Returns the number persisted.
///
/// # Errors
///
/// Returns [`IngestError::Recording`] if the rejection listing cannot be
/// fetched or persisted. Callers log and count it; it never changes the
/// load outcome.
pub(crate) fn record_rejections(
    validator: &dyn LoadValidator,
    audit: &dyn AuditStore,
    event_id: EventId,
    table: &TableRef,
    load_id: &str,
) -> Result<u64, IngestError> {
    let rows = validator
        .rejected_rows(&table.to_string(), load_id)
        .map_err(|source| IngestError::Recording {
            what: format!("rejected records of load {load_id}"),
            source,
        })?;

    if rows.is_empty() {
        return Ok(0);
    }

    let rejected = rows.len();
    let records: Vec<RejectedRecord> = rows
        .into_iter()
        .map(|row| RejectedRecord {
            event_id,
            error_code: row.error_code,
            error_message: row.error_message,
            raw_record: row.raw_record,
            file: row.file,
            line: row.line,
            column_name: row.column_name,
        })
        .collect();

    match audit.insert_rejected_records(&records) {
        Ok(inserted) => {
            tracing::info!(
                table = %table,
                load_id,
                rejected_records = inserted,
                "Persisted rejected records"
            );
            Ok(inserted)
        }
        Err(e) => Err(IngestError::Recording {
            what: format!("{rejected} rejected record(s) of load {load_id}"),
            source: anyhow!(e),
        }),
    }
}

/// [`LoadValidator`] backed by the warehouse `VALIDATE` table function.
pub struct WarehouseLoadValidator {
    session: Arc<dyn Session>,
}

impl WarehouseLoadValidator {
    #[must_use]
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }
}

impl LoadValidator for WarehouseLoadValidator {
    fn rejected_rows(&self, table: &str, load_id: &str) -> anyhow::Result<Vec<RejectedRow>> {
        // VALIDATE only accepts constant arguments; `table` is a validated FQN.
        let sql = format!(
            "SELECT * FROM TABLE(VALIDATE({table}, JOB_ID => {}))",
            quote_literal(load_id)
        );
        let rows = self.session.execute(&sql, &[])?;
        Ok(rows.iter().map(rejected_row).collect())
    }
}

fn rejected_row(row: &Row) -> RejectedRow {
    RejectedRow {
        error_code: column_text(row, "CODE").unwrap_or_default(),
        error_message: column_text(row, "ERROR").unwrap_or_default(),
        raw_record: column_text(row, "REJECTED_RECORD").unwrap_or_default(),
        file: column_str(row, "FILE").map(str::to_string),
        line: column_i64(row, "LINE"),
        column_name: column_str(row, "COLUMN_NAME").map(str::to_string),
    }
}
