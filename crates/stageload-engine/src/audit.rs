//! [`AuditStore`] that writes events and rejected records to warehouse
//! tables through the run's session.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use stageload_state::error::Result as StateResult;
use stageload_state::{AuditStore, StateError};
use stageload_types::dataset::DatasetId;
use stageload_types::event::{IngestionEvent, RejectedRecord};
use stageload_types::run::{EventId, LoadOutcome, RunId};
use stageload_types::value::{column, column_i64, column_str, column_text, Row, SqlParam};
use uuid::Uuid;

use crate::config::types::WarehouseTarget;
use crate::sql::validate_identifier;
use crate::warehouse::Session;

const EVENTS_TABLE: &str = "INGESTION_EVENTS";
const REJECTED_TABLE: &str = "INGESTION_REJECTED_RECORDS";

const EVENT_COLUMNS: &str = "EVENT_ID, RUN_ID, DATASET_ID, DATASET_NAME, TABLE_NAME, FILE_PATH, \
     LOAD_ID, STARTED_AT, FINISHED_AT, OUTCOME, ROWS_LOADED, ERROR_MESSAGE, QUERY_TAG";
const REJECTED_COLUMNS: &str =
    "EVENT_ID, ERROR_CODE, ERROR_MESSAGE, RAW_RECORD, FILE, LINE, COLUMN_NAME";

/// Rows per rejected-record `INSERT`, keeping bind counts bounded.
const REJECTED_INSERT_BATCH: usize = 500;

/// Audit tables in `<database>.<audit_schema>`.
pub struct WarehouseAuditStore {
    session: Arc<dyn Session>,
    qualifier: String,
}

impl WarehouseAuditStore {
    /// # Errors
    ///
    /// Returns [`StateError::Decode`] if the database or audit schema is
    /// not a valid identifier.
    pub fn new(session: Arc<dyn Session>, target: &WarehouseTarget) -> StateResult<Self> {
        for part in [&target.database, &target.audit_schema] {
            validate_identifier(part)
                .map_err(|e| StateError::Decode(format!("audit location: {e}")))?;
        }
        Ok(Self {
            session,
            qualifier: format!("{}.{}", target.database, target.audit_schema),
        })
    }

    /// Create the audit tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the DDL fails.
    pub fn ensure_tables(&self) -> StateResult<()> {
        let q = &self.qualifier;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {q}.{EVENTS_TABLE} (\
                 EVENT_ID VARCHAR NOT NULL PRIMARY KEY, RUN_ID VARCHAR NOT NULL, \
                 DATASET_ID VARCHAR NOT NULL, DATASET_NAME VARCHAR NOT NULL, \
                 TABLE_NAME VARCHAR NOT NULL, FILE_PATH VARCHAR NOT NULL, LOAD_ID VARCHAR, \
                 STARTED_AT TIMESTAMP_TZ NOT NULL, FINISHED_AT TIMESTAMP_TZ NOT NULL, \
                 OUTCOME VARCHAR NOT NULL, ROWS_LOADED NUMBER NOT NULL, \
                 ERROR_MESSAGE VARCHAR, QUERY_TAG VARIANT)"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {q}.{REJECTED_TABLE} (\
                 EVENT_ID VARCHAR NOT NULL, ERROR_CODE VARCHAR NOT NULL, \
                 ERROR_MESSAGE VARCHAR NOT NULL, RAW_RECORD VARCHAR NOT NULL, \
                 FILE VARCHAR, LINE NUMBER, COLUMN_NAME VARCHAR)"
            ),
        ];
        for sql in &statements {
            self.execute("ensure_tables", sql, &[])?;
        }
        Ok(())
    }

    fn execute(
        &self,
        context: &'static str,
        sql: &str,
        params: &[SqlParam],
    ) -> StateResult<Vec<Row>> {
        self.session
            .execute(sql, params)
            .map_err(|e| StateError::Backend {
                context: Some(context),
                source: e.into(),
            })
    }
}

impl AuditStore for WarehouseAuditStore {
    fn record_event(&self, event: &IngestionEvent) -> StateResult<()> {
        let sql = format!(
            "INSERT INTO {}.{EVENTS_TABLE} ({EVENT_COLUMNS}) \
             SELECT ?, ?, ?, ?, ?, ?, ?, TO_TIMESTAMP_TZ(?), TO_TIMESTAMP_TZ(?), ?, ?, ?, \
             PARSE_JSON(?)",
            self.qualifier
        );
        let params = [
            SqlParam::Text(event.event_id.to_string()),
            SqlParam::Text(event.run_id.to_string()),
            SqlParam::Text(event.dataset_id.to_string()),
            SqlParam::Text(event.dataset_name.clone()),
            SqlParam::Text(event.table_name.clone()),
            SqlParam::Text(event.file_path.clone()),
            event.load_id.clone().into(),
            SqlParam::Text(event.started_at.to_rfc3339()),
            SqlParam::Text(event.finished_at.to_rfc3339()),
            SqlParam::Text(event.outcome.as_str().to_string()),
            SqlParam::Int(i64::try_from(event.rows_loaded).unwrap_or(i64::MAX)),
            event.error.clone().into(),
            event
                .query_tag
                .as_ref()
                .map_or(SqlParam::Null, |tag| SqlParam::Json(tag.clone())),
        ];
        self.execute("record_event", &sql, &params)?;
        Ok(())
    }

    fn insert_rejected_records(&self, records: &[RejectedRecord]) -> StateResult<u64> {
        let mut inserted = 0u64;
        for batch in records.chunks(REJECTED_INSERT_BATCH) {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?)"; batch.len()].join(", ");
            let sql = format!(
                "INSERT INTO {}.{REJECTED_TABLE} ({REJECTED_COLUMNS}) VALUES {placeholders}",
                self.qualifier
            );
            let params: Vec<SqlParam> = batch
                .iter()
                .flat_map(|r| {
                    [
                        SqlParam::Text(r.event_id.to_string()),
                        SqlParam::Text(r.error_code.clone()),
                        SqlParam::Text(r.error_message.clone()),
                        SqlParam::Text(r.raw_record.clone()),
                        r.file.clone().into(),
                        r.line.into(),
                        r.column_name.clone().into(),
                    ]
                })
                .collect();
            self.execute("insert_rejected_records", &sql, &params)?;
            inserted += batch.len() as u64;
        }
        Ok(inserted)
    }

    fn events_for_run(&self, run_id: RunId) -> StateResult<Vec<IngestionEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM {}.{EVENTS_TABLE} WHERE RUN_ID = ? \
             ORDER BY STARTED_AT, EVENT_ID",
            self.qualifier
        );
        let rows = self.execute("events_for_run", &sql, &[SqlParam::Text(run_id.to_string())])?;
        rows.iter().map(decode_event).collect()
    }

    fn rejected_records_for_event(&self, event_id: EventId) -> StateResult<Vec<RejectedRecord>> {
        let sql = format!(
            "SELECT {REJECTED_COLUMNS} FROM {}.{REJECTED_TABLE} WHERE EVENT_ID = ?",
            self.qualifier
        );
        let rows = self.execute(
            "rejected_records_for_event",
            &sql,
            &[SqlParam::Text(event_id.to_string())],
        )?;
        rows.iter().map(decode_rejected).collect()
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn text(row: &Row, name: &str) -> StateResult<String> {
    column_text(row, name).ok_or_else(|| StateError::Decode(format!("{name} is missing")))
}

fn uuid(row: &Row, name: &str) -> StateResult<Uuid> {
    Uuid::parse_str(&text(row, name)?).map_err(|e| StateError::Decode(format!("{name}: {e}")))
}

/// Timestamps come back as RFC 3339 text or as `YYYY-MM-DD HH:MM:SS[.f]`
/// in UTC, depending on the driver.
fn timestamp(row: &Row, name: &str) -> StateResult<DateTime<Utc>> {
    let raw = text(row, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .map_err(|e| StateError::Decode(format!("{name}: {e}")))
}

fn decode_event(row: &Row) -> StateResult<IngestionEvent> {
    let outcome: LoadOutcome = text(row, "OUTCOME")?
        .parse()
        .map_err(|e: stageload_types::run::UnknownOutcome| StateError::Decode(e.to_string()))?;
    let rows_loaded = column_i64(row, "ROWS_LOADED")
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| StateError::Decode("ROWS_LOADED is missing or negative".to_string()))?;
    let query_tag = match column(row, "QUERY_TAG") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(
            serde_json::from_str(raw)
                .map_err(|e| StateError::Decode(format!("QUERY_TAG: {e}")))?,
        ),
        Some(other) => Some(other.clone()),
    };

    Ok(IngestionEvent {
        event_id: EventId::from_uuid(uuid(row, "EVENT_ID")?),
        run_id: RunId::from_uuid(uuid(row, "RUN_ID")?),
        dataset_id: DatasetId::new(text(row, "DATASET_ID")?),
        dataset_name: text(row, "DATASET_NAME")?,
        table_name: column_text(row, "TABLE_NAME").unwrap_or_default(),
        file_path: column_text(row, "FILE_PATH").unwrap_or_default(),
        load_id: column_str(row, "LOAD_ID").map(str::to_string),
        started_at: timestamp(row, "STARTED_AT")?,
        finished_at: timestamp(row, "FINISHED_AT")?,
        outcome,
        rows_loaded,
        error: column_str(row, "ERROR_MESSAGE").map(str::to_string),
        query_tag,
    })
}

fn decode_rejected(row: &Row) -> StateResult<RejectedRecord> {
    Ok(RejectedRecord {
        event_id: EventId::from_uuid(uuid(row, "EVENT_ID")?),
        error_code: text(row, "ERROR_CODE")?,
        error_message: text(row, "ERROR_MESSAGE")?,
        raw_record: text(row, "RAW_RECORD")?,
        file: column_str(row, "FILE").map(str::to_string),
        line: column_i64(row, "LINE"),
        column_name: column_str(row, "COLUMN_NAME").map(str::to_string),
    })
}
