//! `SQLite`-backed implementation of [`AuditStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use stageload_types::dataset::DatasetId;
use stageload_types::event::{IngestionEvent, RejectedRecord};
use stageload_types::run::{EventId, LoadOutcome, RunId};
use uuid::Uuid;

use crate::backend::AuditStore;
use crate::error::{self, StateError};

/// Idempotent DDL for audit tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS ingestion_events (
    event_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    dataset_id TEXT NOT NULL,
    dataset_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    load_id TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    outcome TEXT NOT NULL,
    rows_loaded INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    query_tag TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_events_run ON ingestion_events (run_id);

CREATE TABLE IF NOT EXISTS rejected_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL,
    error_code TEXT NOT NULL,
    error_message TEXT NOT NULL,
    raw_record TEXT NOT NULL,
    file TEXT,
    line INTEGER,
    column_name TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_rejected_event ON rejected_records (event_id);
";

const SELECT_EVENT_COLUMNS: &str = "SELECT event_id, run_id, dataset_id, dataset_name, \
     table_name, file_path, load_id, started_at, finished_at, outcome, rows_loaded, \
     error_message, query_tag FROM ingestion_events";

/// `SQLite`-backed audit storage.
///
/// Create with [`SqliteAuditStore::open`] for file-backed persistence
/// or [`SqliteAuditStore::in_memory`] for tests.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open or create a `SQLite` audit database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    #[cfg(test)]
    fn count_rows(&self, table: &str) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .map_err(StateError::backend)
    }
}

/// Raw column values of one `ingestion_events` row, decoded afterwards so
/// model errors surface as [`StateError::Decode`] rather than SQL errors.
struct RawEvent {
    event_id: String,
    run_id: String,
    dataset_id: String,
    dataset_name: String,
    table_name: String,
    file_path: String,
    load_id: Option<String>,
    started_at: String,
    finished_at: String,
    outcome: String,
    rows_loaded: i64,
    error_message: Option<String>,
    query_tag: Option<String>,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            run_id: row.get(1)?,
            dataset_id: row.get(2)?,
            dataset_name: row.get(3)?,
            table_name: row.get(4)?,
            file_path: row.get(5)?,
            load_id: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
            outcome: row.get(9)?,
            rows_loaded: row.get(10)?,
            error_message: row.get(11)?,
            query_tag: row.get(12)?,
        })
    }

    fn decode(self) -> error::Result<IngestionEvent> {
        let outcome: LoadOutcome = self
            .outcome
            .parse()
            .map_err(|e: stageload_types::run::UnknownOutcome| StateError::Decode(e.to_string()))?;
        let query_tag = self
            .query_tag
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| StateError::Decode(format!("query_tag: {e}")))?;
        Ok(IngestionEvent {
            event_id: EventId::from_uuid(parse_uuid("event_id", &self.event_id)?),
            run_id: RunId::from_uuid(parse_uuid("run_id", &self.run_id)?),
            dataset_id: DatasetId::new(self.dataset_id),
            dataset_name: self.dataset_name,
            table_name: self.table_name,
            file_path: self.file_path,
            load_id: self.load_id,
            started_at: parse_timestamp("started_at", &self.started_at)?,
            finished_at: parse_timestamp("finished_at", &self.finished_at)?,
            outcome,
            rows_loaded: u64::try_from(self.rows_loaded)
                .map_err(|_| StateError::Decode(format!("rows_loaded: {}", self.rows_loaded)))?,
            error: self.error_message,
            query_tag,
        })
    }
}

fn parse_uuid(field: &str, raw: &str) -> error::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StateError::Decode(format!("{field}: {e}")))
}

fn parse_timestamp(field: &str, raw: &str) -> error::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StateError::Decode(format!("{field}: {e}")))
}

impl AuditStore for SqliteAuditStore {
    fn record_event(&self, event: &IngestionEvent) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let rows_loaded = i64::try_from(event.rows_loaded).unwrap_or(i64::MAX);
        let query_tag = event.query_tag.as_ref().map(ToString::to_string);
        conn.execute(
            "INSERT INTO ingestion_events \
             (event_id, run_id, dataset_id, dataset_name, table_name, file_path, load_id, \
              started_at, finished_at, outcome, rows_loaded, error_message, query_tag) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                event.event_id.to_string(),
                event.run_id.to_string(),
                event.dataset_id.as_str(),
                event.dataset_name,
                event.table_name,
                event.file_path,
                event.load_id,
                event.started_at.to_rfc3339(),
                event.finished_at.to_rfc3339(),
                event.outcome.as_str(),
                rows_loaded,
                event.error,
                query_tag,
            ],
        )
        .map_err(|e| StateError::backend_context("record_event: execute", e))?;
        Ok(())
    }

    fn insert_rejected_records(&self, records: &[RejectedRecord]) -> error::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("insert_rejected_records: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO rejected_records \
                 (event_id, error_code, error_message, raw_record, file, line, column_name) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| StateError::backend_context("insert_rejected_records: prepare", e))?;

        let mut count = 0u64;
        for record in records {
            stmt.execute(rusqlite::params![
                record.event_id.to_string(),
                record.error_code,
                record.error_message,
                record.raw_record,
                record.file,
                record.line,
                record.column_name,
            ])
            .map_err(|e| StateError::backend_context("insert_rejected_records: execute", e))?;
            count += 1;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::backend_context("insert_rejected_records: commit", e))?;

        Ok(count)
    }

    fn events_for_run(&self, run_id: RunId) -> error::Result<Vec<IngestionEvent>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_EVENT_COLUMNS} WHERE run_id = ?1 ORDER BY rowid"
            ))
            .map_err(|e| StateError::backend_context("events_for_run: prepare", e))?;
        let raw = stmt
            .query_map([run_id.to_string()], RawEvent::from_row)
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| StateError::backend_context("events_for_run: query", e))?;
        raw.into_iter().map(RawEvent::decode).collect()
    }

    fn rejected_records_for_event(
        &self,
        event_id: EventId,
    ) -> error::Result<Vec<RejectedRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT error_code, error_message, raw_record, file, line, column_name \
                 FROM rejected_records WHERE event_id = ?1 ORDER BY id",
            )
            .map_err(|e| StateError::backend_context("rejected_records_for_event: prepare", e))?;
        let records = stmt
            .query_map([event_id.to_string()], |row| {
                Ok(RejectedRecord {
                    event_id,
                    error_code: row.get(0)?,
                    error_message: row.get(1)?,
                    raw_record: row.get(2)?,
                    file: row.get(3)?,
                    line: row.get(4)?,
                    column_name: row.get(5)?,
                })
            })
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| StateError::backend_context("rejected_records_for_event: query", e))?;
        Ok(records)
    }
}
