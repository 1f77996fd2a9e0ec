//! Audit records written by the run engine.
//!
//! [`IngestionEvent`] is the one-per-attempt audit row. [`RejectedRecord`]
//! captures rows the warehouse refused during a load, linked to the event
//! that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::DatasetId;
use crate::run::{EventId, LoadOutcome, RunId};

/// One record per dataset attempt. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub event_id: EventId,
    pub run_id: RunId,
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    /// Fully qualified target table, empty when the attempt failed before
    /// it was known.
    pub table_name: String,
    /// File path relative to the stage (root + prefix + file name), empty
    /// when resolution failed.
    pub file_path: String,
    /// Warehouse query id of the load command, when one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: LoadOutcome,
    pub rows_loaded: u64,
    /// Error description; set only for [`LoadOutcome::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_tag: Option<Value>,
}

/// A row rejected by a load, as reported by the warehouse validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub event_id: EventId,
    pub error_code: String,
    pub error_message: String,
    /// Raw row content as the loader saw it.
    pub raw_record: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}
