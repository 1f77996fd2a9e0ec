//! Collaborator seams between the run engine and the outside world.
//!
//! The engine never opens connections itself. A caller hands it a
//! [`Session`] and, optionally, replacements for the other collaborators;
//! the `Warehouse*` implementations elsewhere in this crate cover the
//! defaults by issuing SQL through the same session.

use chrono::{DateTime, Utc};
use stageload_types::dataset::{DatasetConfig, RunSelector};
use stageload_types::value::{Row, SqlParam};

/// A warehouse session that executes SQL with bound parameters.
///
/// Session state (notably the query tag) persists across calls, so one
/// run must use one session sequentially.
pub trait Session: Send + Sync {
    /// Execute one statement and return its result rows (empty for DDL).
    ///
    /// # Errors
    ///
    /// Returns an error if the warehouse rejects or fails the statement.
    fn execute(&self, sql: &str, params: &[SqlParam]) -> anyhow::Result<Vec<Row>>;
}

/// Provides the dataset records a run should process.
pub trait DatasetSource: Send + Sync {
    /// Datasets matching `selector`, in processing order.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or a record is malformed.
    fn datasets(&self, selector: &RunSelector) -> anyhow::Result<Vec<DatasetConfig>>;
}

/// One column proposed by schema inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Infers a tabular schema from a staged file.
pub trait SchemaInference: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the warehouse cannot read or infer the file.
    fn infer_columns(
        &self,
        stage_path: &str,
        file_format: &str,
    ) -> anyhow::Result<Vec<InferredColumn>>;
}

/// One record the warehouse skipped during a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub error_code: String,
    pub error_message: String,
    pub raw_record: String,
    pub file: Option<String>,
    pub line: Option<i64>,
    pub column_name: Option<String>,
}

/// Lists the records rejected by a finished load.
pub trait LoadValidator: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the rejection listing cannot be produced.
    fn rejected_rows(&self, table: &str, load_id: &str) -> anyhow::Result<Vec<RejectedRow>>;
}

/// Time source for event timestamps and the load period.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
