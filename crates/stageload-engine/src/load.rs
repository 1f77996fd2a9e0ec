//! Load execution and session query tagging.

use anyhow::{anyhow, Context};
use serde_json::Value;
use stageload_types::value::{column_str, Row, SqlParam};

use crate::errors::IngestError;
use crate::location::ResolvedLocation;
use crate::sql::{quote_literal, TableRef};
use crate::warehouse::Session;

const SET_QUERY_TAG: &str = "ALTER SESSION SET QUERY_TAG = ?";
const UNSET_QUERY_TAG: &str = "ALTER SESSION UNSET QUERY_TAG";

/// Session query tag held for the duration of one dataset.
///
/// Dropping the scope always resets the tag, whether or not one was
/// attached and whether the dataset succeeded or failed. Reset failures
/// are logged, never raised.
pub struct TagScope<'a> {
    session: &'a dyn Session,
    dataset: &'a str,
}

impl<'a> TagScope<'a> {
    #[must_use]
    pub fn open(session: &'a dyn Session, dataset: &'a str) -> Self {
        Self { session, dataset }
    }

    /// Attach `tag`, serialized as JSON, to every following statement.
    ///
    /// Empty tags (null, `""`, `{}`, `[]`) are not attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the session rejects the tag.
    pub fn attach(&self, tag: &Value) -> anyhow::Result<()> {
        if is_empty_tag(tag) {
            tracing::debug!(dataset = self.dataset, "Skipping empty query tag");
            return Ok(());
        }
        let text = match tag {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).context("serializing query tag")?,
        };
        self.session
            .execute(SET_QUERY_TAG, &[SqlParam::Text(text)])
            .context("attaching query tag")?;
        Ok(())
    }
}

fn is_empty_tag(tag: &Value) -> bool {
    match tag {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

impl Drop for TagScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.session.execute(UNSET_QUERY_TAG, &[]) {
            tracing::warn!(
                dataset = self.dataset,
                error = %format!("{e:#}"),
                "Failed to reset session query tag"
            );
        }
    }
}

/// Identity and result rows of one completed load command.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReceipt {
    /// Warehouse query id of the load command.
    pub load_id: String,
    pub rows: Vec<Row>,
}

/// Build the bulk load statement for one staged file.
#[must_use]
pub fn copy_statement(
    table: &TableRef,
    location: &ResolvedLocation,
    file_format: &str,
    option_clauses: &str,
) -> String {
    let mut sql = format!(
        "COPY INTO {table}\nFROM {}\nFILE_FORMAT = (FORMAT_NAME = {})",
        quote_literal(&location.stage_path),
        quote_literal(file_format.trim())
    );
    if !option_clauses.trim().is_empty() {
        sql.push('\n');
        sql.push_str(option_clauses);
    }
    sql
}

/// Run the load command and fetch its per-file result rows.
///
/// # Errors
///
/// Returns [`IngestError::Load`] if the command, the query id lookup, or
/// the result fetch fails.
pub fn execute_load(
    session: &dyn Session,
    table: &TableRef,
    location: &ResolvedLocation,
    file_format: &str,
    option_clauses: &str,
) -> Result<LoadReceipt, IngestError> {
    let load_error = |source: anyhow::Error| IngestError::Load {
        table: table.to_string(),
        source,
    };

    let sql = copy_statement(table, location, file_format, option_clauses);
    tracing::debug!(table = %table, sql = %sql, "Executing load");
    session
        .execute(&sql, &[])
        .with_context(|| format!("loading {}", location.stage_path))
        .map_err(load_error)?;

    let load_id = last_query_id(session).map_err(load_error)?;
    let rows = session
        .execute(
            &format!(
                "SELECT * FROM TABLE(RESULT_SCAN({}))",
                quote_literal(&load_id)
            ),
            &[],
        )
        .with_context(|| format!("fetching results of load {load_id}"))
        .map_err(load_error)?;

    Ok(LoadReceipt { load_id, rows })
}

fn last_query_id(session: &dyn Session) -> anyhow::Result<String> {
    let rows = session
        .execute("SELECT LAST_QUERY_ID() AS QUERY_ID", &[])
        .context("looking up load query id")?;
    rows.first()
        .and_then(|row| column_str(row, "QUERY_ID"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("warehouse returned no query id for the load"))
}
