//! Dataset catalogs: warehouse configuration tables and YAML files.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use stageload_types::dataset::{DatasetConfig, DatasetId, PathSpec, RunSelector};
use stageload_types::value::{column, column_str, column_text, Row, SqlParam};

use crate::config::parser::parse_datasets;
use crate::config::types::{DatasetEntry, WarehouseTarget};
use crate::options::option_source_from_value;
use crate::sql::validate_identifier;
use crate::warehouse::{DatasetSource, Session};

const DATASET_TABLE: &str = "INGESTION_DATASET_CONFIG";
const ADHOC_TABLE: &str = "INGESTION_ADHOC_CONFIG";

const DATASET_COLUMNS: &str = "DATASET_ID, DATASET_NAME, DATA_SOURCE, TABLE_NAME, FILE_TYPE, \
     S3_PATH_TEMPLATE, FILE_NAME, FILE_FORMAT_OBJECT, COPY_OPTIONS, QUERY_TAG";
const ADHOC_COLUMNS: &str = "ADHOC_ID, DATASET_NAME, DATA_SOURCE, TABLE_NAME, FILE_TYPE, \
     S3_PATH, FILE_NAME, FILE_FORMAT_OBJECT, COPY_OPTIONS, QUERY_TAG";

// ---------------------------------------------------------------------------
// Warehouse catalog
// ---------------------------------------------------------------------------

/// Reads datasets from the configuration tables in
/// `<database>.<config_schema>`.
pub struct WarehouseCatalog {
    session: Arc<dyn Session>,
    qualifier: String,
}

impl WarehouseCatalog {
    /// # Errors
    ///
    /// Returns an error if the database or config schema is not a valid
    /// identifier.
    pub fn new(session: Arc<dyn Session>, target: &WarehouseTarget) -> anyhow::Result<Self> {
        validate_identifier(&target.database)
            .map_err(|e| anyhow!("invalid catalog database: {e}"))?;
        validate_identifier(&target.config_schema)
            .map_err(|e| anyhow!("invalid catalog schema: {e}"))?;
        Ok(Self {
            session,
            qualifier: format!("{}.{}", target.database, target.config_schema),
        })
    }

    fn query(&self, selector: &RunSelector) -> (String, Vec<SqlParam>) {
        let q = &self.qualifier;
        match selector {
            RunSelector::AllActive => (
                format!(
                    "SELECT {DATASET_COLUMNS} FROM {q}.{DATASET_TABLE} \
                     WHERE IS_ACTIVE = TRUE ORDER BY DATASET_ID"
                ),
                Vec::new(),
            ),
            RunSelector::Source(source) => (
                format!(
                    "SELECT {DATASET_COLUMNS} FROM {q}.{DATASET_TABLE} \
                     WHERE IS_ACTIVE = TRUE AND DATA_SOURCE = ? ORDER BY DATASET_ID"
                ),
                vec![SqlParam::Text(source.clone())],
            ),
            RunSelector::Adhoc(id) => (
                format!(
                    "SELECT {ADHOC_COLUMNS} FROM {q}.{ADHOC_TABLE} \
                     WHERE ADHOC_ID = ? AND STATUS = 'PENDING'"
                ),
                vec![SqlParam::Text(id.clone())],
            ),
        }
    }
}

impl DatasetSource for WarehouseCatalog {
    fn datasets(&self, selector: &RunSelector) -> anyhow::Result<Vec<DatasetConfig>> {
        let (sql, params) = self.query(selector);
        let rows = self
            .session
            .execute(&sql, &params)
            .with_context(|| format!("querying dataset catalog for {selector}"))?;
        let adhoc = matches!(selector, RunSelector::Adhoc(_));
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                dataset_from_row(row, adhoc).with_context(|| format!("catalog row {i}"))
            })
            .collect()
    }
}

fn required(row: &Row, name: &str) -> anyhow::Result<String> {
    column_text(row, name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("column {name} is missing or empty"))
}

/// Query tags may arrive as VARIANT objects or as JSON text.
fn query_tag_from_value(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::String(text) => {
            Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())))
        }
        other => Some(other.clone()),
    }
}

fn dataset_from_row(row: &Row, adhoc: bool) -> anyhow::Result<DatasetConfig> {
    let (id_column, path) = if adhoc {
        ("ADHOC_ID", PathSpec::Literal(required(row, "S3_PATH")?))
    } else {
        (
            "DATASET_ID",
            PathSpec::Template(required(row, "S3_PATH_TEMPLATE")?),
        )
    };
    let table_name = required(row, "TABLE_NAME")?;
    let name = column_str(row, "DATASET_NAME")
        .map(str::to_string)
        .unwrap_or_else(|| table_name.clone());

    Ok(DatasetConfig {
        dataset_id: DatasetId::new(required(row, id_column)?),
        name,
        data_source: column_str(row, "DATA_SOURCE").map(str::to_string),
        table_name,
        file_type: required(row, "FILE_TYPE")?,
        path,
        file_name: required(row, "FILE_NAME")?,
        file_format: required(row, "FILE_FORMAT_OBJECT")?,
        copy_options: option_source_from_value(column(row, "COPY_OPTIONS"))?,
        query_tag: query_tag_from_value(column(row, "QUERY_TAG")),
    })
}

// ---------------------------------------------------------------------------
// File catalog
// ---------------------------------------------------------------------------

/// Datasets declared in a YAML file.
///
/// Selection mirrors the warehouse catalog: templated entries are picked by
/// `AllActive` and `Source` when active, literal entries only by `Adhoc`.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    entries: Vec<DatasetEntry>,
}

impl FileCatalog {
    #[must_use]
    pub fn new(entries: Vec<DatasetEntry>) -> Self {
        Self { entries }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or declares a
    /// dataset id twice.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let entries = parse_datasets(path)?;
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.dataset.dataset_id.as_str()) {
                bail!(
                    "dataset id '{}' is declared more than once in {}",
                    entry.dataset.dataset_id,
                    path.display()
                );
            }
        }
        Ok(Self::new(entries))
    }

    #[must_use]
    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }
}

impl DatasetSource for FileCatalog {
    fn datasets(&self, selector: &RunSelector) -> anyhow::Result<Vec<DatasetConfig>> {
        let selected = self.entries.iter().filter(|entry| {
            let ds = &entry.dataset;
            match selector {
                RunSelector::AllActive => entry.active && !ds.is_adhoc(),
                RunSelector::Source(source) => {
                    entry.active && !ds.is_adhoc() && ds.data_source.as_deref() == Some(source)
                }
                RunSelector::Adhoc(id) => {
                    entry.active && ds.is_adhoc() && ds.dataset_id.as_str() == id
                }
            }
        });
        Ok(selected.map(|entry| entry.dataset.clone()).collect())
    }
}
