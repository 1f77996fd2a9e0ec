//! Target table provisioning.
//!
//! A missing table is created before its first load: schemaless (JSON)
//! datasets get a single `VARIANT` column, everything else gets the schema
//! the warehouse infers from the staged file. Schema evolution is enabled
//! on every target table, existing ones included, so later files may add
//! columns.

use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use regex::Regex;
use stageload_types::dataset::DatasetConfig;
use stageload_types::value::{column, column_str};

use crate::config::types::WarehouseTarget;
use crate::errors::IngestError;
use crate::location::ResolvedLocation;
use crate::sql::{quote_identifier, quote_literal, TableRef};
use crate::warehouse::{InferredColumn, SchemaInference, Session};

static COLUMN_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_(), ]+$").expect("valid column type regex"));

/// What provisioning did for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionAction {
    /// The table already existed; nothing was created.
    Existing,
    /// Created with a single `RAW VARIANT` column.
    CreatedVariant,
    /// Created from an inferred schema with this many columns.
    CreatedInferred { columns: usize },
}

/// Fully qualified target table for `dataset` in `target`.
///
/// # Errors
///
/// Returns [`IngestError::Provision`] if any name part is not a valid
/// identifier.
pub fn target_table(
    target: &WarehouseTarget,
    dataset: &DatasetConfig,
) -> Result<TableRef, IngestError> {
    TableRef::new(&target.database, &target.schema, &dataset.table_name).map_err(|message| {
        IngestError::Provision {
            table: format!(
                "{}.{}.{}",
                target.database, target.schema, dataset.table_name
            ),
            source: anyhow!(message),
        }
    })
}

/// `CREATE TABLE` statement for a schemaless table.
#[must_use]
pub fn create_variant_table_sql(table: &TableRef) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} (RAW VARIANT)")
}

/// `CREATE TABLE` statement for an inferred column set.
///
/// # Errors
///
/// Returns an error if the column set is empty or a column type contains
/// characters outside a plain type name.
pub fn create_inferred_table_sql(
    table: &TableRef,
    columns: &[InferredColumn],
) -> anyhow::Result<String> {
    if columns.is_empty() {
        return Err(anyhow!("schema inference returned no columns"));
    }

    let mut defs = Vec::with_capacity(columns.len());
    for col in columns {
        let data_type = col.data_type.trim();
        if !COLUMN_TYPE_RE.is_match(data_type) {
            return Err(anyhow!(
                "inferred type '{}' for column '{}' is not a plain type name",
                col.data_type,
                col.name
            ));
        }
        let null_clause = if col.nullable { "" } else { " NOT NULL" };
        defs.push(format!("{} {data_type}{null_clause}", quote_identifier(&col.name)));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        defs.join(", ")
    ))
}

/// `ALTER TABLE` statement enabling schema evolution.
#[must_use]
pub fn enable_schema_evolution_sql(table: &TableRef) -> String {
    format!("ALTER TABLE {table} SET ENABLE_SCHEMA_EVOLUTION = TRUE")
}

/// Creates missing target tables through a session.
pub struct TableProvisioner<'a> {
    session: &'a dyn Session,
    inference: &'a dyn SchemaInference,
}

impl<'a> TableProvisioner<'a> {
    #[must_use]
    pub fn new(session: &'a dyn Session, inference: &'a dyn SchemaInference) -> Self {
        Self { session, inference }
    }

    /// Make sure `table` exists before loading `location` into it.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Provision`] if the existence check, inference,
    /// creation or the schema evolution change fails.
    pub fn ensure_table(
        &self,
        table: &TableRef,
        dataset: &DatasetConfig,
        location: &ResolvedLocation,
    ) -> Result<ProvisionAction, IngestError> {
        let provision_error = |source: anyhow::Error| IngestError::Provision {
            table: table.to_string(),
            source,
        };

        let action = if self.table_exists(table).map_err(provision_error)? {
            tracing::debug!(table = %table, "Target table exists");
            ProvisionAction::Existing
        } else {
            self.create_table(table, dataset, location)
                .map_err(provision_error)?
        };

        // Evolution is enabled on every load, pre-existing tables included.
        self.session
            .execute(&enable_schema_evolution_sql(table), &[])
            .context("enabling schema evolution")
            .map_err(provision_error)?;

        tracing::info!(table = %table, action = ?action, "Provisioned target table");
        Ok(action)
    }

    fn create_table(
        &self,
        table: &TableRef,
        dataset: &DatasetConfig,
        location: &ResolvedLocation,
    ) -> anyhow::Result<ProvisionAction> {
        let (create_sql, action) = if dataset.is_schemaless() {
            (create_variant_table_sql(table), ProvisionAction::CreatedVariant)
        } else {
            let columns = self
                .inference
                .infer_columns(&location.stage_path, &dataset.file_format)
                .with_context(|| format!("inferring schema from {}", location.stage_path))?;
            let sql = create_inferred_table_sql(table, &columns)?;
            (
                sql,
                ProvisionAction::CreatedInferred {
                    columns: columns.len(),
                },
            )
        };

        self.session
            .execute(&create_sql, &[])
            .context("creating table")?;
        Ok(action)
    }

    fn table_exists(&self, table: &TableRef) -> anyhow::Result<bool> {
        let sql = format!(
            "SELECT 1 AS PRESENT FROM {}.INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = UPPER(?) AND TABLE_NAME = UPPER(?) LIMIT 1",
            table.database()
        );
        let rows = self
            .session
            .execute(&sql, &[table.schema().into(), table.table().into()])
            .context("checking table existence")?;
        Ok(!rows.is_empty())
    }
}

/// [`SchemaInference`] backed by the warehouse `INFER_SCHEMA` table function.
pub struct WarehouseSchemaInference {
    session: Arc<dyn Session>,
}

impl WarehouseSchemaInference {
    #[must_use]
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }
}

impl SchemaInference for WarehouseSchemaInference {
    fn infer_columns(
        &self,
        stage_path: &str,
        file_format: &str,
    ) -> anyhow::Result<Vec<InferredColumn>> {
        // Table function arguments must be constants, so they are inlined.
        let sql = format!(
            "SELECT COLUMN_NAME, TYPE, NULLABLE FROM TABLE(INFER_SCHEMA(\
             LOCATION => {}, FILE_FORMAT => {})) ORDER BY ORDER_ID",
            quote_literal(stage_path),
            quote_literal(file_format)
        );
        let rows = self.session.execute(&sql, &[])?;

        rows.iter()
            .map(|row| {
                let name = column_str(row, "COLUMN_NAME")
                    .ok_or_else(|| anyhow!("INFER_SCHEMA row is missing COLUMN_NAME"))?;
                let data_type = column_str(row, "TYPE")
                    .ok_or_else(|| anyhow!("INFER_SCHEMA row for '{name}' is missing TYPE"))?;
                let nullable = match column(row, "NULLABLE") {
                    Some(serde_json::Value::Bool(b)) => *b,
                    Some(serde_json::Value::String(s)) => !s.eq_ignore_ascii_case("false"),
                    _ => true,
                };
                Ok(InferredColumn {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                    nullable,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;
    use stageload_types::dataset::{OptionSource, PathSpec};
    use stageload_types::value::{Row, SqlParam};

    struct RecordingSession {
        statements: Mutex<Vec<String>>,
        table_exists: bool,
        infer_rows: Vec<Row>,
    }

    impl RecordingSession {
        fn new(table_exists: bool) -> Self {
            Self {
                statements: Mutex::new(Vec::new()),
                table_exists,
                infer_rows: Vec::new(),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl Session for RecordingSession {
        fn execute(&self, sql: &str, _params: &[SqlParam]) -> anyhow::Result<Vec<Row>> {
            self.statements.lock().unwrap().push(sql.to_string());
            if sql.contains("INFORMATION_SCHEMA") && self.table_exists {
                return Ok(vec![Row::from([("PRESENT".to_string(), json!(1))])]);
            }
            if sql.contains("INFER_SCHEMA") {
                return Ok(self.infer_rows.clone());
            }
            Ok(Vec::new())
        }
    }

    struct StaticInference(Vec<InferredColumn>);

    impl SchemaInference for StaticInference {
        fn infer_columns(&self, _: &str, _: &str) -> anyhow::Result<Vec<InferredColumn>> {
            Ok(self.0.clone())
        }
    }

    fn dataset(file_type: &str) -> DatasetConfig {
        DatasetConfig {
            dataset_id: "1".into(),
            name: "orders".into(),
            data_source: None,
            table_name: "ORDERS".into(),
            file_type: file_type.into(),
            path: PathSpec::Template("orders".into()),
            file_name: "orders.csv".into(),
            file_format: "CSV_FMT".into(),
            copy_options: OptionSource::default(),
            query_tag: None,
        }
    }

    fn location() -> ResolvedLocation {
        ResolvedLocation {
            prefix: "orders".into(),
            file_path: "orders/orders.csv".into(),
            stage_path: "@S3/orders/orders.csv".into(),
        }
    }

    fn table() -> TableRef {
        TableRef::new("RAW", "LANDING", "ORDERS").unwrap()
    }

    fn col(name: &str, data_type: &str, nullable: bool) -> InferredColumn {
        InferredColumn {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    #[test]
    fn test_target_table_qualifies_name() {
        let target = WarehouseTarget {
            database: "RAW".into(),
            schema: "LANDING".into(),
            config_schema: "CONFIG_SCH".into(),
            audit_schema: "AUDIT".into(),
        };
        let mut ds = dataset("CSV");
        assert_eq!(target_table(&target, &ds).unwrap(), table());

        ds.table_name = "ORDERS; DROP TABLE X".into();
        let err = target_table(&target, &ds).unwrap_err();
        assert!(matches!(err, IngestError::Provision { .. }));
    }

    #[test]
    fn test_existing_table_still_gets_schema_evolution() {
        let session = RecordingSession::new(true);
        let inference = StaticInference(vec![]);
        let action = TableProvisioner::new(&session, &inference)
            .ensure_table(&table(), &dataset("CSV"), &location())
            .unwrap();
        assert_eq!(action, ProvisionAction::Existing);
        let statements = session.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("INFORMATION_SCHEMA.TABLES"));
        assert_eq!(
            statements[1],
            "ALTER TABLE RAW.LANDING.ORDERS SET ENABLE_SCHEMA_EVOLUTION = TRUE"
        );
    }

    #[test]
    fn test_json_dataset_gets_variant_table() {
        let session = RecordingSession::new(false);
        let inference = StaticInference(vec![]);
        let action = TableProvisioner::new(&session, &inference)
            .ensure_table(&table(), &dataset("json"), &location())
            .unwrap();
        assert_eq!(action, ProvisionAction::CreatedVariant);
        let statements = session.statements();
        assert_eq!(
            statements[1],
            "CREATE TABLE IF NOT EXISTS RAW.LANDING.ORDERS (RAW VARIANT)"
        );
        assert_eq!(
            statements[2],
            "ALTER TABLE RAW.LANDING.ORDERS SET ENABLE_SCHEMA_EVOLUTION = TRUE"
        );
    }

    #[test]
    fn test_tabular_dataset_uses_inferred_columns() {
        let session = RecordingSession::new(false);
        let inference = StaticInference(vec![
            col("order id", "NUMBER(38, 0)", false),
            col("amount", "FLOAT", true),
        ]);
        let action = TableProvisioner::new(&session, &inference)
            .ensure_table(&table(), &dataset("CSV"), &location())
            .unwrap();
        assert_eq!(action, ProvisionAction::CreatedInferred { columns: 2 });
        assert_eq!(
            session.statements()[1],
            "CREATE TABLE IF NOT EXISTS RAW.LANDING.ORDERS \
             (\"order id\" NUMBER(38, 0) NOT NULL, \"amount\" FLOAT)"
        );
    }

    #[test]
    fn test_empty_inference_is_provision_error() {
        let session = RecordingSession::new(false);
        let inference = StaticInference(vec![]);
        let err = TableProvisioner::new(&session, &inference)
            .ensure_table(&table(), &dataset("PARQUET"), &location())
            .unwrap_err();
        assert!(matches!(err, IngestError::Provision { .. }));
        assert!(err.describe().contains("no columns"));
    }

    #[test]
    fn test_suspicious_column_type_rejected() {
        let err = create_inferred_table_sql(&table(), &[col("a", "TEXT); DROP TABLE X; --", true)])
            .unwrap_err();
        assert!(err.to_string().contains("not a plain type name"));
    }

    #[test]
    fn test_warehouse_inference_maps_rows() {
        let mut session = RecordingSession::new(false);
        session.infer_rows = vec![
            Row::from([
                ("COLUMN_NAME".to_string(), json!("ID")),
                ("TYPE".to_string(), json!("NUMBER(38, 0)")),
                ("NULLABLE".to_string(), json!(false)),
            ]),
            Row::from([
                ("column_name".to_string(), json!("NOTE")),
                ("type".to_string(), json!("TEXT")),
            ]),
        ];
        let session: Arc<RecordingSession> = Arc::new(session);
        let inference = WarehouseSchemaInference::new(session.clone());
        let columns = inference.infer_columns("@S3/it's.csv", "CSV_FMT").unwrap();
        assert_eq!(
            columns,
            vec![col("ID", "NUMBER(38, 0)", false), col("NOTE", "TEXT", true)]
        );
        assert!(session.statements()[0].contains("LOCATION => '@S3/it''s.csv'"));
    }
}
