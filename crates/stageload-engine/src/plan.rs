//! Offline load plans: the statements a run would issue for a dataset,
//! computed without a warehouse connection.

use serde::Serialize;
use stageload_types::dataset::DatasetConfig;

use crate::config::types::EnvironmentConfig;
use crate::errors::IngestError;
use crate::load::copy_statement;
use crate::location::{resolve_location, LoadPeriod};
use crate::options::{compile_options, CopyOptions};
use crate::provision::{create_variant_table_sql, enable_schema_evolution_sql, target_table};

/// Statements and paths for one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetPlan {
    pub dataset: String,
    pub table: String,
    pub prefix: String,
    pub file_path: String,
    pub stage_path: String,
    /// DDL run when the table is missing. `None` for tabular datasets,
    /// whose DDL depends on the inferred schema.
    pub create_table: Option<String>,
    pub enable_schema_evolution: String,
    pub copy: String,
}

/// Plan `dataset` for `period` in `env`.
///
/// # Errors
///
/// Returns the same error the dataset's attempt would fail with before
/// reaching the warehouse.
pub fn plan_dataset(
    env: &EnvironmentConfig,
    defaults: &CopyOptions,
    dataset: &DatasetConfig,
    period: LoadPeriod,
) -> Result<DatasetPlan, IngestError> {
    let table = target_table(&env.warehouse, dataset)?;
    let location = resolve_location(dataset, &env.stage, period)?;
    let option_clauses = compile_options(defaults, &dataset.copy_options)?;
    let copy = copy_statement(&table, &location, &dataset.file_format, &option_clauses);

    Ok(DatasetPlan {
        dataset: dataset.name.clone(),
        table: table.to_string(),
        prefix: location.prefix,
        file_path: location.file_path,
        stage_path: location.stage_path,
        create_table: dataset
            .is_schemaless()
            .then(|| create_variant_table_sql(&table)),
        enable_schema_evolution: enable_schema_evolution_sql(&table),
        copy,
    })
}
