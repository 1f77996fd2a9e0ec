//! Semantic validation for parsed engine configuration and dataset files.

use std::collections::HashSet;

use anyhow::{bail, Result};
use chrono::Utc;
use stageload_types::dataset::PathSpec;

use crate::config::types::{DatasetEntry, EngineConfig, EnvironmentConfig};
use crate::location::{render_template, LoadPeriod};
use crate::options::CopyOptions;
use crate::sql::{validate_identifier, validate_object_name};

/// Validate warehouse and stage names of one environment.
fn validate_environment(name: &str, env: &EnvironmentConfig, errors: &mut Vec<String>) {
    let wh = &env.warehouse;
    for (field, value) in [
        ("database", &wh.database),
        ("schema", &wh.schema),
        ("config_schema", &wh.config_schema),
        ("audit_schema", &wh.audit_schema),
    ] {
        if let Err(e) = validate_identifier(value) {
            errors.push(format!("environments.{name}.warehouse.{field}: {e}"));
        }
    }

    let stage = env.stage.name.trim().trim_start_matches('@');
    if let Err(e) = validate_object_name(stage) {
        errors.push(format!("environments.{name}.stage.name: {e}"));
    }
}

/// Validate a parsed engine configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.environments.is_empty() {
        errors.push("At least one environment must be defined".to_string());
    }

    for (branch, env) in &config.branch_map {
        if !config.environments.contains_key(env) {
            errors.push(format!(
                "branch_map.{branch} points at undefined environment '{env}'"
            ));
        }
    }

    if let Err(e) = config.active_environment() {
        errors.push(e.to_string());
    }

    for (name, env) in &config.environments {
        validate_environment(name, env, &mut errors);
    }

    if let Err(e) = CopyOptions::from_source(&config.default_copy_options) {
        errors.push(format!("default_copy_options: {e}"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}

/// Validate dataset entries without touching a warehouse.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the entries.
pub fn validate_datasets(entries: &[DatasetEntry]) -> Result<()> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    // Only placeholder names matter here, not the period rendered.
    let probe = LoadPeriod::from_datetime(Utc::now());

    for (i, entry) in entries.iter().enumerate() {
        let ds = &entry.dataset;
        let label = if ds.name.trim().is_empty() {
            format!("datasets[{i}]")
        } else {
            format!("dataset '{}'", ds.name)
        };

        if ds.name.trim().is_empty() {
            errors.push(format!("{label}: name must not be empty"));
        }
        if !seen.insert(ds.dataset_id.as_str()) {
            errors.push(format!(
                "{label}: dataset_id '{}' is declared more than once",
                ds.dataset_id
            ));
        }
        if let Err(e) = validate_identifier(ds.table_name.trim()) {
            errors.push(format!("{label}: table_name: {e}"));
        }
        if ds.file_name.trim().trim_matches('/').is_empty() {
            errors.push(format!("{label}: file_name must not be empty"));
        }
        if ds.file_format.trim().is_empty() {
            errors.push(format!("{label}: file_format must not be empty"));
        }
        if let PathSpec::Template(template) = &ds.path {
            if let Err(unknown) = render_template(template, probe) {
                errors.push(format!(
                    "{label}: unknown placeholder(s) {} in path template",
                    unknown.join(", ")
                ));
            }
        }
        if let Err(e) = CopyOptions::from_source(&ds.copy_options) {
            errors.push(format!("{label}: copy_options: {e}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Dataset validation failed:\n  - {}", errors.join("\n  - "));
    }
}
