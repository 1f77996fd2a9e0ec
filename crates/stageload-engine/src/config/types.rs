//! Engine configuration types, deserialized from YAML.

use std::collections::BTreeMap;

use serde::Deserialize;
use stageload_types::dataset::{DatasetConfig, OptionSource};

use crate::errors::IngestError;

/// Branch used when `current_branch` is not configured, and the environment
/// used when the branch has no mapping.
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: String,
    #[serde(default)]
    pub current_branch: Option<String>,
    /// Deployment branch to environment name.
    #[serde(default)]
    pub branch_map: BTreeMap<String, String>,
    pub environments: BTreeMap<String, EnvironmentConfig>,
    /// Options applied to every load before dataset overrides.
    #[serde(default)]
    pub default_copy_options: OptionSource,
}

impl EngineConfig {
    /// Name of the environment selected by the current branch.
    #[must_use]
    pub fn environment_name(&self) -> &str {
        let branch = self
            .current_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_ENVIRONMENT);
        self.branch_map
            .get(branch)
            .map_or(DEFAULT_ENVIRONMENT, String::as_str)
    }

    /// The active environment and its name.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the selected environment is not
    /// defined.
    pub fn active_environment(&self) -> Result<(&str, &EnvironmentConfig), IngestError> {
        let name = self.environment_name();
        self.environments
            .get(name)
            .map(|env| (name, env))
            .ok_or_else(|| {
                IngestError::config(format!(
                    "environment '{name}' is not defined (available: {})",
                    self.environments
                        .keys()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Per-environment warehouse and stage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub warehouse: WarehouseTarget,
    pub stage: StageConfig,
}

/// Where tables, dataset configuration and audit records live.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseTarget {
    pub database: String,
    /// Schema the target tables are created in.
    pub schema: String,
    #[serde(default = "default_config_schema")]
    pub config_schema: String,
    #[serde(default = "default_audit_schema")]
    pub audit_schema: String,
}

fn default_config_schema() -> String {
    "CONFIG_SCH".to_string()
}

fn default_audit_schema() -> String {
    "AUDIT".to_string()
}

/// Named external stage plus an optional root prefix inside it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub root_path: Option<String>,
}

/// One dataset in a YAML dataset file.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    #[serde(flatten)]
    pub dataset: DatasetConfig,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
