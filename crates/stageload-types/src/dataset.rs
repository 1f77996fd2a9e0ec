//! Dataset definitions consumed by the run engine.
//!
//! A [`DatasetConfig`] identifies one ingestable file: where it lives on the
//! stage, which table it lands in, and how the warehouse should load it.
//! Records are sourced externally and treated as immutable for a run.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque dataset identifier (catalog primary key or ad-hoc request id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Create a new dataset identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DatasetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a dataset's file lives, relative to the stage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSpec {
    /// Prefix with `{year}` / `{month}` placeholders, rendered at run time.
    Template(String),
    /// Prefix used verbatim, no substitution. Ad-hoc requests carry these.
    Literal(String),
}

impl PathSpec {
    /// Borrow the raw, unrendered path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Template(s) | Self::Literal(s) => s,
        }
    }
}

/// Load options as they arrive from configuration.
///
/// Catalog rows may hold options either as a native object or as JSON text;
/// both are normalized once by the option compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionSource {
    Mapping(Map<String, Value>),
    JsonText(String),
}

impl Default for OptionSource {
    fn default() -> Self {
        Self::Mapping(Map::new())
    }
}

/// One ingestable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub dataset_id: DatasetId,
    pub name: String,
    /// Logical source system, used by [`RunSelector::Source`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    pub table_name: String,
    /// Declared file type (e.g. `CSV`, `JSON`, `PARQUET`).
    pub file_type: String,
    pub path: PathSpec,
    pub file_name: String,
    /// Named warehouse file format object.
    pub file_format: String,
    #[serde(default)]
    pub copy_options: OptionSource,
    /// Arbitrary metadata attached to the session while this dataset loads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_tag: Option<Value>,
}

impl DatasetConfig {
    /// Schemaless datasets land in a single `VARIANT` column instead of an
    /// inferred tabular schema.
    #[must_use]
    pub fn is_schemaless(&self) -> bool {
        self.file_type.trim().eq_ignore_ascii_case("JSON")
    }

    #[must_use]
    pub fn is_adhoc(&self) -> bool {
        matches!(self.path, PathSpec::Literal(_))
    }
}

/// Which datasets a run should pick up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunSelector {
    /// Every active dataset in the catalog.
    AllActive,
    /// Active datasets belonging to one source system.
    Source(String),
    /// A single pending ad-hoc request.
    Adhoc(String),
}

impl fmt::Display for RunSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllActive => f.write_str("all"),
            Self::Source(source) => write!(f, "source:{source}"),
            Self::Adhoc(id) => write!(f, "adhoc:{id}"),
        }
    }
}
