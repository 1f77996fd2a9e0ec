//! Path resolution: dataset path + file name + environment stage and root
//! into the concrete staged location of one file.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use stageload_types::dataset::{DatasetConfig, PathSpec};

use crate::config::types::StageConfig;
use crate::errors::IngestError;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid placeholder regex"));

/// Year and month a run loads data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPeriod {
    year: i32,
    month: u32,
}

impl LoadPeriod {
    /// Returns `None` unless `month` is in `1..=12` and `year` has at most
    /// four digits.
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((1..=12).contains(&month) && (0..=9999).contains(&year)).then_some(Self { year, month })
    }

    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.month
    }
}

/// Concrete location of one dataset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Rendered dataset path, no leading or trailing slash.
    pub prefix: String,
    /// Root + prefix + file name, relative to the stage.
    pub file_path: String,
    /// Stage reference + file path, as used in `FROM '...'`.
    pub stage_path: String,
}

/// Normalize a stage name to the `@NAME` reference form.
#[must_use]
pub fn normalize_stage(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('/');
    if trimmed.starts_with('@') {
        trimmed.to_string()
    } else {
        format!("@{trimmed}")
    }
}

/// Render `{year}` and `{month}` placeholders.
///
/// # Errors
///
/// Returns every unknown placeholder found, in order of appearance.
pub fn render_template(template: &str, period: LoadPeriod) -> Result<String, Vec<String>> {
    let mut unknown = Vec::new();
    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &regex::Captures<'_>| {
        match &caps[1] {
            "year" => format!("{:04}", period.year),
            "month" => format!("{:02}", period.month),
            _ => {
                unknown.push(caps[0].to_string());
                String::new()
            }
        }
    });
    let rendered = rendered.into_owned();
    if unknown.is_empty() {
        Ok(rendered)
    } else {
        Err(unknown)
    }
}

/// Join path segments with `/`, dropping empty segments so the result has
/// no leading, trailing or doubled separators.
fn join_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split('/'))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve where `dataset`'s file lives for `period`.
///
/// # Errors
///
/// Returns [`IngestError::Resolution`] for unknown template placeholders or
/// an empty file name.
pub fn resolve_location(
    dataset: &DatasetConfig,
    stage: &StageConfig,
    period: LoadPeriod,
) -> Result<ResolvedLocation, IngestError> {
    let resolution_error = |message: String| IngestError::Resolution {
        dataset: dataset.name.clone(),
        message,
    };

    let file_name = dataset.file_name.trim().trim_matches('/');
    if file_name.is_empty() {
        return Err(resolution_error("file name is empty".to_string()));
    }

    let rendered = match &dataset.path {
        PathSpec::Template(template) => render_template(template, period).map_err(|unknown| {
            resolution_error(format!(
                "unknown placeholder(s) {} in template '{template}'",
                unknown.join(", ")
            ))
        })?,
        PathSpec::Literal(literal) => literal.clone(),
    };

    let prefix = join_segments([rendered.as_str()]);
    let root = stage.root_path.as_deref().unwrap_or_default();
    let file_path = join_segments([root, prefix.as_str(), file_name]);
    let stage_path = format!("{}/{file_path}", normalize_stage(&stage.name));

    Ok(ResolvedLocation {
        prefix,
        file_path,
        stage_path,
    })
}
