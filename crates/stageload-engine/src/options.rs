//! Load option compilation.
//!
//! Option sources are normalized once into [`CopyOptions`]: upper-cased
//! identifier keys mapped to scalar values. Defaults and dataset overrides
//! merge key-wise, then render as one `KEY = VALUE` clause per line in key
//! order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};
use stageload_types::dataset::OptionSource;

use crate::errors::IngestError;
use crate::sql::quote_literal;

static OPTION_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid option key regex"));

/// Scalar option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(&quote_literal(s)),
        }
    }
}

/// Normalized load options keyed by upper-case option name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyOptions(BTreeMap<String, OptionValue>);

impl CopyOptions {
    /// Normalize an option source.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] for undecodable JSON text, non-object
    /// JSON, invalid keys, keys that collide after case folding, or
    /// non-scalar values.
    pub fn from_source(source: &OptionSource) -> Result<Self, IngestError> {
        match source {
            OptionSource::Mapping(map) => Self::from_pairs(map.iter()),
            OptionSource::JsonText(text) if text.trim().is_empty() => Ok(Self::default()),
            OptionSource::JsonText(text) => {
                let value: Value = serde_json::from_str(text).map_err(|e| {
                    IngestError::config(format!("copy options are not valid JSON: {e}"))
                })?;
                match value {
                    Value::Object(map) => Self::from_pairs(map.iter()),
                    Value::Null => Ok(Self::default()),
                    other => Err(IngestError::config(format!(
                        "copy options must be a JSON object, got {}",
                        json_kind(&other)
                    ))),
                }
            }
        }
    }

    fn from_pairs<'a>(
        pairs: impl Iterator<Item = (&'a String, &'a Value)>,
    ) -> Result<Self, IngestError> {
        let mut options = BTreeMap::new();
        for (key, value) in pairs {
            let canonical = canonical_key(key)?;
            let value = match value {
                Value::Bool(b) => OptionValue::Bool(*b),
                Value::Number(n) => OptionValue::Number(n.clone()),
                Value::String(s) => OptionValue::Text(s.clone()),
                other => {
                    return Err(IngestError::config(format!(
                        "copy option '{key}' must be a boolean, number or string, got {}",
                        json_kind(other)
                    )))
                }
            };
            if options.insert(canonical.clone(), value).is_some() {
                return Err(IngestError::config(format!(
                    "copy option '{canonical}' is given more than once"
                )));
            }
        }
        Ok(Self(options))
    }

    /// `defaults` overlaid with `overrides`; overrides win per key.
    #[must_use]
    pub fn merge(defaults: &Self, overrides: &Self) -> Self {
        let mut merged = defaults.0.clone();
        merged.extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(merged)
    }

    /// One `KEY = VALUE` clause per line, keys sorted.
    #[must_use]
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse clauses produced by [`render`](Self::render) back into options.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if a line is not a `KEY = VALUE`
    /// clause.
    pub fn parse_rendered(text: &str) -> Result<Self, IngestError> {
        let mut options = BTreeMap::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (key, raw) = line.split_once(" = ").ok_or_else(|| {
                IngestError::config(format!("malformed option clause '{line}'"))
            })?;
            let value = parse_rendered_value(raw.trim()).ok_or_else(|| {
                IngestError::config(format!("malformed option value in '{line}'"))
            })?;
            options.insert(canonical_key(key.trim())?, value);
        }
        Ok(Self(options))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(&key.to_ascii_uppercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Merge a dataset's options over the run defaults and render the clauses.
///
/// # Errors
///
/// Returns [`IngestError::Config`] if the dataset's options are invalid.
pub fn compile_options(
    defaults: &CopyOptions,
    overrides: &OptionSource,
) -> Result<String, IngestError> {
    let overrides = CopyOptions::from_source(overrides)?;
    Ok(CopyOptions::merge(defaults, &overrides).render())
}

/// Interpret a catalog column as an option source.
///
/// # Errors
///
/// Returns [`IngestError::Config`] for values that are neither an object,
/// a string nor null.
pub fn option_source_from_value(value: Option<&Value>) -> Result<OptionSource, IngestError> {
    match value {
        None | Some(Value::Null) => Ok(OptionSource::default()),
        Some(Value::Object(map)) => Ok(OptionSource::Mapping(map.clone())),
        Some(Value::String(text)) => Ok(OptionSource::JsonText(text.clone())),
        Some(other) => Err(IngestError::config(format!(
            "copy options must be an object or JSON text, got {}",
            json_kind(other)
        ))),
    }
}

fn canonical_key(key: &str) -> Result<String, IngestError> {
    if OPTION_KEY_RE.is_match(key) {
        Ok(key.to_ascii_uppercase())
    } else {
        Err(IngestError::config(format!(
            "copy option key '{key}' is not a plain identifier"
        )))
    }
}

fn parse_rendered_value(raw: &str) -> Option<OptionValue> {
    match raw {
        "TRUE" => return Some(OptionValue::Bool(true)),
        "FALSE" => return Some(OptionValue::Bool(false)),
        _ => {}
    }
    if let Some(body) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return unquote(body).map(OptionValue::Text);
    }
    serde_json::from_str::<Number>(raw).ok().map(OptionValue::Number)
}

fn unquote(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                if chars.next()? != '\'' {
                    return None;
                }
                out.push('\'');
            }
            '\\' => match chars.next()? {
                '\\' => out.push('\\'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                _ => return None,
            },
            other => out.push(other),
        }
    }
    Some(out)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: Value) -> OptionSource {
        match value {
            Value::Object(map) => OptionSource::Mapping(map),
            _ => unreachable!("test helper takes objects"),
        }
    }

    #[test]
    fn test_render_formats_each_value_kind() {
        let opts = CopyOptions::from_source(&mapping(json!({
            "on_error": "CONTINUE",
            "purge": true,
            "size_limit": 1000,
            "force": false,
        })))
        .unwrap();
        assert_eq!(
            opts.render(),
            "FORCE = FALSE\nON_ERROR = 'CONTINUE'\nPURGE = TRUE\nSIZE_LIMIT = 1000"
        );
    }

    #[test]
    fn test_override_wins_after_case_folding() {
        let defaults =
            CopyOptions::from_source(&mapping(json!({"ON_ERROR": "ABORT_STATEMENT", "PURGE": false})))
                .unwrap();
        let rendered =
            compile_options(&defaults, &OptionSource::JsonText(r#"{"on_error": "CONTINUE"}"#.into()))
                .unwrap();
        assert_eq!(rendered, "ON_ERROR = 'CONTINUE'\nPURGE = FALSE");
    }

    #[test]
    fn test_strings_are_quote_escaped() {
        let opts = CopyOptions::from_source(&mapping(json!({"PATTERN": "it's"}))).unwrap();
        assert_eq!(opts.render(), "PATTERN = 'it''s'");
    }

    #[test]
    fn test_invalid_key_rejected() {
        let err = CopyOptions::from_source(&mapping(json!({"PURGE = TRUE; DROP": true}))).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_case_colliding_keys_rejected() {
        let err = CopyOptions::from_source(&mapping(json!({"purge": true, "PURGE": false})))
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_non_scalar_values_rejected() {
        for bad in [json!({"A": null}), json!({"A": [1]}), json!({"A": {"B": 1}})] {
            assert!(CopyOptions::from_source(&mapping(bad)).is_err());
        }
    }

    #[test]
    fn test_json_text_must_be_object() {
        assert!(CopyOptions::from_source(&OptionSource::JsonText("[1,2]".into())).is_err());
        assert!(CopyOptions::from_source(&OptionSource::JsonText("{oops".into())).is_err());
        assert!(CopyOptions::from_source(&OptionSource::JsonText("  ".into()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_rendered_round_trip() {
        let opts = CopyOptions::from_source(&mapping(json!({
            "PATTERN": "a\\'b\nc",
            "SKIP_HEADER": 1,
            "TRIM_SPACE": true,
        })))
        .unwrap();
        assert_eq!(CopyOptions::parse_rendered(&opts.render()).unwrap(), opts);
    }

    #[test]
    fn test_option_source_from_column_value() {
        assert_eq!(option_source_from_value(None).unwrap(), OptionSource::default());
        assert!(matches!(
            option_source_from_value(Some(&json!("{\"PURGE\": true}"))).unwrap(),
            OptionSource::JsonText(_)
        ));
        assert!(option_source_from_value(Some(&json!(42))).is_err());
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let opts = CopyOptions::from_source(&mapping(json!({"on_error": "CONTINUE"}))).unwrap();
        assert_eq!(opts.get("On_Error"), Some(&OptionValue::Text("CONTINUE".into())));
        assert_eq!(opts.len(), 1);
    }
}
