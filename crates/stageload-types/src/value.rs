//! Warehouse row and bind-parameter types.

use std::collections::BTreeMap;

use serde_json::Value;

/// One result row: column name to value.
///
/// Warehouses disagree on identifier case, so lookups go through
/// [`column`] rather than indexing the map directly.
pub type Row = BTreeMap<String, Value>;

/// Bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Structured payload; executors bind it as serialized JSON text.
    Json(Value),
}

impl SqlParam {
    /// Render the parameter as the text most drivers accept for binding.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Json(v) => Some(v.to_string()),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Case-insensitive column lookup. Exact matches win.
#[must_use]
pub fn column<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.get(name).or_else(|| {
        row.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// String column, ignoring nulls.
#[must_use]
pub fn column_str<'a>(row: &'a Row, name: &str) -> Option<&'a str> {
    column(row, name).and_then(Value::as_str)
}

/// Integer column. Accepts JSON numbers and numeric strings, since some
/// drivers return `NUMBER` columns as text.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn column_i64(row: &Row, name: &str) -> Option<i64> {
    match column(row, name)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Column rendered as display text: strings as-is, other non-null values
/// in their JSON form.
#[must_use]
pub fn column_text(row: &Row, name: &str) -> Option<String> {
    match column(row, name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
