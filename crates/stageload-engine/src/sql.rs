//! Identifier validation and literal quoting for generated warehouse SQL.
//!
//! Values travel as bound parameters wherever the warehouse accepts them.
//! Table-function arguments and DDL cannot be bound, so those paths go
//! through the quoting helpers here.

use std::fmt;

const MAX_IDENTIFIER_LEN: usize = 255;

/// Validate an unquoted warehouse identifier: letters, digits, `_` and `$`,
/// starting with a letter or underscore.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("identifier must not be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier '{name}' exceeds maximum length of {MAX_IDENTIFIER_LEN} bytes"
        ));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(format!(
                "identifier '{name}' must start with a letter or underscore"
            ));
        }
    }

    if let Some(bad) = chars.find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_' && *ch != '$') {
        return Err(format!("identifier '{name}' contains invalid character '{bad}'"));
    }

    Ok(())
}

/// Validate a dotted object name (`STAGE`, `SCHEMA.STAGE`, `DB.SCHEMA.STAGE`).
///
/// # Errors
///
/// Returns a description of the first invalid part.
pub fn validate_object_name(name: &str) -> Result<(), String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 3 {
        return Err(format!("object name '{name}' has more than three parts"));
    }
    parts.into_iter().try_for_each(validate_identifier)
}

/// Single-quoted string literal. Quotes are doubled and backslashes
/// escaped, so the value cannot terminate the literal early. Line breaks
/// become `\n` / `\r` escapes to keep the literal on one line.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Double-quoted identifier with embedded `"` doubled. Used for inferred
/// column names, which may contain arbitrary characters.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualified `DATABASE.SCHEMA.TABLE` reference with validated parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    database: String,
    schema: String,
    table: String,
}

impl TableRef {
    /// Build a table reference, validating every part.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid part.
    pub fn new(database: &str, schema: &str, table: &str) -> Result<Self, String> {
        let (database, schema, table) = (database.trim(), schema.trim(), table.trim());
        validate_identifier(database)?;
        validate_identifier(schema)?;
        validate_identifier(table)?;
        Ok(Self {
            database: database.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}
