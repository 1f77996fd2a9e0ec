//! Ingestion error taxonomy.
//!
//! `Config` errors raised while preparing a run abort the whole run before
//! any dataset is attempted. Every other variant is scoped to one dataset:
//! the coordinator catches it at the dataset boundary, records a `FAILED`
//! event, and moves on. `Recording` errors never change an outcome.

/// Categorized ingestion error.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Missing or invalid environment, dataset, or option configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Location template could not be rendered for a dataset.
    #[error("cannot resolve location for dataset '{dataset}': {message}")]
    Resolution { dataset: String, message: String },

    /// Target table could not be inferred, created, or altered.
    #[error("failed to provision table {table}")]
    Provision {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// The load command, its result fetch, or the session tag attach failed.
    #[error("load into {table} failed")]
    Load {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// An event or rejected-record write failed.
    #[error("failed to record {what}")]
    Recording {
        what: String,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Display string followed by every underlying cause, `: `-separated.
    ///
    /// This is the text stored on `FAILED` events.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn describe_includes_cause_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("SQL compilation error"));
        let source = inner.context("COPY INTO RAW.LANDING.ORDERS").unwrap_err();
        let err = IngestError::Load {
            table: "RAW.LANDING.ORDERS".into(),
            source,
        };
        let text = err.describe();
        assert!(text.starts_with("load into RAW.LANDING.ORDERS failed"), "got: {text}");
        assert!(text.contains("COPY INTO RAW.LANDING.ORDERS"), "got: {text}");
        assert!(text.ends_with("SQL compilation error"), "got: {text}");
    }

    #[test]
    fn config_error_display() {
        let err = IngestError::config("no environment 'prod' configured");
        assert_eq!(
            err.to_string(),
            "configuration error: no environment 'prod' configured"
        );
        assert_eq!(err.describe(), err.to_string());
    }

    #[test]
    fn resolution_error_names_dataset() {
        let err = IngestError::Resolution {
            dataset: "orders".into(),
            message: "unknown placeholder {day}".into(),
        };
        assert!(err.to_string().contains("'orders'"));
    }
}
