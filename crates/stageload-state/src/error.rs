//! Audit store error types.

/// Errors produced by [`AuditStore`](crate::AuditStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying storage failure, optionally tagged with the operation that
    /// raised it.
    #[error("audit backend error{}: {source}", context_suffix(.context))]
    Backend {
        context: Option<&'static str>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stored value could not be decoded back into a model type.
    #[error("corrupt audit row: {0}")]
    Decode(String),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("audit store lock poisoned")]
    LockPoisoned,
}

fn context_suffix(context: &Option<&'static str>) -> String {
    context.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl StateError {
    /// Wrap a backend error without operation context.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend {
            context: None,
            source: Box::new(err),
        }
    }

    /// Wrap a backend error with the operation that raised it.
    pub fn backend_context(
        context: &'static str,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: Some(context),
            source: Box::new(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
