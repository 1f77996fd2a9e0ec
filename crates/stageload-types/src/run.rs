//! Run-level model types: identifiers, load outcomes, and aggregate stats.
//!
//! Pure data types shared by the engine and the audit store so both sides
//! agree on wire strings without a dependency cycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier shared by every event written during one coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh random run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one dataset attempt; rejected records point back at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a fresh random event id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Load outcome
// ---------------------------------------------------------------------------

/// Terminal state of one dataset attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadOutcome {
    /// New rows landed in the table.
    Loaded,
    /// The warehouse skipped the file because it was loaded before.
    AlreadyLoaded,
    /// The load completed without loading any rows and without an
    /// already-loaded signal.
    Partial,
    /// The attempt raised before an outcome could be classified.
    Failed,
}

impl LoadOutcome {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "LOADED",
            Self::AlreadyLoaded => "ALREADY_LOADED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored outcome string is not one of the four states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOutcome(pub String);

impl fmt::Display for UnknownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown load outcome '{}'", self.0)
    }
}

impl std::error::Error for UnknownOutcome {}

impl FromStr for LoadOutcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOADED" => Ok(Self::Loaded),
            "ALREADY_LOADED" => Ok(Self::AlreadyLoaded),
            "PARTIAL" => Ok(Self::Partial),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownOutcome(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

/// Aggregate counters for one coordinator invocation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub files_attempted: u64,
    pub files_loaded: u64,
    pub files_already_loaded: u64,
    pub files_partial: u64,
    pub files_failed: u64,
    /// Newly loaded rows across all `Loaded` datasets.
    pub rows_loaded: u64,
    /// Event or rejection writes that failed. Outcomes are unaffected.
    pub recording_failures: u64,
}

impl RunStats {
    /// Count a dataset whose attempt has started.
    pub fn begin_attempt(&mut self) {
        self.files_attempted += 1;
    }

    /// Count the terminal outcome of the current attempt.
    pub fn record_outcome(&mut self, outcome: LoadOutcome, rows_loaded: u64) {
        match outcome {
            LoadOutcome::Loaded => self.files_loaded += 1,
            LoadOutcome::AlreadyLoaded => self.files_already_loaded += 1,
            LoadOutcome::Partial => self.files_partial += 1,
            LoadOutcome::Failed => self.files_failed += 1,
        }
        self.rows_loaded = self.rows_loaded.saturating_add(rows_loaded);
    }

    /// `files_attempted` equals the sum of the outcome counters.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.files_attempted
            == self.files_loaded + self.files_already_loaded + self.files_partial + self.files_failed
    }
}
