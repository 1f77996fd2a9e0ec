//! Load outcome classification from warehouse-reported result rows.
//!
//! Classification is a pure function of the rows the load command returned.
//! An "already loaded" signal from any row wins; otherwise a positive row
//! count means `Loaded`, and anything else is `Partial`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use stageload_types::run::LoadOutcome;
use stageload_types::value::{column_i64, column_str, Row};

/// Matches the warehouse's "nothing to do" status, e.g. "Copy executed with
/// 0 files processed.", without matching "10 files processed".
static ALREADY_LOADED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b0 files? processed").expect("valid already-loaded regex")
});

/// Result of classifying one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: LoadOutcome,
    pub rows_loaded: u64,
}

/// Classify a load from its result rows.
#[must_use]
pub fn classify(rows: &[Row]) -> Classification {
    let already_loaded = rows
        .iter()
        .filter_map(|row| column_str(row, "status"))
        .any(|status| ALREADY_LOADED_RE.is_match(status));
    if already_loaded {
        return Classification {
            outcome: LoadOutcome::AlreadyLoaded,
            rows_loaded: 0,
        };
    }

    let rows_loaded = total_rows_loaded(rows);
    let outcome = if rows_loaded > 0 {
        LoadOutcome::Loaded
    } else {
        LoadOutcome::Partial
    };
    Classification {
        outcome,
        rows_loaded,
    }
}

/// Sum of per-file maxima. A file reported on several rows counts once;
/// rows without a `file` column are counted individually.
fn total_rows_loaded(rows: &[Row]) -> u64 {
    let mut per_file: BTreeMap<&str, u64> = BTreeMap::new();
    let mut unattributed = 0u64;

    for row in rows {
        let Some(count) = column_i64(row, "rows_loaded") else {
            continue;
        };
        let count = u64::try_from(count).unwrap_or(0);
        match column_str(row, "file") {
            Some(file) => {
                let entry = per_file.entry(file).or_default();
                *entry = (*entry).max(count);
            }
            None => unattributed = unattributed.saturating_add(count),
        }
    }

    per_file
        .values()
        .fold(unattributed, |total, count| total.saturating_add(*count))
}
