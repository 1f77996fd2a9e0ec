//! Ingestion event construction and persistence.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use stageload_state::AuditStore;
use stageload_types::dataset::DatasetConfig;
use stageload_types::event::IngestionEvent;
use stageload_types::run::{EventId, LoadOutcome, RunId};

use crate::classify::Classification;
use crate::errors::IngestError;

/// Facts an attempt established before it concluded. Fields stay empty
/// when the attempt failed before computing them.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttemptTrace {
    pub table_name: String,
    pub file_path: String,
    pub load_id: Option<String>,
}

/// Identity and timing of one attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptHeader<'a> {
    pub run_id: RunId,
    pub event_id: EventId,
    pub dataset: &'a DatasetConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Build the single event for an attempt from its result.
pub(crate) fn build_event(
    header: AttemptHeader<'_>,
    trace: &AttemptTrace,
    result: &Result<Classification, IngestError>,
) -> IngestionEvent {
    let (outcome, rows_loaded, error) = match result {
        Ok(classification) => (classification.outcome, classification.rows_loaded, None),
        Err(e) => (LoadOutcome::Failed, 0, Some(e.describe())),
    };

    IngestionEvent {
        event_id: header.event_id,
        run_id: header.run_id,
        dataset_id: header.dataset.dataset_id.clone(),
        dataset_name: header.dataset.name.clone(),
        table_name: trace.table_name.clone(),
        file_path: trace.file_path.clone(),
        load_id: trace.load_id.clone(),
        started_at: header.started_at,
        finished_at: header.finished_at,
        outcome,
        rows_loaded,
        error,
        query_tag: header.dataset.query_tag.clone(),
    }
}

/// Persist `event`.
///
/// # Errors
///
/// Returns [`IngestError::Recording`] if the audit store rejects the write.
pub(crate) fn record_event(
    audit: &dyn AuditStore,
    event: &IngestionEvent,
) -> Result<(), IngestError> {
    audit
        .record_event(event)
        .map_err(|e| IngestError::Recording {
            what: format!("event {} for dataset '{}'", event.event_id, event.dataset_name),
            source: anyhow!(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stageload_state::SqliteAuditStore;
    use stageload_types::dataset::{OptionSource, PathSpec};

    fn dataset() -> DatasetConfig {
        DatasetConfig {
            dataset_id: "7".into(),
            name: "orders".into(),
            data_source: Some("shop".into()),
            table_name: "ORDERS".into(),
            file_type: "CSV".into(),
            path: PathSpec::Template("orders/{year}".into()),
            file_name: "orders.csv".into(),
            file_format: "CSV_FMT".into(),
            copy_options: OptionSource::default(),
            query_tag: Some(json!({"team": "finance"})),
        }
    }

    fn header(dataset: &DatasetConfig) -> AttemptHeader<'_> {
        let now = Utc::now();
        AttemptHeader {
            run_id: RunId::generate(),
            event_id: EventId::generate(),
            dataset,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_success_event_carries_classification() {
        let ds = dataset();
        let trace = AttemptTrace {
            table_name: "RAW.LANDING.ORDERS".into(),
            file_path: "@S3/orders/2024/orders.csv".into(),
            load_id: Some("q-1".into()),
        };
        let result = Ok(Classification {
            outcome: LoadOutcome::Loaded,
            rows_loaded: 150,
        });
        let event = build_event(header(&ds), &trace, &result);
        assert_eq!(event.outcome, LoadOutcome::Loaded);
        assert_eq!(event.rows_loaded, 150);
        assert!(event.error.is_none());
        assert_eq!(event.load_id.as_deref(), Some("q-1"));
        assert_eq!(event.query_tag, Some(json!({"team": "finance"})));
    }

    #[test]
    fn test_failure_event_has_error_and_partial_trace() {
        let ds = dataset();
        let result = Err(IngestError::Resolution {
            dataset: "orders".into(),
            message: "unknown placeholder(s) {day}".into(),
        });
        let event = build_event(header(&ds), &AttemptTrace::default(), &result);
        assert_eq!(event.outcome, LoadOutcome::Failed);
        assert_eq!(event.rows_loaded, 0);
        assert_eq!(event.table_name, "");
        assert_eq!(event.file_path, "");
        assert!(event.error.as_deref().is_some_and(|e| e.contains("{day}")));
    }

    #[test]
    fn test_record_event_round_trips_through_store() {
        let store = SqliteAuditStore::in_memory().unwrap();
        let ds = dataset();
        let event = build_event(
            header(&ds),
            &AttemptTrace::default(),
            &Ok(Classification {
                outcome: LoadOutcome::AlreadyLoaded,
                rows_loaded: 0,
            }),
        );
        record_event(&store, &event).unwrap();
        let err = record_event(&store, &event).unwrap_err();
        assert!(matches!(err, IngestError::Recording { .. }));
        assert_eq!(store.events_for_run(event.run_id).unwrap().len(), 1);
    }
}
