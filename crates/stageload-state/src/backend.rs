//! Audit store trait definition.
//!
//! [`AuditStore`] defines the storage contract for ingestion events and the
//! rejected records linked to them. Model types live in
//! [`stageload_types::event`].

use stageload_types::event::{IngestionEvent, RejectedRecord};
use stageload_types::run::{EventId, RunId};

use crate::error;

/// Storage contract for ingestion audit records.
///
/// Records are append-only: nothing here updates or deletes a row.
/// Implementations must be `Send + Sync` for use behind `Arc<dyn AuditStore>`.
pub trait AuditStore: Send + Sync {
    /// Persist one ingestion event.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn record_event(&self, event: &IngestionEvent) -> error::Result<()>;

    /// Persist rejected records. Returns the count inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_rejected_records(&self, records: &[RejectedRecord]) -> error::Result<u64>;

    /// Events written for one run, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn events_for_run(&self, run_id: RunId) -> error::Result<Vec<IngestionEvent>>;

    /// Rejected records linked to one event.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn rejected_records_for_event(&self, event_id: EventId)
        -> error::Result<Vec<RejectedRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn AuditStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn AuditStore) {}
    }
}
