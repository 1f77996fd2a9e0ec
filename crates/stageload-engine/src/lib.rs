//! Ingestion run engine for the stageload workspace.
//!
//! Loads dated, path-templated staged files into warehouse tables and
//! records one audit event per dataset attempt so repeated runs are safe.

pub mod audit;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod errors;
pub(crate) mod events;
pub mod load;
pub mod location;
pub mod options;
pub mod orchestrator;
pub mod plan;
pub mod provision;
pub(crate) mod rejections;
pub mod sql;
pub mod warehouse;

// Re-export public API for convenience
pub use audit::WarehouseAuditStore;
pub use catalog::{FileCatalog, WarehouseCatalog};
pub use errors::IngestError;
pub use orchestrator::RunCoordinator;
pub use provision::WarehouseSchemaInference;
pub use rejections::WarehouseLoadValidator;
pub use warehouse::{
    Clock, DatasetSource, FixedClock, InferredColumn, LoadValidator, RejectedRow,
    SchemaInference, Session, SystemClock,
};
