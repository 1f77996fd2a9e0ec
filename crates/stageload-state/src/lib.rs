//! Ingestion audit persistence for the stageload engine.
//!
//! Provides the [`AuditStore`] trait and a [`SqliteAuditStore`]
//! implementation for ingestion events and rejected-record diagnostics.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::AuditStore;
pub use error::StateError;
pub use sqlite::SqliteAuditStore;
