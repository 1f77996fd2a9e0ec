//! Shared stageload model types: datasets, warehouse rows, audit events, and
//! run statistics.
//!
//! Kept free of I/O so both the engine and the audit store can depend on it.

pub mod dataset;
pub mod event;
pub mod run;
pub mod value;
