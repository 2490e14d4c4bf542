//! Domain types and pure rules for the report workflow orchestrator.
//!
//! Nothing in this crate performs I/O; the database, worker client and
//! orchestrator crates build on these definitions.

pub mod error;
pub mod job;
pub mod job_events;
pub mod progress;
pub mod report;
pub mod types;
pub mod workflow;
