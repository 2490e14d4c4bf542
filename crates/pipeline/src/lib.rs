//! Orchestration of the six-step report workflow.
//!
//! - [`dispatcher`] hands jobs to the external worker.
//! - [`monitor`] follows a job's progress records to completion.
//! - [`controller`] persists the workflow step of a project.
//! - [`coordinator`] runs steps 2 to 6 on top of the three above.
//! - [`guard`] holds navigation away from an unfinished workflow.
//!
//! Storage is reached only through the traits in [`store`].

pub mod actions;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod dispatcher;
pub mod guard;
pub mod memory;
pub mod monitor;
pub mod orchestrator;
pub mod postgres;
pub mod store;
pub mod work;

pub use orchestrator::{Orchestrator, Stores};
