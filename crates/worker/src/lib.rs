//! Client for the external analysis/generation worker.
//!
//! The worker is opaque: it accepts a dispatch request, acknowledges
//! receipt, and later appends progress records for the job on its own.
//! This crate covers the request side ([`api`], [`request`]) and the
//! backoff schedule used when re-establishing progress subscriptions
//! ([`backoff`]).

pub mod api;
pub mod backoff;
pub mod request;
