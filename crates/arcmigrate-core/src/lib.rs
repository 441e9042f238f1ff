//! arcmigrate-core — domain logic for the Arc participant migration tool.
//!
//! This crate owns the row model and join resolution over the legacy
//! platform's JSON table exports, participant classification and
//! deduplication, the at-most-once migration state machine against the
//! target platform, completed-test reconciliation, and the schedule
//! rescheduling engine.

pub mod classify;
pub mod completion;
pub mod core;
pub mod dedup;
pub mod directory;
pub mod password;
pub mod reschedule;
pub mod rows;
pub mod staging;
