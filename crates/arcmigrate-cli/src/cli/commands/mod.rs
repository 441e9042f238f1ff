//! CLI command implementations.

pub mod helpers;
pub mod migrate;
pub mod reschedule;
