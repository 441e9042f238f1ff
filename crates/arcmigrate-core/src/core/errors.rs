//! Typed error types for the arcmigrate-core service layer.

use thiserror::Error;

/// Result type alias for core service operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors that can occur in the arcmigrate-core service layer.
///
/// Lookups that find nothing are not errors here; they are `Option::None`
/// branch values consumed by classification and the migration state machine.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Two entries with the same Arc ID survived deduplication. The list was
    /// corrupted outside the resolver; never silently re-resolve.
    #[error("Duplicate Arc ID {arc_id} survived deduplication")]
    DuplicateArcId { arc_id: String },

    /// One or more export files failed to deserialize. Accumulated across
    /// the whole file set and raised once, after attempting every file.
    #[error("Failed to parse file(s): {}", files.join(", "))]
    ParseFailures { files: Vec<String> },

    /// A participant that an operator named does not exist in the directory.
    #[error("No participant found for external ID {external_id}")]
    ParticipantNotFound { external_id: String },

    /// The participant exists but has no stored schedule report.
    #[error("No {kind} report stored for participant {participant_id}")]
    ReportNotFound {
        participant_id: String,
        kind: String,
    },

    /// The stored time-zone offset could not be parsed in any accepted form.
    #[error("Invalid time zone offset: {offset:?}")]
    InvalidZoneOffset { offset: String },

    /// An operator-supplied calendar date was not YYYY-MM-DD.
    #[error("Invalid date {date:?}, expected YYYY-MM-DD")]
    InvalidDate { date: String },

    /// The selected test cycle has no sessions to reschedule.
    #[error("Test cycle {cycle} has no sessions")]
    EmptyCycle { cycle: u32 },

    /// The selected test cycle has no day-0/day-1 anchor session.
    #[error("Test cycle {cycle} has no first session to anchor the shift")]
    NoAnchorSession { cycle: u32 },

    /// A network or API failure against the target system, or an internal
    /// I/O failure.
    #[error(transparent)]
    External(#[from] anyhow::Error),
}
