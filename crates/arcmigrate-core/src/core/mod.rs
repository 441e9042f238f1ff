//! Service layer for arcmigrate-core.
//!
//! Holds the immutable run configuration and the migration service that
//! drives the per-participant state machine against the target system.

pub mod errors;
pub mod migrate;

pub use errors::{MigrationError, MigrationResult};
pub use migrate::{
    BatchOutcome, MigrationFailure, MigrationReport, MigrationState, Migrator, UserReports,
};

/// Immutable configuration for one migration run.
///
/// The system this replaces kept these as global mutable statics; here they
/// are passed explicitly into each component at construction time.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Study ID that collects participants with no resolvable site.
    pub error_study_id: String,
    /// Sentinel device id for participants who never used the source app.
    pub no_device_id: String,
    /// Rater email attribute value used when no rater was resolved.
    pub no_rater_email: String,
    /// Static suffix appended to a device id so the resulting password
    /// satisfies the target system's complexity rules.
    pub device_password_suffix: String,
    /// Note text prefixed when a participant has no resolvable site.
    pub missing_site_note: String,
    /// Maximum length of any account attribute value; longer values are
    /// truncated before transmission.
    pub attribute_max_len: usize,
    /// Generated password length for non-device accounts.
    pub password_len: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            error_study_id: "Happy-Medium-Errors".to_string(),
            no_device_id: "No-Device-Id".to_string(),
            no_rater_email: "No rater assigned yet".to_string(),
            device_password_suffix: "aB1!".to_string(),
            missing_site_note: "Could not find site location.".to_string(),
            attribute_max_len: 255,
            password_len: 9,
        }
    }
}
