//! External interfaces to the target system.
//!
//! The migration state machine talks to the participant directory and the
//! report store only through these traits. The CLI ships a filesystem-backed
//! implementation for mirror runs; the HTTP client for the live system
//! implements the same pair out of tree.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::MigrationResult;

/// Account attribute keys understood by the target system.
pub mod attributes {
    pub const ARC_ID: &str = "ARC_ID";
    pub const RATER_EMAIL: &str = "RATER_EMAIL";
    pub const SITE_NOTES: &str = "SITE_NOTES";
    pub const VERIFICATION_CODE: &str = "VERIFICATION_CODE";
    pub const PHONE_NUMBER: &str = "PHONE_NUMBER";
    pub const IS_MIGRATED: &str = "IS_MIGRATED";
}

/// Account attributes, ordered for stable serialization.
pub type AttributeMap = BTreeMap<String, String>;

/// The singleton report documents stored per participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Reconciled completion list.
    CompletedTests,
    /// Raw test-session schedule document.
    TestSchedule,
    /// Raw wake-sleep availability document.
    Availability,
}

impl ReportKind {
    pub const ALL: [Self; 3] = [Self::CompletedTests, Self::TestSchedule, Self::Availability];

    /// Report identifier in the target system.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompletedTests => "CompletedTests",
            Self::TestSchedule => "TestSchedule",
            Self::Availability => "Availability",
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant record as the directory reports it.
#[derive(Debug, Clone)]
pub struct DirectoryParticipant {
    /// Directory-assigned opaque identifier.
    pub participant_id: String,
    pub external_id: String,
    pub study_id: String,
    pub attributes: AttributeMap,
}

/// Everything needed to create one directory account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub study_id: String,
    pub external_id: String,
    pub password: String,
    pub phone: Option<String>,
    pub attributes: AttributeMap,
}

/// Participant accounts in the target system.
pub trait ParticipantDirectory {
    /// Look up a participant by external ID. Absence is a valid outcome.
    fn lookup_by_external_id(
        &self,
        external_id: &str,
    ) -> MigrationResult<Option<DirectoryParticipant>>;

    /// Create an account, returning the directory-assigned participant ID.
    fn create_participant(&self, account: &NewAccount) -> MigrationResult<String>;

    /// Replace a participant's attribute map in full.
    fn update_attributes(
        &self,
        participant_id: &str,
        attributes: &AttributeMap,
    ) -> MigrationResult<()>;
}

/// Singleton report documents attached to participants.
pub trait ReportStore {
    /// Read a participant's report of the given kind, if stored.
    fn read_singleton_report(
        &self,
        participant_id: &str,
        kind: ReportKind,
    ) -> MigrationResult<Option<Value>>;

    /// Write (or overwrite) a participant's report of the given kind.
    fn write_singleton_report(
        &self,
        participant_id: &str,
        kind: ReportKind,
        report: &Value,
    ) -> MigrationResult<()>;

    /// Delete every stored report of the given kind. Absence is not an
    /// error.
    fn delete_all_reports(&self, participant_id: &str, kind: ReportKind) -> MigrationResult<()>;
}

/// Truncate an attribute value to the directory's maximum length,
/// counting characters rather than bytes.
#[must_use]
pub fn truncate_attribute(value: &str, max_len: usize) -> String {
    value.chars().take(max_len).collect()
}

/// Truncate every value in an attribute map.
#[must_use]
pub fn truncate_attributes(attributes: AttributeMap, max_len: usize) -> AttributeMap {
    attributes
        .into_iter()
        .map(|(key, value)| (key, truncate_attribute(&value, max_len)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_kind_identifiers() {
        assert_eq!(ReportKind::CompletedTests.as_str(), "CompletedTests");
        assert_eq!(ReportKind::TestSchedule.as_str(), "TestSchedule");
        assert_eq!(ReportKind::Availability.as_str(), "Availability");
        assert_eq!(ReportKind::ALL.len(), 3);
    }

    #[test]
    fn test_truncate_attribute_counts_chars() {
        assert_eq!(truncate_attribute("short", 255), "short");
        let long = "x".repeat(300);
        assert_eq!(truncate_attribute(&long, 255).len(), 255);
        // Multi-byte characters count as one each.
        assert_eq!(truncate_attribute("ééééé", 3), "ééé");
    }

    #[test]
    fn test_truncate_attributes_applies_to_every_value() {
        let mut attrs = AttributeMap::new();
        attrs.insert(attributes::SITE_NOTES.to_string(), "n".repeat(400));
        attrs.insert(attributes::ARC_ID.to_string(), "000042".to_string());

        let truncated = truncate_attributes(attrs, 255);
        assert_eq!(truncated[attributes::SITE_NOTES].len(), 255);
        assert_eq!(truncated[attributes::ARC_ID], "000042");
    }
}
