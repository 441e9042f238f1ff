//! Participant classification.
//!
//! Turns one participant row plus its resolved joins into a canonical
//! migrated-user record and assigns it one of three shapes:
//!
//! - no resolvable site: the participant cannot be migrated and is parked
//!   in the error study for tracking;
//! - site but no device id: the participant was registered at a site but
//!   never signed in on the source app, so a fresh permanent account is
//!   created for the site to hand out later;
//! - site and device id: an active source-app user, migrated through a
//!   temporary holding account keyed by their device id.

use serde::Serialize;

use crate::core::MigrationConfig;
use crate::password::PasswordGenerator;
use crate::rows::{ParticipantRow, ResolvedJoins};

use anyhow::Result;

/// Every Arc ID is exactly this many characters, zero-padded on the left.
pub const ARC_ID_LENGTH: usize = 6;

/// Site renames that postdate the frozen export format.
const SITE_ALIASES: &[(&str, &str)] = &[
    ("WashingtonUniversityStLouis", "WashUStLouis"),
    ("UniversityofSouthernCalifornia", "USC"),
];

/// Canonical participant record, held in memory for one migration run.
///
/// Invariants: `arc_id` is exactly [`ARC_ID_LENGTH`] characters;
/// `external_id` equals either `arc_id` or `device_id`, never a third
/// value.
#[derive(Debug, Clone, Serialize)]
pub struct MigratedUser {
    /// Canonical six-character participant identifier.
    pub arc_id: String,
    /// External ID for the target-system account.
    pub external_id: String,
    /// Account password.
    pub password: String,
    /// Target-system study identifier (sanitized site name, or the error
    /// study).
    pub study_id: String,
    /// Only present for the study type that collects phone numbers.
    pub phone: Option<String>,
    /// Display name; only populated in QA data sets.
    pub name: Option<String>,
    /// Device id UUID, or the configured no-device sentinel.
    pub device_id: String,
    /// When the device id was created; `None` when there is no device.
    pub device_created_at: Option<f64>,
    /// Sanitized site name, absent for error-classified participants.
    pub site_name: Option<String>,
    /// Email of the rater who registered the participant.
    pub rater_email: Option<String>,
    /// Free-form site notes.
    pub notes: Option<String>,
}

impl MigratedUser {
    /// True when this record represents a temporary data-holding account
    /// keyed by device id.
    #[must_use]
    pub fn is_holding_account(&self) -> bool {
        self.external_id == self.device_id
    }
}

/// Left-zero-pad a raw participant id to [`ARC_ID_LENGTH`], or truncate to
/// the first [`ARC_ID_LENGTH`] characters if longer.
#[must_use]
pub fn fix_participant_id(raw: &str) -> String {
    if raw.chars().count() >= ARC_ID_LENGTH {
        return raw.chars().take(ARC_ID_LENGTH).collect();
    }
    let zeros = "0".repeat(ARC_ID_LENGTH - raw.chars().count());
    format!("{zeros}{raw}")
}

/// Sanitize a site name for use as a target-system study identifier.
///
/// The target system rejects apostrophes, periods, and spaces; known legacy
/// aliases are then translated to their canonical names.
#[must_use]
pub fn sanitize_site_name(site_name: &str) -> String {
    let stripped: String = site_name
        .chars()
        .filter(|c| *c != '\'' && *c != '.' && *c != ' ')
        .collect();
    for (alias, canonical) in SITE_ALIASES {
        if stripped == *alias {
            return (*canonical).to_string();
        }
    }
    stripped
}

/// Classifies participant rows into canonical migrated-user records.
pub struct Classifier<'a> {
    config: &'a MigrationConfig,
    passwords: PasswordGenerator,
}

impl<'a> Classifier<'a> {
    #[must_use]
    pub fn new(config: &'a MigrationConfig) -> Self {
        Self {
            config,
            passwords: PasswordGenerator,
        }
    }

    /// Classify one participant row with its resolved joins.
    pub fn classify(&self, row: &ParticipantRow, joins: &ResolvedJoins<'_>) -> Result<MigratedUser> {
        let arc_id = fix_participant_id(&row.participant_id);
        let notes = joins.notes.and_then(|n| n.note.clone());
        let rater_email = joins.rater.and_then(|r| r.email.clone());
        let phone = joins.phone.and_then(|p| p.phone.clone());
        let device = joins
            .device_id
            .and_then(|d| d.device_id.as_deref().map(|id| (id, d.created_at)));

        let site_name = joins.site.and_then(|s| s.name.as_deref());
        let Some(site_name) = site_name else {
            // Nothing to migrate; park the participant in the error study so
            // the coordinators can track them down.
            tracing::warn!(%arc_id, "could not find site location");
            let prefixed_notes = match notes {
                Some(n) => format!("{} {n}", self.config.missing_site_note),
                None => self.config.missing_site_note.clone(),
            };
            return Ok(MigratedUser {
                external_id: arc_id.clone(),
                password: self
                    .passwords
                    .next_password_of_length(self.config.password_len)?,
                study_id: self.config.error_study_id.clone(),
                phone,
                name: row.name.clone(),
                device_id: device
                    .map_or_else(|| self.config.no_device_id.clone(), |(id, _)| id.to_string()),
                device_created_at: device.and_then(|(_, created_at)| created_at),
                site_name: None,
                rater_email,
                notes: Some(prefixed_notes),
                arc_id,
            });
        };

        let study_id = sanitize_site_name(site_name);

        let Some((device_id, device_created_at)) = device else {
            // Registered at a site but never signed in on the source app;
            // create a permanent account the site can hand out later.
            tracing::info!(%arc_id, "unused account for site {study_id}");
            return Ok(MigratedUser {
                external_id: arc_id.clone(),
                password: self
                    .passwords
                    .next_password_of_length(self.config.password_len)?,
                study_id: study_id.clone(),
                phone,
                name: row.name.clone(),
                device_id: self.config.no_device_id.clone(),
                device_created_at: None,
                site_name: Some(study_id),
                rater_email,
                notes,
                arc_id,
            });
        };

        // Active source-app user. The account created from this record is a
        // temporary holding account: on first launch of the upgraded app the
        // participant authenticates once with their device id and pulls
        // their data across.
        tracing::info!(%arc_id, "migrating as device-id holding account");
        Ok(MigratedUser {
            external_id: device_id.to_string(),
            password: format!("{device_id}{}", self.config.device_password_suffix),
            study_id: study_id.clone(),
            phone,
            name: row.name.clone(),
            device_id: device_id.to_string(),
            device_created_at,
            site_name: Some(study_id),
            rater_email,
            notes,
            arc_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{
        ParticipantDeviceIdRow, ParticipantNotesRow, SiteLocationRow,
    };

    fn config() -> MigrationConfig {
        MigrationConfig::default()
    }

    fn participant(row_id: &str, participant_id: &str) -> ParticipantRow {
        ParticipantRow {
            id: Some(row_id.to_string()),
            participant_id: participant_id.to_string(),
            name: None,
            study_id: None,
        }
    }

    #[test]
    fn test_fix_participant_id_pads_to_six() {
        for raw in ["", "4", "42", "428", "4281", "42815", "428159"] {
            let fixed = fix_participant_id(raw);
            assert_eq!(fixed.len(), ARC_ID_LENGTH);
            assert!(fixed.ends_with(raw));
        }
        assert_eq!(fix_participant_id("42"), "000042");
    }

    #[test]
    fn test_fix_participant_id_truncates_long_ids() {
        assert_eq!(fix_participant_id("1234567"), "123456");
        assert_eq!(fix_participant_id("123456789"), "123456");
    }

    #[test]
    fn test_sanitize_site_name_strips_punctuation() {
        assert_eq!(sanitize_site_name("St. Louis'"), "StLouis");
        assert_eq!(sanitize_site_name("Mayo Clinic"), "MayoClinic");
    }

    #[test]
    fn test_sanitize_site_name_translates_aliases() {
        assert_eq!(
            sanitize_site_name("Washington University St. Louis"),
            "WashUStLouis"
        );
        assert_eq!(
            sanitize_site_name("University of Southern California"),
            "USC"
        );
    }

    #[test]
    fn test_classify_no_site_goes_to_error_study() {
        let cfg = config();
        let classifier = Classifier::new(&cfg);
        let row = participant("1", "42");
        let notes_row = ParticipantNotesRow {
            id: None,
            participant: Some("1".to_string()),
            note: Some("called twice".to_string()),
        };
        let joins = ResolvedJoins {
            notes: Some(&notes_row),
            ..ResolvedJoins::default()
        };

        let user = classifier.classify(&row, &joins).unwrap();
        assert_eq!(user.arc_id, "000042");
        assert_eq!(user.study_id, "Happy-Medium-Errors");
        assert_eq!(user.external_id, "000042");
        assert_eq!(user.device_id, "No-Device-Id");
        assert_eq!(user.password.len(), 9);
        assert_eq!(
            user.notes.as_deref(),
            Some("Could not find site location. called twice")
        );
        assert!(user.site_name.is_none());
    }

    #[test]
    fn test_classify_site_without_device_is_unused_account() {
        let cfg = config();
        let classifier = Classifier::new(&cfg);
        let row = participant("1", "42");
        let site = SiteLocationRow {
            id: Some("s1".to_string()),
            name: Some("St. Louis'".to_string()),
            contact_phone: None,
            contact_email: None,
        };
        let joins = ResolvedJoins {
            site: Some(&site),
            ..ResolvedJoins::default()
        };

        let user = classifier.classify(&row, &joins).unwrap();
        assert_eq!(user.arc_id, "000042");
        assert_eq!(user.study_id, "StLouis");
        assert_eq!(user.external_id, "000042");
        assert_eq!(user.device_id, "No-Device-Id");
        assert!(user.device_created_at.is_none());
        assert!(!user.is_holding_account());
    }

    #[test]
    fn test_classify_device_user_becomes_holding_account() {
        let cfg = config();
        let classifier = Classifier::new(&cfg);
        let row = participant("1", "999999");
        let site = SiteLocationRow {
            id: Some("s1".to_string()),
            name: Some("UCSF".to_string()),
            contact_phone: None,
            contact_email: None,
        };
        let device = ParticipantDeviceIdRow {
            id: None,
            participant: Some("1".to_string()),
            device_id: Some("8bf126cc-f882-4f9c-836b-e09e2cdb9d75".to_string()),
            created_at: Some(1_600_000_000.0),
        };
        let joins = ResolvedJoins {
            site: Some(&site),
            device_id: Some(&device),
            ..ResolvedJoins::default()
        };

        let user = classifier.classify(&row, &joins).unwrap();
        assert_eq!(user.external_id, "8bf126cc-f882-4f9c-836b-e09e2cdb9d75");
        assert_eq!(
            user.password,
            "8bf126cc-f882-4f9c-836b-e09e2cdb9d75aB1!"
        );
        assert_eq!(user.device_created_at, Some(1_600_000_000.0));
        assert!(user.is_holding_account());
    }
}
