//! The per-participant migration state machine.
//!
//! Each run recomputes every participant's state from a fresh directory
//! lookup; nothing about prior runs is cached or trusted. That makes the
//! whole pipeline safe to re-run after a partial failure:
//!
//! - account missing: create it and write the staged reports;
//! - account present, data already pulled across (`IS_MIGRATED=true` on a
//!   holding account): delete the staged reports and strip the account back
//!   to its tombstone attributes;
//! - account present, data not yet pulled: overwrite the reports with the
//!   freshly staged versions.

use serde::Serialize;
use serde_json::Value;

use crate::classify::MigratedUser;
use crate::completion::CompletedTestList;
use crate::core::errors::{MigrationError, MigrationResult};
use crate::core::MigrationConfig;
use crate::directory::{
    attributes, truncate_attributes, AttributeMap, NewAccount, ParticipantDirectory, ReportKind,
    ReportStore,
};

/// A participant's standing in the target system, computed fresh from a
/// directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// No account exists for the external ID.
    NotYetCreated,
    /// An account exists and still holds (or awaits) staged data.
    AwaitingMigration { participant_id: String },
    /// A holding account whose data the participant has already pulled
    /// across.
    Migrated { participant_id: String },
}

/// What the state machine did for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Account created and reports written.
    Created,
    /// Reports deleted and attributes reset after a completed migration.
    Cleared,
    /// Reports overwritten on an existing, unmigrated account.
    Rewritten,
}

/// Staged report documents for one participant, already loaded from disk.
#[derive(Debug, Clone, Default)]
pub struct UserReports {
    pub completed_tests: Option<CompletedTestList>,
    pub schedule: Option<Value>,
    pub availability: Option<Value>,
}

/// One participant the batch runner could not migrate.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationFailure {
    pub arc_id: String,
    pub message: String,
}

/// Trailing summary of one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub created: usize,
    pub cleared: usize,
    pub rewritten: usize,
    pub failures: Vec<MigrationFailure>,
}

impl MigrationReport {
    fn record(&mut self, outcome: BatchOutcome) {
        match outcome {
            BatchOutcome::Created => self.created += 1,
            BatchOutcome::Cleared => self.cleared += 1,
            BatchOutcome::Rewritten => self.rewritten += 1,
        }
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.created + self.cleared + self.rewritten + self.failures.len()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives the migration state machine against the target system.
pub struct Migrator<'a> {
    config: &'a MigrationConfig,
    directory: &'a dyn ParticipantDirectory,
    reports: &'a dyn ReportStore,
}

impl<'a> Migrator<'a> {
    #[must_use]
    pub fn new(
        config: &'a MigrationConfig,
        directory: &'a dyn ParticipantDirectory,
        reports: &'a dyn ReportStore,
    ) -> Self {
        Self {
            config,
            directory,
            reports,
        }
    }

    /// Compute the participant's current state from a directory lookup.
    ///
    /// Only device-id holding accounts can be `Migrated`; permanent
    /// accounts keep their data indefinitely, whatever their attributes
    /// claim.
    pub fn state_of(&self, user: &MigratedUser) -> MigrationResult<MigrationState> {
        let Some(existing) = self.directory.lookup_by_external_id(&user.external_id)? else {
            return Ok(MigrationState::NotYetCreated);
        };

        let pulled_across = existing
            .attributes
            .get(attributes::IS_MIGRATED)
            .is_some_and(|v| v == "true");
        if user.is_holding_account() && pulled_across {
            Ok(MigrationState::Migrated {
                participant_id: existing.participant_id,
            })
        } else {
            Ok(MigrationState::AwaitingMigration {
                participant_id: existing.participant_id,
            })
        }
    }

    /// Run the state machine for one participant.
    pub fn migrate_user(
        &self,
        user: &MigratedUser,
        staged: &UserReports,
    ) -> MigrationResult<BatchOutcome> {
        match self.state_of(user)? {
            MigrationState::NotYetCreated => {
                tracing::info!(arc_id = %user.arc_id, "creating account");
                let account = NewAccount {
                    study_id: user.study_id.clone(),
                    external_id: user.external_id.clone(),
                    password: user.password.clone(),
                    phone: user.phone.clone(),
                    attributes: self.build_attributes(user),
                };
                let participant_id = self.directory.create_participant(&account)?;
                self.write_reports(&participant_id, staged)?;
                Ok(BatchOutcome::Created)
            }
            MigrationState::Migrated { participant_id } => {
                tracing::info!(arc_id = %user.arc_id, "migration complete, clearing staged data");
                for kind in ReportKind::ALL {
                    self.reports.delete_all_reports(&participant_id, kind)?;
                }
                let mut tombstone = AttributeMap::new();
                tombstone.insert(attributes::ARC_ID.to_string(), user.arc_id.clone());
                tombstone.insert(attributes::IS_MIGRATED.to_string(), "true".to_string());
                self.directory.update_attributes(&participant_id, &tombstone)?;
                Ok(BatchOutcome::Cleared)
            }
            MigrationState::AwaitingMigration { participant_id } => {
                tracing::info!(arc_id = %user.arc_id, "account exists, rewriting reports");
                self.write_reports(&participant_id, staged)?;
                Ok(BatchOutcome::Rewritten)
            }
        }
    }

    /// Run the whole batch, processing participants independently.
    ///
    /// `load_reports` supplies each participant's staged documents; a load
    /// or migrate failure is recorded and the batch moves on.
    pub fn migrate_batch<F>(&self, users: &[MigratedUser], mut load_reports: F) -> MigrationReport
    where
        F: FnMut(&MigratedUser) -> MigrationResult<UserReports>,
    {
        let mut report = MigrationReport::default();

        for user in users {
            let result = load_reports(user).and_then(|staged| self.migrate_user(user, &staged));
            match result {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    tracing::error!(arc_id = %user.arc_id, error = %err, "migration failed");
                    report.failures.push(MigrationFailure {
                        arc_id: user.arc_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            attempted = report.attempted(),
            failed = report.failures.len(),
            "batch complete"
        );
        report
    }

    /// Migrate a single participant located by device ID.
    pub fn migrate_by_device_id<F>(
        &self,
        device_id: &str,
        users: &[MigratedUser],
        mut load_reports: F,
    ) -> MigrationResult<BatchOutcome>
    where
        F: FnMut(&MigratedUser) -> MigrationResult<UserReports>,
    {
        let user = users
            .iter()
            .find(|u| u.device_id == device_id)
            .ok_or_else(|| MigrationError::ParticipantNotFound {
                external_id: device_id.to_string(),
            })?;
        let staged = load_reports(user)?;
        self.migrate_user(user, &staged)
    }

    fn build_attributes(&self, user: &MigratedUser) -> AttributeMap {
        let mut attrs = AttributeMap::new();
        attrs.insert(attributes::ARC_ID.to_string(), user.arc_id.clone());
        attrs.insert(
            attributes::RATER_EMAIL.to_string(),
            user.rater_email
                .clone()
                .unwrap_or_else(|| self.config.no_rater_email.clone()),
        );
        if let Some(notes) = &user.notes {
            attrs.insert(attributes::SITE_NOTES.to_string(), notes.clone());
        }
        if let Some(phone) = &user.phone {
            attrs.insert(attributes::PHONE_NUMBER.to_string(), phone.clone());
        }
        if user.is_holding_account() {
            attrs.insert(attributes::IS_MIGRATED.to_string(), "false".to_string());
        } else {
            // Permanent accounts carry their credentials as a verification
            // code so site staff can release them to the participant.
            attrs.insert(
                attributes::VERIFICATION_CODE.to_string(),
                user.password.clone(),
            );
        }
        truncate_attributes(attrs, self.config.attribute_max_len)
    }

    fn write_reports(&self, participant_id: &str, staged: &UserReports) -> MigrationResult<()> {
        if let Some(completed) = &staged.completed_tests {
            let value = serde_json::to_value(completed).map_err(anyhow::Error::from)?;
            self.reports
                .write_singleton_report(participant_id, ReportKind::CompletedTests, &value)?;
        }
        if let Some(schedule) = &staged.schedule {
            self.reports
                .write_singleton_report(participant_id, ReportKind::TestSchedule, schedule)?;
        }
        if let Some(availability) = &staged.availability {
            self.reports
                .write_singleton_report(participant_id, ReportKind::Availability, availability)?;
        }
        Ok(())
    }
}
