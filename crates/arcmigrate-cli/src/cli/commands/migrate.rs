//! Implementation of `arcmigrate migrate` and `arcmigrate migrate-one`.

use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use arcmigrate_core::core::{BatchOutcome, MigrationConfig, Migrator};

use crate::cli::commands::helpers::{load_reports, stage_export};
use crate::output::{Formatter, OutputFormat};
use crate::store::MirrorStore;

/// Serializable output for the migrate-one command.
#[derive(Serialize)]
struct MigrateOneOutput {
    arc_id: Option<String>,
    device_id: String,
    outcome: BatchOutcome,
}

/// Run the full batch migration against the mirror store.
pub fn run_migrate(export_dir: &Path, store_root: &Path, format: OutputFormat) -> Result<()> {
    let config = MigrationConfig::default();
    let staged = stage_export(export_dir, &config)?;
    let store = MirrorStore::open(store_root)?;
    let migrator = Migrator::new(&config, &store, &store);

    let report = migrator.migrate_batch(&staged.users, |user| {
        load_reports(user, &staged.data_by_arc_id)
    });
    Formatter::new(format).print(&report)?;

    if !report.is_clean() {
        bail!("{} participant(s) failed to migrate", report.failures.len());
    }
    Ok(())
}

/// Migrate a single participant located by device ID.
pub fn run_migrate_one(
    device_id: &str,
    export_dir: &Path,
    store_root: &Path,
    format: OutputFormat,
) -> Result<()> {
    let config = MigrationConfig::default();
    let staged = stage_export(export_dir, &config)?;
    let store = MirrorStore::open(store_root)?;
    let migrator = Migrator::new(&config, &store, &store);

    let outcome = migrator.migrate_by_device_id(device_id, &staged.users, |user| {
        load_reports(user, &staged.data_by_arc_id)
    })?;

    let arc_id = staged
        .users
        .iter()
        .find(|u| u.device_id == device_id)
        .map(|u| u.arc_id.clone());
    Formatter::new(format).print(&MigrateOneOutput {
        arc_id,
        device_id: device_id.to_string(),
        outcome,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::helpers::{
        PARTICIPANTS_DIR, SCHEDULES_DIR, TEST_SESSIONS_DIR,
    };
    use arcmigrate_core::directory::{attributes, ParticipantDirectory, ReportKind, ReportStore};
    use std::fs;
    use tempfile::tempdir;

    fn write_export(export: &Path) {
        let participants = export.join(PARTICIPANTS_DIR).join("export-1");
        fs::create_dir_all(&participants).unwrap();
        fs::write(
            participants.join("hasd-participant-9-21-21.json"),
            r#"[{"id":"1","participant_id":"42"},{"id":"2","participant_id":"7"}]"#,
        )
        .unwrap();
        fs::write(
            participants.join("hasd-site_location-9-21-21.json"),
            r#"[{"id":"s1","name":"St. Louis'"}]"#,
        )
        .unwrap();
        fs::write(
            participants.join("hasd-participant_site_location-9-21-21.json"),
            r#"[{"id":"l1","participant":"1","site_location":"s1"}]"#,
        )
        .unwrap();
        fs::write(
            participants.join("hasd-participant_device-9-21-21.json"),
            r#"[{"id":"d1","participant":"1","device_id":"dev-1","created_at":1600000000}]"#,
        )
        .unwrap();

        let sessions = export.join(TEST_SESSIONS_DIR);
        fs::create_dir_all(&sessions).unwrap();
        fs::write(
            sessions.join("one.json"),
            r#"{"participant_id":"42","finished_session":1,"week":0,"day":0,"session":0,"session_date":100}"#,
        )
        .unwrap();

        let schedules = export.join(SCHEDULES_DIR);
        fs::create_dir_all(&schedules).unwrap();
        fs::write(
            schedules.join("000042 schedule 2020-02-20T12-31-13Z.json"),
            r#"{"participant_id":"42","sessions":[]}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_run_migrate_creates_accounts_and_reports() {
        let export = tempdir().unwrap();
        let store_root = tempdir().unwrap();
        write_export(export.path());

        run_migrate(export.path(), store_root.path(), OutputFormat::Text).unwrap();

        let store = MirrorStore::open(store_root.path()).unwrap();
        // 000042 has a device, so its account is keyed by device id.
        let holding = store.lookup_by_external_id("dev-1").unwrap().unwrap();
        assert_eq!(holding.attributes[attributes::ARC_ID], "000042");
        assert_eq!(holding.attributes[attributes::IS_MIGRATED], "false");

        // 000007 has no site, so it lands in the error study.
        let parked = store.lookup_by_external_id("000007").unwrap().unwrap();
        assert_eq!(parked.study_id, "Happy-Medium-Errors");

        let completed = store
            .read_singleton_report(&holding.participant_id, ReportKind::CompletedTests)
            .unwrap()
            .unwrap();
        assert_eq!(completed["completed"][0]["week"], 0);
        assert!(store
            .read_singleton_report(&holding.participant_id, ReportKind::TestSchedule)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_run_migrate_is_idempotent() {
        let export = tempdir().unwrap();
        let store_root = tempdir().unwrap();
        write_export(export.path());

        run_migrate(export.path(), store_root.path(), OutputFormat::Text).unwrap();
        run_migrate(export.path(), store_root.path(), OutputFormat::Text).unwrap();

        let accounts = fs::read_dir(store_root.path().join("participants"))
            .unwrap()
            .count();
        assert_eq!(accounts, 2);
    }

    #[test]
    fn test_run_migrate_one() {
        let export = tempdir().unwrap();
        let store_root = tempdir().unwrap();
        write_export(export.path());

        run_migrate_one("dev-1", export.path(), store_root.path(), OutputFormat::Text).unwrap();

        let store = MirrorStore::open(store_root.path()).unwrap();
        assert!(store.lookup_by_external_id("dev-1").unwrap().is_some());
        // Only the named participant was migrated.
        assert!(store.lookup_by_external_id("000007").unwrap().is_none());
    }

    #[test]
    fn test_run_migrate_one_unknown_device_fails() {
        let export = tempdir().unwrap();
        let store_root = tempdir().unwrap();
        write_export(export.path());

        let result = run_migrate_one(
            "no-such-device",
            export.path(),
            store_root.path(),
            OutputFormat::Text,
        );
        assert!(result.is_err());
    }
}
