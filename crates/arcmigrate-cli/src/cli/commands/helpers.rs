//! Shared helpers for CLI commands.
//!
//! Stages an export directory tree into classified users plus their
//! per-participant report documents.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;

use arcmigrate_core::classify::MigratedUser;
use arcmigrate_core::core::{MigrationConfig, MigrationResult, UserReports};
use arcmigrate_core::staging::{
    assemble_user_data, completed_test_map, load_migrated_users, read_json, session_schedule_map,
    UserData,
};

/// Expected subdirectories of an export root.
pub const PARTICIPANTS_DIR: &str = "participants";
pub const TEST_SESSIONS_DIR: &str = "test_sessions";
pub const SCHEDULES_DIR: &str = "test_session_schedules";
pub const AVAILABILITY_DIR: &str = "wake_sleep_schedules";

/// One export tree, fully staged and classified.
pub struct StagedExport {
    pub users: Vec<MigratedUser>,
    pub data_by_arc_id: HashMap<String, UserData>,
}

/// Stage a whole export tree: classify and deduplicate the participant
/// tables, then reconcile completions and pick the freshest schedule and
/// availability documents.
pub fn stage_export(
    export_dir: &Path,
    config: &MigrationConfig,
) -> MigrationResult<StagedExport> {
    let folders = participant_folders(export_dir)?;
    let users = load_migrated_users(&folders, config)?;
    tracing::info!(
        folders = folders.len(),
        users = users.len(),
        "classified export"
    );

    let test_sessions = export_dir.join(TEST_SESSIONS_DIR);
    let completed = if test_sessions.is_dir() {
        completed_test_map(&test_sessions)?
    } else {
        HashMap::new()
    };

    let schedules_dir = export_dir.join(SCHEDULES_DIR);
    let schedules = if schedules_dir.is_dir() {
        session_schedule_map(&schedules_dir)?
    } else {
        HashMap::new()
    };

    let availability_dir = export_dir.join(AVAILABILITY_DIR);
    let availabilities = if availability_dir.is_dir() {
        session_schedule_map(&availability_dir)?
    } else {
        HashMap::new()
    };

    let data_by_arc_id = assemble_user_data(completed, schedules, availabilities)
        .into_iter()
        .map(|data| (data.arc_id.clone(), data))
        .collect();

    Ok(StagedExport {
        users,
        data_by_arc_id,
    })
}

/// The participant table sub-export folders under the export root.
///
/// An export is usually split into several numbered sub-folders; a flat
/// layout with the table files directly in `participants/` also works.
pub fn participant_folders(export_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = export_dir.join(PARTICIPANTS_DIR);
    if !dir.is_dir() {
        bail!(
            "No '{PARTICIPANTS_DIR}' directory under {}. Point --export-dir at the unzipped export root.",
            export_dir.display()
        );
    }

    let mut folders: Vec<PathBuf> = fs::read_dir(&dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    folders.sort();

    if folders.is_empty() {
        folders.push(dir);
    }
    Ok(folders)
}

/// Load the staged report documents for one participant.
pub fn load_reports(
    user: &MigratedUser,
    data_by_arc_id: &HashMap<String, UserData>,
) -> MigrationResult<UserReports> {
    let Some(data) = data_by_arc_id.get(&user.arc_id) else {
        return Ok(UserReports::default());
    };

    Ok(UserReports {
        completed_tests: data.completed_tests.clone(),
        schedule: data
            .schedule_path
            .as_deref()
            .map(read_json::<Value>)
            .transpose()?,
        availability: data
            .availability_path
            .as_deref()
            .map(read_json::<Value>)
            .transpose()?,
    })
}
