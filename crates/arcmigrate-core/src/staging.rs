//! Staging layer: discovery and parsing of the unzipped JSON exports.
//!
//! Parsing is fail-closed: every file is attempted, parse failures are
//! accumulated across the whole set, and a single fatal error listing every
//! offending filename is raised at the end. The reconciled data feeds
//! payment and eligibility decisions, so migrating on partial data is never
//! acceptable.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::classify::{fix_participant_id, Classifier, MigratedUser};
use crate::completion::{CompletedTestList, TestSession};
use crate::core::{MigrationConfig, MigrationError, MigrationResult};
use crate::dedup::dedupe_users;
use crate::rows::RowSet;

/// Every export filename ends with a fixed-width timestamp suffix of this
/// length, e.g. `2020-02-20T12-31-13Z.json`.
pub const FILENAME_DATE_SUFFIX_LEN: usize = "2020-02-20T12-31-13Z.json".len();

/// Filename identifiers for the per-table participant export files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantFileKind {
    Participant,
    Rater,
    Phone,
    SiteLocation,
    ParticipantSiteLocation,
    ParticipantRater,
    ParticipantDeviceId,
    ParticipantNotes,
}

impl ParticipantFileKind {
    /// Substring that identifies this table's export file.
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::Participant => "-participant-",
            Self::Rater => "-rater-",
            Self::Phone => "-participant_phone-",
            Self::SiteLocation => "-site_location-",
            Self::ParticipantSiteLocation => "-participant_site_location-",
            Self::ParticipantRater => "participant_rater-",
            Self::ParticipantDeviceId => "-participant_device-",
            Self::ParticipantNotes => "-participant_note-",
        }
    }
}

/// Everything staged for one participant from the data exports.
#[derive(Debug, Clone)]
pub struct UserData {
    pub arc_id: String,
    /// Reconciled completion list, if any sessions were exported.
    pub completed_tests: Option<CompletedTestList>,
    /// Most recent test-session schedule file.
    pub schedule_path: Option<PathBuf>,
    /// Most recent wake-sleep availability file.
    pub availability_path: Option<PathBuf>,
}

/// Recursively list every `.json` file under `dir`, sorted by path so that
/// array order is stable across runs.
pub fn find_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_json_files(dir, &mut files)
        .with_context(|| format!("failed to walk {}", dir.display()))?;
    files.sort();
    Ok(files)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Find the first file under `dir` whose name contains `substring`.
///
/// Finding nothing is a valid outcome, not an error.
pub fn find_file_containing(dir: &Path, substring: &str) -> Result<Option<PathBuf>> {
    let files = find_json_files(dir)?;
    Ok(files.into_iter().find(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains(substring))
    }))
}

/// Parse one JSON file into `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load the eight row arrays for one participant export folder.
///
/// A missing table file leaves its array empty. Unparsable files are
/// accumulated and raised together.
pub fn load_row_set(dir: &Path) -> MigrationResult<RowSet> {
    let mut rows = RowSet::default();
    let mut failed: Vec<String> = Vec::new();

    {
        // A directory-walk failure is an I/O error and propagates; only a
        // file that exists but will not deserialize counts as a parse
        // failure.
        let mut load_table =
            |kind: ParticipantFileKind, target: &mut dyn TableSink| -> MigrationResult<()> {
                let Some(path) = find_file_containing(dir, kind.identifier())? else {
                    return Ok(());
                };
                tracing::debug!(path = %path.display(), "found participant file");
                if target.load(&path).is_err() {
                    failed.push(display_name(&path));
                }
                Ok(())
            };

        load_table(ParticipantFileKind::Participant, &mut rows.participants)?;
        load_table(ParticipantFileKind::Rater, &mut rows.raters)?;
        load_table(ParticipantFileKind::Phone, &mut rows.participant_phones)?;
        load_table(ParticipantFileKind::SiteLocation, &mut rows.site_locations)?;
        load_table(
            ParticipantFileKind::ParticipantSiteLocation,
            &mut rows.participant_site_locations,
        )?;
        load_table(
            ParticipantFileKind::ParticipantRater,
            &mut rows.participant_raters,
        )?;
        load_table(
            ParticipantFileKind::ParticipantDeviceId,
            &mut rows.participant_device_ids,
        )?;
        load_table(
            ParticipantFileKind::ParticipantNotes,
            &mut rows.participant_notes,
        )?;
    }

    if failed.is_empty() {
        Ok(rows)
    } else {
        Err(MigrationError::ParseFailures { files: failed })
    }
}

/// Deserialization sink for one table array.
trait TableSink {
    fn load(&mut self, path: &Path) -> Result<()>;
}

impl<T: DeserializeOwned> TableSink for Vec<T> {
    fn load(&mut self, path: &Path) -> Result<()> {
        *self = read_json(path)?;
        Ok(())
    }
}

/// Classify every participant row in the given export folders, then
/// deduplicate down to one record per Arc ID.
pub fn load_migrated_users(
    folders: &[PathBuf],
    config: &MigrationConfig,
) -> MigrationResult<Vec<MigratedUser>> {
    let classifier = Classifier::new(config);
    let mut users: Vec<MigratedUser> = Vec::new();

    for folder in folders {
        let rows = load_row_set(folder)?;
        let resolver = rows.resolver();
        for row in &rows.participants {
            let Some(row_id) = row.id.as_deref() else {
                continue;
            };
            let joins = resolver.resolve(row_id);
            users.push(classifier.classify(row, &joins)?);
        }
    }

    dedupe_users(users)
}

/// Parse every completion export and reconcile per Arc ID.
pub fn completed_test_map(dir: &Path) -> MigrationResult<HashMap<String, CompletedTestList>> {
    let files = find_json_files(dir).map_err(MigrationError::External)?;
    let mut sessions_by_arc_id: HashMap<String, Vec<TestSession>> = HashMap::new();
    let mut failed: Vec<String> = Vec::new();

    for path in &files {
        tracing::debug!(path = %path.display(), "parsing test session file");
        match read_json::<TestSession>(path) {
            Ok(session) => {
                let arc_id = fix_participant_id(&session.participant_id);
                sessions_by_arc_id.entry(arc_id).or_default().push(session);
            }
            Err(_) => failed.push(display_name(path)),
        }
    }
    tracing::info!(files = files.len(), "test session parsing complete");

    if !failed.is_empty() {
        return Err(MigrationError::ParseFailures { files: failed });
    }

    Ok(sessions_by_arc_id
        .into_iter()
        .map(|(arc_id, sessions)| (arc_id, CompletedTestList::from_sessions(&sessions)))
        .collect())
}

/// Owner stamp present in every schedule/availability document.
#[derive(Debug, Deserialize)]
struct ScheduleOwner {
    participant_id: Option<String>,
}

/// Map each Arc ID to its most recent schedule (or availability) file.
///
/// Multiple candidates per participant are resolved by comparing the
/// trailing fixed-width timestamp suffix of the filenames
/// lexicographically; the greatest suffix wins. This is deliberately a
/// string comparison, relying on the suffix staying fixed-width and
/// zero-padded.
pub fn session_schedule_map(dir: &Path) -> MigrationResult<HashMap<String, PathBuf>> {
    let files = find_json_files(dir).map_err(MigrationError::External)?;
    let mut by_arc_id: HashMap<String, PathBuf> = HashMap::new();
    let mut failed: Vec<String> = Vec::new();

    for path in &files {
        tracing::debug!(path = %path.display(), "parsing schedule file");
        let owner: Option<String> = match read_json::<ScheduleOwner>(path) {
            Ok(owner) => owner.participant_id,
            Err(_) => None,
        };
        let Some(participant_id) = owner else {
            failed.push(display_name(path));
            continue;
        };

        let arc_id = fix_participant_id(&participant_id);
        match by_arc_id.get(&arc_id) {
            None => {
                by_arc_id.insert(arc_id, path.clone());
            }
            Some(existing) => {
                if filename_date_suffix(path) > filename_date_suffix(existing) {
                    by_arc_id.insert(arc_id, path.clone());
                }
            }
        }
    }
    tracing::info!(files = files.len(), "schedule parsing complete");

    if failed.is_empty() {
        Ok(by_arc_id)
    } else {
        Err(MigrationError::ParseFailures { files: failed })
    }
}

/// The trailing fixed-width timestamp portion of a filename, or the whole
/// name when shorter.
fn filename_date_suffix(path: &Path) -> String {
    let name = display_name(path);
    if name.len() < FILENAME_DATE_SUFFIX_LEN {
        return name;
    }
    let cut = name.len() - FILENAME_DATE_SUFFIX_LEN;
    // Names that ignore the export convention can put a multibyte character
    // across the cut; compare the whole name then.
    match name.get(cut..) {
        Some(suffix) => suffix.to_string(),
        None => name,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or_else(|| path.display().to_string(), ToString::to_string)
}

/// Join the three per-participant maps into one staged record per Arc ID,
/// sorted ascending.
#[must_use]
pub fn assemble_user_data(
    mut completed: HashMap<String, CompletedTestList>,
    mut schedules: HashMap<String, PathBuf>,
    mut availabilities: HashMap<String, PathBuf>,
) -> Vec<UserData> {
    let arc_ids: BTreeSet<String> = completed
        .keys()
        .chain(schedules.keys())
        .chain(availabilities.keys())
        .cloned()
        .collect();

    arc_ids
        .into_iter()
        .map(|arc_id| UserData {
            completed_tests: completed.remove(&arc_id),
            schedule_path: schedules.remove(&arc_id),
            availability_path: availabilities.remove(&arc_id),
            arc_id,
        })
        .collect()
}
