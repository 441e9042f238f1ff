//! Filesystem-backed mirror of the participant directory and report store.
//!
//! Used for local mirror runs: the whole migration executes against a
//! directory of JSON files so the output can be inspected and diffed before
//! pointing the same pipeline at the live system. Layout:
//!
//! ```text
//! <root>/participants/<participant-id>.json
//! <root>/reports/<participant-id>/<ReportKind>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arcmigrate_core::core::MigrationResult;
use arcmigrate_core::directory::{
    AttributeMap, DirectoryParticipant, NewAccount, ParticipantDirectory, ReportKind, ReportStore,
};

const PARTICIPANTS_DIR: &str = "participants";
const REPORTS_DIR: &str = "reports";

/// One account file in the mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    participant_id: String,
    external_id: String,
    study_id: String,
    password: String,
    phone: Option<String>,
    attributes: AttributeMap,
}

/// Local JSON-file implementation of both target-system traits.
#[derive(Debug)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    /// Open (and lay out) a mirror store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(PARTICIPANTS_DIR))
            .with_context(|| format!("creating mirror store at {}", root.display()))?;
        fs::create_dir_all(root.join(REPORTS_DIR))
            .with_context(|| format!("creating mirror store at {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn participants_dir(&self) -> PathBuf {
        self.root.join(PARTICIPANTS_DIR)
    }

    fn account_path(&self, participant_id: &str) -> PathBuf {
        self.participants_dir().join(format!("{participant_id}.json"))
    }

    fn report_path(&self, participant_id: &str, kind: ReportKind) -> PathBuf {
        self.root
            .join(REPORTS_DIR)
            .join(participant_id)
            .join(format!("{}.json", kind.as_str()))
    }

    fn load_accounts(&self) -> Result<Vec<StoredAccount>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.participants_dir())
            .with_context(|| format!("reading mirror store at {}", self.root.display()))?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<_>>()?;
        paths.sort();

        paths
            .iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .map(|path| {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))
            })
            .collect()
    }

    fn save_account(&self, account: &StoredAccount) -> Result<()> {
        let path = self.account_path(&account.participant_id);
        let text = serde_json::to_string_pretty(account)?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }
}

impl ParticipantDirectory for MirrorStore {
    fn lookup_by_external_id(
        &self,
        external_id: &str,
    ) -> MigrationResult<Option<DirectoryParticipant>> {
        let found = self
            .load_accounts()?
            .into_iter()
            .find(|account| account.external_id == external_id)
            .map(|account| DirectoryParticipant {
                participant_id: account.participant_id,
                external_id: account.external_id,
                study_id: account.study_id,
                attributes: account.attributes,
            });
        Ok(found)
    }

    fn create_participant(&self, account: &NewAccount) -> MigrationResult<String> {
        let participant_id = format!("local-{:05}", self.load_accounts()?.len());
        self.save_account(&StoredAccount {
            participant_id: participant_id.clone(),
            external_id: account.external_id.clone(),
            study_id: account.study_id.clone(),
            password: account.password.clone(),
            phone: account.phone.clone(),
            attributes: account.attributes.clone(),
        })?;
        Ok(participant_id)
    }

    fn update_attributes(
        &self,
        participant_id: &str,
        attributes: &AttributeMap,
    ) -> MigrationResult<()> {
        let path = self.account_path(participant_id);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("no stored account {participant_id}"))?;
        let mut account: StoredAccount =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        account.attributes = attributes.clone();
        self.save_account(&account)?;
        Ok(())
    }
}

impl ReportStore for MirrorStore {
    fn read_singleton_report(
        &self,
        participant_id: &str,
        kind: ReportKind,
    ) -> MigrationResult<Option<Value>> {
        let path = self.report_path(participant_id, kind);
        if !path.exists() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let value =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }

    fn write_singleton_report(
        &self,
        participant_id: &str,
        kind: ReportKind,
        report: &Value,
    ) -> MigrationResult<()> {
        let path = self.report_path(participant_id, kind);
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("report path has no parent"))?;
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        let text = serde_json::to_string_pretty(report).map_err(anyhow::Error::from)?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn delete_all_reports(&self, participant_id: &str, kind: ReportKind) -> MigrationResult<()> {
        let path = self.report_path(participant_id, kind);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        }
        Ok(())
    }
}
