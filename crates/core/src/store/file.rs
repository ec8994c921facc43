use super::{
    check_swap, sort_recent_first, CarePlanStore, ChangeAction, ChangeContext, RevisionRecord,
};
use crate::careplan::{CarePlan, CarePlanStatus, VersionStamp};
use crate::config::CoreConfig;
use crate::constants::CAREPLAN_FILENAME;
use crate::versioned_files::{
    CommitAuthor, CommitMessage, CommitRecord, FileToWrite, VersionedFileService,
};
use crate::{CarePlanError, CarePlanResult, ShardableUuid};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const STATUS_TRAILER: &str = "Careplan-Status";
const VERSION_TRAILER: &str = "Careplan-Version";
const REVISION_TRAILER: &str = "Careplan-Revision";
const MODIFIED_TRAILER: &str = "Careplan-Modified";

/// Durable store: one Git repository per care plan.
///
/// Layout:
///
/// ```text
/// <data_dir>/careplans/<s1>/<s2>/<uuid>/
///     .git/
///     CAREPLAN.yaml
/// <data_dir>/careplans/<s1>/<s2>/<uuid>.lock
/// ```
///
/// Each accepted transition is one commit on `main`, so [`revisions`](CarePlanStore::revisions)
/// is read straight from the Git log.
///
/// Writers hold an exclusive OS lock on `<uuid>.lock` from the read through the commit, and
/// readers hold a shared one. The lock is taken per file handle, so it serialises store
/// instances in one process as well as the CLI and the servers sharing a data directory.
pub struct FileCarePlanStore {
    root: PathBuf,
}

/// An advisory lock on one care plan, released on drop.
struct RecordLock {
    file: File,
}

impl RecordLock {
    /// Lock a plan that is being created, creating the lock file first.
    fn create_exclusive(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    fn exclusive(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    fn shared(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file })
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileCarePlanStore {
    /// Open (creating if needed) the store under `cfg.careplans_dir()`.
    pub fn new(cfg: &CoreConfig) -> CarePlanResult<Self> {
        Self::with_root(cfg.careplans_dir())
    }

    pub fn with_root(root: PathBuf) -> CarePlanResult<Self> {
        fs::create_dir_all(&root).map_err(CarePlanError::StorageDirCreation)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn careplan_dir(&self, id: &ShardableUuid) -> PathBuf {
        id.sharded_dir(&self.root)
    }

    fn lock_path(&self, id: &ShardableUuid) -> PathBuf {
        self.careplan_dir(id).with_extension("lock")
    }

    /// Lock an existing plan. `insert` creates the lock file before the plan directory, so a
    /// missing lock file means the plan was never created.
    fn lock_existing(&self, id: &ShardableUuid, exclusive: bool) -> CarePlanResult<RecordLock> {
        let path = self.lock_path(id);
        let lock = if exclusive {
            RecordLock::exclusive(&path)
        } else {
            RecordLock::shared(&path)
        };
        lock.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CarePlanError::NotFound(id.to_string()),
            _ => CarePlanError::RecordLock(e),
        })
    }

    /// Read the current document. The caller holds the record lock.
    fn read_unlocked(&self, id: &ShardableUuid) -> CarePlanResult<(CarePlan, String)> {
        let path = self.careplan_dir(id).join(CAREPLAN_FILENAME);
        let yaml = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CarePlanError::NotFound(id.to_string()))
            }
            Err(e) => return Err(CarePlanError::FileRead(e)),
        };
        let careplan = parse_careplan_yaml(&yaml)?;
        if careplan.careplan_id != *id {
            return Err(CarePlanError::Schema(format!(
                "{} holds care plan {}",
                path.display(),
                careplan.careplan_id
            )));
        }
        Ok((careplan, yaml))
    }

    fn ids(&self) -> CarePlanResult<Vec<ShardableUuid>> {
        let mut ids = Vec::new();
        for s1 in subdirs(&self.root)? {
            for s2 in subdirs(&s1)? {
                for dir in subdirs(&s2)? {
                    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    match ShardableUuid::parse(name) {
                        Ok(id) => ids.push(id),
                        Err(_) => {
                            tracing::warn!(path = %dir.display(), "ignoring non-care-plan directory")
                        }
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Plans whose creation was rolled back between the directory walk and the read are skipped.
    fn load_all(&self) -> CarePlanResult<Vec<CarePlan>> {
        let mut plans = Vec::new();
        for id in self.ids()? {
            match self.get(&id) {
                Ok(careplan) => plans.push(careplan),
                Err(CarePlanError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(plans)
    }
}

fn subdirs(dir: &Path) -> CarePlanResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CarePlanError::FileRead(e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(CarePlanError::FileRead)?;
        let file_type = entry.file_type().map_err(CarePlanError::FileRead)?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Parse a stored care plan, reporting the failing field path on schema mismatch.
pub(crate) fn parse_careplan_yaml(yaml_text: &str) -> CarePlanResult<CarePlan> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    match serde_path_to_error::deserialize::<_, CarePlan>(deserializer) {
        Ok(careplan) => Ok(careplan),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            Err(CarePlanError::Schema(format!(
                "care plan schema mismatch at {path}: {source}"
            )))
        }
    }
}

fn commit_message(
    careplan: &CarePlan,
    action: ChangeAction,
    summary: String,
) -> CarePlanResult<CommitMessage> {
    CommitMessage::new(action, summary)?
        .with_trailer(STATUS_TRAILER, careplan.status.as_str())?
        .with_trailer(VERSION_TRAILER, careplan.version.to_string())?
        .with_trailer(REVISION_TRAILER, careplan.revision.to_string())?
        .with_trailer(MODIFIED_TRAILER, careplan.last_modified.to_rfc3339())
}

fn commit_author(change: &ChangeContext) -> CommitAuthor {
    CommitAuthor {
        id: change.actor_id.clone(),
        name: change.actor_name.clone(),
    }
}

fn revision_from_commit(record: &CommitRecord) -> CarePlanResult<RevisionRecord> {
    let trailer = |key: &str| {
        record.trailer(key).ok_or_else(|| {
            CarePlanError::Schema(format!("commit '{}' lacks {key} trailer", record.summary))
        })
    };
    let number = |key: &str| -> CarePlanResult<u64> {
        trailer(key)?
            .parse()
            .map_err(|_| CarePlanError::Schema(format!("{key} trailer is not a number")))
    };

    let action = ChangeAction::parse(&record.action).ok_or_else(|| {
        CarePlanError::Schema(format!("unknown commit action '{}'", record.action))
    })?;
    let status: CarePlanStatus = trailer(STATUS_TRAILER)?
        .parse()
        .map_err(|e: CarePlanError| CarePlanError::Schema(e.to_string()))?;
    let recorded_at = record
        .trailer(MODIFIED_TRAILER)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(record.committed_at);

    Ok(RevisionRecord {
        revision: number(REVISION_TRAILER)?,
        version: number(VERSION_TRAILER)?,
        status,
        action,
        actor_id: trailer("Author-Id")?.to_string(),
        actor_name: trailer("Author-Name")?.to_string(),
        recorded_at,
    })
}

impl CarePlanStore for FileCarePlanStore {
    fn insert(&self, careplan: &CarePlan, change: &ChangeContext) -> CarePlanResult<()> {
        let dir = self.careplan_dir(&careplan.careplan_id);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(CarePlanError::StorageDirCreation)?;
        }
        let _lock = RecordLock::create_exclusive(&self.lock_path(&careplan.careplan_id))
            .map_err(CarePlanError::RecordLock)?;
        if dir.exists() {
            return Err(CarePlanError::AlreadyExists(careplan.careplan_id.to_string()));
        }

        let yaml = serde_yaml::to_string(careplan).map_err(CarePlanError::YamlSerialization)?;
        let message = commit_message(
            careplan,
            change.action,
            format!("Draft generated for review ({})", careplan.provenance.llm_model_used),
        )?;
        let files = [FileToWrite {
            relative_path: Path::new(CAREPLAN_FILENAME),
            content: &yaml,
            old_content: None,
        }];
        VersionedFileService::init_and_commit(&dir, &commit_author(change), &message, &files)?;
        Ok(())
    }

    fn get(&self, id: &ShardableUuid) -> CarePlanResult<CarePlan> {
        let _lock = self.lock_existing(id, false)?;
        self.read_unlocked(id).map(|(careplan, _)| careplan)
    }

    fn list_by_patient(&self, patient_id: &str) -> CarePlanResult<Vec<CarePlan>> {
        let mut plans: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|p| p.patient_id.as_str() == patient_id)
            .collect();
        sort_recent_first(&mut plans);
        Ok(plans)
    }

    fn list_by_status(&self, status: Option<CarePlanStatus>) -> CarePlanResult<Vec<CarePlan>> {
        let mut plans: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        sort_recent_first(&mut plans);
        Ok(plans)
    }

    fn compare_and_swap(
        &self,
        expected: VersionStamp,
        next: &CarePlan,
        change: &ChangeContext,
    ) -> CarePlanResult<()> {
        let id = next.careplan_id;
        let _lock = self.lock_existing(&id, true)?;

        let (current, old_yaml) = self.read_unlocked(&id)?;
        check_swap(&current, expected, next)?;

        let yaml = serde_yaml::to_string(next).map_err(CarePlanError::YamlSerialization)?;
        let message = commit_message(
            next,
            change.action,
            format!("{} -> {}", current.status, next.status),
        )?;
        let files = [FileToWrite {
            relative_path: Path::new(CAREPLAN_FILENAME),
            content: &yaml,
            old_content: Some(&old_yaml),
        }];
        VersionedFileService::write_and_commit_files(
            &self.careplan_dir(&id),
            &commit_author(change),
            &message,
            &files,
        )?;
        tracing::debug!(careplan_id = %id, action = message.action().as_str(), "committed care plan revision");
        Ok(())
    }

    fn revisions(&self, id: &ShardableUuid) -> CarePlanResult<Vec<RevisionRecord>> {
        let _lock = self.lock_existing(id, false)?;

        let dir = self.careplan_dir(id);
        if !dir.join(CAREPLAN_FILENAME).exists() {
            return Err(CarePlanError::NotFound(id.to_string()));
        }
        VersionedFileService::open(&dir)?
            .history()?
            .iter()
            .map(revision_from_commit)
            .collect()
    }
}
