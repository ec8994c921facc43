//! Versioned file operations with Git-based version control for CPR.
//!
//! Each care plan lives in its own directory, versioned by a local Git repository
//! (`git2`/libgit2). Every accepted transition becomes exactly one commit, so the repository
//! history is the plan's revision history.
//!
//! - **Atomic writes**: files are written and committed together; on failure the previous
//!   content is restored and newly created directories are removed.
//! - **Structured messages**: commit messages follow [`CommitMessage`], a subject line plus
//!   Git trailers, so history can be read back without parsing YAML.
//! - **Nothing is deleted**: plans in terminal states keep their repository and history.
//!
//! ## Branch Policy
//!
//! CPR standardises on `refs/heads/main` for all care plan repositories.

use crate::store::ChangeAction;
use crate::{CarePlanError, CarePlanResult, NonEmptyText};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::{LazyLock, Mutex};

const MAIN_REF: &str = "refs/heads/main";

/// Commit subject domain. All care plan repositories use the same one.
const COMMIT_DOMAIN: &str = "careplan";

/// Trailer keys written from [`CommitAuthor`] and therefore reserved.
const AUTHOR_NAME_TRAILER: &str = "Author-Name";
const AUTHOR_ID_TRAILER: &str = "Author-Id";

/// Who made a change. Rendered as the reserved `Author-*` trailers and the Git signature.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitAuthor {
    pub(crate) id: NonEmptyText,
    pub(crate) name: NonEmptyText,
}

impl CommitAuthor {
    fn signature(&self) -> CarePlanResult<git2::Signature<'static>> {
        git2::Signature::now(
            &signature_safe(self.name.as_str()),
            &signature_safe(self.id.as_str()),
        )
        .map_err(CarePlanError::GitSignature)
    }
}

/// Stands in for an author field with nothing left after [`signature_safe`] cleaning.
const UNKNOWN_AUTHOR: &str = "unknown";

/// Replace characters libgit2 refuses in signatures, and line breaks that would split a
/// trailer. Never returns an empty string.
fn signature_safe(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '<' | '>' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect();
    match cleaned.trim() {
        "" => UNKNOWN_AUTHOR.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// A single commit trailer line in standard Git trailer format (`Key: Value`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct CommitTrailer {
    key: String,
    value: String,
}

impl CommitTrailer {
    /// # Errors
    ///
    /// Returns [`CarePlanError::InvalidInput`] if the key is empty, contains `:` or a line
    /// break, or if the value is empty or multi-line.
    pub(crate) fn new(key: impl Into<String>, value: impl Into<String>) -> CarePlanResult<Self> {
        let key = key.into().trim().to_string();
        let value = value.into().trim().to_string();

        if key.is_empty()
            || key.contains(['\n', '\r'])
            || key.contains(':')
            || value.is_empty()
            || value.contains(['\n', '\r'])
        {
            return Err(CarePlanError::InvalidInput(
                "commit trailer key/value must be non-empty and single-line (key cannot contain ':')".into(),
            ));
        }

        Ok(Self { key, value })
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn value(&self) -> &str {
        &self.value
    }
}

/// A structured, predictable commit message.
///
/// Rendering rules:
///
/// - Subject line: `careplan:<action>: <summary>`
/// - A blank line, then `Author-Name` and `Author-Id`, then the remaining trailers sorted by
///   key and value.
/// - No free-form prose paragraphs.
///
/// Commit messages are labels and indexes; do not put clinical content in them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitMessage {
    action: ChangeAction,
    summary: NonEmptyText,
    trailers: Vec<CommitTrailer>,
}

impl CommitMessage {
    /// # Errors
    ///
    /// Returns [`CarePlanError::InvalidInput`] if `summary` is empty or multi-line.
    pub(crate) fn new(action: ChangeAction, summary: impl AsRef<str>) -> CarePlanResult<Self> {
        let summary_str = summary.as_ref().trim();
        if summary_str.contains(['\n', '\r']) {
            return Err(CarePlanError::InvalidInput(
                "commit summary must be single-line".into(),
            ));
        }
        let summary = NonEmptyText::new(summary_str)
            .map_err(|_| CarePlanError::InvalidInput("commit summary must be non-empty".into()))?;

        Ok(Self {
            action,
            summary,
            trailers: Vec::new(),
        })
    }

    /// Add a trailer. `Author-*` keys are reserved and rejected.
    pub(crate) fn with_trailer(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> CarePlanResult<Self> {
        let key_str = key.into();
        if key_str.trim_start().starts_with("Author-") {
            return Err(CarePlanError::InvalidInput(format!(
                "trailer key '{}' is reserved",
                key_str.trim()
            )));
        }
        self.trailers.push(CommitTrailer::new(key_str, value.into())?);
        Ok(self)
    }

    pub(crate) fn action(&self) -> ChangeAction {
        self.action
    }

    /// Render the message including the author trailers.
    pub(crate) fn render_with_author(&self, author: &CommitAuthor) -> String {
        let mut rendered = format!(
            "{}:{}: {}",
            COMMIT_DOMAIN,
            self.action.as_str(),
            self.summary.as_str()
        );

        let mut other = self.trailers.clone();
        other.sort_by(|a, b| (a.key(), a.value()).cmp(&(b.key(), b.value())));

        rendered.push_str("\n\n");
        rendered.push_str(AUTHOR_NAME_TRAILER);
        rendered.push_str(": ");
        rendered.push_str(&signature_safe(author.name.as_str()));
        rendered.push('\n');
        rendered.push_str(AUTHOR_ID_TRAILER);
        rendered.push_str(": ");
        rendered.push_str(&signature_safe(author.id.as_str()));

        for trailer in other {
            rendered.push('\n');
            rendered.push_str(trailer.key());
            rendered.push_str(": ");
            rendered.push_str(trailer.value());
        }

        rendered
    }
}

/// A commit read back from a care plan repository, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CommitRecord {
    pub(crate) action: String,
    pub(crate) summary: String,
    pub(crate) trailers: BTreeMap<String, String>,
    pub(crate) committed_at: DateTime<Utc>,
}

impl CommitRecord {
    pub(crate) fn trailer(&self, key: &str) -> Option<&str> {
        self.trailers.get(key).map(String::as_str)
    }
}

/// Parse a rendered [`CommitMessage`] back into `(action, summary, trailers)`.
///
/// Returns `None` if the subject does not follow `careplan:<action>: <summary>`.
pub(crate) fn parse_commit_message(
    message: &str,
) -> Option<(String, String, BTreeMap<String, String>)> {
    let mut lines = message.lines();
    let subject = lines.next()?;
    let rest = subject.strip_prefix(COMMIT_DOMAIN)?.strip_prefix(':')?;
    let (action, summary) = rest.split_once(": ")?;

    let trailers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Some((action.to_string(), summary.to_string(), trailers))
}

/// Represents a file to be written and committed.
///
/// Used with [`VersionedFileService::write_and_commit_files`] to write multiple files in a
/// single atomic commit operation.
#[derive(Debug, Clone)]
pub(crate) struct FileToWrite<'a> {
    /// The relative path to the file within the repository directory.
    pub relative_path: &'a Path,
    /// The new content to write to the file.
    pub content: &'a str,
    /// The previous file content for rollback. `None` if this is a new file.
    pub old_content: Option<&'a str>,
}

/// Service for managing versioned files with Git version control.
///
/// The typical workflow is:
/// 1. Create a repository and its first commit with [`init_and_commit`](Self::init_and_commit)
/// 2. Record each later change with [`write_and_commit_files`](Self::write_and_commit_files)
/// 3. Read the change log back with [`history`](Self::history)
pub(crate) struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    /// Create a new Git repository at `workdir`.
    ///
    /// # Errors
    ///
    /// Returns [`CarePlanError::GitInit`] if initialisation fails or the repository is bare.
    pub(crate) fn init(workdir: &Path) -> CarePlanResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(CarePlanError::GitInit)?;
        // Use the actual workdir from the repository to ensure path stripping works correctly.
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                CarePlanError::GitInit(git2::Error::from_str(
                    "repository has no working directory",
                ))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open an existing Git repository at exactly `workdir`.
    ///
    /// `NO_SEARCH` stops git2 from walking up to a parent repository, which keeps each care
    /// plan isolated even if the data directory itself sits inside a Git checkout.
    ///
    /// # Errors
    ///
    /// Returns [`CarePlanError::GitOpen`] if the repository is missing, unreadable or bare.
    pub(crate) fn open(workdir: &Path) -> CarePlanResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(CarePlanError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                CarePlanError::GitOpen(git2::Error::from_str(
                    "repository has no working directory",
                ))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Ensure `HEAD` points at `refs/heads/main`.
    ///
    /// For a newly initialised repository this creates an unborn `main` branch that is born
    /// with the first commit.
    fn ensure_main_head(&self) -> CarePlanResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(CarePlanError::GitSetHead)?;
        Ok(())
    }

    /// Create a commit including only the provided repo-relative paths.
    ///
    /// Absolute paths under the workdir are normalised; paths containing `..` are rejected.
    pub(crate) fn commit_paths(
        &self,
        author: &CommitAuthor,
        message: &CommitMessage,
        relative_paths: &[PathBuf],
    ) -> CarePlanResult<git2::Oid> {
        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(CarePlanError::GitIndex)?;

        for path in relative_paths {
            let rel = if path.is_absolute() {
                path.strip_prefix(&self.workdir)
                    .map_err(|_| {
                        CarePlanError::InvalidInput(
                            "path is outside the repository working directory".into(),
                        )
                    })?
                    .to_path_buf()
            } else {
                path.to_path_buf()
            };

            if rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(CarePlanError::InvalidInput(
                    "path must not contain parent directory references (..)".into(),
                ));
            }

            index.add_path(&rel).map_err(CarePlanError::GitAdd)?;
        }
        index.write().map_err(CarePlanError::GitIndex)?;

        let tree_id = index.write_tree().map_err(CarePlanError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(CarePlanError::GitFindTree)?;
        let sig = author.signature()?;
        let rendered = message.render_with_author(author);

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &rendered, &tree, &parent_refs)
            .map_err(CarePlanError::GitCommit)
    }

    /// Writes files and commits them to Git, rolling back on failure.
    ///
    /// On error, files that previously existed are restored, new files are removed, and any
    /// directories created by this call are removed again. A file that no longer holds the
    /// bytes this call wrote belongs to another writer and is left alone.
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        author: &CommitAuthor,
        msg: &CommitMessage,
        files: &[FileToWrite],
    ) -> CarePlanResult<git2::Oid> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>, &str)> = Vec::new();

        let result: CarePlanResult<git2::Oid> = (|| {
            let mut dirs_needed = std::collections::HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                if let Some(parent) = full_path.parent() {
                    let mut current = parent;
                    while current != repo.workdir && !current.exists() {
                        dirs_needed.insert(current.to_path_buf());
                        match current.parent() {
                            Some(p) => current = p,
                            None => break,
                        }
                    }
                }
            }

            // Shallowest first.
            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(CarePlanError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                let old_content = file.old_content.map(|s| s.to_string());

                std::fs::write(&full_path, file.content).map_err(CarePlanError::FileWrite)?;
                written_files.push((full_path, old_content, file.content));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(author, msg, &paths)
        })();

        match result {
            Ok(oid) => Ok(oid),
            Err(write_error) => {
                for (full_path, old_content, written) in written_files.iter().rev() {
                    if let Ok(on_disk) = std::fs::read_to_string(full_path) {
                        if on_disk != *written {
                            tracing::warn!(
                                path = %full_path.display(),
                                "file changed by another writer, not rolling back"
                            );
                            continue;
                        }
                    }
                    match old_content {
                        Some(contents) => {
                            let _ = std::fs::write(full_path, contents);
                        }
                        None => {
                            let _ = std::fs::remove_file(full_path);
                        }
                    }
                }

                // Deepest first.
                for dir in created_dirs.iter().rev() {
                    let _ = std::fs::remove_dir(dir);
                }

                Err(write_error)
            }
        }
    }

    /// Initialise a repository in `careplan_dir`, commit the initial files, and remove the
    /// whole directory if anything fails.
    ///
    /// If the cleanup itself fails, returns [`CarePlanError::CleanupAfterInitialiseFailed`]
    /// carrying both errors.
    pub(crate) fn init_and_commit(
        careplan_dir: &Path,
        author: &CommitAuthor,
        message: &CommitMessage,
        files: &[FileToWrite],
    ) -> CarePlanResult<git2::Oid> {
        let result: CarePlanResult<git2::Oid> = (|| {
            let _repo = Self::init(careplan_dir)?;
            Self::write_and_commit_files(careplan_dir, author, message, files)
        })();

        match result {
            Ok(oid) => Ok(oid),
            Err(init_error) => {
                if let Err(cleanup_err) = cleanup_careplan_dir(careplan_dir) {
                    return Err(CarePlanError::CleanupAfterInitialiseFailed {
                        path: careplan_dir.to_path_buf(),
                        init_error: Box::new(init_error),
                        cleanup_error: cleanup_err,
                    });
                }
                Err(init_error)
            }
        }
    }

    /// Resolve the parent commit(s) for a new commit: `HEAD` if born, none otherwise.
    fn resolve_head_parents(&self) -> CarePlanResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(CarePlanError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(CarePlanError::GitHead(e)),
        }
    }

    /// Every commit reachable from `HEAD`, oldest first.
    ///
    /// Commits whose subject does not follow [`CommitMessage`] rendering are skipped.
    pub(crate) fn history(&self) -> CarePlanResult<Vec<CommitRecord>> {
        let mut walk = self.repo.revwalk().map_err(CarePlanError::GitRevwalk)?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)
            .map_err(CarePlanError::GitRevwalk)?;
        match walk.push_head() {
            Ok(()) => {}
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(vec![]),
            Err(e) => return Err(CarePlanError::GitRevwalk(e)),
        }

        let mut records = Vec::new();
        for oid in walk {
            let oid = oid.map_err(CarePlanError::GitRevwalk)?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(CarePlanError::GitRevwalk)?;
            let Some((action, summary, trailers)) =
                commit.message().and_then(parse_commit_message)
            else {
                tracing::warn!(commit = %oid, "skipping commit with unstructured message");
                continue;
            };
            let committed_at =
                DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();
            records.push(CommitRecord {
                action,
                summary,
                trailers,
                committed_at,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
static FORCE_CLEANUP_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn cleanup_careplan_dir(careplan_dir: &Path) -> std::io::Result<()> {
    #[cfg(test)]
    {
        let current_id = std::thread::current().id();
        let mut guard = FORCE_CLEANUP_ERROR_FOR_THREADS
            .lock()
            .expect("FORCE_CLEANUP_ERROR_FOR_THREADS mutex poisoned");

        if guard.remove(&current_id) {
            return Err(std::io::Error::other("forced cleanup failure (test hook)"));
        }
    }

    std::fs::remove_dir_all(careplan_dir)
}
