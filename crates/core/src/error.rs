use crate::careplan::{CarePlanStatus, VersionStamp};
use crate::role::Role;
use crate::transition::Event;

/// Coarse classification of [`CarePlanError`] used by the API layers to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    StaleVersion,
    InvalidTransition,
    Forbidden,
    ValidationFailed,
    GenerationFailed,
    InvalidInput,
    Storage,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::StaleVersion => "stale_version",
            Self::InvalidTransition => "invalid_transition",
            Self::Forbidden => "forbidden",
            Self::ValidationFailed => "validation_failed",
            Self::GenerationFailed => "generation_failed",
            Self::InvalidInput => "invalid_input",
            Self::Storage => "storage",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CarePlanError {
    #[error("care plan not found: {0}")]
    NotFound(String),
    #[error("stale version for care plan {careplan_id}: expected {expected}, found {actual}")]
    StaleVersion {
        careplan_id: String,
        expected: VersionStamp,
        actual: VersionStamp,
    },
    #[error("event '{event}' is not permitted from status '{from}'")]
    InvalidTransition { event: Event, from: CarePlanStatus },
    #[error("role '{role}' may not perform '{action}'")]
    Forbidden { role: Role, action: String },
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("draft generation failed: {0}")]
    GenerationFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("care plan already exists: {0}")]
    AlreadyExists(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error(
        "initialise failed and cleanup also failed (path: {path}): init={init_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterInitialiseFailed {
        path: std::path::PathBuf,
        #[source]
        init_error: Box<CarePlanError>,
        cleanup_error: std::io::Error,
    },
    #[error("failed to write care plan file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read care plan file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("stored care plan does not match schema: {0}")]
    Schema(String),
    #[error("failed to serialize JSON: {0}")]
    JsonSerialization(serde_json::Error),
    #[error("care plan lock poisoned")]
    LockPoisoned,
    #[error("failed to lock care plan record: {0}")]
    RecordLock(std::io::Error),

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),
    #[error("failed to walk git history: {0}")]
    GitRevwalk(git2::Error),
}

impl CarePlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StaleVersion { .. } => ErrorKind::StaleVersion,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::InvalidInput(_) | Self::AlreadyExists(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Storage,
        }
    }
}

impl From<cpr_uuid::UuidError> for CarePlanError {
    fn from(err: cpr_uuid::UuidError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type CarePlanResult<T> = std::result::Result<T, CarePlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_their_kind() {
        assert_eq!(
            CarePlanError::NotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CarePlanError::ValidationFailed("comments required".into()).kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            CarePlanError::InvalidTransition {
                event: Event::Approve,
                from: CarePlanStatus::Draft,
            }
            .kind(),
            ErrorKind::InvalidTransition
        );
        assert_eq!(CarePlanError::LockPoisoned.kind(), ErrorKind::Storage);
    }

    #[test]
    fn invalid_transition_message_names_event_and_state() {
        let err = CarePlanError::InvalidTransition {
            event: Event::SendToPatient,
            from: CarePlanStatus::UnderReview,
        };
        assert_eq!(
            err.to_string(),
            "event 'send_to_patient' is not permitted from status 'under_review'"
        );
    }
}
