//! Care plan persistence.
//!
//! The store is the only place care plans change. Every mutation after creation goes through
//! [`CarePlanStore::compare_and_swap`], which is atomic per care plan: two writers presenting the
//! same [`VersionStamp`] cannot both succeed.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryCarePlanStore`] for tests and ephemeral servers.
//! - [`FileCarePlanStore`] for durable storage, one Git repository per care plan.

mod file;
mod memory;

pub use file::FileCarePlanStore;
pub use memory::InMemoryCarePlanStore;

use crate::careplan::{CarePlan, CarePlanStatus, VersionStamp};
use crate::transition::Event;
use crate::{CarePlanError, CarePlanResult, NonEmptyText, ShardableUuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a stored revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    SubmitForReview,
    Approve,
    Deny,
    Edit,
    SendToPatient,
    Activate,
    Complete,
}

impl ChangeAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::SubmitForReview => Event::SubmitForReview.as_str(),
            Self::Approve => Event::Approve.as_str(),
            Self::Deny => Event::Deny.as_str(),
            Self::Edit => Event::Edit.as_str(),
            Self::SendToPatient => Event::SendToPatient.as_str(),
            Self::Activate => Event::Activate.as_str(),
            Self::Complete => Event::Complete.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Create,
            Self::SubmitForReview,
            Self::Approve,
            Self::Deny,
            Self::Edit,
            Self::SendToPatient,
            Self::Activate,
            Self::Complete,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
    }
}

impl From<Event> for ChangeAction {
    fn from(event: Event) -> Self {
        match event {
            Event::SubmitForReview => Self::SubmitForReview,
            Event::Approve => Self::Approve,
            Event::Deny => Self::Deny,
            Event::Edit => Self::Edit,
            Event::SendToPatient => Self::SendToPatient,
            Event::Activate => Self::Activate,
            Event::Complete => Self::Complete,
        }
    }
}

/// Who made a change and why, recorded alongside the new state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeContext {
    pub action: ChangeAction,
    pub actor_id: NonEmptyText,
    pub actor_name: NonEmptyText,
}

/// One retained state of a care plan, for audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub revision: u64,
    pub version: u64,
    pub status: CarePlanStatus,
    pub action: ChangeAction,
    pub actor_id: String,
    pub actor_name: String,
    pub recorded_at: DateTime<Utc>,
}

impl RevisionRecord {
    pub(crate) fn from_change(careplan: &CarePlan, change: &ChangeContext) -> Self {
        Self {
            revision: careplan.revision,
            version: careplan.version,
            status: careplan.status,
            action: change.action,
            actor_id: change.actor_id.to_string(),
            actor_name: change.actor_name.to_string(),
            recorded_at: careplan.last_modified,
        }
    }
}

pub trait CarePlanStore: Send + Sync {
    /// Persist a freshly generated draft.
    ///
    /// # Errors
    ///
    /// [`CarePlanError::AlreadyExists`] if the id is taken.
    fn insert(&self, careplan: &CarePlan, change: &ChangeContext) -> CarePlanResult<()>;

    /// The current state of a care plan.
    ///
    /// # Errors
    ///
    /// [`CarePlanError::NotFound`] if no plan has this id.
    fn get(&self, id: &ShardableUuid) -> CarePlanResult<CarePlan>;

    /// All plans for a patient, most recently modified first.
    fn list_by_patient(&self, patient_id: &str) -> CarePlanResult<Vec<CarePlan>>;

    /// All plans, or those in `status`, most recently modified first.
    fn list_by_status(&self, status: Option<CarePlanStatus>) -> CarePlanResult<Vec<CarePlan>>;

    /// Replace the stored plan with `next` if its stamp still equals `expected`.
    ///
    /// # Errors
    ///
    /// - [`CarePlanError::NotFound`] if no plan has this id.
    /// - [`CarePlanError::StaleVersion`] if another writer got there first.
    fn compare_and_swap(
        &self,
        expected: VersionStamp,
        next: &CarePlan,
        change: &ChangeContext,
    ) -> CarePlanResult<()>;

    /// Every retained state of a plan, oldest first.
    fn revisions(&self, id: &ShardableUuid) -> CarePlanResult<Vec<RevisionRecord>>;
}

/// Checks made by every store before swapping in a new state.
pub(crate) fn check_swap(
    current: &CarePlan,
    expected: VersionStamp,
    next: &CarePlan,
) -> CarePlanResult<()> {
    if current.stamp() != expected {
        return Err(CarePlanError::StaleVersion {
            careplan_id: current.careplan_id.to_string(),
            expected,
            actual: current.stamp(),
        });
    }
    if next.careplan_id != current.careplan_id || next.patient_id != current.patient_id {
        return Err(CarePlanError::InvalidInput(
            "care plan identity cannot change".into(),
        ));
    }
    if next.revision != current.revision + 1 || next.version < current.version {
        return Err(CarePlanError::InvalidInput(format!(
            "next state {} does not follow {}",
            next.stamp(),
            current.stamp()
        )));
    }
    if next.provenance != current.provenance {
        return Err(CarePlanError::ValidationFailed(
            "provenance is write-once".into(),
        ));
    }
    if next.reviews.len() < current.reviews.len()
        || next.reviews[..current.reviews.len()] != current.reviews[..]
    {
        return Err(CarePlanError::InvalidInput(
            "reviews are append-only".into(),
        ));
    }
    Ok(())
}

/// Most recently modified first; id breaks ties so listings are deterministic.
pub(crate) fn sort_recent_first(plans: &mut [CarePlan]) {
    plans.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.careplan_id.cmp(&b.careplan_id))
    });
}
