//! Care plan records.
//!
//! A [`CarePlan`] is one treatment recommendation document for one patient. Its `content` is
//! drafted by the [`DraftGenerator`](crate::generator::DraftGenerator) and then reviewed by
//! clinicians; every change after creation goes through the
//! [`ReviewEngine`](crate::review::ReviewEngine).
//!
//! Two counters track change:
//!
//! - `version` is the content version. It moves only when clinical content changes.
//! - `revision` moves on every accepted transition and is what concurrent writers race on.
//!
//! Together they form the [`VersionStamp`] a caller must present to transition a plan.

use crate::{CarePlanError, CarePlanResult, ConfidenceScore, NonEmptyText, ShardableUuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a care plan.
///
/// Deserialisation rejects any value outside this set, so a record with an unknown status can
/// never enter the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarePlanStatus {
    Draft,
    UnderReview,
    Approved,
    Denied,
    SentToPatient,
    Active,
    Completed,
}

impl CarePlanStatus {
    pub const ALL: [CarePlanStatus; 7] = [
        Self::Draft,
        Self::UnderReview,
        Self::Approved,
        Self::Denied,
        Self::SentToPatient,
        Self::Active,
        Self::Completed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::SentToPatient => "sent_to_patient",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// `denied` and `completed` accept no further events.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Completed)
    }

    /// States in which the patient may see the plan.
    pub const fn is_patient_visible(self) -> bool {
        matches!(self, Self::SentToPatient | Self::Active | Self::Completed)
    }
}

impl fmt::Display for CarePlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarePlanStatus {
    type Err = CarePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| CarePlanError::InvalidInput(format!("unknown care plan status '{s}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Medication,
    Diagnostic,
    Lifestyle,
    Followup,
    Monitoring,
    Referral,
}

impl ActionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medication => "medication",
            Self::Diagnostic => "diagnostic",
            Self::Lifestyle => "lifestyle",
            Self::Followup => "followup",
            Self::Monitoring => "monitoring",
            Self::Referral => "referral",
        }
    }
}

impl FromStr for ActionType {
    type Err = CarePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "medication" => Ok(Self::Medication),
            "diagnostic" => Ok(Self::Diagnostic),
            "lifestyle" => Ok(Self::Lifestyle),
            "followup" => Ok(Self::Followup),
            "monitoring" => Ok(Self::Monitoring),
            "referral" => Ok(Self::Referral),
            other => Err(CarePlanError::ValidationFailed(format!(
                "unknown action type '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = CarePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(CarePlanError::ValidationFailed(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// A single recommended action within a plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarePlanAction {
    pub action_id: String,
    pub action_type: ActionType,
    pub description: String,
    pub priority: Priority,
    pub timeline: String,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_source: Option<String>,
    #[serde(default)]
    pub contraindications: Vec<String>,
}

/// The clinical content of a plan. Replaced only through transitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarePlanContent {
    pub primary_diagnosis: String,
    #[serde(default)]
    pub secondary_diagnoses: Vec<String>,
    pub chief_complaint: String,
    pub clinical_summary: String,
    #[serde(default)]
    pub actions: Vec<CarePlanAction>,
    #[serde(default)]
    pub short_term_goals: Vec<String>,
    #[serde(default)]
    pub long_term_goals: Vec<String>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_instructions: Option<String>,
    #[serde(default)]
    pub educational_resources: Vec<String>,
}

impl CarePlanContent {
    /// Checks that every action has a non-empty id and that ids are unique within the plan.
    pub fn validate_actions(actions: &[CarePlanAction]) -> CarePlanResult<()> {
        let mut seen = HashSet::new();
        for action in actions {
            let id = action.action_id.trim();
            if id.is_empty() {
                return Err(CarePlanError::ValidationFailed(
                    "action_id cannot be empty".into(),
                ));
            }
            if action.description.trim().is_empty() {
                return Err(CarePlanError::ValidationFailed(format!(
                    "action '{id}' has an empty description"
                )));
            }
            if !seen.insert(id) {
                return Err(CarePlanError::ValidationFailed(format!(
                    "duplicate action_id '{id}'"
                )));
            }
        }
        Ok(())
    }
}

/// Generator metadata. Written once at creation and never changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Provenance {
    pub llm_model_used: String,
    pub generation_timestamp: DateTime<Utc>,
    pub confidence_score: ConfidenceScore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Denied,
    Edited,
}

impl ReviewDecision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Edited => "edited",
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one changed content field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldChange {
    pub field: String,
    pub previous: serde_json::Value,
    pub new: serde_json::Value,
}

/// One clinician decision, appended to a plan's review history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClinicianReview {
    pub reviewer_id: NonEmptyText,
    pub reviewer_name: NonEmptyText,
    pub review_date: DateTime<Utc>,
    pub status: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default)]
    pub modifications: Vec<FieldChange>,
    /// Content version of the plan once this review was applied.
    pub resulting_version: u64,
}

/// The `(version, revision)` pair a caller read, presented back on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub version: u64,
    pub revision: u64,
}

impl VersionStamp {
    pub const fn new(version: u64, revision: u64) -> Self {
        Self { version, revision }
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}/r{}", self.version, self.revision)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarePlan {
    pub careplan_id: ShardableUuid,
    pub patient_id: NonEmptyText,
    pub version: u64,
    pub revision: u64,
    pub status: CarePlanStatus,
    pub content: CarePlanContent,
    #[serde(default)]
    pub reviews: Vec<ClinicianReview>,
    pub provenance: Provenance,
    pub created_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_approver: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl CarePlan {
    /// A fresh draft at version 1, revision 1, with no reviews.
    pub fn new_draft(
        careplan_id: ShardableUuid,
        patient_id: NonEmptyText,
        content: CarePlanContent,
        provenance: Provenance,
    ) -> Self {
        let now = provenance.generation_timestamp;
        Self {
            careplan_id,
            patient_id,
            version: 1,
            revision: 1,
            status: CarePlanStatus::Draft,
            content,
            reviews: Vec::new(),
            provenance,
            created_date: now,
            last_modified: now,
            final_approver: None,
            approval_date: None,
            delivered_at: None,
        }
    }

    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.version, self.revision)
    }

    /// Checks that a plan is a well-formed, untouched draft.
    ///
    /// Used on everything the Draft Generator returns before it reaches the store.
    pub fn validate_new_draft(&self) -> CarePlanResult<()> {
        if self.status != CarePlanStatus::Draft {
            return Err(CarePlanError::ValidationFailed(format!(
                "new care plans must be drafts, got '{}'",
                self.status
            )));
        }
        if self.version != 1 || self.revision != 1 {
            return Err(CarePlanError::ValidationFailed(format!(
                "new care plans start at v1/r1, got {}",
                self.stamp()
            )));
        }
        if !self.reviews.is_empty()
            || self.final_approver.is_some()
            || self.approval_date.is_some()
            || self.delivered_at.is_some()
        {
            return Err(CarePlanError::ValidationFailed(
                "new care plans cannot carry review or delivery data".into(),
            ));
        }
        CarePlanContent::validate_actions(&self.content.actions)
    }

    /// Reviews ordered by `review_date`, ties kept in insertion order.
    pub fn ordered_reviews(&self) -> Vec<ClinicianReview> {
        let mut reviews = self.reviews.clone();
        reviews.sort_by_key(|r| r.review_date);
        reviews
    }
}
