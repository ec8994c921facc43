//! Draft generation.
//!
//! The Review Engine asks a [`DraftGenerator`] for new drafts and validates whatever comes back
//! before storing it. [`TemplateDraftGenerator`] is a deterministic, rule-based generator that
//! picks a template from the chief complaint; an LLM-backed generator implements the same trait.

use crate::careplan::{
    ActionType, CarePlan, CarePlanAction, CarePlanContent, Priority, Provenance,
};
use crate::{CarePlanError, CarePlanResult, ConfidenceScore, NonEmptyText, ShardableUuid};
use chrono::Utc;

/// Model name recorded in provenance for template drafts.
pub const TEMPLATE_MODEL_NAME: &str = "template_generator";

/// What the generator needs to draft a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftRequest {
    pub patient_id: NonEmptyText,
    pub chief_complaint: NonEmptyText,
    /// Generate even if the patient already has an open plan.
    pub override_existing: bool,
}

pub trait DraftGenerator: Send + Sync {
    /// Produce a plan in `draft` at version 1, revision 1, with no reviews.
    fn generate(&self, request: &DraftRequest) -> CarePlanResult<CarePlan>;
}

/// Share of the eight content sections that are filled in.
///
/// Sections: primary diagnosis, clinical summary, actions, short-term goals, long-term goals,
/// success metrics, patient instructions, educational resources.
pub fn completeness_score(content: &CarePlanContent) -> CarePlanResult<ConfidenceScore> {
    let filled = [
        !content.primary_diagnosis.trim().is_empty(),
        !content.clinical_summary.trim().is_empty(),
        !content.actions.is_empty(),
        !content.short_term_goals.is_empty(),
        !content.long_term_goals.is_empty(),
        !content.success_metrics.is_empty(),
        content
            .patient_instructions
            .as_deref()
            .is_some_and(|i| !i.trim().is_empty()),
        !content.educational_resources.is_empty(),
    ]
    .into_iter()
    .filter(|f| *f)
    .count();

    ConfidenceScore::new(filled as f64 / 8.0)
        .map_err(|e| CarePlanError::GenerationFailed(e.to_string()))
}

struct ActionTemplate {
    action_type: ActionType,
    description: String,
    priority: Priority,
    timeline: &'static str,
    rationale: &'static str,
}

impl ActionTemplate {
    fn new(
        action_type: ActionType,
        description: impl Into<String>,
        priority: Priority,
        timeline: &'static str,
        rationale: &'static str,
    ) -> Self {
        Self {
            action_type,
            description: description.into(),
            priority,
            timeline,
            rationale,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Template {
    Diabetes,
    Hypertension,
    General,
}

impl Template {
    fn for_complaint(complaint: &str) -> Self {
        let lower = complaint.to_lowercase();
        if lower.contains("diabetes") {
            Self::Diabetes
        } else if lower.contains("hypertension") || lower.contains("blood pressure") {
            Self::Hypertension
        } else {
            Self::General
        }
    }

    fn actions(self, complaint: &str) -> Vec<ActionTemplate> {
        use ActionType::*;
        use Priority::*;
        match self {
            Self::Diabetes => vec![
                ActionTemplate::new(
                    Medication,
                    "Continue Metformin 500mg twice daily",
                    High,
                    "ongoing",
                    "Blood glucose management",
                ),
                ActionTemplate::new(
                    Lifestyle,
                    "Low-carb diet consultation with nutritionist",
                    High,
                    "within 2 weeks",
                    "Dietary management essential for diabetes control",
                ),
                ActionTemplate::new(
                    Monitoring,
                    "HbA1c testing every 3 months",
                    Medium,
                    "quarterly",
                    "Monitor long-term glucose control",
                ),
            ],
            Self::Hypertension => vec![
                ActionTemplate::new(
                    Medication,
                    "Start ACE inhibitor (Lisinopril 10mg daily)",
                    High,
                    "immediately",
                    "First-line treatment for hypertension",
                ),
                ActionTemplate::new(
                    Lifestyle,
                    "Reduce sodium intake to <2g/day",
                    High,
                    "ongoing",
                    "Dietary sodium reduction improves BP control",
                ),
                ActionTemplate::new(
                    Monitoring,
                    "Home blood pressure monitoring twice daily",
                    Medium,
                    "daily",
                    "Track treatment response",
                ),
            ],
            Self::General => vec![
                ActionTemplate::new(
                    Diagnostic,
                    format!("Further evaluation of {complaint}"),
                    High,
                    "within 1 week",
                    "Need additional information for proper diagnosis",
                ),
                ActionTemplate::new(
                    Lifestyle,
                    "General wellness consultation",
                    Medium,
                    "within 2 weeks",
                    "Address overall health optimization",
                ),
            ],
        }
    }

    fn goals(self) -> [&'static str; 3] {
        match self {
            Self::Diabetes => [
                "Achieve HbA1c < 7%",
                "Maintain stable blood glucose levels",
                "Prevent diabetic complications",
            ],
            Self::Hypertension => [
                "Achieve blood pressure <130/80 mmHg",
                "Reduce cardiovascular risk",
                "Maintain medication adherence",
            ],
            Self::General => [
                "Establish accurate diagnosis",
                "Address patient concerns",
                "Develop comprehensive treatment plan",
            ],
        }
    }
}

/// Rule-based generator used when no model is configured.
#[derive(Clone, Debug)]
pub struct TemplateDraftGenerator {
    model_name: String,
}

impl Default for TemplateDraftGenerator {
    fn default() -> Self {
        Self {
            model_name: TEMPLATE_MODEL_NAME.to_string(),
        }
    }
}

impl TemplateDraftGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn content(&self, careplan_id: &ShardableUuid, complaint: &str) -> CarePlanContent {
        let template = Template::for_complaint(complaint);
        let actions = template
            .actions(complaint)
            .into_iter()
            .enumerate()
            .map(|(i, t)| CarePlanAction {
                action_id: format!("{careplan_id}_action_{i}"),
                action_type: t.action_type,
                description: t.description,
                priority: t.priority,
                timeline: t.timeline.to_string(),
                rationale: t.rationale.to_string(),
                evidence_source: None,
                contraindications: Vec::new(),
            })
            .collect();
        let [first, second, third] = template.goals();

        CarePlanContent {
            primary_diagnosis: complaint.to_string(),
            secondary_diagnoses: Vec::new(),
            chief_complaint: complaint.to_string(),
            clinical_summary: format!(
                "Patient presents with {complaint}. Comprehensive evaluation and management plan developed."
            ),
            actions,
            short_term_goals: vec![first.to_string(), second.to_string()],
            long_term_goals: vec![third.to_string()],
            success_metrics: vec![
                "Patient reports symptom improvement".to_string(),
                "Clinical markers within target range".to_string(),
                "Treatment adherence >80%".to_string(),
            ],
            patient_instructions: Some(format!(
                "Follow prescribed treatment plan for {complaint}. Contact provider with concerns."
            )),
            educational_resources: vec![
                format!("Patient education materials for {complaint}"),
                "General wellness resources".to_string(),
            ],
        }
    }
}

impl DraftGenerator for TemplateDraftGenerator {
    fn generate(&self, request: &DraftRequest) -> CarePlanResult<CarePlan> {
        let careplan_id = ShardableUuid::new();
        let content = self.content(&careplan_id, request.chief_complaint.as_str());
        let confidence_score = completeness_score(&content)?;

        Ok(CarePlan::new_draft(
            careplan_id,
            request.patient_id.clone(),
            content,
            Provenance {
                llm_model_used: self.model_name.clone(),
                generation_timestamp: Utc::now(),
                confidence_score,
            },
        ))
    }
}
