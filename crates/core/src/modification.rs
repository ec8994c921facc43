//! Reviewer-supplied content changes.
//!
//! A [`ContentModifications`] names the content fields a reviewer wants to replace. Fields left
//! as `None` are untouched. Applying a modification yields the new content together with a
//! [`FieldChange`] snapshot for every field whose value actually changed.

use crate::careplan::{CarePlanAction, CarePlanContent, FieldChange};
use crate::{CarePlanError, CarePlanResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentModifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_diagnoses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<CarePlanAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_term_goals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term_goals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_metrics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub educational_resources: Option<Vec<String>>,

    // Accepted on the wire only so that `validate` can reject them with a clear message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model_used: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_timestamp: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<serde_json::Value>,
}

impl ContentModifications {
    /// True if no content field is set.
    pub fn is_empty(&self) -> bool {
        self.primary_diagnosis.is_none()
            && self.secondary_diagnoses.is_none()
            && self.chief_complaint.is_none()
            && self.clinical_summary.is_none()
            && self.actions.is_none()
            && self.short_term_goals.is_none()
            && self.long_term_goals.is_none()
            && self.success_metrics.is_none()
            && self.patient_instructions.is_none()
            && self.educational_resources.is_none()
    }

    pub fn touches_provenance(&self) -> bool {
        self.llm_model_used.is_some()
            || self.generation_timestamp.is_some()
            || self.confidence_score.is_some()
    }

    /// Rejects provenance fields, blank required text, and malformed replacement actions.
    pub fn validate(&self) -> CarePlanResult<()> {
        if self.touches_provenance() {
            return Err(CarePlanError::ValidationFailed(
                "llm_model_used, generation_timestamp and confidence_score are set at generation and cannot be modified".into(),
            ));
        }

        for (field, value) in [
            ("primary_diagnosis", &self.primary_diagnosis),
            ("chief_complaint", &self.chief_complaint),
            ("clinical_summary", &self.clinical_summary),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(CarePlanError::ValidationFailed(format!(
                    "{field} cannot be replaced with empty text"
                )));
            }
        }

        if let Some(actions) = &self.actions {
            if actions.is_empty() {
                return Err(CarePlanError::ValidationFailed(
                    "replacement actions cannot be empty".into(),
                ));
            }
            CarePlanContent::validate_actions(actions)?;
        }

        Ok(())
    }

    /// Produces the modified content and a snapshot of every field that changed.
    ///
    /// Fields that are set but equal to the current value are not reported.
    pub fn apply(
        &self,
        content: &CarePlanContent,
    ) -> CarePlanResult<(CarePlanContent, Vec<FieldChange>)> {
        let mut next = content.clone();
        let mut changes = Vec::new();

        replace(
            "primary_diagnosis",
            &mut next.primary_diagnosis,
            &self.primary_diagnosis,
            &mut changes,
        )?;
        replace(
            "secondary_diagnoses",
            &mut next.secondary_diagnoses,
            &self.secondary_diagnoses,
            &mut changes,
        )?;
        replace(
            "chief_complaint",
            &mut next.chief_complaint,
            &self.chief_complaint,
            &mut changes,
        )?;
        replace(
            "clinical_summary",
            &mut next.clinical_summary,
            &self.clinical_summary,
            &mut changes,
        )?;
        replace("actions", &mut next.actions, &self.actions, &mut changes)?;
        replace(
            "short_term_goals",
            &mut next.short_term_goals,
            &self.short_term_goals,
            &mut changes,
        )?;
        replace(
            "long_term_goals",
            &mut next.long_term_goals,
            &self.long_term_goals,
            &mut changes,
        )?;
        replace(
            "success_metrics",
            &mut next.success_metrics,
            &self.success_metrics,
            &mut changes,
        )?;
        let instructions = self.patient_instructions.clone().map(Some);
        replace(
            "patient_instructions",
            &mut next.patient_instructions,
            &instructions,
            &mut changes,
        )?;
        replace(
            "educational_resources",
            &mut next.educational_resources,
            &self.educational_resources,
            &mut changes,
        )?;

        Ok((next, changes))
    }
}

fn replace<T>(
    field: &str,
    slot: &mut T,
    replacement: &Option<T>,
    changes: &mut Vec<FieldChange>,
) -> CarePlanResult<()>
where
    T: Clone + PartialEq + Serialize,
{
    let Some(new_value) = replacement else {
        return Ok(());
    };
    if *new_value == *slot {
        return Ok(());
    }
    changes.push(FieldChange {
        field: field.to_string(),
        previous: serde_json::to_value(&*slot).map_err(CarePlanError::JsonSerialization)?,
        new: serde_json::to_value(new_value).map_err(CarePlanError::JsonSerialization)?,
    });
    *slot = new_value.clone();
    Ok(())
}
