//! Patient-facing rendering and delivery.

use crate::careplan::CarePlan;
use crate::{CarePlanError, CarePlanResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One action, phrased for the patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientAction {
    pub action: String,
    pub priority: String,
    pub when: String,
    pub why: String,
}

/// What a patient sees once a plan has been sent to them.
///
/// Review history, provenance and reviewer identities are deliberately absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCarePlan {
    pub careplan_id: String,
    pub patient_id: String,
    pub summary: String,
    pub primary_condition: String,
    pub what_you_need_to_do: Vec<PatientAction>,
    pub short_term_goals: Vec<String>,
    pub long_term_goals: Vec<String>,
    pub how_we_measure_success: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub helpful_resources: Vec<String>,
    /// Creation date, e.g. `March 04, 2026`.
    pub care_plan_date: String,
}

impl From<&CarePlan> for PatientCarePlan {
    fn from(careplan: &CarePlan) -> Self {
        let content = &careplan.content;
        Self {
            careplan_id: careplan.careplan_id.to_string(),
            patient_id: careplan.patient_id.to_string(),
            summary: content.clinical_summary.clone(),
            primary_condition: content.primary_diagnosis.clone(),
            what_you_need_to_do: content
                .actions
                .iter()
                .map(|a| PatientAction {
                    action: a.description.clone(),
                    priority: a.priority.as_str().to_string(),
                    when: a.timeline.clone(),
                    why: a.rationale.clone(),
                })
                .collect(),
            short_term_goals: content.short_term_goals.clone(),
            long_term_goals: content.long_term_goals.clone(),
            how_we_measure_success: content.success_metrics.clone(),
            instructions: content.patient_instructions.clone(),
            helpful_resources: content.educational_resources.clone(),
            care_plan_date: careplan.created_date.format("%B %d, %Y").to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub method: String,
    pub confirmation_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// Pushes a sent care plan to wherever the patient reads it.
pub trait DeliveryChannel: Send + Sync {
    fn deliver(&self, careplan: &PatientCarePlan) -> CarePlanResult<DeliveryReceipt>;
}

pub const PORTAL_DELIVERY_METHOD: &str = "patient_portal";

/// Publishes to the patient portal. The portal reads from the store, so delivery only needs to
/// record that the plan is available.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortalDelivery;

impl DeliveryChannel for PortalDelivery {
    fn deliver(&self, careplan: &PatientCarePlan) -> CarePlanResult<DeliveryReceipt> {
        if careplan.patient_id.trim().is_empty() {
            return Err(CarePlanError::InvalidInput(
                "cannot deliver a care plan without a patient".into(),
            ));
        }
        let receipt = DeliveryReceipt {
            method: PORTAL_DELIVERY_METHOD.to_string(),
            confirmation_id: uuid::Uuid::new_v4().simple().to_string(),
            delivered_at: Utc::now(),
        };
        tracing::info!(
            careplan_id = %careplan.careplan_id,
            patient_id = %careplan.patient_id,
            confirmation_id = %receipt.confirmation_id,
            "care plan published to patient portal"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::draft;
    use chrono::TimeZone;

    #[test]
    fn patient_view_formats_date_and_actions() {
        let mut plan = draft("patient-1");
        plan.created_date = Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap();
        let view = PatientCarePlan::from(&plan);

        assert_eq!(view.care_plan_date, "March 04, 2026");
        assert_eq!(view.primary_condition, plan.content.primary_diagnosis);
        assert_eq!(view.what_you_need_to_do.len(), plan.content.actions.len());
        assert_eq!(view.what_you_need_to_do[0].priority, "high");
    }

    #[test]
    fn portal_delivery_issues_receipt() {
        let plan = draft("patient-1");
        let receipt = PortalDelivery
            .deliver(&PatientCarePlan::from(&plan))
            .unwrap();
        assert_eq!(receipt.method, PORTAL_DELIVERY_METHOD);
        assert_eq!(receipt.confirmation_id.len(), 32);
    }
}
