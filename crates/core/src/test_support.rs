//! Fixtures shared by unit tests across the crate.

use crate::careplan::{
    ActionType, CarePlan, CarePlanAction, CarePlanContent, Priority, Provenance,
};
use crate::delivery::{DeliveryChannel, DeliveryReceipt, PatientCarePlan};
use crate::role::{Caller, Role};
use crate::store::{ChangeAction, ChangeContext};
use crate::{CarePlanError, CarePlanResult, ConfidenceScore, NonEmptyText, ShardableUuid};
use chrono::Utc;

fn text(s: &str) -> NonEmptyText {
    NonEmptyText::new(s).unwrap()
}

/// A valid draft at v1/r1 with a fresh id. The first action is high priority.
pub(crate) fn draft(patient_id: &str) -> CarePlan {
    let content = CarePlanContent {
        primary_diagnosis: "Type 2 diabetes".into(),
        chief_complaint: "Raised blood glucose".into(),
        clinical_summary: "Newly diagnosed, HbA1c 58 mmol/mol.".into(),
        actions: vec![
            CarePlanAction {
                action_id: "a1".into(),
                action_type: ActionType::Medication,
                description: "Start metformin 500mg daily".into(),
                priority: Priority::High,
                timeline: "immediately".into(),
                rationale: "First-line glucose control".into(),
                evidence_source: None,
                contraindications: Vec::new(),
            },
            CarePlanAction {
                action_id: "a2".into(),
                action_type: ActionType::Monitoring,
                description: "Repeat HbA1c".into(),
                priority: Priority::Medium,
                timeline: "in 3 months".into(),
                rationale: "Check response".into(),
                evidence_source: Some("NICE NG28".into()),
                contraindications: Vec::new(),
            },
        ],
        short_term_goals: vec!["HbA1c below 53 mmol/mol".into()],
        ..Default::default()
    };
    CarePlan::new_draft(
        ShardableUuid::new(),
        text(patient_id),
        content,
        Provenance {
            llm_model_used: "test-model".into(),
            generation_timestamp: Utc::now(),
            confidence_score: ConfidenceScore::new(0.5).unwrap(),
        },
    )
}

pub(crate) fn change(action: ChangeAction) -> ChangeContext {
    ChangeContext {
        action,
        actor_id: text("dr-1"),
        actor_name: text("Dr One"),
    }
}

pub(crate) fn clinician(id: &str) -> Caller {
    Caller::new(text(id), Role::Clinician)
}

pub(crate) fn admin(id: &str) -> Caller {
    Caller::new(text(id), Role::Admin)
}

pub(crate) fn patient(id: &str, patient_id: &str) -> Caller {
    Caller::patient(text(id), text(patient_id))
}

/// A delivery channel that is always down.
pub(crate) struct FailingDelivery;

impl DeliveryChannel for FailingDelivery {
    fn deliver(&self, _careplan: &PatientCarePlan) -> CarePlanResult<DeliveryReceipt> {
        Err(CarePlanError::InvalidInput("portal unavailable".into()))
    }
}
