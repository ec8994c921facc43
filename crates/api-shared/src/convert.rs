//! Conversions between `cpr-core` domain types and the generated wire types.
//!
//! Outbound conversions are infallible `From` impls. Inbound ones parse and can fail with the
//! same [`CarePlanError`] kinds the engine uses, so both APIs map them to statuses the same way.

use crate::pb;
use chrono::{DateTime, Utc};
use cpr_core::{
    CarePlan, CarePlanAction, CarePlanContent, CarePlanError, CarePlanResult, CarePlanStatus,
    ClinicianReview, ContentModifications, DeliveryReceipt, DraftRequest, FieldChange,
    NonEmptyText, PatientCarePlan, Provenance, RevisionRecord, Reviewer, SendOutcome,
    ShardableUuid, VersionStamp,
};

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

impl From<&CarePlanAction> for pb::CarePlanAction {
    fn from(a: &CarePlanAction) -> Self {
        Self {
            action_id: a.action_id.clone(),
            action_type: a.action_type.as_str().to_string(),
            description: a.description.clone(),
            priority: a.priority.as_str().to_string(),
            timeline: a.timeline.clone(),
            rationale: a.rationale.clone(),
            evidence_source: a.evidence_source.clone(),
            contraindications: a.contraindications.clone(),
        }
    }
}

impl From<&CarePlanContent> for pb::CarePlanContent {
    fn from(c: &CarePlanContent) -> Self {
        Self {
            primary_diagnosis: c.primary_diagnosis.clone(),
            secondary_diagnoses: c.secondary_diagnoses.clone(),
            chief_complaint: c.chief_complaint.clone(),
            clinical_summary: c.clinical_summary.clone(),
            actions: c.actions.iter().map(Into::into).collect(),
            short_term_goals: c.short_term_goals.clone(),
            long_term_goals: c.long_term_goals.clone(),
            success_metrics: c.success_metrics.clone(),
            patient_instructions: c.patient_instructions.clone(),
            educational_resources: c.educational_resources.clone(),
        }
    }
}

impl From<&Provenance> for pb::Provenance {
    fn from(p: &Provenance) -> Self {
        Self {
            llm_model_used: p.llm_model_used.clone(),
            generation_timestamp: timestamp(p.generation_timestamp),
            confidence_score: p.confidence_score.value(),
        }
    }
}

impl From<&FieldChange> for pb::FieldChange {
    fn from(c: &FieldChange) -> Self {
        Self {
            field: c.field.clone(),
            previous: c.previous.to_string(),
            new: c.new.to_string(),
        }
    }
}

impl From<&ClinicianReview> for pb::ClinicianReview {
    fn from(r: &ClinicianReview) -> Self {
        Self {
            reviewer_id: r.reviewer_id.to_string(),
            reviewer_name: r.reviewer_name.to_string(),
            review_date: timestamp(r.review_date),
            status: r.status.as_str().to_string(),
            comments: r.comments.clone(),
            modifications: r.modifications.iter().map(Into::into).collect(),
            resulting_version: r.resulting_version,
        }
    }
}

impl From<&CarePlan> for pb::CarePlan {
    fn from(p: &CarePlan) -> Self {
        Self {
            careplan_id: p.careplan_id.to_string(),
            patient_id: p.patient_id.to_string(),
            version: p.version,
            revision: p.revision,
            status: p.status.as_str().to_string(),
            content: Some((&p.content).into()),
            reviews: p.reviews.iter().map(Into::into).collect(),
            provenance: Some((&p.provenance).into()),
            created_date: timestamp(p.created_date),
            last_modified: timestamp(p.last_modified),
            final_approver: p.final_approver.as_ref().map(ToString::to_string),
            approval_date: p.approval_date.map(timestamp),
            delivered_at: p.delivered_at.map(timestamp),
        }
    }
}

impl From<&RevisionRecord> for pb::RevisionRecord {
    fn from(r: &RevisionRecord) -> Self {
        Self {
            revision: r.revision,
            version: r.version,
            status: r.status.as_str().to_string(),
            action: r.action.as_str().to_string(),
            actor_id: r.actor_id.clone(),
            actor_name: r.actor_name.clone(),
            recorded_at: timestamp(r.recorded_at),
        }
    }
}

impl From<&PatientCarePlan> for pb::PatientCarePlan {
    fn from(v: &PatientCarePlan) -> Self {
        Self {
            careplan_id: v.careplan_id.clone(),
            patient_id: v.patient_id.clone(),
            summary: v.summary.clone(),
            primary_condition: v.primary_condition.clone(),
            what_you_need_to_do: v
                .what_you_need_to_do
                .iter()
                .map(|a| pb::PatientAction {
                    action: a.action.clone(),
                    priority: a.priority.clone(),
                    when: a.when.clone(),
                    why: a.why.clone(),
                })
                .collect(),
            short_term_goals: v.short_term_goals.clone(),
            long_term_goals: v.long_term_goals.clone(),
            how_we_measure_success: v.how_we_measure_success.clone(),
            instructions: v.instructions.clone(),
            helpful_resources: v.helpful_resources.clone(),
            care_plan_date: v.care_plan_date.clone(),
        }
    }
}

impl From<&DeliveryReceipt> for pb::DeliveryReceipt {
    fn from(r: &DeliveryReceipt) -> Self {
        Self {
            method: r.method.clone(),
            confirmation_id: r.confirmation_id.clone(),
            delivered_at: timestamp(r.delivered_at),
        }
    }
}

impl From<&CarePlan> for pb::CarePlanRes {
    fn from(p: &CarePlan) -> Self {
        Self {
            careplan: Some(p.into()),
        }
    }
}

impl From<&SendOutcome> for pb::SendToPatientRes {
    fn from(o: &SendOutcome) -> Self {
        Self {
            careplan: Some((&o.careplan).into()),
            receipt: o.receipt.as_ref().map(Into::into),
        }
    }
}

pub fn careplans_res(plans: &[CarePlan]) -> pb::ListCarePlansRes {
    pb::ListCarePlansRes {
        careplans: plans.iter().map(Into::into).collect(),
    }
}

// ----- inbound -----

pub fn careplan_id(raw: &str) -> CarePlanResult<ShardableUuid> {
    Ok(ShardableUuid::parse(raw.trim())?)
}

pub fn stamp(version: u64, revision: u64) -> VersionStamp {
    VersionStamp::new(version, revision)
}

pub fn reviewer(id: &str, name: &str) -> CarePlanResult<Reviewer> {
    Reviewer::new(id, name)
}

/// An empty string means "no filter".
pub fn status_filter(raw: Option<&str>) -> CarePlanResult<Option<CarePlanStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

pub fn draft_request(patient_id: &str, req: &pb::GenerateCarePlanReq) -> CarePlanResult<DraftRequest> {
    let patient_id = NonEmptyText::new(patient_id)
        .map_err(|_| CarePlanError::InvalidInput("patient_id is required".into()))?;
    let chief_complaint = NonEmptyText::new(&req.chief_complaint)
        .map_err(|_| CarePlanError::ValidationFailed("chief_complaint is required".into()))?;
    Ok(DraftRequest {
        patient_id,
        chief_complaint,
        override_existing: req.override_existing,
    })
}

pub fn action(a: pb::CarePlanAction) -> CarePlanResult<CarePlanAction> {
    Ok(CarePlanAction {
        action_id: a.action_id,
        action_type: a.action_type.parse()?,
        description: a.description,
        priority: a.priority.parse()?,
        timeline: a.timeline,
        rationale: a.rationale,
        evidence_source: a.evidence_source,
        contraindications: a.contraindications,
    })
}

pub fn modifications(m: pb::ContentModifications) -> CarePlanResult<ContentModifications> {
    let list = |l: Option<pb::StringList>| l.map(|l| l.items);
    let actions = match m.actions {
        Some(actions) => Some(
            actions
                .items
                .into_iter()
                .map(action)
                .collect::<CarePlanResult<Vec<_>>>()?,
        ),
        None => None,
    };

    Ok(ContentModifications {
        primary_diagnosis: m.primary_diagnosis,
        secondary_diagnoses: list(m.secondary_diagnoses),
        chief_complaint: m.chief_complaint,
        clinical_summary: m.clinical_summary,
        actions,
        short_term_goals: list(m.short_term_goals),
        long_term_goals: list(m.long_term_goals),
        success_metrics: list(m.success_metrics),
        patient_instructions: m.patient_instructions,
        educational_resources: list(m.educational_resources),
        llm_model_used: m.llm_model_used.map(serde_json::Value::from),
        generation_timestamp: m.generation_timestamp.map(serde_json::Value::from),
        confidence_score: m.confidence_score.map(serde_json::Value::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpr_core::{ActionType, ErrorKind, Priority};

    fn wire_action(action_type: &str) -> pb::CarePlanAction {
        pb::CarePlanAction {
            action_id: "a1".into(),
            action_type: action_type.into(),
            description: "Walk 30 minutes".into(),
            priority: "medium".into(),
            timeline: "daily".into(),
            rationale: "Cardiovascular fitness".into(),
            ..Default::default()
        }
    }

    #[test]
    fn modifications_keep_absent_lists_absent() {
        let mods = modifications(pb::ContentModifications {
            clinical_summary: Some("Updated".into()),
            short_term_goals: Some(pb::StringList { items: vec![] }),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(mods.clinical_summary.as_deref(), Some("Updated"));
        assert_eq!(mods.short_term_goals, Some(vec![]));
        assert!(mods.long_term_goals.is_none());
        assert!(mods.actions.is_none());
    }

    #[test]
    fn wire_actions_are_parsed() {
        let mods = modifications(pb::ContentModifications {
            actions: Some(pb::ActionList {
                items: vec![wire_action("lifestyle")],
            }),
            ..Default::default()
        })
        .unwrap();
        let actions = mods.actions.unwrap();
        assert_eq!(actions[0].action_type, ActionType::Lifestyle);
        assert_eq!(actions[0].priority, Priority::Medium);

        let err = action(wire_action("surgery")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn provenance_on_the_wire_is_rejected_by_validation() {
        let mods = modifications(pb::ContentModifications {
            confidence_score: Some(0.99),
            ..Default::default()
        })
        .unwrap();
        assert!(mods.touches_provenance());
        assert_eq!(mods.validate().unwrap_err().kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn status_filter_parses_or_rejects() {
        assert_eq!(status_filter(None).unwrap(), None);
        assert_eq!(status_filter(Some("")).unwrap(), None);
        assert_eq!(
            status_filter(Some("under_review")).unwrap(),
            Some(CarePlanStatus::UnderReview)
        );
        assert_eq!(
            status_filter(Some("pending")).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn careplan_id_must_be_canonical() {
        let id = ShardableUuid::new();
        assert_eq!(careplan_id(&id.to_string()).unwrap(), id);
        assert_eq!(
            careplan_id("not-a-uuid").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
}
