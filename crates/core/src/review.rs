//! The Review Engine.
//!
//! Every operation on a care plan enters here. A transition is checked in a fixed order:
//!
//! 1. the caller's role grants the event's capability,
//! 2. the plan exists,
//! 3. the caller's [`VersionStamp`] matches the stored one,
//! 4. the state table has an edge for the event,
//! 5. the payload is valid,
//!
//! and is then committed with [`CarePlanStore::compare_and_swap`]. The engine keeps no state
//! between calls; it re-reads the plan for every transition, so concurrent reviewers are
//! reconciled entirely by the store's stamp check.

use crate::audit;
use crate::careplan::{
    CarePlan, CarePlanStatus, ClinicianReview, FieldChange, ReviewDecision, VersionStamp,
};
use crate::delivery::{DeliveryChannel, DeliveryReceipt, PatientCarePlan, PortalDelivery};
use crate::error::ErrorKind;
use crate::generator::{DraftGenerator, DraftRequest, TemplateDraftGenerator};
use crate::modification::ContentModifications;
use crate::role::{Caller, Capability, Role};
use crate::store::{CarePlanStore, ChangeAction, ChangeContext, RevisionRecord};
use crate::transition::Event;
use crate::{CarePlanError, CarePlanResult, NonEmptyText, ShardableUuid};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The clinician recorded on a review.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reviewer {
    pub id: NonEmptyText,
    pub name: NonEmptyText,
}

impl Reviewer {
    /// # Errors
    ///
    /// [`CarePlanError::ValidationFailed`] if either field is blank, or the name has no letters
    /// or digits.
    pub fn new(id: &str, name: &str) -> CarePlanResult<Self> {
        let id = NonEmptyText::new(id)
            .map_err(|_| CarePlanError::ValidationFailed("reviewer_id is required".into()))?;
        let name = NonEmptyText::new(name)
            .map_err(|_| CarePlanError::ValidationFailed("reviewer_name is required".into()))?;
        if !name.as_str().chars().any(char::is_alphanumeric) {
            return Err(CarePlanError::ValidationFailed(
                "reviewer_name must contain a letter or digit".into(),
            ));
        }
        Ok(Self { id, name })
    }
}

/// Result of [`ReviewEngine::send_to_patient`].
///
/// `receipt` is `None` when the plan was sent but the delivery channel failed; the transition
/// stands and the failure is logged.
#[derive(Clone, Debug, PartialEq)]
pub struct SendOutcome {
    pub careplan: CarePlan,
    pub receipt: Option<DeliveryReceipt>,
}

#[derive(Clone)]
pub struct ReviewEngine {
    store: Arc<dyn CarePlanStore>,
    generator: Arc<dyn DraftGenerator>,
    delivery: Arc<dyn DeliveryChannel>,
}

impl ReviewEngine {
    pub fn new(
        store: Arc<dyn CarePlanStore>,
        generator: Arc<dyn DraftGenerator>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Self {
        Self {
            store,
            generator,
            delivery,
        }
    }

    /// An engine using the template generator and portal delivery.
    pub fn with_store(store: Arc<dyn CarePlanStore>) -> Self {
        Self::new(
            store,
            Arc::new(TemplateDraftGenerator::new()),
            Arc::new(PortalDelivery),
        )
    }

    // ----- creation -----

    /// Generate and store a new draft.
    ///
    /// Unless `override_existing` is set, a patient's open plan (`draft` or `under_review`) is
    /// returned instead of generating another. Nothing is stored if generation fails.
    pub fn create_draft(&self, caller: &Caller, request: &DraftRequest) -> CarePlanResult<CarePlan> {
        let result = (|| {
            caller.require(Capability::Generate)?;

            if !request.override_existing {
                let open = self
                    .store
                    .list_by_patient(request.patient_id.as_str())?
                    .into_iter()
                    .find(|p| {
                        matches!(p.status, CarePlanStatus::Draft | CarePlanStatus::UnderReview)
                    });
                if let Some(existing) = open {
                    tracing::info!(
                        careplan_id = %existing.careplan_id,
                        "returning existing open care plan instead of generating"
                    );
                    return Ok(existing);
                }
            }

            let careplan = self.generator.generate(request).map_err(|e| match e {
                CarePlanError::GenerationFailed(_) => e,
                other => CarePlanError::GenerationFailed(other.to_string()),
            })?;
            careplan
                .validate_new_draft()
                .map_err(|e| CarePlanError::GenerationFailed(e.to_string()))?;
            if careplan.patient_id != request.patient_id {
                return Err(CarePlanError::GenerationFailed(
                    "generator returned a plan for a different patient".into(),
                ));
            }

            let change = ChangeContext {
                action: ChangeAction::Create,
                actor_id: caller.id().clone(),
                actor_name: caller.id().clone(),
            };
            self.store.insert(&careplan, &change)?;
            audit::transition_applied(ChangeAction::Create.as_str(), &careplan, caller);
            Ok(careplan)
        })();
        self.audited("create_draft", None, caller, result)
    }

    // ----- reads -----

    pub fn get(&self, caller: &Caller, id: &ShardableUuid) -> CarePlanResult<CarePlan> {
        let result = (|| {
            let careplan = self.store.get(id)?;
            authorize_read(caller, &careplan)?;
            if caller.role() != Role::Patient {
                audit::careplan_viewed("get", id, caller);
            }
            Ok(careplan)
        })();
        self.audited("get", Some(id), caller, result)
    }

    /// A patient's plans, most recently modified first.
    ///
    /// Patients may only list their own, and only see plans that have been sent to them.
    pub fn list_by_patient(&self, caller: &Caller, patient_id: &str) -> CarePlanResult<Vec<CarePlan>> {
        let result = (|| {
            if caller.require(Capability::ViewAll).is_ok() {
                return self.store.list_by_patient(patient_id);
            }
            caller.require(Capability::ViewOwn)?;
            if caller.patient_id().map(|p| p.as_str()) != Some(patient_id) {
                return Err(CarePlanError::Forbidden {
                    role: caller.role(),
                    action: "list_other_patient".into(),
                });
            }
            Ok(self
                .store
                .list_by_patient(patient_id)?
                .into_iter()
                .filter(|p| p.status.is_patient_visible())
                .collect())
        })();
        self.audited("list_by_patient", None, caller, result)
    }

    /// All plans, or only those in `status`. `Some(UnderReview)` is the pending-review queue.
    pub fn list_by_status(
        &self,
        caller: &Caller,
        status: Option<CarePlanStatus>,
    ) -> CarePlanResult<Vec<CarePlan>> {
        let result = (|| {
            caller.require(Capability::ViewAll)?;
            self.store.list_by_status(status)
        })();
        self.audited("list_by_status", None, caller, result)
    }

    /// Reviews ordered by `review_date`, ties in insertion order.
    pub fn get_history(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
    ) -> CarePlanResult<Vec<ClinicianReview>> {
        let result = (|| {
            caller.require(Capability::ViewAll)?;
            let careplan = self.store.get(id)?;
            audit::careplan_viewed("get_history", id, caller);
            Ok(careplan.ordered_reviews())
        })();
        self.audited("get_history", Some(id), caller, result)
    }

    /// Every retained state of the plan, oldest first.
    pub fn revisions(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
    ) -> CarePlanResult<Vec<RevisionRecord>> {
        let result = (|| {
            caller.require(Capability::ViewAll)?;
            let revisions = self.store.revisions(id)?;
            audit::careplan_viewed("revisions", id, caller);
            Ok(revisions)
        })();
        self.audited("revisions", Some(id), caller, result)
    }

    /// The patient-facing rendering of a plan.
    pub fn patient_view(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
    ) -> CarePlanResult<PatientCarePlan> {
        self.get(caller, id).map(|careplan| PatientCarePlan::from(&careplan))
    }

    // ----- transitions -----

    /// `draft → under_review`. The plan must have at least one action.
    pub fn submit_for_review(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
    ) -> CarePlanResult<CarePlan> {
        self.transition(caller, id, expected, Event::SubmitForReview, None, |careplan, _| {
            if careplan.content.actions.is_empty() {
                return Err(CarePlanError::ValidationFailed(
                    "a care plan needs at least one action before review".into(),
                ));
            }
            Ok(())
        })
    }

    /// `under_review → approved`.
    ///
    /// The content version moves only if `modifications` actually change something.
    pub fn approve(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
        reviewer: &Reviewer,
        comments: Option<&str>,
        modifications: Option<&ContentModifications>,
    ) -> CarePlanResult<CarePlan> {
        self.transition(
            caller,
            id,
            expected,
            Event::Approve,
            Some(&reviewer.name),
            |careplan, now| {
                check_reviewer(caller, reviewer)?;
                let changes = match modifications {
                    Some(mods) => apply_modifications(careplan, mods)?,
                    None => Vec::new(),
                };
                careplan.final_approver = Some(reviewer.id.clone());
                careplan.approval_date = Some(now);
                append_review(
                    careplan,
                    reviewer,
                    ReviewDecision::Approved,
                    comments,
                    changes,
                    now,
                );
                Ok(())
            },
        )
    }

    /// `under_review → denied`. Comments are required.
    pub fn deny(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
        reviewer: &Reviewer,
        comments: Option<&str>,
    ) -> CarePlanResult<CarePlan> {
        self.transition(
            caller,
            id,
            expected,
            Event::Deny,
            Some(&reviewer.name),
            |careplan, now| {
                check_reviewer(caller, reviewer)?;
                if normalise_comments(comments).is_none() {
                    return Err(CarePlanError::ValidationFailed(
                        "comments are required when denying a care plan".into(),
                    ));
                }
                append_review(
                    careplan,
                    reviewer,
                    ReviewDecision::Denied,
                    comments,
                    Vec::new(),
                    now,
                );
                Ok(())
            },
        )
    }

    /// Replace content and bump the version.
    ///
    /// In `under_review` this is edit-and-resubmit; in `approved`, `sent_to_patient` and
    /// `active` it is a correction. The status does not change either way.
    pub fn edit(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
        reviewer: &Reviewer,
        modifications: &ContentModifications,
        comments: Option<&str>,
    ) -> CarePlanResult<CarePlan> {
        self.transition(
            caller,
            id,
            expected,
            Event::Edit,
            Some(&reviewer.name),
            |careplan, now| {
                check_reviewer(caller, reviewer)?;
                let changes = apply_modifications(careplan, modifications)?;
                if changes.is_empty() {
                    return Err(CarePlanError::ValidationFailed(
                        "edit does not change any field".into(),
                    ));
                }
                append_review(
                    careplan,
                    reviewer,
                    ReviewDecision::Edited,
                    comments,
                    changes,
                    now,
                );
                Ok(())
            },
        )
    }

    /// `approved → sent_to_patient`, then notify the delivery channel.
    pub fn send_to_patient(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
    ) -> CarePlanResult<SendOutcome> {
        let careplan =
            self.transition(caller, id, expected, Event::SendToPatient, None, |careplan, now| {
                careplan.delivered_at = Some(now);
                Ok(())
            })?;

        let receipt = match self.delivery.deliver(&PatientCarePlan::from(&careplan)) {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                tracing::error!(
                    careplan_id = %careplan.careplan_id,
                    error = %e,
                    "care plan sent but delivery failed"
                );
                None
            }
        };
        Ok(SendOutcome { careplan, receipt })
    }

    /// `sent_to_patient → active`. Clinicians trigger it, or the system via [`Caller::system`].
    pub fn activate(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
    ) -> CarePlanResult<CarePlan> {
        self.transition(caller, id, expected, Event::Activate, None, |_, _| Ok(()))
    }

    /// `active → completed`.
    pub fn complete(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
    ) -> CarePlanResult<CarePlan> {
        self.transition(caller, id, expected, Event::Complete, None, |_, _| Ok(()))
    }

    fn transition<F>(
        &self,
        caller: &Caller,
        id: &ShardableUuid,
        expected: VersionStamp,
        event: Event,
        actor_name: Option<&NonEmptyText>,
        apply: F,
    ) -> CarePlanResult<CarePlan>
    where
        F: FnOnce(&mut CarePlan, DateTime<Utc>) -> CarePlanResult<()>,
    {
        let result = (|| {
            caller.require(event.capability())?;

            let current = self.store.get(id)?;
            if current.stamp() != expected {
                return Err(CarePlanError::StaleVersion {
                    careplan_id: id.to_string(),
                    expected,
                    actual: current.stamp(),
                });
            }
            let to = event.apply(current.status)?;

            let now = Utc::now().max(current.last_modified);
            let mut next = current.clone();
            apply(&mut next, now)?;
            next.status = to;
            next.revision = current.revision + 1;
            next.last_modified = now;

            let change = ChangeContext {
                action: event.into(),
                actor_id: caller.id().clone(),
                actor_name: actor_name.unwrap_or(caller.id()).clone(),
            };
            self.store.compare_and_swap(expected, &next, &change)?;
            audit::transition_applied(event.as_str(), &next, caller);
            Ok(next)
        })();
        self.audited(event.as_str(), Some(id), caller, result)
    }

    fn audited<T>(
        &self,
        action: &str,
        id: Option<&ShardableUuid>,
        caller: &Caller,
        result: CarePlanResult<T>,
    ) -> CarePlanResult<T> {
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Storage {
                tracing::error!(action, error = %e, "care plan storage failure");
            } else {
                audit::operation_rejected(action, id, caller, e);
            }
        }
        result
    }
}

/// Clinicians and admins may read everything; patients only their own plans once sent.
fn authorize_read(caller: &Caller, careplan: &CarePlan) -> CarePlanResult<()> {
    if caller.require(Capability::ViewAll).is_ok() {
        return Ok(());
    }
    caller.require(Capability::ViewOwn)?;
    let own = caller.patient_id() == Some(&careplan.patient_id);
    if own && careplan.status.is_patient_visible() {
        Ok(())
    } else {
        Err(CarePlanError::Forbidden {
            role: caller.role(),
            action: "view_careplan".into(),
        })
    }
}

/// Only admins may record a review under someone else's id.
fn check_reviewer(caller: &Caller, reviewer: &Reviewer) -> CarePlanResult<()> {
    if caller.role() == Role::Admin || reviewer.id == *caller.id() {
        Ok(())
    } else {
        Err(CarePlanError::Forbidden {
            role: caller.role(),
            action: "review_on_behalf_of_another_clinician".into(),
        })
    }
}

/// Validates and applies `mods`, bumping the version if anything changed.
fn apply_modifications(
    careplan: &mut CarePlan,
    mods: &ContentModifications,
) -> CarePlanResult<Vec<FieldChange>> {
    mods.validate()?;
    let (content, changes) = mods.apply(&careplan.content)?;
    if !changes.is_empty() {
        careplan.content = content;
        careplan.version += 1;
    }
    Ok(changes)
}

fn normalise_comments(comments: Option<&str>) -> Option<String> {
    comments
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn append_review(
    careplan: &mut CarePlan,
    reviewer: &Reviewer,
    decision: ReviewDecision,
    comments: Option<&str>,
    modifications: Vec<FieldChange>,
    now: DateTime<Utc>,
) {
    careplan.reviews.push(ClinicianReview {
        reviewer_id: reviewer.id.clone(),
        reviewer_name: reviewer.name.clone(),
        review_date: now,
        status: decision,
        comments: normalise_comments(comments),
        modifications,
        resulting_version: careplan.version,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::careplan::CarePlanAction;
    use crate::store::InMemoryCarePlanStore;
    use crate::test_support::{admin, clinician, draft, patient, FailingDelivery};

    struct Fixture {
        engine: ReviewEngine,
        store: Arc<InMemoryCarePlanStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCarePlanStore::new());
        Fixture {
            engine: ReviewEngine::with_store(store.clone()),
            store,
        }
    }

    fn request(patient_id: &str) -> DraftRequest {
        DraftRequest {
            patient_id: NonEmptyText::new(patient_id).unwrap(),
            chief_complaint: NonEmptyText::new("type 2 diabetes").unwrap(),
            override_existing: false,
        }
    }

    fn reviewer(id: &str) -> Reviewer {
        Reviewer::new(id, "Dr Jane Smith").unwrap()
    }

    fn summary_edit(text: &str) -> ContentModifications {
        ContentModifications {
            clinical_summary: Some(text.into()),
            ..Default::default()
        }
    }

    /// A stored plan already submitted for review.
    fn under_review(f: &Fixture) -> CarePlan {
        let dr = clinician("dr-1");
        let plan = f.engine.create_draft(&dr, &request("patient-1")).unwrap();
        f.engine
            .submit_for_review(&dr, &plan.careplan_id, plan.stamp())
            .unwrap()
    }

    #[test]
    fn full_lifecycle_tracks_version_and_revision() {
        let f = fixture();
        let dr = clinician("dr-1");

        let plan = f.engine.create_draft(&dr, &request("patient-1")).unwrap();
        assert_eq!(plan.stamp(), VersionStamp::new(1, 1));

        let plan = f
            .engine
            .submit_for_review(&dr, &plan.careplan_id, plan.stamp())
            .unwrap();
        assert_eq!(plan.status, CarePlanStatus::UnderReview);
        assert_eq!(plan.version, 1);

        let plan = f
            .engine
            .approve(
                &dr,
                &plan.careplan_id,
                plan.stamp(),
                &reviewer("dr-1"),
                Some("Looks right"),
                Some(&summary_edit("Well controlled on metformin.")),
            )
            .unwrap();
        assert_eq!(plan.status, CarePlanStatus::Approved);
        assert_eq!(plan.version, 2);
        assert_eq!(plan.reviews.len(), 1);
        assert_eq!(plan.reviews[0].resulting_version, 2);
        assert_eq!(plan.final_approver.as_ref().unwrap().as_str(), "dr-1");
        assert!(plan.approval_date.is_some());

        let sent = f
            .engine
            .send_to_patient(&dr, &plan.careplan_id, plan.stamp())
            .unwrap();
        assert_eq!(sent.careplan.status, CarePlanStatus::SentToPatient);
        assert_eq!(sent.careplan.version, 2);
        assert!(sent.careplan.delivered_at.is_some());
        assert!(sent.receipt.is_some());

        let plan = f
            .engine
            .activate(&Caller::system(), &plan.careplan_id, sent.careplan.stamp())
            .unwrap();
        assert_eq!(plan.status, CarePlanStatus::Active);

        let plan = f
            .engine
            .complete(&dr, &plan.careplan_id, plan.stamp())
            .unwrap();
        assert_eq!(plan.status, CarePlanStatus::Completed);
        assert_eq!(plan.stamp(), VersionStamp::new(2, 6));

        let revisions = f.engine.revisions(&dr, &plan.careplan_id).unwrap();
        let revs: Vec<_> = revisions.iter().map(|r| r.revision).collect();
        assert_eq!(revs, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn approve_without_modifications_keeps_version() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);

        let approved = f
            .engine
            .approve(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), None, None)
            .unwrap();
        assert_eq!(approved.version, plan.version);
        assert_eq!(approved.revision, plan.revision + 1);
        assert!(approved.reviews[0].modifications.is_empty());
    }

    #[test]
    fn concurrent_approvals_on_same_stamp_admit_one() {
        let f = fixture();
        let plan = under_review(&f);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = ["dr-1", "dr-2"]
                .into_iter()
                .map(|id| {
                    let engine = &f.engine;
                    let plan = &plan;
                    s.spawn(move || {
                        engine.approve(
                            &clinician(id),
                            &plan.careplan_id,
                            plan.stamp(),
                            &reviewer(id),
                            None,
                            None,
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(CarePlanError::StaleVersion { .. })
        )));
        let stored = f.store.get(&plan.careplan_id).unwrap();
        assert_eq!(stored.reviews.len(), 1);
    }

    #[test]
    fn deny_then_concurrent_approve_is_stale() {
        let f = fixture();
        let dr = clinician("dr-1");
        let mut plan = under_review(&f);
        for text in ["first pass", "second pass"] {
            plan = f
                .engine
                .edit(
                    &dr,
                    &plan.careplan_id,
                    plan.stamp(),
                    &reviewer("dr-1"),
                    &summary_edit(text),
                    None,
                )
                .unwrap();
        }
        assert_eq!(plan.status, CarePlanStatus::UnderReview);
        assert_eq!(plan.version, 3);
        let read_state = plan.stamp();

        let denied = f
            .engine
            .deny(
                &clinician("dr-a"),
                &plan.careplan_id,
                read_state,
                &reviewer("dr-a"),
                Some("Dose too high"),
            )
            .unwrap();
        assert_eq!(denied.status, CarePlanStatus::Denied);
        assert_eq!(denied.version, 3);

        let err = f
            .engine
            .approve(
                &clinician("dr-b"),
                &plan.careplan_id,
                read_state,
                &reviewer("dr-b"),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CarePlanError::StaleVersion { .. }));
    }

    #[test]
    fn deny_without_comments_leaves_state_unchanged() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);

        for comments in [None, Some("   ")] {
            let err = f
                .engine
                .deny(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), comments)
                .unwrap_err();
            assert!(matches!(err, CarePlanError::ValidationFailed(_)));
        }
        assert_eq!(f.store.get(&plan.careplan_id).unwrap(), plan);
    }

    #[test]
    fn edit_of_summary_leaves_provenance_alone() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);

        let edited = f
            .engine
            .edit(
                &dr,
                &plan.careplan_id,
                plan.stamp(),
                &reviewer("dr-1"),
                &summary_edit("Revised summary."),
                Some("clarified"),
            )
            .unwrap();
        assert_eq!(edited.provenance, plan.provenance);
        assert_eq!(edited.version, plan.version + 1);
        assert_eq!(edited.reviews[0].status, ReviewDecision::Edited);
        assert_eq!(edited.reviews[0].modifications[0].field, "clinical_summary");
    }

    #[test]
    fn payload_with_provenance_is_rejected() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);
        let mods = ContentModifications {
            clinical_summary: Some("x".into()),
            confidence_score: Some(serde_json::json!(1.0)),
            ..Default::default()
        };

        let err = f
            .engine
            .edit(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), &mods, None)
            .unwrap_err();
        assert!(matches!(err, CarePlanError::ValidationFailed(_)));
    }

    #[test]
    fn edit_that_changes_nothing_fails() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);
        let same = summary_edit(&plan.content.clinical_summary);

        let err = f
            .engine
            .edit(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), &same, None)
            .unwrap_err();
        assert!(matches!(err, CarePlanError::ValidationFailed(_)));
    }

    #[test]
    fn correction_after_send_keeps_status() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);
        let plan = f
            .engine
            .approve(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), None, None)
            .unwrap();
        let sent = f
            .engine
            .send_to_patient(&dr, &plan.careplan_id, plan.stamp())
            .unwrap()
            .careplan;

        let corrected = f
            .engine
            .edit(
                &dr,
                &sent.careplan_id,
                sent.stamp(),
                &reviewer("dr-1"),
                &summary_edit("Corrected typo."),
                None,
            )
            .unwrap();
        assert_eq!(corrected.status, CarePlanStatus::SentToPatient);
        assert_eq!(corrected.version, sent.version + 1);
    }

    #[test]
    fn invalid_transitions_are_typed_errors() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = f.engine.create_draft(&dr, &request("patient-1")).unwrap();

        let err = f
            .engine
            .approve(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            CarePlanError::InvalidTransition {
                event: Event::Approve,
                from: CarePlanStatus::Draft
            }
        ));

        let err = f
            .engine
            .send_to_patient(&dr, &plan.careplan_id, plan.stamp())
            .unwrap_err();
        assert!(matches!(err, CarePlanError::InvalidTransition { .. }));
    }

    #[test]
    fn stale_stamp_is_checked_before_transition_validity() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = f.engine.create_draft(&dr, &request("patient-1")).unwrap();

        let err = f
            .engine
            .approve(
                &dr,
                &plan.careplan_id,
                VersionStamp::new(1, 9),
                &reviewer("dr-1"),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CarePlanError::StaleVersion { .. }));
    }

    #[test]
    fn submit_requires_an_action() {
        let f = fixture();
        let dr = clinician("dr-1");
        let mut plan = draft("patient-7");
        plan.content.actions.clear();
        f.store
            .insert(
                &plan,
                &ChangeContext {
                    action: ChangeAction::Create,
                    actor_id: dr.id().clone(),
                    actor_name: dr.id().clone(),
                },
            )
            .unwrap();

        let err = f
            .engine
            .submit_for_review(&dr, &plan.careplan_id, plan.stamp())
            .unwrap_err();
        assert!(matches!(err, CarePlanError::ValidationFailed(_)));
    }

    #[test]
    fn patients_cannot_review_or_read_unsent_plans() {
        let f = fixture();
        let plan = under_review(&f);
        let me = patient("user-1", "patient-1");

        let err = f
            .engine
            .approve(&me, &plan.careplan_id, plan.stamp(), &reviewer("user-1"), None, None)
            .unwrap_err();
        assert!(matches!(err, CarePlanError::Forbidden { role: Role::Patient, .. }));

        assert!(matches!(
            f.engine.get(&me, &plan.careplan_id),
            Err(CarePlanError::Forbidden { .. })
        ));
        assert!(f.engine.list_by_patient(&me, "patient-1").unwrap().is_empty());
        assert!(matches!(
            f.engine.list_by_patient(&me, "patient-2"),
            Err(CarePlanError::Forbidden { .. })
        ));
        assert!(matches!(
            f.engine.get_history(&me, &plan.careplan_id),
            Err(CarePlanError::Forbidden { .. })
        ));
    }

    #[test]
    fn patient_sees_own_plan_once_sent() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);
        let plan = f
            .engine
            .approve(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), None, None)
            .unwrap();
        f.engine
            .send_to_patient(&dr, &plan.careplan_id, plan.stamp())
            .unwrap();

        let me = patient("user-1", "patient-1");
        let view = f.engine.patient_view(&me, &plan.careplan_id).unwrap();
        assert_eq!(view.patient_id, "patient-1");
        assert_eq!(f.engine.list_by_patient(&me, "patient-1").unwrap().len(), 1);

        let someone_else = patient("user-2", "patient-2");
        assert!(f.engine.get(&someone_else, &plan.careplan_id).is_err());
    }

    #[test]
    fn clinician_cannot_review_as_someone_else_but_admin_can() {
        let f = fixture();
        let plan = under_review(&f);

        let err = f
            .engine
            .approve(
                &clinician("dr-1"),
                &plan.careplan_id,
                plan.stamp(),
                &reviewer("dr-2"),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CarePlanError::Forbidden { .. }));

        let approved = f
            .engine
            .approve(
                &admin("admin-1"),
                &plan.careplan_id,
                plan.stamp(),
                &reviewer("dr-2"),
                None,
                None,
            )
            .unwrap();
        assert_eq!(approved.reviews[0].reviewer_id.as_str(), "dr-2");
    }

    #[test]
    fn create_draft_returns_open_plan_unless_overridden() {
        let f = fixture();
        let dr = clinician("dr-1");
        let first = f.engine.create_draft(&dr, &request("patient-1")).unwrap();
        let again = f.engine.create_draft(&dr, &request("patient-1")).unwrap();
        assert_eq!(first.careplan_id, again.careplan_id);

        let mut forced = request("patient-1");
        forced.override_existing = true;
        let fresh = f.engine.create_draft(&dr, &forced).unwrap();
        assert_ne!(fresh.careplan_id, first.careplan_id);
    }

    #[test]
    fn generator_output_is_validated() {
        struct BrokenGenerator;
        impl DraftGenerator for BrokenGenerator {
            fn generate(&self, request: &DraftRequest) -> CarePlanResult<CarePlan> {
                let mut plan = draft(request.patient_id.as_str());
                plan.status = CarePlanStatus::Approved;
                Ok(plan)
            }
        }

        let store = Arc::new(InMemoryCarePlanStore::new());
        let engine = ReviewEngine::new(
            store.clone(),
            Arc::new(BrokenGenerator),
            Arc::new(PortalDelivery),
        );
        let err = engine
            .create_draft(&clinician("dr-1"), &request("patient-1"))
            .unwrap_err();
        assert!(matches!(err, CarePlanError::GenerationFailed(_)));
        assert!(store.list_by_status(None).unwrap().is_empty());
    }

    #[test]
    fn delivery_failure_does_not_roll_back_send() {
        let store = Arc::new(InMemoryCarePlanStore::new());
        let engine = ReviewEngine::new(
            store.clone(),
            Arc::new(TemplateDraftGenerator::new()),
            Arc::new(FailingDelivery),
        );
        let dr = clinician("dr-1");
        let plan = engine.create_draft(&dr, &request("patient-1")).unwrap();
        let plan = engine
            .submit_for_review(&dr, &plan.careplan_id, plan.stamp())
            .unwrap();
        let plan = engine
            .approve(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), None, None)
            .unwrap();

        let outcome = engine
            .send_to_patient(&dr, &plan.careplan_id, plan.stamp())
            .unwrap();
        assert!(outcome.receipt.is_none());
        assert_eq!(
            store.get(&plan.careplan_id).unwrap().status,
            CarePlanStatus::SentToPatient
        );
    }

    #[test]
    fn history_is_ordered_and_append_only() {
        let f = fixture();
        let dr = clinician("dr-1");
        let plan = under_review(&f);
        let plan = f
            .engine
            .edit(
                &dr,
                &plan.careplan_id,
                plan.stamp(),
                &reviewer("dr-1"),
                &ContentModifications {
                    actions: Some(vec![CarePlanAction {
                        action_id: "replacement".into(),
                        ..plan.content.actions[0].clone()
                    }]),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let plan = f
            .engine
            .approve(&dr, &plan.careplan_id, plan.stamp(), &reviewer("dr-1"), None, None)
            .unwrap();

        let history = f.engine.get_history(&dr, &plan.careplan_id).unwrap();
        let decisions: Vec<_> = history.iter().map(|r| r.status).collect();
        assert_eq!(decisions, [ReviewDecision::Edited, ReviewDecision::Approved]);
        assert!(history[0].review_date <= history[1].review_date);
    }

    #[test]
    fn list_by_status_requires_clinical_role() {
        let f = fixture();
        under_review(&f);
        let pending = f
            .engine
            .list_by_status(&clinician("dr-1"), Some(CarePlanStatus::UnderReview))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(f
            .engine
            .list_by_status(&patient("user-1", "patient-1"), None)
            .is_err());
    }

    #[test]
    fn blank_reviewer_is_a_validation_error() {
        assert!(matches!(
            Reviewer::new(" ", "Dr"),
            Err(CarePlanError::ValidationFailed(_))
        ));
        assert!(matches!(
            Reviewer::new("dr-1", ""),
            Err(CarePlanError::ValidationFailed(_))
        ));
        assert!(matches!(
            Reviewer::new("dr-1", "<>"),
            Err(CarePlanError::ValidationFailed(_))
        ));
        assert!(Reviewer::new("dr-1", "Dr O'Neil").is_ok());
    }
}
