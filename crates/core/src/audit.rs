//! Audit trail events.
//!
//! Every engine operation that changes or exposes a care plan emits one event on the
//! `careplan_audit` tracing target. Subscribers can route that target to a separate sink.

use crate::careplan::CarePlan;
use crate::constants::AUDIT_TARGET;
use crate::role::Caller;
use crate::{CarePlanError, ShardableUuid};

/// A state-changing operation succeeded.
pub(crate) fn transition_applied(action: &str, careplan: &CarePlan, actor: &Caller) {
    tracing::info!(
        target: AUDIT_TARGET,
        action,
        careplan_id = %careplan.careplan_id,
        patient_id = %careplan.patient_id,
        actor_id = %actor.id(),
        actor_role = %actor.role(),
        status = %careplan.status,
        version = careplan.version,
        revision = careplan.revision,
        "care plan updated"
    );
}

/// A plan was read by someone other than its patient.
pub(crate) fn careplan_viewed(action: &str, careplan_id: &ShardableUuid, actor: &Caller) {
    tracing::info!(
        target: AUDIT_TARGET,
        action,
        careplan_id = %careplan_id,
        actor_id = %actor.id(),
        actor_role = %actor.role(),
        "care plan viewed"
    );
}

/// An operation was refused. Storage failures are logged elsewhere as errors.
pub(crate) fn operation_rejected(
    action: &str,
    careplan_id: Option<&ShardableUuid>,
    actor: &Caller,
    error: &CarePlanError,
) {
    tracing::warn!(
        target: AUDIT_TARGET,
        action,
        careplan_id = %careplan_id.map(|id| id.to_string()).unwrap_or_default(),
        actor_id = %actor.id(),
        actor_role = %actor.role(),
        error_kind = error.kind().as_str(),
        error = %error,
        "care plan operation rejected"
    );
}
