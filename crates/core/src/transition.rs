//! The care plan state table.
//!
//! ```text
//! draft ──submit_for_review──► under_review ──approve──► approved ──send_to_patient──► sent_to_patient
//!                               │     ▲                                                     │
//!                               │     └─edit                                             activate
//!                               └──deny──► denied                                           ▼
//!                                                            completed ◄──complete── active
//! ```
//!
//! `edit` is also accepted in `approved`, `sent_to_patient` and `active` as a correction that
//! leaves the status unchanged.

use crate::careplan::CarePlanStatus;
use crate::role::Capability;
use crate::{CarePlanError, CarePlanResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    SubmitForReview,
    Approve,
    Deny,
    Edit,
    SendToPatient,
    Activate,
    Complete,
}

impl Event {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubmitForReview => "submit_for_review",
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Edit => "edit",
            Self::SendToPatient => "send_to_patient",
            Self::Activate => "activate",
            Self::Complete => "complete",
        }
    }

    pub const fn capability(self) -> Capability {
        match self {
            Self::SubmitForReview | Self::Approve | Self::Deny | Self::Edit => Capability::Review,
            Self::SendToPatient | Self::Activate | Self::Complete => Capability::Deliver,
        }
    }

    /// The status this event leads to from `from`, or `None` if the table has no such edge.
    pub const fn target(self, from: CarePlanStatus) -> Option<CarePlanStatus> {
        use CarePlanStatus::*;
        match (self, from) {
            (Self::SubmitForReview, Draft) => Some(UnderReview),
            (Self::Approve, UnderReview) => Some(Approved),
            (Self::Deny, UnderReview) => Some(Denied),
            (Self::Edit, UnderReview | Approved | SentToPatient | Active) => Some(from),
            (Self::SendToPatient, Approved) => Some(SentToPatient),
            (Self::Activate, SentToPatient) => Some(Active),
            (Self::Complete, Active) => Some(Completed),
            _ => None,
        }
    }

    /// Like [`target`](Self::target) but fails with [`CarePlanError::InvalidTransition`].
    pub fn apply(self, from: CarePlanStatus) -> CarePlanResult<CarePlanStatus> {
        self.target(from)
            .ok_or(CarePlanError::InvalidTransition { event: self, from })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::careplan::CarePlanStatus::*;

    const EVENTS: [Event; 7] = [
        Event::SubmitForReview,
        Event::Approve,
        Event::Deny,
        Event::Edit,
        Event::SendToPatient,
        Event::Activate,
        Event::Complete,
    ];

    #[test]
    fn happy_path_follows_table() {
        assert_eq!(Event::SubmitForReview.apply(Draft).unwrap(), UnderReview);
        assert_eq!(Event::Approve.apply(UnderReview).unwrap(), Approved);
        assert_eq!(Event::SendToPatient.apply(Approved).unwrap(), SentToPatient);
        assert_eq!(Event::Activate.apply(SentToPatient).unwrap(), Active);
        assert_eq!(Event::Complete.apply(Active).unwrap(), Completed);
    }

    #[test]
    fn draft_cannot_jump_to_approved() {
        let err = Event::Approve.apply(Draft).unwrap_err();
        assert!(matches!(
            err,
            CarePlanError::InvalidTransition {
                event: Event::Approve,
                from: Draft
            }
        ));
    }

    #[test]
    fn terminal_states_accept_no_events() {
        for from in [Denied, Completed] {
            for event in EVENTS {
                assert!(event.target(from).is_none(), "{event} from {from}");
            }
        }
    }

    #[test]
    fn edit_keeps_status_where_allowed() {
        for from in [UnderReview, Approved, SentToPatient, Active] {
            assert_eq!(Event::Edit.apply(from).unwrap(), from);
        }
        assert!(Event::Edit.apply(Draft).is_err());
    }

    #[test]
    fn every_reachable_status_has_an_incoming_edge() {
        for to in CarePlanStatus::ALL {
            if to == Draft {
                continue;
            }
            let reachable = CarePlanStatus::ALL
                .into_iter()
                .any(|from| EVENTS.iter().any(|e| e.target(from) == Some(to) && from != to));
            assert!(reachable, "{to} unreachable");
        }
    }
}
