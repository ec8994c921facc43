//! Caller identity and role-based capabilities.
//!
//! Authentication happens outside this crate. API layers build a [`Caller`] from the trusted
//! identity they receive and the Review Engine checks capabilities once, at its boundary.

use crate::constants::SYSTEM_CALLER_ID;
use crate::{CarePlanError, CarePlanResult, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Clinician,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Clinician => "clinician",
            Self::Admin => "admin",
        }
    }

    pub fn has(self, capability: Capability) -> bool {
        match self {
            Self::Patient => matches!(capability, Capability::ViewOwn),
            Self::Clinician | Self::Admin => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CarePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Self::Patient),
            "clinician" => Ok(Self::Clinician),
            "admin" => Ok(Self::Admin),
            other => Err(CarePlanError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// Something a role may be allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// List or read any care plan, including review history.
    ViewAll,
    /// Read one's own care plans once they have been sent.
    ViewOwn,
    /// Ask the Draft Generator for a new draft.
    Generate,
    /// Submit, approve, deny and edit.
    Review,
    /// Send to patient, activate and complete.
    Deliver,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ViewAll => "view_all",
            Self::ViewOwn => "view_own",
            Self::Generate => "generate",
            Self::Review => "review",
            Self::Deliver => "deliver",
        }
    }
}

/// The authenticated principal issuing an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    id: NonEmptyText,
    role: Role,
    patient_id: Option<NonEmptyText>,
}

impl Caller {
    pub fn new(id: NonEmptyText, role: Role) -> Self {
        Self {
            id,
            role,
            patient_id: None,
        }
    }

    /// A patient caller linked to their own patient record.
    pub fn patient(id: NonEmptyText, patient_id: NonEmptyText) -> Self {
        Self {
            id,
            role: Role::Patient,
            patient_id: Some(patient_id),
        }
    }

    /// Build a caller from raw identity strings, as supplied by an API layer.
    ///
    /// # Errors
    ///
    /// Returns [`CarePlanError::InvalidInput`] if the id is blank, the role is unknown, or a
    /// patient caller has no linked patient id.
    pub fn from_parts(id: &str, role: &str, patient_id: Option<&str>) -> CarePlanResult<Self> {
        let id = NonEmptyText::new(id)
            .map_err(|_| CarePlanError::InvalidInput("caller id cannot be empty".into()))?;
        let role: Role = role.parse()?;
        let patient_id = patient_id
            .filter(|p| !p.trim().is_empty())
            .map(NonEmptyText::new)
            .transpose()
            .map_err(|_| CarePlanError::InvalidInput("patient id cannot be empty".into()))?;

        if role == Role::Patient && patient_id.is_none() {
            return Err(CarePlanError::InvalidInput(
                "patient callers must carry a patient id".into(),
            ));
        }

        Ok(Self {
            id,
            role,
            patient_id,
        })
    }

    /// The identity used for transitions triggered by the system (e.g. automatic activation).
    pub fn system() -> Self {
        Self {
            id: NonEmptyText::new(SYSTEM_CALLER_ID).expect("system caller id is non-empty"),
            role: Role::Admin,
            patient_id: None,
        }
    }

    pub fn id(&self) -> &NonEmptyText {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn patient_id(&self) -> Option<&NonEmptyText> {
        self.patient_id.as_ref()
    }

    pub fn is_system(&self) -> bool {
        self.id.as_str() == SYSTEM_CALLER_ID && self.role == Role::Admin
    }

    /// Fails with [`CarePlanError::Forbidden`] unless the caller's role grants `capability`.
    pub fn require(&self, capability: Capability) -> CarePlanResult<()> {
        if self.role.has(capability) {
            Ok(())
        } else {
            Err(CarePlanError::Forbidden {
                role: self.role,
                action: capability.as_str().to_string(),
            })
        }
    }
}
