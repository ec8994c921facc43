//! Request authentication shared by the REST and gRPC servers.
//!
//! Identity is asserted by the upstream gateway in three headers. The API key guards the gRPC
//! port; it is resolved once at startup and handed to the interceptor.

use cpr_core::{CarePlanError, Caller};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const PATIENT_ID_HEADER: &str = "x-patient-id";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid API key")]
    InvalidApiKey,
    #[error(transparent)]
    InvalidCaller(#[from] CarePlanError),
}

/// Compares the presented key with the one configured at startup.
pub fn validate_api_key(expected: &str, provided: Option<&str>) -> Result<(), AuthError> {
    let provided = provided.ok_or(AuthError::MissingHeader(API_KEY_HEADER))?;
    if provided == expected {
        Ok(())
    } else {
        Err(AuthError::InvalidApiKey)
    }
}

/// Builds the caller from header values, looked up by name.
///
/// A missing id or role is an authentication failure; present but malformed values (unknown
/// role, patient without `x-patient-id`) are invalid input.
pub fn caller_from_headers<'a>(
    header: impl Fn(&'static str) -> Option<&'a str>,
) -> Result<Caller, AuthError> {
    let id = header(CALLER_ID_HEADER).ok_or(AuthError::MissingHeader(CALLER_ID_HEADER))?;
    let role = header(CALLER_ROLE_HEADER).ok_or(AuthError::MissingHeader(CALLER_ROLE_HEADER))?;
    Ok(Caller::from_parts(id, role, header(PATIENT_ID_HEADER))?)
}

impl From<AuthError> for tonic::Status {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingHeader(_) | AuthError::InvalidApiKey => {
                tonic::Status::unauthenticated(e.to_string())
            }
            AuthError::InvalidCaller(inner) => tonic::Status::invalid_argument(inner.to_string()),
        }
    }
}
