//! JSON error responses.

use api_shared::auth::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cpr_core::{CarePlanError, ErrorKind};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `stale_version`.
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StaleVersion | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::GenerationFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CarePlanError> for ApiError {
    fn from(e: CarePlanError) -> Self {
        let kind = e.kind();
        // Storage details stay in the server log.
        let message = match kind {
            ErrorKind::Storage => "Internal error".to_string(),
            _ => e.to_string(),
        };
        Self {
            status: status_for(kind),
            kind: kind.as_str(),
            message,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCaller(inner) => inner.into(),
            other => Self {
                status: StatusCode::UNAUTHORIZED,
                kind: "unauthenticated",
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
