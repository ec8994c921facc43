//! Route handlers. Each one extracts the caller, converts the wire request, calls the engine
//! and converts the result back.

use crate::error::{ApiError, ErrorBody};
use crate::AppState;
use api_shared::auth::caller_from_headers;
use api_shared::{convert, pb, HealthService};
use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::response::Json;
use cpr_core::{CarePlanError, Caller};
use serde::Deserialize;
use utoipa::IntoParams;

/// The authenticated caller, from the gateway's identity headers.
pub struct CallerIdentity(pub Caller);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let caller = caller_from_headers(|name| headers.get(name).and_then(|v| v.to_str().ok()))?;
        Ok(Self(caller))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Only plans in this status, e.g. `under_review` for the pending queue.
    pub status: Option<String>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = pb::HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks; needs no identity headers.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<pb::HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/careplans/generate/{patient_id}",
    request_body = pb::GenerateCarePlanReq,
    params(("patient_id" = String, Path, description = "Patient the plan is for")),
    responses(
        (status = 200, description = "New draft, or the patient's open plan", body = pb::CarePlanRes),
        (status = 403, description = "Caller may not generate plans", body = ErrorBody),
        (status = 422, description = "Missing chief complaint", body = ErrorBody),
        (status = 502, description = "Generator failed", body = ErrorBody)
    )
)]
/// Generate a draft care plan
///
/// Returns the patient's open (`draft` or `under_review`) plan instead, unless
/// `override_existing` is set.
#[axum::debug_handler]
pub async fn generate_careplan(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(patient_id): Path<String>,
    Json(req): Json<pb::GenerateCarePlanReq>,
) -> ApiResult<pb::CarePlanRes> {
    let request = convert::draft_request(&patient_id, &req)?;
    let careplan = state.engine.create_draft(&caller, &request)?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    get,
    path = "/careplans",
    params(StatusQuery),
    responses(
        (status = 200, description = "Care plans, most recently modified first", body = pb::ListCarePlansRes),
        (status = 400, description = "Unknown status", body = ErrorBody),
        (status = 403, description = "Patients cannot list all plans", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn list_careplans(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Query(query): Query<StatusQuery>,
) -> ApiResult<pb::ListCarePlansRes> {
    let status = convert::status_filter(query.status.as_deref())?;
    let plans = state.engine.list_by_status(&caller, status)?;
    Ok(Json(convert::careplans_res(&plans)))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}/careplans",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "The patient's care plans", body = pb::ListCarePlansRes),
        (status = 403, description = "Another patient's plans", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn list_patient_careplans(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(patient_id): Path<String>,
) -> ApiResult<pb::ListCarePlansRes> {
    let plans = state.engine.list_by_patient(&caller, &patient_id)?;
    Ok(Json(convert::careplans_res(&plans)))
}

#[utoipa::path(
    get,
    path = "/careplans/{id}",
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "The care plan", body = pb::CarePlanRes),
        (status = 403, description = "Not visible to the caller", body = ErrorBody),
        (status = 404, description = "No such care plan", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_careplan(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<pb::CarePlanRes> {
    let careplan = state.engine.get(&caller, &convert::careplan_id(&id)?)?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    get,
    path = "/careplans/{id}/history",
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Reviews in review-date order", body = pb::HistoryRes),
        (status = 404, description = "No such care plan", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<pb::HistoryRes> {
    let reviews = state.engine.get_history(&caller, &convert::careplan_id(&id)?)?;
    Ok(Json(pb::HistoryRes {
        reviews: reviews.iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/careplans/{id}/revisions",
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Every stored revision, oldest first", body = pb::RevisionsRes),
        (status = 404, description = "No such care plan", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_revisions(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<pb::RevisionsRes> {
    let revisions = state.engine.revisions(&caller, &convert::careplan_id(&id)?)?;
    Ok(Json(pb::RevisionsRes {
        revisions: revisions.iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/careplans/{id}/patient-view",
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Patient-facing rendering", body = pb::PatientViewRes),
        (status = 403, description = "Not visible to the caller", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_patient_view(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<pb::PatientViewRes> {
    let view = state
        .engine
        .patient_view(&caller, &convert::careplan_id(&id)?)?;
    Ok(Json(pb::PatientViewRes {
        careplan: Some((&view).into()),
    }))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/submit",
    request_body = pb::TransitionReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan is under review", body = pb::CarePlanRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn submit_for_review(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::TransitionReq>,
) -> ApiResult<pb::CarePlanRes> {
    let careplan = state.engine.submit_for_review(
        &caller,
        &convert::careplan_id(&id)?,
        convert::stamp(req.expected_version, req.expected_revision),
    )?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/approve",
    request_body = pb::ApproveReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan approved", body = pb::CarePlanRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody),
        (status = 422, description = "Invalid modifications", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn approve(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::ApproveReq>,
) -> ApiResult<pb::CarePlanRes> {
    let id = convert::careplan_id(&id)?;
    let reviewer = convert::reviewer(&req.reviewer_id, &req.reviewer_name)?;
    let modifications = req.modifications.map(convert::modifications).transpose()?;
    let careplan = state.engine.approve(
        &caller,
        &id,
        convert::stamp(req.expected_version, req.expected_revision),
        &reviewer,
        req.comments.as_deref(),
        modifications.as_ref(),
    )?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/deny",
    request_body = pb::DenyReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan denied", body = pb::CarePlanRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody),
        (status = 422, description = "Comments missing", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn deny(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::DenyReq>,
) -> ApiResult<pb::CarePlanRes> {
    let id = convert::careplan_id(&id)?;
    let reviewer = convert::reviewer(&req.reviewer_id, &req.reviewer_name)?;
    let careplan = state.engine.deny(
        &caller,
        &id,
        convert::stamp(req.expected_version, req.expected_revision),
        &reviewer,
        Some(req.comments.as_str()),
    )?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/edit",
    request_body = pb::EditReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan content replaced", body = pb::CarePlanRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody),
        (status = 422, description = "Invalid or empty modifications", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn edit(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::EditReq>,
) -> ApiResult<pb::CarePlanRes> {
    let id = convert::careplan_id(&id)?;
    let reviewer = convert::reviewer(&req.reviewer_id, &req.reviewer_name)?;
    let modifications = req
        .modifications
        .map(convert::modifications)
        .transpose()?
        .ok_or_else(|| CarePlanError::ValidationFailed("modifications are required".into()))?;
    let careplan = state.engine.edit(
        &caller,
        &id,
        convert::stamp(req.expected_version, req.expected_revision),
        &reviewer,
        &modifications,
        req.comments.as_deref(),
    )?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/send",
    request_body = pb::TransitionReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan sent; receipt absent if delivery failed", body = pb::SendToPatientRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn send_to_patient(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::TransitionReq>,
) -> ApiResult<pb::SendToPatientRes> {
    let outcome = state.engine.send_to_patient(
        &caller,
        &convert::careplan_id(&id)?,
        convert::stamp(req.expected_version, req.expected_revision),
    )?;
    Ok(Json((&outcome).into()))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/activate",
    request_body = pb::TransitionReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan is active", body = pb::CarePlanRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn activate(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::TransitionReq>,
) -> ApiResult<pb::CarePlanRes> {
    let careplan = state.engine.activate(
        &caller,
        &convert::careplan_id(&id)?,
        convert::stamp(req.expected_version, req.expected_revision),
    )?;
    Ok(Json((&careplan).into()))
}

#[utoipa::path(
    post,
    path = "/careplans/{id}/complete",
    request_body = pb::TransitionReq,
    params(("id" = String, Path, description = "Care plan identifier")),
    responses(
        (status = 200, description = "Plan completed", body = pb::CarePlanRes),
        (status = 409, description = "Stale version or invalid transition", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn complete(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<pb::TransitionReq>,
) -> ApiResult<pb::CarePlanRes> {
    let careplan = state.engine.complete(
        &caller,
        &convert::careplan_id(&id)?,
        convert::stamp(req.expected_version, req.expected_revision),
    )?;
    Ok(Json((&careplan).into()))
}
