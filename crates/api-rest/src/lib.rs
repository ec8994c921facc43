//! # API REST
//!
//! REST API implementation for CPR.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for wire types and caller extraction, and `cpr-core` for every operation.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handlers;

use api_shared::pb;
use axum::routing::{get, post};
use axum::Router;
use cpr_core::ReviewEngine;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ErrorBody};

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: ReviewEngine,
}

impl AppState {
    pub fn new(engine: ReviewEngine) -> Self {
        Self { engine }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::generate_careplan,
        handlers::list_careplans,
        handlers::list_patient_careplans,
        handlers::get_careplan,
        handlers::get_history,
        handlers::get_revisions,
        handlers::get_patient_view,
        handlers::submit_for_review,
        handlers::approve,
        handlers::deny,
        handlers::edit,
        handlers::send_to_patient,
        handlers::activate,
        handlers::complete,
    ),
    components(schemas(
        ErrorBody,
        pb::HealthRes,
        pb::CarePlan,
        pb::CarePlanContent,
        pb::CarePlanAction,
        pb::Provenance,
        pb::ClinicianReview,
        pb::FieldChange,
        pb::RevisionRecord,
        pb::PatientCarePlan,
        pb::PatientAction,
        pb::DeliveryReceipt,
        pb::ContentModifications,
        pb::StringList,
        pb::ActionList,
        pb::GenerateCarePlanReq,
        pb::TransitionReq,
        pb::ApproveReq,
        pb::DenyReq,
        pb::EditReq,
        pb::CarePlanRes,
        pb::ListCarePlansRes,
        pb::HistoryRes,
        pb::RevisionsRes,
        pb::PatientViewRes,
        pb::SendToPatientRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/careplans/generate/:patient_id",
            post(handlers::generate_careplan),
        )
        .route("/careplans", get(handlers::list_careplans))
        .route(
            "/patients/:patient_id/careplans",
            get(handlers::list_patient_careplans),
        )
        .route("/careplans/:id", get(handlers::get_careplan))
        .route("/careplans/:id/history", get(handlers::get_history))
        .route("/careplans/:id/revisions", get(handlers::get_revisions))
        .route("/careplans/:id/patient-view", get(handlers::get_patient_view))
        .route("/careplans/:id/submit", post(handlers::submit_for_review))
        .route("/careplans/:id/approve", post(handlers::approve))
        .route("/careplans/:id/deny", post(handlers::deny))
        .route("/careplans/:id/edit", post(handlers::edit))
        .route("/careplans/:id/send", post(handlers::send_to_patient))
        .route("/careplans/:id/activate", post(handlers::activate))
        .route("/careplans/:id/complete", post(handlers::complete))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::auth::{CALLER_ID_HEADER, CALLER_ROLE_HEADER, PATIENT_ID_HEADER};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cpr_core::InMemoryCarePlanStore;
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let engine = ReviewEngine::with_store(Arc::new(InMemoryCarePlanStore::new()));
        router(AppState::new(engine))
    }

    fn request(method: &str, uri: &str, role: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        match role {
            Some("patient") => {
                builder = builder
                    .header(CALLER_ID_HEADER, "user-1")
                    .header(CALLER_ROLE_HEADER, "patient")
                    .header(PATIENT_ID_HEADER, "patient-1");
            }
            Some(role) => {
                builder = builder
                    .header(CALLER_ID_HEADER, "dr-1")
                    .header(CALLER_ROLE_HEADER, role);
            }
            None => {}
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn parse<T: DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    async fn generated(app: &Router) -> pb::CarePlan {
        let (status, body) = send(
            app,
            request(
                "POST",
                "/careplans/generate/patient-1",
                Some("clinician"),
                json!({ "chief_complaint": "type 2 diabetes" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        parse::<pb::CarePlanRes>(body).careplan.unwrap()
    }

    fn stamp(plan: &pb::CarePlan) -> serde_json::Value {
        json!({ "expected_version": plan.version, "expected_revision": plan.revision })
    }

    #[tokio::test]
    async fn health_needs_no_identity() {
        let (status, body) = send(&app(), request("GET", "/health", None, json!(null))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorised() {
        let (status, body) = send(&app(), request("GET", "/careplans", None, json!(null))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");
    }

    #[tokio::test]
    async fn review_flow_over_http() {
        let app = app();
        let plan = generated(&app).await;
        assert_eq!(plan.status, "draft");
        let uri = |action: &str| format!("/careplans/{}/{action}", plan.careplan_id);

        let (status, body) =
            send(&app, request("POST", &uri("submit"), Some("clinician"), stamp(&plan))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let plan = parse::<pb::CarePlanRes>(body).careplan.unwrap();
        assert_eq!(plan.status, "under_review");

        let (status, body) = send(
            &app,
            request(
                "GET",
                "/careplans?status=under_review",
                Some("clinician"),
                json!(null),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<pb::ListCarePlansRes>(body).careplans.len(), 1);

        let mut approve = stamp(&plan);
        approve["reviewer_id"] = json!("dr-1");
        approve["reviewer_name"] = json!("Dr Jane Smith");
        approve["modifications"] = json!({ "clinical_summary": "Reviewed and adjusted." });
        let (status, body) =
            send(&app, request("POST", &uri("approve"), Some("clinician"), approve)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let plan = parse::<pb::CarePlanRes>(body).careplan.unwrap();
        assert_eq!((plan.status.as_str(), plan.version), ("approved", 2));
        assert_eq!(plan.reviews.len(), 1);

        let (status, body) =
            send(&app, request("POST", &uri("send"), Some("clinician"), stamp(&plan))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let sent: pb::SendToPatientRes = parse(body);
        assert_eq!(sent.careplan.unwrap().status, "sent_to_patient");
        assert!(sent.receipt.is_some());

        let (status, body) =
            send(&app, request("GET", &uri("patient-view"), Some("patient"), json!(null))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let view: pb::PatientViewRes = parse(body);
        assert_eq!(view.careplan.unwrap().patient_id, "patient-1");
    }

    #[tokio::test]
    async fn stale_stamp_is_a_conflict() {
        let app = app();
        let plan = generated(&app).await;
        let mut stale = stamp(&plan);
        stale["expected_revision"] = json!(7);

        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/careplans/{}/submit", plan.careplan_id),
                Some("clinician"),
                stale,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "stale_version");
    }

    #[tokio::test]
    async fn deny_without_comments_is_unprocessable() {
        let app = app();
        let plan = generated(&app).await;
        let (_, body) = send(
            &app,
            request(
                "POST",
                &format!("/careplans/{}/submit", plan.careplan_id),
                Some("clinician"),
                stamp(&plan),
            ),
        )
        .await;
        let plan = parse::<pb::CarePlanRes>(body).careplan.unwrap();

        let mut deny = stamp(&plan);
        deny["reviewer_id"] = json!("dr-1");
        deny["reviewer_name"] = json!("Dr Jane Smith");
        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/careplans/{}/deny", plan.careplan_id),
                Some("clinician"),
                deny,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_failed");
    }

    #[tokio::test]
    async fn patients_are_forbidden_from_review_and_drafts() {
        let app = app();
        let plan = generated(&app).await;

        let (status, _) = send(
            &app,
            request(
                "GET",
                &format!("/careplans/{}", plan.careplan_id),
                Some("patient"),
                json!(null),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            request(
                "POST",
                &format!("/careplans/{}/submit", plan.careplan_id),
                Some("patient"),
                stamp(&plan),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bad_ids_and_statuses_are_bad_requests() {
        let app = app();
        let (status, _) =
            send(&app, request("GET", "/careplans/nope", Some("clinician"), json!(null))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            request("GET", "/careplans?status=pending", Some("clinician"), json!(null)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");

        let (status, _) = send(
            &app,
            request(
                "GET",
                &format!("/careplans/{}", cpr_core::ShardableUuid::new()),
                Some("clinician"),
                json!(null),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn provenance_in_edit_is_rejected() {
        let app = app();
        let plan = generated(&app).await;
        let (_, body) = send(
            &app,
            request(
                "POST",
                &format!("/careplans/{}/submit", plan.careplan_id),
                Some("clinician"),
                stamp(&plan),
            ),
        )
        .await;
        let plan = parse::<pb::CarePlanRes>(body).careplan.unwrap();

        let mut edit = stamp(&plan);
        edit["reviewer_id"] = json!("dr-1");
        edit["reviewer_name"] = json!("Dr Jane Smith");
        edit["modifications"] = json!({ "llm_model_used": "gpt-5" });
        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/careplans/{}/edit", plan.careplan_id),
                Some("clinician"),
                edit,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    }
}
