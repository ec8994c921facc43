// Re-export the proto module from the shared `api-shared` crate so callers
// can continue to reference `api_grpc::service::pb`.
pub use api_shared::pb;

use api_shared::auth::{self, API_KEY_HEADER};
use api_shared::{convert, HealthService};
use cpr_core::{CarePlanError, Caller, ErrorKind, ReviewEngine};
use pb::care_plan_review_server::CarePlanReview;
use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Response, Status};

/// Checks `x-api-key` against the key configured at startup.
#[derive(Clone)]
pub struct ApiKeyInterceptor {
    expected: Arc<str>,
}

impl ApiKeyInterceptor {
    pub fn new(expected: impl Into<Arc<str>>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl Interceptor for ApiKeyInterceptor {
    fn call(&mut self, req: Request<()>) -> Result<Request<()>, Status> {
        let provided = req
            .metadata()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        auth::validate_api_key(&self.expected, provided)?;
        Ok(req)
    }
}

/// Maps engine errors onto gRPC status codes.
pub fn status_from(e: CarePlanError) -> Status {
    match e.kind() {
        ErrorKind::NotFound => Status::not_found(e.to_string()),
        ErrorKind::StaleVersion => Status::aborted(e.to_string()),
        ErrorKind::InvalidTransition => Status::failed_precondition(e.to_string()),
        ErrorKind::Forbidden => Status::permission_denied(e.to_string()),
        ErrorKind::ValidationFailed | ErrorKind::InvalidInput => {
            Status::invalid_argument(e.to_string())
        }
        ErrorKind::GenerationFailed => Status::unavailable(e.to_string()),
        ErrorKind::Storage => Status::internal("Internal error"),
    }
}

fn caller<T>(req: &Request<T>) -> Result<Caller, Status> {
    let metadata = req.metadata();
    Ok(auth::caller_from_headers(|name| {
        metadata.get(name).and_then(|v| v.to_str().ok())
    })?)
}

#[derive(Clone)]
pub struct CarePlanReviewService {
    engine: ReviewEngine,
}

impl CarePlanReviewService {
    pub fn new(engine: ReviewEngine) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl CarePlanReview for CarePlanReviewService {
    async fn health(&self, _req: Request<()>) -> Result<Response<pb::HealthRes>, Status> {
        Ok(Response::new(HealthService::check_health()))
    }

    async fn generate_care_plan(
        &self,
        req: Request<pb::GenerateCarePlanReq>,
    ) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let request = convert::draft_request(&req.patient_id, &req).map_err(status_from)?;
        let careplan = self
            .engine
            .create_draft(&caller, &request)
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn get_care_plan(
        &self,
        req: Request<pb::CarePlanIdReq>,
    ) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let id = convert::careplan_id(&req.get_ref().careplan_id).map_err(status_from)?;
        let careplan = self.engine.get(&caller, &id).map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn list_care_plans(
        &self,
        req: Request<pb::ListCarePlansReq>,
    ) -> Result<Response<pb::ListCarePlansRes>, Status> {
        let caller = caller(&req)?;
        let status =
            convert::status_filter(req.get_ref().status.as_deref()).map_err(status_from)?;
        let plans = self
            .engine
            .list_by_status(&caller, status)
            .map_err(status_from)?;
        Ok(Response::new(convert::careplans_res(&plans)))
    }

    async fn list_patient_care_plans(
        &self,
        req: Request<pb::ListPatientCarePlansReq>,
    ) -> Result<Response<pb::ListCarePlansRes>, Status> {
        let caller = caller(&req)?;
        let plans = self
            .engine
            .list_by_patient(&caller, &req.get_ref().patient_id)
            .map_err(status_from)?;
        Ok(Response::new(convert::careplans_res(&plans)))
    }

    async fn get_history(
        &self,
        req: Request<pb::CarePlanIdReq>,
    ) -> Result<Response<pb::HistoryRes>, Status> {
        let caller = caller(&req)?;
        let id = convert::careplan_id(&req.get_ref().careplan_id).map_err(status_from)?;
        let reviews = self.engine.get_history(&caller, &id).map_err(status_from)?;
        Ok(Response::new(pb::HistoryRes {
            reviews: reviews.iter().map(Into::into).collect(),
        }))
    }

    async fn get_revisions(
        &self,
        req: Request<pb::CarePlanIdReq>,
    ) -> Result<Response<pb::RevisionsRes>, Status> {
        let caller = caller(&req)?;
        let id = convert::careplan_id(&req.get_ref().careplan_id).map_err(status_from)?;
        let revisions = self.engine.revisions(&caller, &id).map_err(status_from)?;
        Ok(Response::new(pb::RevisionsRes {
            revisions: revisions.iter().map(Into::into).collect(),
        }))
    }

    async fn get_patient_view(
        &self,
        req: Request<pb::CarePlanIdReq>,
    ) -> Result<Response<pb::PatientViewRes>, Status> {
        let caller = caller(&req)?;
        let id = convert::careplan_id(&req.get_ref().careplan_id).map_err(status_from)?;
        let view = self.engine.patient_view(&caller, &id).map_err(status_from)?;
        Ok(Response::new(pb::PatientViewRes {
            careplan: Some((&view).into()),
        }))
    }

    async fn submit_for_review(
        &self,
        req: Request<pb::TransitionReq>,
    ) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let careplan = self
            .engine
            .submit_for_review(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
            )
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn approve(
        &self,
        req: Request<pb::ApproveReq>,
    ) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let reviewer =
            convert::reviewer(&req.reviewer_id, &req.reviewer_name).map_err(status_from)?;
        let modifications = req
            .modifications
            .map(convert::modifications)
            .transpose()
            .map_err(status_from)?;
        let careplan = self
            .engine
            .approve(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
                &reviewer,
                req.comments.as_deref(),
                modifications.as_ref(),
            )
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn deny(&self, req: Request<pb::DenyReq>) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let reviewer =
            convert::reviewer(&req.reviewer_id, &req.reviewer_name).map_err(status_from)?;
        let careplan = self
            .engine
            .deny(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
                &reviewer,
                Some(req.comments.as_str()),
            )
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn edit(&self, req: Request<pb::EditReq>) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let reviewer =
            convert::reviewer(&req.reviewer_id, &req.reviewer_name).map_err(status_from)?;
        let modifications = req
            .modifications
            .map(convert::modifications)
            .transpose()
            .map_err(status_from)?
            .ok_or_else(|| Status::invalid_argument("modifications are required"))?;
        let careplan = self
            .engine
            .edit(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
                &reviewer,
                &modifications,
                req.comments.as_deref(),
            )
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn send_to_patient(
        &self,
        req: Request<pb::TransitionReq>,
    ) -> Result<Response<pb::SendToPatientRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let outcome = self
            .engine
            .send_to_patient(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
            )
            .map_err(status_from)?;
        Ok(Response::new((&outcome).into()))
    }

    async fn activate(
        &self,
        req: Request<pb::TransitionReq>,
    ) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let careplan = self
            .engine
            .activate(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
            )
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }

    async fn complete(
        &self,
        req: Request<pb::TransitionReq>,
    ) -> Result<Response<pb::CarePlanRes>, Status> {
        let caller = caller(&req)?;
        let req = req.into_inner();
        let id = convert::careplan_id(&req.careplan_id).map_err(status_from)?;
        let careplan = self
            .engine
            .complete(
                &caller,
                &id,
                convert::stamp(req.expected_version, req.expected_revision),
            )
            .map_err(status_from)?;
        Ok(Response::new((&careplan).into()))
    }
}
