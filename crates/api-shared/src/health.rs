use crate::pb::HealthRes;

/// Health check shared by the gRPC and REST APIs.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "CPR is alive".into(),
        }
    }
}
