//! # CPR Core
//!
//! Core business logic for the care plan review service.
//!
//! This crate owns the care plan lifecycle:
//! - The [`CarePlan`] model and its status machine ([`transition`])
//! - The [`ReviewEngine`], which enforces roles, optimistic concurrency and payload rules
//! - Storage behind [`CarePlanStore`], either in memory or as one Git repository per plan
//!   under `CAREPLAN_DATA_DIR`
//! - Draft generation and patient delivery seams
//!
//! **No API concerns**: authentication, HTTP/gRPC servers, or service interfaces belong in
//! `api-grpc`, `api-rest`, or `api-shared`.

mod audit;
pub mod careplan;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod generator;
pub mod modification;
pub mod review;
pub mod role;
pub mod store;
pub mod transition;
pub(crate) mod versioned_files;

#[cfg(test)]
pub(crate) mod test_support;

pub use careplan::{
    ActionType, CarePlan, CarePlanAction, CarePlanContent, CarePlanStatus, ClinicianReview,
    FieldChange, Priority, Provenance, ReviewDecision, VersionStamp,
};
pub use config::{CoreConfig, StoreBackend};
pub use cpr_types::{ConfidenceScore, NonEmptyText};
pub use cpr_uuid::ShardableUuid;
pub use delivery::{DeliveryChannel, DeliveryReceipt, PatientCarePlan, PortalDelivery};
pub use error::{CarePlanError, CarePlanResult, ErrorKind};
pub use generator::{DraftGenerator, DraftRequest, TemplateDraftGenerator};
pub use modification::ContentModifications;
pub use review::{ReviewEngine, Reviewer, SendOutcome};
pub use role::{Caller, Capability, Role};
pub use store::{
    CarePlanStore, ChangeAction, ChangeContext, FileCarePlanStore, InMemoryCarePlanStore,
    RevisionRecord,
};
pub use transition::Event;

use std::sync::Arc;

/// Build the configured store.
///
/// # Errors
///
/// Returns a storage error if the file backend's directory cannot be created.
pub fn open_store(config: &CoreConfig) -> CarePlanResult<Arc<dyn CarePlanStore>> {
    Ok(match config.store_backend() {
        StoreBackend::Memory => Arc::new(InMemoryCarePlanStore::new()),
        StoreBackend::File => Arc::new(FileCarePlanStore::new(config)?),
    })
}
