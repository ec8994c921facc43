//! # API gRPC
//!
//! gRPC server implementation for CPR.
//!
//! Handles:
//! - gRPC service setup and API key authentication
//! - The `cpr.v1.CarePlanReview` service, backed by the `cpr-core` review engine
//! - gRPC-specific concerns (interceptors, status codes, tonic integration)
//!
//! Uses `api-shared` for wire types, conversions and caller extraction.

#![warn(rust_2018_idioms)]

pub use service::{pb, status_from, ApiKeyInterceptor, CarePlanReviewService};

pub mod service;
