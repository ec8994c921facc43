//! # API Shared
//!
//! Shared utilities and definitions for the CPR APIs.
//!
//! Contains:
//! - Protobuf-generated types (`pb` module), also used as REST bodies
//! - Conversions between wire and domain types
//! - Shared services like `HealthService`
//! - Authentication utilities (usable by both gRPC and REST)
//! - The default log filter for the binaries
//!
//! Used by `api-grpc` and `api-rest` for common functionality.

// Re-export the generated protobuf module. The generated code will be placed
// into OUT_DIR at build time by the build script.
pub mod pb {
    tonic::include_proto!("cpr.v1");
}

pub mod auth;
pub mod convert;
pub mod health;
pub mod logging;

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("proto_descriptor");

pub use health::HealthService;
