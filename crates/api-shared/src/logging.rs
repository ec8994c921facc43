//! Log filtering shared by the CPR binaries.

use cpr_core::constants::AUDIT_TARGET;
use tracing_subscriber::filter::{Directive, EnvFilter, ParseError};

/// Targets logged at `info` on top of whatever `RUST_LOG` enables.
const INFO_TARGETS: &[&str] = &[
    "cpr_run",
    "cpr_core",
    "api_shared",
    "api_rest",
    "api_grpc",
    AUDIT_TARGET,
];

/// Add the CPR crates and the care plan audit trail to `filter`.
pub fn with_default_directives(mut filter: EnvFilter) -> Result<EnvFilter, ParseError> {
    for target in INFO_TARGETS {
        filter = filter.add_directive(format!("{target}=info").parse::<Directive>()?);
    }
    Ok(filter)
}
