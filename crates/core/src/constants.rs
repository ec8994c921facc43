//! Constants used throughout the CPR core crate.
//!
//! Path and filename constants live here so the file store, CLI and servers agree on layout.

/// Directory name (under the data directory) holding sharded care plan repositories.
pub const CAREPLAN_DIR_NAME: &str = "careplans";

/// Filename of the care plan document inside each care plan repository.
pub const CAREPLAN_FILENAME: &str = "CAREPLAN.yaml";

/// Default directory for care plan storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "careplan_data";

/// Tracing target for audit events.
pub const AUDIT_TARGET: &str = "careplan_audit";

/// Identifier recorded for transitions triggered by the system rather than a person.
pub const SYSTEM_CALLER_ID: &str = "system";
