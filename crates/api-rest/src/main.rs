//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! This binary is useful for development and debugging when you only want the REST server (with
//! OpenAPI/Swagger UI). The workspace's main `cpr-run` binary runs both gRPC and REST concurrently.

use api_rest::{router, AppState};
use cpr_core::{CoreConfig, ReviewEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CPR REST API server
///
/// # Environment Variables
/// - `CPR_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CPR_DATA_DIR`: Care plan storage root (default: "careplan_data")
/// - `CPR_STORE`: `file` or `memory` (default: "file")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the storage directory cannot be created,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            api_shared::logging::with_default_directives(
                tracing_subscriber::EnvFilter::from_default_env(),
            )?,
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CPR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = CoreConfig::from_values(
        std::env::var("CPR_DATA_DIR").ok(),
        std::env::var("CPR_STORE").ok(),
    )?;
    let store = cpr_core::open_store(&cfg)?;
    tracing::info!(
        "-- Starting CPR REST API on {} ({} store at {})",
        addr,
        cfg.store_backend(),
        cfg.data_dir().display()
    );

    let app = router(AppState::new(ReviewEngine::with_store(store)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
