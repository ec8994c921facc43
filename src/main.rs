use std::net::SocketAddr;
use tonic::transport::Server;
use tonic_reflection::server::Builder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_grpc::{
    pb::care_plan_review_server::CarePlanReviewServer, ApiKeyInterceptor, CarePlanReviewService,
};
use api_rest::AppState;
use api_shared::FILE_DESCRIPTOR_SET;
use cpr_core::{CoreConfig, ReviewEngine};

/// Main entry point for the CPR application
///
/// Starts both gRPC and REST servers concurrently over one review engine, so both see the same
/// store and the same per-plan concurrency control:
/// - gRPC server on port 50051 (configurable via CPR_ADDR)
/// - REST server on port 3000 (configurable via CPR_REST_ADDR)
///
/// The gRPC server requires authentication via x-api-key header. The REST server trusts the
/// identity headers set by the gateway in front of it.
///
/// # Environment Variables
/// - `CPR_ADDR`: gRPC server address (default: "0.0.0.0:50051")
/// - `CPR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CPR_DATA_DIR`: Directory for care plan storage (default: "careplan_data")
/// - `CPR_STORE`: `file` or `memory` (default: "file")
/// - `API_KEY`: API key for gRPC authentication
/// - `CPR_ENABLE_REFLECTION`: `true` to serve gRPC reflection
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

    let grpc_addr: SocketAddr = std::env::var("CPR_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:50051".into())
        .parse()?;
    let rest_addr = std::env::var("CPR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("API_KEY").map_err(|_| anyhow::anyhow!("API_KEY not set"))?;

    let cfg = CoreConfig::from_values(
        std::env::var("CPR_DATA_DIR").ok(),
        std::env::var("CPR_STORE").ok(),
    )?;
    let engine = ReviewEngine::with_store(cpr_core::open_store(&cfg)?);

    tracing::info!("++ Starting CPR gRPC on {}", grpc_addr);
    tracing::info!("++ Starting CPR REST on {}", rest_addr);
    tracing::info!(
        "++ Using {} store at {}",
        cfg.store_backend(),
        cfg.data_dir().display()
    );

    // Start REST server
    let rest_app = api_rest::router(AppState::new(engine.clone()));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    let rest_server = tokio::spawn(async move { axum::serve(listener, rest_app).await });

    // Start gRPC server
    let mut grpc_builder = Server::builder().add_service(CarePlanReviewServer::with_interceptor(
        CarePlanReviewService::new(engine),
        ApiKeyInterceptor::new(api_key),
    ));
    if std::env::var("CPR_ENABLE_REFLECTION").unwrap_or_else(|_| "false".to_string()) == "true" {
        let reflection_service = Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;
        grpc_builder = grpc_builder.add_service(reflection_service);
        tracing::info!("gRPC server reflection enabled");
    }
    let grpc_server = grpc_builder.serve(grpc_addr);

    // Run both
    let (rest_result, grpc_result) = tokio::join!(rest_server, grpc_server);
    rest_result??;
    grpc_result?;

    Ok(())
}
