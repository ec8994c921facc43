use std::net::SocketAddr;
use tonic::transport::Server;
use tonic_reflection::server::Builder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_grpc::{pb::care_plan_review_server::CarePlanReviewServer, ApiKeyInterceptor, CarePlanReviewService};
use api_shared::FILE_DESCRIPTOR_SET;
use cpr_core::{CoreConfig, ReviewEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(api_shared::logging::with_default_directives(
            tracing_subscriber::EnvFilter::from_default_env(),
        )?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = std::env::var("CPR_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:50051".into())
        .parse()?;
    let api_key = std::env::var("API_KEY").map_err(|_| anyhow::anyhow!("API_KEY not set"))?;

    let cfg = CoreConfig::from_values(
        std::env::var("CPR_DATA_DIR").ok(),
        std::env::var("CPR_STORE").ok(),
    )?;
    let engine = ReviewEngine::with_store(cpr_core::open_store(&cfg)?);

    tracing::info!("-- Starting CPR gRPC on {}", addr);

    let svc = CarePlanReviewServer::with_interceptor(
        CarePlanReviewService::new(engine),
        ApiKeyInterceptor::new(api_key),
    );
    let mut server_builder = Server::builder().add_service(svc);

    if std::env::var("CPR_ENABLE_REFLECTION").unwrap_or_else(|_| "false".to_string()) == "true" {
        let reflection_service = Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;
        server_builder = server_builder.add_service(reflection_service);
        tracing::info!("gRPC server reflection enabled");
    } else {
        tracing::info!("gRPC server reflection disabled");
    }

    server_builder.serve(addr).await?;

    Ok(())
}
