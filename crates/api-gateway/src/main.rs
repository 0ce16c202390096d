//! api-gateway: single entry point for the comment and member services, with a
//! merged OpenAPI document at `/openapi.json`.

mod config;
mod error;
mod openapi;
mod proxy;
mod registry;
mod routes;
mod server;

use config::GatewayConfig;
use openapi::SchemaAggregator;
use proxy::Forwarder;
use registry::ServiceRegistry;
use routes::RouteTable;
use server::AppState;

fn main() -> anyhow::Result<()> {
    // Determine config path
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        // Check for --config flag first
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            // Fall back to positional arg
            .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
            .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
            .unwrap_or_else(|| "gateway.toml".to_string())
    };

    let config = GatewayConfig::load(&config_path)?;

    // Build the tokio runtime first; the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = gateway_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            comment_service_url = %config.services.comment_service_url,
            member_service_url = %config.services.member_service_url,
            timeout_secs = config.upstream.timeout_secs,
            otlp_export = tracing_guard.is_exporting(),
            "Starting api-gateway"
        );
        if config.upstream.timeout().is_none() {
            tracing::warn!("Upstream timeout disabled; a stalled backend holds requests open indefinitely");
        }

        run(config).await
    })
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let registry = ServiceRegistry::from_config(&config.services)?;
    let routes = RouteTable::build(routes::gateway_routes(), &registry)?;

    // One pooled client serves both proxy traffic and schema fetches
    let forwarder = Forwarder::new(&config.upstream)?;

    // The merged schema is built lazily, on the first /openapi.json request
    let aggregator = SchemaAggregator::new(
        forwarder.clone(),
        registry,
        openapi::base_document(&routes),
    );

    let state = AppState {
        config,
        routes,
        forwarder,
        aggregator,
    };

    server::run(state).await
}
