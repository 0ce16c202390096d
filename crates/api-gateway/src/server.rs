//! Axum HTTP server: router, listener, graceful shutdown.
//!
//! Proxy routes are not registered with axum one by one; every request that
//! is not a gateway endpoint falls through to [`handle_proxy`], which asks the
//! route table where it goes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::openapi::SchemaAggregator;
use crate::proxy::correlation::{self, REQUEST_ID_HEADER};
use crate::proxy::{Forwarder, ProxiedRequest, ProxiedResponse};
use crate::routes::RouteTable;

/// Shared application state.
pub struct AppState {
    pub config: GatewayConfig,
    pub routes: RouteTable,
    pub forwarder: Forwarder,
    pub aggregator: SchemaAggregator,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/openapi.json", get(handle_openapi))
        .route("/health", get(handle_health))
        .fallback(handle_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "api-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("api-gateway shut down gracefully");
    Ok(())
}

/// Catch-all handler: dispatch through the route table and forward.
async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = correlation::generate_id();
    let span = gateway_tracing::gateway_request_span!(
        &request_id,
        request.method(),
        request.uri().path()
    );

    let mut response = async {
        match proxy(&state, request).await {
            Ok(proxied) => proxied.into_response(),
            Err(e) => {
                match &e {
                    GatewayError::RouteNotFound { .. } | GatewayError::MethodNotAllowed { .. } => {
                        tracing::debug!(error = %e, "Request rejected by dispatcher")
                    }
                    GatewayError::BackendUnreachable { .. } | GatewayError::BackendTimeout { .. } => {
                        tracing::error!(error = %e, "Backend transport failure")
                    }
                    _ => tracing::warn!(error = %e, "Request failed"),
                }
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await;

    response.headers_mut().insert(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );
    response
}

async fn proxy(state: &AppState, request: Request) -> Result<ProxiedResponse, GatewayError> {
    // Dispatch before buffering the body so rejected requests cost nothing
    let target = state
        .routes
        .resolve(request.method(), request.uri().path())?;
    tracing::Span::current().record("route", target.route.as_str());
    tracing::Span::current().record("service", target.service.as_str());

    let proxied = ProxiedRequest::from_request(request, state.config.server.max_body_bytes).await?;
    state.forwarder.forward(&proxied, &target.url).await
}

/// GET /openapi.json: the merged schema, built on first request.
async fn handle_openapi(State(state): State<Arc<AppState>>) -> Response {
    tracing::debug!(state = ?state.aggregator.state(), "Serving merged OpenAPI schema");
    let schema = state.aggregator.merged_schema().await;
    axum::Json(&*schema).into_response()
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
