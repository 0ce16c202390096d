//! Backend forwarding.
//!
//! One inbound request becomes exactly one outbound call: headers copied
//! minus `Host` and hop-by-hop headers, body forwarded verbatim, the
//! backend's status kept and its body reparsed as JSON. No retries.

use std::time::Instant;

use axum::http::HeaderName;
use tracing::Instrument;

use super::types::{ProxiedRequest, ProxiedResponse};
use crate::config::UpstreamConfig;
use crate::error::GatewayError;

/// Headers that should NOT be forwarded. `host` is re-derived from the target URL;
/// the rest are hop-by-hop and describe the inbound connection only.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

fn is_forwardable(name: &HeaderName) -> bool {
    !HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Executes backend calls. Cheap to clone; holds no per-request state, so
/// concurrent forwards never contend.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    /// Build a forwarder whose client applies the configured timeouts.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self::from_client(builder.build()?))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Forward `request` to `target_url`, appending the inbound query string.
    pub async fn forward(
        &self,
        request: &ProxiedRequest,
        target_url: &str,
    ) -> Result<ProxiedResponse, GatewayError> {
        let url = match &request.query {
            Some(query) => format!("{target_url}?{query}"),
            None => target_url.to_string(),
        };
        let span = gateway_tracing::backend_forward_span!(request.method, url);
        let start = Instant::now();

        async {
            let mut req_builder = self
                .client
                .request(request.method.clone(), &url)
                .body(request.body.clone());

            for (name, value) in request.headers.iter() {
                if is_forwardable(name) {
                    req_builder = req_builder.header(name, value);
                }
            }

            let upstream_resp = req_builder
                .send()
                .await
                .map_err(|e| classify_transport_error(e, &url))?;
            let status = upstream_resp.status();

            // Reading the body is still part of waiting on the backend
            let bytes = upstream_resp
                .bytes()
                .await
                .map_err(|e| classify_transport_error(e, &url))?;

            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);
            tracing::Span::current().record("status", status.as_u16());

            let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|source| {
                tracing::warn!(
                    status = status.as_u16(),
                    body_len = bytes.len(),
                    "Backend body is not JSON"
                );
                GatewayError::NonJsonResponse {
                    url: url.clone(),
                    status,
                    source,
                }
            })?;

            tracing::info!(
                inbound_path = %request.path,
                status = status.as_u16(),
                latency_ms = latency,
                "Forward complete"
            );

            Ok::<_, GatewayError>(ProxiedResponse { status, body })
        }
        .instrument(span)
        .await
    }

    /// `GET url` with no inbound headers, through the same client and error
    /// classification as proxied traffic.
    pub async fn get_json(&self, url: &str) -> Result<ProxiedResponse, GatewayError> {
        let path = reqwest::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        self.forward(&ProxiedRequest::get(&path), url).await
    }
}

fn classify_transport_error(e: reqwest::Error, url: &str) -> GatewayError {
    if e.is_timeout() {
        tracing::debug!(error = %e, "Upstream timeout");
        GatewayError::BackendTimeout {
            url: url.to_string(),
        }
    } else {
        tracing::debug!(error = %e, "Upstream connection error");
        GatewayError::BackendUnreachable {
            url: url.to_string(),
            source: e,
        }
    }
}
