//! Per-call request and response values passed through the forwarder.

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::error::GatewayError;

/// An inbound request as the forwarder sees it. Read-only once built.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Case-insensitive, ordered, duplicates preserved.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxiedRequest {
    /// A bodiless `GET` with no inbound headers, for gateway-originated calls.
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: path.to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Buffer an axum request, rejecting bodies over `max_body_bytes`.
    pub async fn from_request(request: Request, max_body_bytes: usize) -> Result<Self, GatewayError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|e| GatewayError::BodyRead(e.to_string()))?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        })
    }
}

/// A backend's answer: its status, and its body parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self.body)).into_response()
    }
}
