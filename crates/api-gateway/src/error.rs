//! Client-visible gateway errors and their HTTP mapping.

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while dispatching or forwarding one request.
///
/// Every variant reaches the client; nothing here is retried.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {path}")]
    RouteNotFound { path: String },

    #[error("method {method} is not allowed on {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },

    #[error("backend {url} unreachable: {source}")]
    BackendUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend {url} did not answer within the configured timeout")]
    BackendTimeout { url: String },

    #[error("backend {url} answered {status} with a body that is not JSON: {source}")]
    NonJsonResponse {
        url: String,
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read request body: {0}")]
    BodyRead(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BackendUnreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NonJsonResponse { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message placed in the `detail` field of the error body.
    fn detail(&self) -> String {
        match self {
            GatewayError::RouteNotFound { .. } => "Not Found".to_string(),
            GatewayError::MethodNotAllowed { .. } => "Method Not Allowed".to_string(),
            GatewayError::BackendUnreachable { .. } => "upstream connection error".to_string(),
            GatewayError::BackendTimeout { .. } => "upstream timeout".to_string(),
            GatewayError::NonJsonResponse { .. } => {
                "upstream returned a non-JSON response".to_string()
            }
            GatewayError::BodyRead(reason) => reason.clone(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (
            status,
            axum::Json(serde_json::json!({ "detail": self.detail() })),
        )
            .into_response();

        if let GatewayError::MethodNotAllowed { allowed, .. } = &self {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_errors_map_to_4xx() {
        let not_found = GatewayError::RouteNotFound {
            path: "/posts".to_string(),
        }
        .into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let not_allowed = GatewayError::MethodNotAllowed {
            method: Method::PUT,
            path: "/comments".to_string(),
            allowed: vec![Method::GET, Method::POST, Method::DELETE],
        }
        .into_response();
        assert_eq!(not_allowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            not_allowed.headers().get(header::ALLOW).unwrap(),
            "GET, POST, DELETE"
        );
    }

    #[test]
    fn test_forwarding_errors_map_to_5xx() {
        let source = serde_json::from_slice::<serde_json::Value>(b"<html>").unwrap_err();
        let err = GatewayError::NonJsonResponse {
            url: "http://comment-service:8000/comments".to_string(),
            status: StatusCode::OK,
            source,
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = GatewayError::BackendTimeout {
            url: "http://comment-service:8000/comments".to_string(),
        };
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
