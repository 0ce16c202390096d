//! Span builder helpers for gateway instrumentation.

/// Create a tracing span for one inbound request handled by the gateway.
///
/// Usage: `let span = gateway_request_span!(request_id, method, path);`
///
/// `route` is recorded once the dispatcher has matched a pattern.
#[macro_export]
macro_rules! gateway_request_span {
    ($request_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "gateway_request",
            request_id = %$request_id,
            method = %$method,
            path = %$path,
            route = tracing::field::Empty,
            service = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the outbound call to a backend service.
#[macro_export]
macro_rules! backend_forward_span {
    ($method:expr, $target:expr) => {
        tracing::info_span!(
            "backend_forward",
            method = %$method,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for fetching one backend's OpenAPI document.
#[macro_export]
macro_rules! schema_fetch_span {
    ($service:expr, $url:expr) => {
        tracing::info_span!(
            "schema_fetch",
            service = %$service,
            url = %$url,
            paths = tracing::field::Empty,
        )
    };
}
