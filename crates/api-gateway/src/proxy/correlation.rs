//! Correlation ID generation for request tracing.

use uuid::Uuid;

/// Response header carrying the id the gateway logged the request under.
pub const REQUEST_ID_HEADER: &str = "x-gateway-request-id";

/// Generate a new correlation ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
