//! Proxy forwarding: request/response types, the backend forwarder, and correlation.

pub mod correlation;
pub mod forward;
pub mod types;

pub use forward::Forwarder;
pub use types::{ProxiedRequest, ProxiedResponse};
