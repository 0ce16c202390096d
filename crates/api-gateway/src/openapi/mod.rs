//! Unified OpenAPI document: the gateway's own routes plus every backend's schema.

pub mod aggregator;
pub mod base;
pub mod merge;

pub use aggregator::SchemaAggregator;
pub use base::base_document;
