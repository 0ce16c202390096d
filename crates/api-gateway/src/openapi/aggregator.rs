//! Lazily built, process-wide merged OpenAPI document.
//!
//! Lifecycle: `Unbuilt -> Building -> Built`, with no way back to `Unbuilt`
//! once built. A `tokio::sync::OnceCell` is the single-flight guard:
//! concurrent first callers wait on one build instead of each fetching.
//! If the building caller is cancelled mid-build the state returns to
//! `Unbuilt` and the next caller starts over.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::Instrument;

use super::merge::SchemaMerger;
use crate::error::GatewayError;
use crate::proxy::Forwarder;
use crate::registry::{ServiceRegistration, ServiceRegistry};

/// Where each backend publishes its own document.
pub const OPENAPI_PATH: &str = "/openapi.json";

/// Build state of the merged schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchemaState {
    Unbuilt = 0,
    Building = 1,
    Built = 2,
}

impl SchemaState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SchemaState::Building,
            2 => SchemaState::Built,
            _ => SchemaState::Unbuilt,
        }
    }
}

/// Why one backend's document was left out of the merge. Never surfaced to
/// the caller of [`SchemaAggregator::merged_schema`].
#[derive(Debug, Error)]
pub enum SchemaFetchError {
    #[error(transparent)]
    Request(#[from] GatewayError),

    #[error("backend answered with status {0}")]
    Status(StatusCode),

    #[error("document is not a JSON object")]
    NotAnObject,
}

struct AggregatorInner {
    forwarder: Forwarder,
    registry: ServiceRegistry,
    base: Map<String, Value>,
    merged: OnceCell<Arc<Value>>,
    state: AtomicU8,
}

/// Owner of the merged schema. Cheap to clone (Arc).
#[derive(Clone)]
pub struct SchemaAggregator {
    inner: Arc<AggregatorInner>,
}

/// Marks the state `Building` for its lifetime; resets to `Unbuilt` if
/// dropped before [`BuildingGuard::finish`].
struct BuildingGuard<'a> {
    state: &'a AtomicU8,
    finished: bool,
}

impl<'a> BuildingGuard<'a> {
    fn enter(state: &'a AtomicU8) -> Self {
        state.store(SchemaState::Building as u8, Ordering::Release);
        Self {
            state,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.state.store(SchemaState::Built as u8, Ordering::Release);
        self.finished = true;
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.store(SchemaState::Unbuilt as u8, Ordering::Release);
        }
    }
}

impl SchemaAggregator {
    /// `base` is the gateway's own description; backend documents are merged
    /// on top of it in registry order.
    pub fn new(forwarder: Forwarder, registry: ServiceRegistry, base: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                forwarder,
                registry,
                base,
                merged: OnceCell::new(),
                state: AtomicU8::new(SchemaState::Unbuilt as u8),
            }),
        }
    }

    pub fn state(&self) -> SchemaState {
        SchemaState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// The merged schema, building it on first call. Every later call returns
    /// the same `Arc` without contacting any backend.
    pub async fn merged_schema(&self) -> Arc<Value> {
        let merged = self
            .inner
            .merged
            .get_or_init(|| async {
                let guard = BuildingGuard::enter(&self.inner.state);
                let document = Arc::new(self.build().await);
                guard.finish();
                document
            })
            .await;
        Arc::clone(merged)
    }

    async fn build(&self) -> Value {
        let mut merger = SchemaMerger::new(self.inner.base.clone());
        let mut merged_services = 0;
        let mut skipped_services = 0;
        let mut operations = 0;

        for service in self.inner.registry.iter() {
            match self.fetch_document(service).await {
                Ok(document) => {
                    let outcome = merger.merge(&service.name, document);
                    tracing::debug!(
                        service = %service.name,
                        paths = outcome.paths,
                        operations = outcome.operations,
                        components = outcome.components,
                        "Merged service OpenAPI document"
                    );
                    merged_services += 1;
                    operations += outcome.operations;
                }
                Err(e) => {
                    tracing::warn!(
                        service = %service.name,
                        base_url = %service.base_url,
                        error = %e,
                        "Failed to fetch OpenAPI document, omitting service from merged schema"
                    );
                    skipped_services += 1;
                }
            }
        }

        let document = merger.finish();
        tracing::info!(
            registered_services = self.inner.registry.len(),
            merged_services,
            skipped_services,
            paths = document["paths"].as_object().map_or(0, Map::len),
            imported_operations = operations,
            "Merged OpenAPI schema built"
        );
        document
    }

    /// Fetch one backend's document. Every failure is a value, so the caller
    /// decides per service whether to continue.
    async fn fetch_document(
        &self,
        service: &ServiceRegistration,
    ) -> Result<Map<String, Value>, SchemaFetchError> {
        let url = service.url_for(OPENAPI_PATH);
        let span = gateway_tracing::schema_fetch_span!(service.name, url);
        self.request_document(&url).instrument(span).await
    }

    async fn request_document(&self, url: &str) -> Result<Map<String, Value>, SchemaFetchError> {
        let response = self.inner.forwarder.get_json(url).await?;
        if !response.status.is_success() {
            return Err(SchemaFetchError::Status(response.status));
        }

        let Value::Object(document) = response.body else {
            return Err(SchemaFetchError::NotAnObject);
        };
        let paths = document
            .get("paths")
            .and_then(Value::as_object)
            .map_or(0, Map::len);
        tracing::Span::current().record("paths", paths);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::UpstreamConfig;
    use crate::registry::{COMMENT_SERVICE, MEMBER_SERVICE};

    fn comment_document() -> Value {
        json!({
            "openapi": "3.1.0",
            "info": {"title": "Comment Service", "version": "0.1.0"},
            "paths": {
                "/comments": {
                    "get": {"operationId": "list_items"},
                    "post": {"operationId": "create_item"},
                },
                "/comments/{id}": {"get": {"operationId": "get_item"}},
            },
            "components": {"schemas": {"Comment": {"type": "object"}}},
        })
    }

    fn member_document() -> Value {
        json!({
            "openapi": "3.1.0",
            "info": {"title": "Member Service", "version": "0.1.0"},
            "paths": {
                "/members": {"get": {"operationId": "list_items"}},
                "/members/{id}": {"get": {"operationId": "get_item"}},
            },
            "components": {"schemas": {"Member": {"type": "object"}}},
        })
    }

    async fn backend_serving(document: Value, expected_fetches: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OPENAPI_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .expect(expected_fetches)
            .mount(&server)
            .await;
        server
    }

    fn aggregator(comment_url: &str, member_url: &str) -> SchemaAggregator {
        let registry = ServiceRegistry::new(vec![
            ServiceRegistration::new(COMMENT_SERVICE, comment_url),
            ServiceRegistration::new(MEMBER_SERVICE, member_url),
        ])
        .unwrap();
        let base = match json!({"openapi": "3.1.0", "info": {"title": "Gateway Service"}, "paths": {}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let forwarder = Forwarder::new(&UpstreamConfig::default()).unwrap();
        SchemaAggregator::new(forwarder, registry, base)
    }

    fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn operation_ids(document: &Value) -> Vec<String> {
        document["paths"]
            .as_object()
            .unwrap()
            .values()
            .flat_map(|item| item.as_object().unwrap().values())
            .filter_map(|op| op.get("operationId").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_merges_both_services_without_id_collisions() {
        let comments = backend_serving(comment_document(), 1).await;
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&comments.uri(), &members.uri());

        let merged = aggregator.merged_schema().await;

        let ids = operation_ids(&merged);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len(), "{ids:?}");
        for id in ["comments_get_item", "members_get_item", "comments_list_items", "members_list_items"] {
            assert!(ids.iter().any(|i| i == id), "missing {id} in {ids:?}");
        }

        let schemas = merged["components"]["schemas"].as_object().unwrap();
        assert!(schemas.contains_key("Comment"));
        assert!(schemas.contains_key("Member"));
        assert_eq!(merged["info"]["title"], json!("Gateway Service"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_left_out() {
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&unreachable_url(), &members.uri());

        let merged = aggregator.merged_schema().await;

        let paths = merged["paths"].as_object().unwrap();
        assert!(paths.contains_key("/members"));
        assert!(paths.contains_key("/members/{id}"));
        assert!(!paths.contains_key("/comments"));
        assert!(merged["components"]["schemas"]
            .as_object()
            .unwrap()
            .contains_key("Member"));
        assert_eq!(aggregator.state(), SchemaState::Built);
    }

    #[tokio::test]
    async fn test_error_status_and_non_object_bodies_are_left_out() {
        let comments = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OPENAPI_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "down"})))
            .mount(&comments)
            .await;
        let members = backend_serving(json!(["not", "a", "document"]), 1).await;
        let aggregator = aggregator(&comments.uri(), &members.uri());

        let merged = aggregator.merged_schema().await;
        assert_eq!(merged["paths"], json!({}));
        assert_eq!(merged["components"]["schemas"], json!({}));
    }

    #[tokio::test]
    async fn test_second_call_returns_cached_instance() {
        // expect(1) makes the mock server fail the test on a second fetch
        let comments = backend_serving(comment_document(), 1).await;
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&comments.uri(), &members.uri());
        assert_eq!(aggregator.state(), SchemaState::Unbuilt);

        let first = aggregator.merged_schema().await;
        let second = aggregator.clone().merged_schema().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(aggregator.state(), SchemaState::Built);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_one_build() {
        let comments = backend_serving(comment_document(), 1).await;
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&comments.uri(), &members.uri());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move { aggregator.merged_schema().await })
            })
            .collect();

        let mut documents = Vec::new();
        for handle in handles {
            documents.push(handle.await.unwrap());
        }
        assert!(documents.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        comments.verify().await;
        members.verify().await;
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_not_retried_after_build() {
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&unreachable_url(), &members.uri());

        let first = aggregator.merged_schema().await;
        let second = aggregator.merged_schema().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unreachable_service_is_a_warning_not_an_error() {
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&unreachable_url(), &members.uri());

        aggregator.merged_schema().await;

        assert!(logs_contain("omitting service from merged schema"));
        assert!(!logs_contain("ERROR"));
    }

    #[tokio::test]
    async fn test_cancelled_build_returns_to_unbuilt_and_next_caller_rebuilds() {
        let comments = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OPENAPI_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(comment_document())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&comments)
            .await;
        // Fetched in registry order, so only the rebuild reaches members
        let members = backend_serving(member_document(), 1).await;
        let aggregator = aggregator(&comments.uri(), &members.uri());

        let first_caller = {
            let aggregator = aggregator.clone();
            tokio::spawn(async move { aggregator.merged_schema().await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while aggregator.state() != SchemaState::Building {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        first_caller.abort();
        assert!(first_caller.await.unwrap_err().is_cancelled());
        assert_eq!(aggregator.state(), SchemaState::Unbuilt);

        let merged = aggregator.merged_schema().await;
        assert_eq!(aggregator.state(), SchemaState::Built);
        assert!(merged["paths"].as_object().unwrap().contains_key("/comments"));
        assert_eq!(comments.received_requests().await.unwrap().len(), 2);
    }
}
