//! The gateway's own OpenAPI description, generated from the route table.

use serde_json::{json, Map, Value};

use crate::routes::RouteTable;

pub const OPENAPI_VERSION: &str = "3.1.0";
pub const GATEWAY_TITLE: &str = "Gateway Service";

/// Operation id of a native gateway operation.
///
/// Imported ids are `{service}_{id}`; native ids always start with `proxy_`,
/// which is never a service name, so the two cannot collide.
pub fn native_operation_id(route: &str, method: &str) -> String {
    format!("proxy_{route}_{}", method.to_ascii_lowercase())
}

/// Base document describing every route in `table`, with an empty
/// `components.schemas` bucket ready for merging.
pub fn base_document(table: &RouteTable) -> Map<String, Value> {
    let mut paths = Map::new();

    for route in table.routes() {
        let parameters: Vec<Value> = route
            .params()
            .map(|name| {
                json!({
                    "name": name,
                    "in": "path",
                    "required": true,
                    "schema": { "type": "string" },
                })
            })
            .collect();

        let mut item = Map::new();
        for method in &route.methods {
            let mut operation = json!({
                "operationId": native_operation_id(&route.name, method.as_str()),
                "summary": format!("Forward {method} {} to the {} service", route.pattern, route.service),
                "tags": [route.service],
                "responses": {
                    "default": { "description": "Backend response, relayed unchanged" },
                },
            });
            if !parameters.is_empty() {
                operation["parameters"] = Value::Array(parameters.clone());
            }
            item.insert(method.as_str().to_ascii_lowercase(), operation);
        }
        paths.insert(route.pattern.clone(), Value::Object(item));
    }

    let mut document = Map::new();
    document.insert("openapi".to_string(), json!(OPENAPI_VERSION));
    document.insert(
        "info".to_string(),
        json!({ "title": GATEWAY_TITLE, "version": env!("CARGO_PKG_VERSION") }),
    );
    document.insert("paths".to_string(), Value::Object(paths));
    document.insert("components".to_string(), json!({ "schemas": {} }));
    document
}
