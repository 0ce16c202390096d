//! Merging backend OpenAPI documents into one.
//!
//! Documents stay untyped `serde_json::Value` so fields this gateway does not
//! know about survive the merge untouched.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Path item keys that hold operations. Anything else (`summary`,
/// `parameters`, `servers`, extensions) is copied as-is.
const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Rewrite every operation's `operationId` in `path_item` to
/// `{service}_{operationId}`. Returns the number of ids rewritten.
pub fn prefix_operation_ids(service: &str, path_item: &mut Value) -> usize {
    let Some(item) = path_item.as_object_mut() else {
        return 0;
    };

    let mut renamed = 0;
    for (key, operation) in item.iter_mut() {
        if !HTTP_METHODS.contains(&key.as_str()) {
            continue;
        }
        if let Some(Value::String(id)) = operation.get_mut("operationId") {
            *id = format!("{service}_{id}");
            renamed += 1;
        }
    }
    renamed
}

/// Counts for one merged service document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub paths: usize,
    pub operations: usize,
    pub components: usize,
}

/// Accumulates service documents on top of a base document.
///
/// Collisions are last-wins: a later service replaces an earlier one's path
/// item or same-named component. Replacing a gateway-native path is expected
/// and logged at debug; replacing another service's entry is logged at warn.
pub struct SchemaMerger {
    document: Map<String, Value>,
    path_origins: HashMap<String, String>,
    component_origins: HashMap<(String, String), String>,
}

impl SchemaMerger {
    pub fn new(mut base: Map<String, Value>) -> Self {
        object_entry(&mut base, "paths");
        object_entry(object_entry(&mut base, "components"), "schemas");
        Self {
            document: base,
            path_origins: HashMap::new(),
            component_origins: HashMap::new(),
        }
    }

    /// Merge one service's document. Non-object `paths` or `components`
    /// sections are ignored.
    pub fn merge(&mut self, service: &str, document: Map<String, Value>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut document = document;

        if let Some(Value::Object(paths)) = document.remove("paths") {
            let merged_paths = object_entry(&mut self.document, "paths");
            for (path, mut item) in paths {
                outcome.operations += prefix_operation_ids(service, &mut item);

                match self.path_origins.insert(path.clone(), service.to_string()) {
                    Some(previous) => tracing::warn!(
                        path = %path,
                        previous_service = %previous,
                        service = %service,
                        "Path collision in merged schema, last registration wins"
                    ),
                    None if merged_paths.contains_key(&path) => tracing::debug!(
                        path = %path,
                        service = %service,
                        "Backend path item replaces gateway route description"
                    ),
                    None => {}
                }

                merged_paths.insert(path, item);
                outcome.paths += 1;
            }
        }

        if let Some(Value::Object(components)) = document.remove("components") {
            let merged_components = object_entry(&mut self.document, "components");
            for (kind, entries) in components {
                let Value::Object(entries) = entries else {
                    tracing::debug!(
                        component_type = %kind,
                        service = %service,
                        "Skipping non-object component section"
                    );
                    continue;
                };

                let bucket = object_entry(merged_components, &kind);
                for (name, component) in entries {
                    let key = (kind.clone(), name.clone());
                    if let Some(previous) = self.component_origins.insert(key, service.to_string()) {
                        tracing::warn!(
                            component_type = %kind,
                            name = %name,
                            previous_service = %previous,
                            service = %service,
                            "Component collision in merged schema, last registration wins"
                        );
                    }
                    bucket.insert(name, component);
                    outcome.components += 1;
                }
            }
        }

        outcome
    }

    pub fn finish(self) -> Value {
        Value::Object(self.document)
    }
}

/// The object stored under `key`, replacing a missing or non-object value
/// with an empty object.
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
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

    #[test]
    fn test_prefix_only_touches_operations() {
        let mut item = json!({
            "summary": "Comments",
            "parameters": [{"name": "operationId", "in": "query"}],
            "get": {"operationId": "list_comments"},
            "post": {"operationId": "create_comment"},
            "delete": {"summary": "no id here"},
            "x-operationId": {"operationId": "extension"},
        });

        assert_eq!(prefix_operation_ids("comments", &mut item), 2);
        assert_eq!(item["get"]["operationId"], json!("comments_list_comments"));
        assert_eq!(item["post"]["operationId"], json!("comments_create_comment"));
        assert!(item["delete"].get("operationId").is_none());
        assert_eq!(item["x-operationId"]["operationId"], json!("extension"));
    }

    #[test]
    fn test_same_operation_id_from_two_services_does_not_collide() {
        let mut merger = SchemaMerger::new(Map::new());
        merger.merge(
            "comments",
            object(json!({"paths": {"/comments/{id}": {"get": {"operationId": "get_item"}}}})),
        );
        merger.merge(
            "members",
            object(json!({"paths": {"/members/{id}": {"get": {"operationId": "get_item"}}}})),
        );
        let merged = merger.finish();

        let ids = operation_ids(&merged);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(ids.contains(&"comments_get_item".to_string()));
        assert!(ids.contains(&"members_get_item".to_string()));
    }

    #[test]
    fn test_components_merge_into_shared_buckets() {
        let mut merger = SchemaMerger::new(Map::new());
        let outcome = merger.merge(
            "comments",
            object(json!({"components": {
                "schemas": {"Comment": {"type": "object"}},
                "securitySchemes": {"bearer": {"type": "http", "scheme": "bearer"}},
            }})),
        );
        assert_eq!(outcome.components, 2);
        merger.merge(
            "members",
            object(json!({"components": {"schemas": {"Member": {"type": "object"}}}})),
        );
        let merged = merger.finish();

        let schemas = merged["components"]["schemas"].as_object().unwrap();
        assert!(schemas.contains_key("Comment"));
        assert!(schemas.contains_key("Member"));
        assert_eq!(
            merged["components"]["securitySchemes"]["bearer"]["scheme"],
            json!("bearer")
        );
    }

    #[test]
    fn test_collisions_are_last_wins() {
        let mut merger = SchemaMerger::new(Map::new());
        merger.merge(
            "comments",
            object(json!({
                "paths": {"/health": {"get": {"operationId": "health"}}},
                "components": {"schemas": {"HTTPValidationError": {"title": "from comments"}}},
            })),
        );
        merger.merge(
            "members",
            object(json!({
                "paths": {"/health": {"get": {"operationId": "health"}}},
                "components": {"schemas": {"HTTPValidationError": {"title": "from members"}}},
            })),
        );
        let merged = merger.finish();

        assert_eq!(
            merged["paths"]["/health"]["get"]["operationId"],
            json!("members_health")
        );
        assert_eq!(
            merged["components"]["schemas"]["HTTPValidationError"]["title"],
            json!("from members")
        );
    }

    #[test]
    fn test_backend_path_replaces_base_description() {
        let base = object(json!({
            "openapi": "3.1.0",
            "paths": {"/comments": {"get": {"operationId": "proxy_comments_get"}}},
        }));
        let mut merger = SchemaMerger::new(base);
        merger.merge(
            "comments",
            object(json!({"paths": {"/comments": {"get": {"operationId": "list_comments"}}}})),
        );
        let merged = merger.finish();

        assert_eq!(operation_ids(&merged), vec!["comments_list_comments"]);
        assert_eq!(merged["openapi"], json!("3.1.0"));
        assert_eq!(merged["components"]["schemas"], json!({}));
    }

    #[test]
    fn test_malformed_sections_are_skipped() {
        let mut merger = SchemaMerger::new(Map::new());
        let outcome = merger.merge(
            "comments",
            object(json!({"paths": [], "components": {"schemas": "oops"}})),
        );
        assert_eq!(outcome, MergeOutcome::default());
        let merged = merger.finish();
        assert_eq!(merged["paths"], json!({}));
        assert_eq!(merged["components"]["schemas"], json!({}));
    }
}
