//! Route dispatcher: maps an inbound `(method, path)` to a backend URL.
//!
//! The table is explicit data, one entry per pattern with its allowed
//! methods, owning service, and target path template. Path matching uses a
//! `matchit` radix tree; `{param}` matches exactly one non-empty segment.

use axum::http::Method;
use thiserror::Error;

use crate::error::GatewayError;
use crate::registry::{ServiceRegistry, COMMENT_SERVICE, MEMBER_SERVICE};

/// One entry in the route table.
#[derive(Debug, Clone)]
pub struct Route {
    /// Short identifier, used in logs and native operation ids.
    pub name: String,
    /// Inbound path pattern, e.g. `/comments/{id}`.
    pub pattern: String,
    pub methods: Vec<Method>,
    /// Name of the owning service in the [`ServiceRegistry`].
    pub service: String,
    /// Backend path template; parameters are filled from the pattern.
    pub target: String,
}

impl Route {
    pub fn new(name: &str, pattern: &str, methods: &[Method], service: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            methods: methods.to_vec(),
            service: service.to_string(),
            target: target.to_string(),
        }
    }

    /// Names of the `{param}` segments in the inbound pattern.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        template_params(&self.pattern)
    }
}

/// The routes this gateway exposes.
pub fn gateway_routes() -> Vec<Route> {
    let collection = [Method::GET, Method::POST, Method::DELETE];
    let item = [Method::GET, Method::DELETE];
    vec![
        Route::new("comments", "/comments", &collection, COMMENT_SERVICE, "/comments"),
        Route::new("comment_item", "/comments/{id}", &item, COMMENT_SERVICE, "/comments/{id}"),
        Route::new("members", "/members", &collection, MEMBER_SERVICE, "/members"),
        Route::new("member_item", "/members/{id}", &item, MEMBER_SERVICE, "/members/{id}"),
    ]
}

/// Where a request should be forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub route: String,
    pub service: String,
    /// Fully qualified backend URL, without query string.
    pub url: String,
}

#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("route {route:?} targets unregistered service {service:?}")]
    UnknownService { route: String, service: String },

    #[error("route {route:?} has pattern {pattern:?} rejected by the router: {reason}")]
    InvalidPattern {
        route: String,
        pattern: String,
        reason: String,
    },

    #[error("route {route:?} target uses {param:?}, which its pattern does not capture")]
    UnboundParam { route: String, param: String },

    #[error("route {route:?} allows no methods")]
    NoMethods { route: String },
}

struct CompiledRoute {
    route: Route,
    base_url: String,
}

/// Immutable route table, built once at startup.
pub struct RouteTable {
    router: matchit::Router<usize>,
    routes: Vec<CompiledRoute>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|c| &c.route.pattern))
            .finish()
    }
}

impl RouteTable {
    /// Compile `routes` against `registry`. Fails on any route that could
    /// never be dispatched.
    pub fn build(routes: Vec<Route>, registry: &ServiceRegistry) -> Result<Self, RouteTableError> {
        let mut router = matchit::Router::new();
        let mut compiled = Vec::with_capacity(routes.len());

        for route in routes {
            if route.methods.is_empty() {
                return Err(RouteTableError::NoMethods { route: route.name });
            }
            let service = registry.get(&route.service).ok_or_else(|| {
                RouteTableError::UnknownService {
                    route: route.name.clone(),
                    service: route.service.clone(),
                }
            })?;
            if let Some(param) =
                template_params(&route.target).find(|p| !route.params().any(|q| q == *p))
            {
                return Err(RouteTableError::UnboundParam {
                    route: route.name.clone(),
                    param: param.to_string(),
                });
            }
            router
                .insert(route.pattern.clone(), compiled.len())
                .map_err(|e| RouteTableError::InvalidPattern {
                    route: route.name.clone(),
                    pattern: route.pattern.clone(),
                    reason: e.to_string(),
                })?;

            compiled.push(CompiledRoute {
                base_url: service.base_url.clone(),
                route,
            });
        }

        Ok(Self {
            router,
            routes: compiled,
        })
    }

    /// Resolve a request to its backend URL.
    ///
    /// `RouteNotFound` when no pattern matches `path`; `MethodNotAllowed` when
    /// one does but `method` is not in its allowed set.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<ResolvedTarget, GatewayError> {
        let matched = self
            .router
            .at(path)
            .map_err(|_| GatewayError::RouteNotFound {
                path: path.to_string(),
            })?;
        // `.` and `..` would be collapsed by the URL parser into a path the
        // table never declared
        if matched.params.iter().any(|(_, value)| is_dot_segment(value)) {
            return Err(GatewayError::RouteNotFound {
                path: path.to_string(),
            });
        }
        let compiled = &self.routes[*matched.value];
        let route = &compiled.route;

        if !route.methods.contains(method) {
            return Err(GatewayError::MethodNotAllowed {
                method: method.clone(),
                path: path.to_string(),
                allowed: route.methods.clone(),
            });
        }

        let target_path = route
            .target
            .split('/')
            .map(|segment| match param_name(segment) {
                Some(name) => matched.params.get(name).unwrap_or(segment),
                None => segment,
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(ResolvedTarget {
            route: route.name.clone(),
            service: route.service.clone(),
            url: format!("{}{}", compiled.base_url, target_path),
        })
    }

    /// The routes in table order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|c| &c.route)
    }
}

fn param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

/// `.` or `..`, including their percent-encoded `%2e` spellings.
fn is_dot_segment(value: &str) -> bool {
    let decoded = value.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

fn template_params(template: &str) -> impl Iterator<Item = &str> {
    template.split('/').filter_map(param_name)
}
