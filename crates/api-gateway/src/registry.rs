//! Backend service registry.
//!
//! Registrations are fixed at startup and shared read-only, so the registry
//! is an `Arc` slice with no synchronization.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ServicesConfig;

/// Registered name of the comment backend. Also the operationId prefix.
pub const COMMENT_SERVICE: &str = "comments";

/// Registered name of the member backend. Also the operationId prefix.
pub const MEMBER_SERVICE: &str = "members";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("service name {0:?} is registered more than once")]
    DuplicateName(String),

    #[error("service name {0:?} must be a non-empty token of [A-Za-z0-9_-]")]
    InvalidName(String),

    #[error("service {name:?} has invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        name: String,
        url: String,
        reason: String,
    },
}

/// One backend service the gateway fronts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub name: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>, base_url: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL of `path` on this service. `path` must start with `/`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let name_ok = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !name_ok {
            return Err(RegistryError::InvalidName(self.name.clone()));
        }

        let invalid = |reason: String| RegistryError::InvalidBaseUrl {
            name: self.name.clone(),
            url: self.base_url.clone(),
            reason,
        };
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".to_string()));
        }
        Ok(())
    }
}

/// Ordered set of backend registrations. Cheap to clone (Arc).
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Arc<[ServiceRegistration]>,
}

impl ServiceRegistry {
    /// Validate and freeze `services`, keeping their order.
    pub fn new(services: Vec<ServiceRegistration>) -> Result<Self, RegistryError> {
        for (i, service) in services.iter().enumerate() {
            service.validate()?;
            if services[..i].iter().any(|s| s.name == service.name) {
                return Err(RegistryError::DuplicateName(service.name.clone()));
            }
        }
        Ok(Self {
            services: services.into(),
        })
    }

    /// The comment and member services, in that order.
    pub fn from_config(config: &ServicesConfig) -> Result<Self, RegistryError> {
        Self::new(vec![
            ServiceRegistration::new(COMMENT_SERVICE, &config.comment_service_url),
            ServiceRegistration::new(MEMBER_SERVICE, &config.member_service_url),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&ServiceRegistration> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRegistration> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }
}
