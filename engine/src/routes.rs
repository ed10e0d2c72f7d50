//! Endpoint resolution: mapping (entity type, action) to a remote operation.
//!
//! The route table is static configuration owned by the application layer.
//! It is validated when loaded, so an unknown pair at drain time is a
//! programming error - fatal to that mutation, never retried.

use crate::{error::Result, Action, EntityType, Error};
use std::collections::HashMap;
use std::fmt;

/// HTTP method of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Uppercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved remote operation descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path_template: String,
}

impl Endpoint {
    /// Render the concrete request path, substituting `{id}` if present.
    pub fn path_for(&self, id: Option<&str>) -> Result<String> {
        if self.path_template.contains("{id}") {
            let id = id.ok_or_else(|| Error::MissingPathParam(self.path_template.clone()))?;
            Ok(self.path_template.replace("{id}", id))
        } else {
            Ok(self.path_template.clone())
        }
    }
}

/// Static mapping from (entity type, action) to an [`Endpoint`].
///
/// Unknown pairs are rejected at configuration-load time where possible:
/// duplicates and id-less update/delete templates fail in [`insert`](Self::insert).
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(EntityType, Action), Endpoint>,
}

impl RouteTable {
    /// Create an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route for an (entity type, action) pair.
    ///
    /// Update and delete routes must address a single entity, so their
    /// templates are required to contain `{id}`.
    pub fn insert(
        &mut self,
        entity_type: impl Into<EntityType>,
        action: Action,
        method: HttpMethod,
        path_template: impl Into<String>,
    ) -> Result<()> {
        let entity_type = entity_type.into();
        let path_template = path_template.into();

        if matches!(action, Action::Update | Action::Delete) && !path_template.contains("{id}") {
            return Err(Error::InvalidRouteTemplate(path_template));
        }

        let key = (entity_type.clone(), action);
        if self.routes.contains_key(&key) {
            return Err(Error::DuplicateRoute {
                entity_type,
                action: action.as_str().to_string(),
            });
        }

        self.routes.insert(
            key,
            Endpoint {
                method,
                path_template,
            },
        );
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert) that panics on invalid
    /// configuration; intended for static tables written in code.
    pub fn with_route(
        mut self,
        entity_type: impl Into<EntityType>,
        action: Action,
        method: HttpMethod,
        path_template: impl Into<String>,
    ) -> Self {
        self.insert(entity_type, action, method, path_template)
            .expect("invalid route table entry");
        self
    }

    /// Resolve the remote operation for an (entity type, action) pair.
    pub fn resolve(&self, entity_type: &str, action: Action) -> Result<&Endpoint> {
        self.routes
            .get(&(entity_type.to_string(), action))
            .ok_or_else(|| Error::UnconfiguredRoute {
                entity_type: entity_type.to_string(),
                action: action.as_str().to_string(),
            })
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are configured.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
