//! Cloud identity backend: OIDC providers and IAM roles
//!
//! The engine only talks to [`IdentityBackend`]; [`iam::IamBackend`] is the
//! AWS implementation used by the CLI.
pub mod iam;
pub mod policies;
pub mod roles;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use iam::IamBackend;
pub use roles::{AccountRole, OperatorRole};

/// Kind of identity resource, in creation dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    OidcProvider,
    AccountRole,
    OperatorRole,
}

impl ResourceKind {
    /// Dependency depth: a resource may only reference resources of lower depth
    pub fn depth(self) -> u8 {
        match self {
            ResourceKind::OidcProvider => 0,
            ResourceKind::AccountRole => 1,
            ResourceKind::OperatorRole => 2,
        }
    }

    /// Whether the resource carries a version tag that must match the cluster
    pub fn is_versioned(self) -> bool {
        !matches!(self, ResourceKind::OidcProvider)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::OidcProvider => write!(f, "oidc-provider"),
            ResourceKind::AccountRole => write!(f, "account-role"),
            ResourceKind::OperatorRole => write!(f, "operator-role"),
        }
    }
}

/// An identity resource as it exists in the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    /// Backend lookup name (role name, or issuer host/path for OIDC providers)
    pub name: String,
    /// Cloud-native identifier
    pub arn: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ResourceDescriptor {
    /// Version tag, if the resource carries one
    pub fn version(&self) -> Option<&str> {
        self.tags.get(roles::TAG_VERSION).map(String::as_str)
    }
}

/// Desired shape of a resource to create or update
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub kind: ResourceKind,
    pub name: String,
    pub body: ResourceBody,
    pub tags: BTreeMap<String, String>,
}

/// Kind-specific part of a [`ResourceRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    OidcProvider {
        issuer_url: String,
        client_ids: Vec<String>,
        thumbprint: String,
    },
    Role {
        path: String,
        description: String,
        trust_policy: serde_json::Value,
        permission_policy: serde_json::Value,
        permissions_boundary: Option<String>,
    },
}

/// Errors returned by an identity backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("{0}")]
    Other(String),
}

impl IdentityError {
    /// Errors worth retrying at the call site
    pub fn is_transient(&self) -> bool {
        matches!(self, IdentityError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IdentityError::NotFound { .. })
    }
}

/// Capability interface over the cloud identity API
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Look up a resource by kind and deterministic name. `Ok(None)` when absent.
    async fn find_resource(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ResourceDescriptor>, IdentityError>;

    /// Create a resource. Returns the realized descriptor.
    async fn create_resource(
        &self,
        request: &ResourceRequest,
    ) -> Result<ResourceDescriptor, IdentityError>;

    /// Rewrite an existing resource's policies and tags in place.
    async fn update_resource(
        &self,
        current: &ResourceDescriptor,
        request: &ResourceRequest,
    ) -> Result<ResourceDescriptor, IdentityError>;

    /// Delete a resource. Deleting an absent resource returns `NotFound`.
    async fn delete_resource(&self, descriptor: &ResourceDescriptor) -> Result<(), IdentityError>;
}
