//! Managed cluster service: the OpenShift Cluster Manager API
pub mod client;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use client::OcmClient;
pub use models::{ClusterPayload, ClusterState, ClusterStatus};

/// Authoritative view of one cluster, valid for a single poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRecord {
    pub id: String,
    pub name: String,
    pub state: ClusterState,
    pub api_url: Option<String>,
    pub console_url: Option<String>,
    /// Fixed worker count, when not autoscaling
    pub compute_nodes: Option<u32>,
    pub autoscale: Option<models::AutoscaleCompute>,
}

impl From<models::ClusterObject> for ClusterRecord {
    fn from(obj: models::ClusterObject) -> Self {
        let (compute_nodes, autoscale) = match obj.nodes {
            Some(nodes) => (nodes.compute, nodes.autoscale_compute),
            None => (None, None),
        };
        Self {
            id: obj.id,
            name: obj.name,
            state: obj.state,
            api_url: obj.api.and_then(|a| a.url),
            console_url: obj.console.and_then(|c| c.url),
            compute_nodes,
            autoscale,
        }
    }
}

/// Errors returned by the managed cluster service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

/// Capability interface over the managed cluster service
#[async_trait]
pub trait ClusterService: Send + Sync {
    /// Submit a creation request. Returns the new cluster's identifier.
    async fn submit_create(&self, payload: &ClusterPayload) -> Result<String, ServiceError>;

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterStatus, ServiceError>;

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterRecord, ServiceError>;

    /// Look a cluster up by name. `Ok(None)` when no such cluster exists.
    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterRecord>, ServiceError>;

    /// Request deletion (and deprovisioning) of a cluster
    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ServiceError>;

    /// Whether the cluster API endpoint answers at all
    async fn probe_api(&self, api_url: &str) -> Result<bool, ServiceError>;
}
