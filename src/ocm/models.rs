/// OpenShift Cluster Manager API data models (clusters_mgmt v1)
use serde::{Deserialize, Serialize};

/// Cluster lifecycle state as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Waiting,
    Pending,
    Validating,
    Installing,
    Ready,
    Error,
    Uninstalling,
    Hibernating,
    PoweringDown,
    Resuming,
    #[serde(other)]
    Unknown,
}

impl ClusterState {
    pub fn is_ready(self) -> bool {
        self == ClusterState::Ready
    }

    /// Terminal failure while waiting for a new cluster
    pub fn is_failed(self) -> bool {
        matches!(self, ClusterState::Error | ClusterState::Uninstalling)
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterState::Waiting => "waiting",
            ClusterState::Pending => "pending",
            ClusterState::Validating => "validating",
            ClusterState::Installing => "installing",
            ClusterState::Ready => "ready",
            ClusterState::Error => "error",
            ClusterState::Uninstalling => "uninstalling",
            ClusterState::Hibernating => "hibernating",
            ClusterState::PoweringDown => "powering_down",
            ClusterState::Resuming => "resuming",
            ClusterState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Body of `GET /clusters/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub state: ClusterState,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provision_error_code: Option<String>,
    #[serde(default)]
    pub provision_error_message: Option<String>,
}

impl ClusterStatus {
    pub fn new(state: ClusterState) -> Self {
        Self {
            state,
            description: None,
            provision_error_code: None,
            provision_error_message: None,
        }
    }

    /// Best available explanation of a failure
    pub fn reason(&self) -> String {
        self.provision_error_message
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| format!("cluster entered state {}", self.state))
    }
}

/// Cluster object as returned by `GET /clusters/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterObject {
    pub id: String,
    pub name: String,
    pub state: ClusterState,
    #[serde(default)]
    pub api: Option<UrlRef>,
    #[serde(default)]
    pub console: Option<UrlRef>,
    #[serde(default)]
    pub nodes: Option<NodesObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlRef {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodesObject {
    #[serde(default)]
    pub compute: Option<u32>,
    #[serde(default)]
    pub autoscale_compute: Option<AutoscaleCompute>,
}

/// Body of `GET /clusters?search=...`
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterList {
    #[serde(default)]
    pub items: Vec<ClusterObject>,
}

/// Error body returned by the service
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Cluster creation request (`POST /clusters`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPayload {
    pub name: String,
    pub product: IdRef,
    pub cloud_provider: IdRef,
    pub region: IdRef,
    pub version: VersionRef,
    pub multi_az: bool,
    pub ccs: Ccs,
    pub aws: AwsSettings,
    pub nodes: NodesSettings,
    pub network: NetworkSettings,
    pub api: ApiSettings,
    pub fips: bool,
    pub etcd_encryption: bool,
    pub disable_user_workload_monitoring: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

impl IdRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRef {
    pub id: String,
    pub channel_group: String,
}

/// Customer cloud subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ccs {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsSettings {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sts: Option<StsSettings>,
    pub private_link: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnet_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
}

/// Delegated-credential wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StsSettings {
    pub enabled: bool,
    pub role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_role_arn: Option<String>,
    pub instance_iam_roles: InstanceIamRoles,
    pub operator_iam_roles: Vec<OperatorIamRole>,
    pub operator_role_prefix: String,
    pub oidc_endpoint_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceIamRoles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_role_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorIamRole {
    pub name: String,
    pub namespace: String,
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodesSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<u32>,
    pub compute_machine_type: IdRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscale_compute: Option<AutoscaleCompute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleCompute {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub machine_cidr: String,
    pub service_cidr: String,
    pub pod_cidr: String,
    pub host_prefix: u8,
    #[serde(rename = "type")]
    pub network_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// "external" or "internal"
    pub listening: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_state_deserializes() {
        let status: ClusterStatus =
            serde_json::from_str(r#"{"state": "brand_new_state"}"#).unwrap();
        assert_eq!(status.state, ClusterState::Unknown);
        assert!(!status.state.is_ready());
        assert!(!status.state.is_failed());
    }

    #[test]
    fn test_failure_reason_prefers_provision_error() {
        let status: ClusterStatus = serde_json::from_str(
            r#"{"state": "error", "description": "Install failed", "provision_error_message": "quota exceeded"}"#,
        )
        .unwrap();
        assert!(status.state.is_failed());
        assert_eq!(status.reason(), "quota exceeded");
        assert_eq!(
            ClusterStatus::new(ClusterState::Uninstalling).reason(),
            "cluster entered state uninstalling"
        );
    }

    #[test]
    fn test_cluster_object_optional_fields() {
        let cluster: ClusterObject = serde_json::from_str(
            r#"{"id": "abc", "name": "demo", "state": "ready", "api": {"url": "https://api.demo.example.com:6443"}, "nodes": {"compute": 3}}"#,
        )
        .unwrap();
        assert_eq!(cluster.state, ClusterState::Ready);
        assert_eq!(cluster.nodes.and_then(|n| n.compute), Some(3));
        assert!(cluster.console.is_none());
    }
}
