/// Cluster intent: what the user asked for, fixed for the whole run
use serde::{Deserialize, Serialize};

use crate::identity::roles::{self, AccountRole, OperatorRole};

/// Immutable user intent for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name (also the default operator role prefix)
    pub name: String,

    /// AWS region (e.g. "us-east-1")
    pub region: String,

    /// OpenShift version (e.g. "4.14.3")
    pub version: String,

    /// Delegated (STS) or direct credentials
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// AWS account ID, only needed in direct mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_account_id: Option<String>,

    #[serde(default)]
    pub network: NetworkSpec,

    pub compute: ComputeSpec,

    #[serde(default)]
    pub features: FeatureToggles,

    #[serde(default)]
    pub identity: IdentitySpec,
}

/// How the managed service obtains AWS credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Short-lived credentials through account/operator roles and an OIDC provider
    #[default]
    Delegated,
    /// Long-lived credentials held by the service; no identity resources are created
    Direct,
}

/// Cluster API exposure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    #[default]
    Public,
    Private,
    PrivateLink,
}

/// Machine network layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub mode: NetworkMode,

    #[serde(default = "default_machine_cidr")]
    pub machine_cidr: String,

    #[serde(default = "default_service_cidr")]
    pub service_cidr: String,

    #[serde(default = "default_pod_cidr")]
    pub pod_cidr: String,

    #[serde(default = "default_host_prefix")]
    pub host_prefix: u8,

    /// Existing VPC subnets (required for PrivateLink)
    #[serde(default)]
    pub subnet_ids: Vec<String>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            mode: NetworkMode::default(),
            machine_cidr: default_machine_cidr(),
            service_cidr: default_service_cidr(),
            pod_cidr: default_pod_cidr(),
            host_prefix: default_host_prefix(),
            subnet_ids: Vec::new(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeSpec {
    /// EC2 instance type (e.g. "m5.xlarge")
    pub instance_type: String,

    /// Fixed replica count (ignored when autoscaling is set)
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<Autoscaling>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autoscaling {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

/// Optional cluster features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureToggles {
    #[serde(default)]
    pub multi_az: bool,

    #[serde(default)]
    pub fips: bool,

    #[serde(default)]
    pub etcd_encryption: bool,

    #[serde(default)]
    pub disable_workload_monitoring: bool,

    /// Customer-managed KMS key for EBS volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
}

/// Identity resource layout for delegated-credential mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySpec {
    /// Prefix of the account-wide roles
    #[serde(default = "default_account_role_prefix")]
    pub account_role_prefix: String,

    /// Prefix of the operator roles (defaults to the cluster name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_role_prefix: Option<String>,

    #[serde(default = "default_account_roles")]
    pub account_roles: Vec<AccountRole>,

    #[serde(default = "default_operator_roles")]
    pub operator_roles: Vec<OperatorRole>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcSpec>,

    /// IAM path for created roles
    #[serde(default = "default_role_path")]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions_boundary: Option<String>,

    /// Managed-service principal trusted by the installer and support roles
    #[serde(default = "default_managed_principal")]
    pub managed_principal_arn: String,
}

impl Default for IdentitySpec {
    fn default() -> Self {
        Self {
            account_role_prefix: default_account_role_prefix(),
            operator_role_prefix: None,
            account_roles: default_account_roles(),
            operator_roles: default_operator_roles(),
            oidc: None,
            path: default_role_path(),
            permissions_boundary: None,
            managed_principal_arn: default_managed_principal(),
        }
    }
}

/// OIDC issuer the operator roles federate with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcSpec {
    pub issuer_url: String,

    /// SHA-1 thumbprint of the issuer's root CA
    pub thumbprint: String,

    #[serde(default = "default_client_ids")]
    pub client_ids: Vec<String>,
}

impl ClusterSpec {
    pub fn is_delegated(&self) -> bool {
        self.security_mode == SecurityMode::Delegated
    }

    /// Version demanded of versioned identity resources
    pub fn role_version(&self) -> String {
        roles::role_version(&self.version)
    }

    pub fn operator_role_prefix(&self) -> &str {
        self.identity
            .operator_role_prefix
            .as_deref()
            .unwrap_or(&self.name)
    }

    /// Worker count the service is expected to report once ready
    pub fn expected_compute_nodes(&self) -> std::ops::RangeInclusive<u32> {
        match self.compute.autoscaling {
            Some(scaling) => scaling.min_replicas..=scaling.max_replicas,
            None => self.compute.replicas..=self.compute.replicas,
        }
    }
}

fn default_machine_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_service_cidr() -> String {
    "172.30.0.0/16".to_string()
}

fn default_pod_cidr() -> String {
    "10.128.0.0/14".to_string()
}

fn default_host_prefix() -> u8 {
    23
}

fn default_replicas() -> u32 {
    2
}

fn default_account_role_prefix() -> String {
    "ManagedOpenShift".to_string()
}

fn default_account_roles() -> Vec<AccountRole> {
    AccountRole::ALL.to_vec()
}

fn default_operator_roles() -> Vec<OperatorRole> {
    OperatorRole::ALL.to_vec()
}

fn default_role_path() -> String {
    "/".to_string()
}

fn default_managed_principal() -> String {
    "arn:aws:iam::710019948333:role/RH-Managed-OpenShift-Installer".to_string()
}

fn default_client_ids() -> Vec<String> {
    vec!["openshift".to_string(), "sts.amazonaws.com".to_string()]
}
