/// Role catalog and deterministic naming for STS identity resources
use serde::{Deserialize, Serialize};

/// IAM role names are limited to 64 characters
pub const MAX_ROLE_NAME_LEN: usize = 64;

pub const TAG_ROLE_PREFIX: &str = "rosa_role_prefix";
pub const TAG_ROLE_TYPE: &str = "rosa_role_type";
pub const TAG_VERSION: &str = "rosa_openshift_version";
pub const TAG_MANAGED: &str = "red-hat-managed";
pub const TAG_CLUSTER: &str = "rosa_cluster_name";
pub const TAG_OPERATOR_NAMESPACE: &str = "operator_namespace";
pub const TAG_OPERATOR_NAME: &str = "operator_name";

/// Account-wide roles, shared by every cluster using the same prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Installer,
    ControlPlane,
    Worker,
    Support,
}

impl AccountRole {
    pub const ALL: [AccountRole; 4] = [
        AccountRole::Installer,
        AccountRole::ControlPlane,
        AccountRole::Worker,
        AccountRole::Support,
    ];

    /// Name fragment used in the IAM role name
    pub fn title(self) -> &'static str {
        match self {
            AccountRole::Installer => "Installer",
            AccountRole::ControlPlane => "ControlPlane",
            AccountRole::Worker => "Worker",
            AccountRole::Support => "Support",
        }
    }

    /// Value of the `rosa_role_type` tag
    pub fn tag_value(self) -> &'static str {
        match self {
            AccountRole::Installer => "installer",
            AccountRole::ControlPlane => "instance_controlplane",
            AccountRole::Worker => "instance_worker",
            AccountRole::Support => "support",
        }
    }

    /// Short key used in logical resource names
    pub fn key(self) -> &'static str {
        match self {
            AccountRole::Installer => "installer",
            AccountRole::ControlPlane => "control-plane",
            AccountRole::Worker => "worker",
            AccountRole::Support => "support",
        }
    }
}

/// Operator roles, one per in-cluster component that calls AWS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorRole {
    Ingress,
    ImageRegistry,
    EbsCsi,
    CloudNetworkConfig,
    MachineApi,
    CloudCredential,
}

impl OperatorRole {
    pub const ALL: [OperatorRole; 6] = [
        OperatorRole::Ingress,
        OperatorRole::ImageRegistry,
        OperatorRole::EbsCsi,
        OperatorRole::CloudNetworkConfig,
        OperatorRole::MachineApi,
        OperatorRole::CloudCredential,
    ];

    pub fn key(self) -> &'static str {
        match self {
            OperatorRole::Ingress => "ingress",
            OperatorRole::ImageRegistry => "image-registry",
            OperatorRole::EbsCsi => "ebs-csi",
            OperatorRole::CloudNetworkConfig => "cloud-network-config",
            OperatorRole::MachineApi => "machine-api",
            OperatorRole::CloudCredential => "cloud-credential",
        }
    }

    /// Namespace of the operator's credentials secret
    pub fn namespace(self) -> &'static str {
        match self {
            OperatorRole::Ingress => "openshift-ingress-operator",
            OperatorRole::ImageRegistry => "openshift-image-registry",
            OperatorRole::EbsCsi => "openshift-cluster-csi-drivers",
            OperatorRole::CloudNetworkConfig => "openshift-cloud-network-config-controller",
            OperatorRole::MachineApi => "openshift-machine-api",
            OperatorRole::CloudCredential => "openshift-cloud-credential-operator",
        }
    }

    /// Name of the operator's credentials secret
    pub fn secret_name(self) -> &'static str {
        match self {
            OperatorRole::Ingress => "cloud-credentials",
            OperatorRole::ImageRegistry => "installer-cloud-credentials",
            OperatorRole::EbsCsi => "ebs-cloud-credentials",
            OperatorRole::CloudNetworkConfig => "cloud-credentials",
            OperatorRole::MachineApi => "aws-cloud-credentials",
            OperatorRole::CloudCredential => "cloud-credential-operator-iam-ro-creds",
        }
    }

    /// Service accounts allowed to assume the role through the OIDC provider
    pub fn service_accounts(self) -> &'static [&'static str] {
        match self {
            OperatorRole::Ingress => &["ingress-operator"],
            OperatorRole::ImageRegistry => &["cluster-image-registry-operator", "registry"],
            OperatorRole::EbsCsi => &[
                "aws-ebs-csi-driver-operator",
                "aws-ebs-csi-driver-controller-sa",
            ],
            OperatorRole::CloudNetworkConfig => &["cloud-network-config-controller"],
            OperatorRole::MachineApi => &["machine-api-controllers"],
            OperatorRole::CloudCredential => &["cloud-credential-operator"],
        }
    }
}

/// `{prefix}-{Title}-Role`
pub fn account_role_name(prefix: &str, role: AccountRole) -> String {
    format!("{}-{}-Role", prefix, role.title())
}

/// `{prefix}-{namespace}-{secret}`, truncated to the IAM limit
pub fn operator_role_name(prefix: &str, role: OperatorRole) -> String {
    let mut name = format!("{}-{}-{}", prefix, role.namespace(), role.secret_name());
    if name.len() > MAX_ROLE_NAME_LEN {
        let mut end = MAX_ROLE_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Characters IAM accepts in role names
pub fn is_valid_role_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "+=,.@_-".contains(c)
}

/// The IAM name of an OIDC provider is its issuer URL without the scheme
pub fn oidc_provider_name(issuer_url: &str) -> String {
    issuer_url
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .to_string()
}

/// `major.minor` of an OpenShift version, e.g. "4.14.3" -> "4.14"
pub fn role_version(openshift_version: &str) -> String {
    let version = openshift_version.trim_start_matches("openshift-v");
    let version = version.trim_start_matches('v');
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{}.{}", major, minor),
        _ => version.to_string(),
    }
}

/// Account ID embedded in an ARN (`arn:aws:iam::ACCOUNT:...`)
pub fn account_id_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(4).filter(|id| !id.is_empty())
}
