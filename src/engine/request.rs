//! Cluster creation request: validation and payload construction
//!
//! Both functions are pure. Every violated rule is collected so the user
//! sees the whole problem at once.
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use super::plan::{account_logical_name, operator_logical_name, ProvisionedResource, ResourcePlan, OIDC_LOGICAL_NAME};
use crate::config::{ClusterSpec, NetworkMode, ServiceLimits};
use crate::error::{ProvisionError, Violation};
use crate::identity::roles::{self, AccountRole, MAX_ROLE_NAME_LEN};
use crate::ocm::models::{
    ApiSettings, AutoscaleCompute, AwsSettings, Ccs, ClusterPayload, IdRef, InstanceIamRoles,
    NetworkSettings, NodesSettings, OperatorIamRole, StsSettings, VersionRef,
};

pub const MAX_CLUSTER_NAME_LEN: usize = 54;
pub const MAX_OPERATOR_PREFIX_LEN: usize = 32;
const MIN_REPLICAS_SINGLE_AZ: u32 = 2;
const MIN_REPLICAS_MULTI_AZ: u32 = 3;
const HOST_PREFIX_RANGE: std::ops::RangeInclusive<u8> = 23..=26;

/// Check everything that does not depend on realized identity resources
pub fn validate_spec(spec: &ClusterSpec, limits: &ServiceLimits) -> Result<(), ProvisionError> {
    let violations = spec_violations(spec, limits);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::Validation(violations))
    }
}

/// Translate the ClusterSpec and the run's resources into a creation payload
///
/// In delegated mode every plan entry must already be Created or Reused.
pub fn build_cluster_request(
    spec: &ClusterSpec,
    limits: &ServiceLimits,
    plan: &ResourcePlan,
    resources: &[ProvisionedResource],
) -> Result<ClusterPayload, ProvisionError> {
    let mut violations = spec_violations(spec, limits);
    let arns: HashMap<&str, &str> = resources
        .iter()
        .map(|r| (r.logical_name.as_str(), r.arn.as_str()))
        .collect();

    let mut account_id = None;
    let mut sts = None;

    if spec.is_delegated() {
        for entry in plan.unresolved() {
            violations.push(Violation::new(
                format!("identity.{}", entry.logical_name()),
                format!("not created or reused (planned as {:?})", entry.status),
            ));
        }

        let account_arn = |role: AccountRole| arns.get(account_logical_name(role).as_str()).map(|a| a.to_string());

        let installer = account_arn(AccountRole::Installer);
        match &installer {
            Some(arn) => match roles::account_id_from_arn(arn) {
                Some(id) => account_id = Some(id.to_string()),
                None => violations.push(Violation::new(
                    "identity.account-role/installer",
                    format!("{} carries no AWS account ID", arn),
                )),
            },
            None => violations.push(Violation::new("identity.account-role/installer", "role ARN missing")),
        }

        for &role in &spec.identity.account_roles {
            if account_arn(role).is_none() && role != AccountRole::Installer {
                violations.push(Violation::new(
                    format!("identity.{}", account_logical_name(role)),
                    "role ARN missing",
                ));
            }
        }

        let mut operator_iam_roles = Vec::new();
        if !spec.identity.operator_roles.is_empty() && !arns.contains_key(OIDC_LOGICAL_NAME) {
            violations.push(Violation::new("identity.oidc-provider", "OIDC provider not resolved"));
        }
        for &role in &spec.identity.operator_roles {
            match arns.get(operator_logical_name(role).as_str()) {
                Some(arn) => operator_iam_roles.push(OperatorIamRole {
                    name: role.secret_name().to_string(),
                    namespace: role.namespace().to_string(),
                    role_arn: arn.to_string(),
                }),
                None => violations.push(Violation::new(
                    format!("identity.{}", operator_logical_name(role)),
                    "role ARN missing",
                )),
            }
        }

        if let (Some(role_arn), Some(oidc)) = (installer, &spec.identity.oidc) {
            sts = Some(StsSettings {
                enabled: true,
                role_arn,
                support_role_arn: account_arn(AccountRole::Support),
                instance_iam_roles: InstanceIamRoles {
                    master_role_arn: account_arn(AccountRole::ControlPlane),
                    worker_role_arn: account_arn(AccountRole::Worker),
                },
                operator_iam_roles,
                operator_role_prefix: spec.operator_role_prefix().to_string(),
                oidc_endpoint_url: oidc.issuer_url.clone(),
            });
        }
    } else {
        if !resources.is_empty() {
            violations.push(Violation::new(
                "security_mode",
                "direct mode must not carry identity resources",
            ));
        }
        account_id = spec.aws_account_id.clone();
    }

    if !violations.is_empty() {
        return Err(ProvisionError::Validation(violations));
    }

    let account_id = account_id
        .ok_or_else(|| ProvisionError::validation("aws_account_id", "could not determine the AWS account"))?;

    let (compute, autoscale_compute) = match spec.compute.autoscaling {
        Some(scaling) => (
            None,
            Some(AutoscaleCompute {
                min_replicas: scaling.min_replicas,
                max_replicas: scaling.max_replicas,
            }),
        ),
        None => (Some(spec.compute.replicas), None),
    };

    let listening = match spec.network.mode {
        NetworkMode::Public => "external",
        NetworkMode::Private | NetworkMode::PrivateLink => "internal",
    };

    Ok(ClusterPayload {
        name: spec.name.clone(),
        product: IdRef::new("rosa"),
        cloud_provider: IdRef::new("aws"),
        region: IdRef::new(spec.region.clone()),
        version: VersionRef {
            id: format!("openshift-v{}", spec.version.trim_start_matches("openshift-v")),
            channel_group: "stable".to_string(),
        },
        multi_az: spec.features.multi_az,
        ccs: Ccs { enabled: true },
        aws: AwsSettings {
            account_id,
            sts,
            private_link: spec.network.mode == NetworkMode::PrivateLink,
            subnet_ids: spec.network.subnet_ids.clone(),
            kms_key_arn: spec.features.kms_key_arn.clone(),
        },
        nodes: NodesSettings {
            compute,
            compute_machine_type: IdRef::new(spec.compute.instance_type.clone()),
            autoscale_compute,
        },
        network: NetworkSettings {
            machine_cidr: spec.network.machine_cidr.clone(),
            service_cidr: spec.network.service_cidr.clone(),
            pod_cidr: spec.network.pod_cidr.clone(),
            host_prefix: spec.network.host_prefix,
            network_type: "OVNKubernetes".to_string(),
        },
        api: ApiSettings {
            listening: listening.to_string(),
        },
        fips: spec.features.fips,
        etcd_encryption: spec.features.etcd_encryption,
        disable_user_workload_monitoring: spec.features.disable_workload_monitoring,
    })
}

fn spec_violations(spec: &ClusterSpec, limits: &ServiceLimits) -> Vec<Violation> {
    let mut violations = Vec::new();

    check_name(&spec.name, &mut violations);

    if !limits.supported_regions.iter().any(|r| r == &spec.region) {
        violations.push(Violation::new(
            "region",
            format!("{} is not a supported region", spec.region),
        ));
    }

    let version = spec.version.trim_start_matches("openshift-v");
    let numeric = version.split('.').take(2).filter(|p| p.parse::<u32>().is_ok()).count();
    if numeric < 2 {
        violations.push(Violation::new(
            "version",
            format!("{} is not an OpenShift version (expected major.minor[.patch])", spec.version),
        ));
    }

    check_compute(spec, limits, &mut violations);
    check_security(spec, &mut violations);
    check_network(spec, &mut violations);

    if let Some(kms) = &spec.features.kms_key_arn {
        if !kms.starts_with("arn:aws:kms:") {
            violations.push(Violation::new("features.kms_key_arn", "must be a KMS key ARN"));
        }
    }

    violations
}

fn check_name(name: &str, violations: &mut Vec<Violation>) {
    if name.is_empty() || name.len() > MAX_CLUSTER_NAME_LEN {
        violations.push(Violation::new(
            "name",
            format!("must be 1-{} characters", MAX_CLUSTER_NAME_LEN),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        violations.push(Violation::new(
            "name",
            "may only contain lowercase letters, digits and '-'",
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        violations.push(Violation::new("name", "must start with a lowercase letter"));
    }
    if name.ends_with('-') {
        violations.push(Violation::new("name", "must not end with '-'"));
    }
}

fn check_compute(spec: &ClusterSpec, limits: &ServiceLimits, violations: &mut Vec<Violation>) {
    let compute = &spec.compute;
    if !limits.instance_types.iter().any(|t| t == &compute.instance_type) {
        violations.push(Violation::new(
            "compute.instance_type",
            format!("{} is not an allowed instance type", compute.instance_type),
        ));
    }

    let multi_az = spec.features.multi_az;
    let mut check_count = |field: &str, count: u32| {
        if multi_az {
            if count < MIN_REPLICAS_MULTI_AZ || count % 3 != 0 {
                violations.push(Violation::new(
                    field,
                    format!("multi-AZ clusters need at least {} nodes, in multiples of 3", MIN_REPLICAS_MULTI_AZ),
                ));
            }
        } else if count < MIN_REPLICAS_SINGLE_AZ {
            violations.push(Violation::new(
                field,
                format!("must be at least {}", MIN_REPLICAS_SINGLE_AZ),
            ));
        }
        if count > limits.max_replicas {
            violations.push(Violation::new(
                field,
                format!("must not exceed {}", limits.max_replicas),
            ));
        }
    };

    match compute.autoscaling {
        Some(scaling) => {
            check_count("compute.autoscaling.min_replicas", scaling.min_replicas);
            check_count("compute.autoscaling.max_replicas", scaling.max_replicas);
            if scaling.min_replicas > scaling.max_replicas {
                violations.push(Violation::new(
                    "compute.autoscaling",
                    "min_replicas must not exceed max_replicas",
                ));
            }
        }
        None => check_count("compute.replicas", compute.replicas),
    }
}

fn check_security(spec: &ClusterSpec, violations: &mut Vec<Violation>) {
    let identity = &spec.identity;

    if let Some(account_id) = &spec.aws_account_id {
        if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
            violations.push(Violation::new("aws_account_id", "must be 12 digits"));
        }
    }

    if !spec.is_delegated() {
        if spec.aws_account_id.is_none() {
            violations.push(Violation::new("aws_account_id", "required in direct mode"));
        }
        return;
    }

    if identity.oidc.is_none() {
        violations.push(Violation::new("identity.oidc", "required in delegated mode"));
    }
    if !identity.account_roles.contains(&AccountRole::Installer) {
        violations.push(Violation::new(
            "identity.account_roles",
            "delegated mode requires the installer role",
        ));
    }

    let prefixes = [
        ("identity.account_role_prefix", identity.account_role_prefix.as_str()),
        ("identity.operator_role_prefix", spec.operator_role_prefix()),
    ];
    for (field, prefix) in prefixes {
        if prefix.is_empty() || !prefix.chars().all(roles::is_valid_role_name_char) {
            violations.push(Violation::new(
                field,
                format!("{:?} may only contain letters, digits and +=,.@_-", prefix),
            ));
        }
    }

    let mut seen = HashSet::new();
    for &role in &identity.account_roles {
        if !seen.insert(role) {
            violations.push(Violation::new(
                "identity.account_roles",
                format!("{} is listed more than once", account_logical_name(role)),
            ));
        }
    }
    let mut seen = HashSet::new();
    for &role in &identity.operator_roles {
        if !seen.insert(role) {
            violations.push(Violation::new(
                "identity.operator_roles",
                format!("{} is listed more than once", operator_logical_name(role)),
            ));
        }
    }

    for &role in &identity.account_roles {
        let name = roles::account_role_name(&identity.account_role_prefix, role);
        if name.len() > MAX_ROLE_NAME_LEN {
            violations.push(Violation::new(
                "identity.account_role_prefix",
                format!("role name {} exceeds {} characters", name, MAX_ROLE_NAME_LEN),
            ));
        }
    }

    if spec.operator_role_prefix().len() > MAX_OPERATOR_PREFIX_LEN {
        violations.push(Violation::new(
            "identity.operator_role_prefix",
            format!("must not exceed {} characters", MAX_OPERATOR_PREFIX_LEN),
        ));
    }

    if !identity.path.starts_with('/') || !identity.path.ends_with('/') {
        violations.push(Violation::new("identity.path", "must begin and end with '/'"));
    }
}

fn check_network(spec: &ClusterSpec, violations: &mut Vec<Violation>) {
    let network = &spec.network;

    if network.mode == NetworkMode::PrivateLink {
        if !spec.is_delegated() {
            violations.push(Violation::new(
                "network.mode",
                "PrivateLink requires delegated security mode",
            ));
        }
        if network.subnet_ids.is_empty() {
            violations.push(Violation::new(
                "network.subnet_ids",
                "PrivateLink requires existing subnets",
            ));
        }
    }

    if !HOST_PREFIX_RANGE.contains(&network.host_prefix) {
        violations.push(Violation::new(
            "network.host_prefix",
            format!(
                "must be between {} and {}",
                HOST_PREFIX_RANGE.start(),
                HOST_PREFIX_RANGE.end()
            ),
        ));
    }

    let cidrs = [
        ("network.machine_cidr", &network.machine_cidr),
        ("network.service_cidr", &network.service_cidr),
        ("network.pod_cidr", &network.pod_cidr),
    ];

    let mut parsed = Vec::new();
    for (field, value) in cidrs {
        match parse_cidr(value) {
            Some(cidr) => parsed.push((field, cidr)),
            None => violations.push(Violation::new(field, format!("{} is not a valid IPv4 CIDR", value))),
        }
    }

    for (i, (field_a, a)) in parsed.iter().enumerate() {
        for (field_b, b) in &parsed[i + 1..] {
            if overlaps(*a, *b) {
                violations.push(Violation::new(
                    *field_b,
                    format!("overlaps {}", field_a),
                ));
            }
        }
    }
}

/// (network address, prefix length)
fn parse_cidr(value: &str) -> Option<(u32, u8)> {
    let (addr, prefix) = value.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((u32::from(addr) & mask(prefix), prefix))
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn overlaps(a: (u32, u8), b: (u32, u8)) -> bool {
    let shorter = a.1.min(b.1);
    (a.0 & mask(shorter)) == (b.0 & mask(shorter))
}
