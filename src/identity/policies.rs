//! Least-privilege policy documents and create requests for identity resources
//!
//! Every document is derived from the [`ClusterSpec`] alone, so the same spec
//! always produces the same request. Optional statements (KMS for the EBS CSI
//! driver, the permissions boundary) only appear when the cluster configuration asks for them.
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::roles::{self, AccountRole, OperatorRole};
use super::{ResourceBody, ResourceKind, ResourceRequest};
use crate::config::{ClusterSpec, OidcSpec};

/// Inline policy name attached to every role this tool creates
pub const INLINE_POLICY_NAME: &str = "rosa-permissions";

/// Request for the cluster's OIDC identity provider
pub fn oidc_provider_request(spec: &ClusterSpec, oidc: &OidcSpec) -> ResourceRequest {
    let mut tags = base_tags();
    tags.insert(roles::TAG_CLUSTER.to_string(), spec.name.clone());

    ResourceRequest {
        kind: ResourceKind::OidcProvider,
        name: roles::oidc_provider_name(&oidc.issuer_url),
        body: ResourceBody::OidcProvider {
            issuer_url: oidc.issuer_url.clone(),
            client_ids: oidc.client_ids.clone(),
            thumbprint: oidc.thumbprint.clone(),
        },
        tags,
    }
}

/// Request for an account-wide role
pub fn account_role_request(spec: &ClusterSpec, role: AccountRole) -> ResourceRequest {
    let mut tags = base_tags();
    tags.insert(roles::TAG_VERSION.to_string(), spec.role_version());
    tags.insert(
        roles::TAG_ROLE_PREFIX.to_string(),
        spec.identity.account_role_prefix.clone(),
    );
    tags.insert(roles::TAG_ROLE_TYPE.to_string(), role.tag_value().to_string());

    ResourceRequest {
        kind: ResourceKind::AccountRole,
        name: roles::account_role_name(&spec.identity.account_role_prefix, role),
        body: ResourceBody::Role {
            path: spec.identity.path.clone(),
            description: format!("OpenShift {} account role", role.title()),
            trust_policy: account_role_trust_policy(role, &spec.identity.managed_principal_arn),
            permission_policy: account_role_permission_policy(role),
            permissions_boundary: spec.identity.permissions_boundary.clone(),
        },
        tags,
    }
}

/// Request for an operator role federated with the given OIDC provider
pub fn operator_role_request(
    spec: &ClusterSpec,
    role: OperatorRole,
    oidc_provider_arn: &str,
    oidc_provider_name: &str,
) -> ResourceRequest {
    let mut tags = base_tags();
    tags.insert(roles::TAG_VERSION.to_string(), spec.role_version());
    tags.insert(roles::TAG_CLUSTER.to_string(), spec.name.clone());
    tags.insert(
        roles::TAG_OPERATOR_NAMESPACE.to_string(),
        role.namespace().to_string(),
    );
    tags.insert(
        roles::TAG_OPERATOR_NAME.to_string(),
        role.secret_name().to_string(),
    );

    ResourceRequest {
        kind: ResourceKind::OperatorRole,
        name: roles::operator_role_name(spec.operator_role_prefix(), role),
        body: ResourceBody::Role {
            path: spec.identity.path.clone(),
            description: format!("OpenShift operator role for {}", role.namespace()),
            trust_policy: operator_role_trust_policy(role, oidc_provider_arn, oidc_provider_name),
            permission_policy: operator_role_permission_policy(role, spec),
            permissions_boundary: spec.identity.permissions_boundary.clone(),
        },
        tags,
    }
}

fn base_tags() -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(roles::TAG_MANAGED.to_string(), "true".to_string());
    tags
}

/// Installer and support roles trust the managed service; instance roles trust EC2
pub fn account_role_trust_policy(role: AccountRole, managed_principal_arn: &str) -> Value {
    let principal = match role {
        AccountRole::Installer | AccountRole::Support => json!({ "AWS": managed_principal_arn }),
        AccountRole::ControlPlane | AccountRole::Worker => {
            json!({ "Service": "ec2.amazonaws.com" })
        }
    };

    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": principal,
            "Action": "sts:AssumeRole"
        }]
    })
}

pub fn account_role_permission_policy(role: AccountRole) -> Value {
    let actions: &[&str] = match role {
        AccountRole::Installer => &[
            "autoscaling:DescribeAutoScalingGroups",
            "ec2:AllocateAddress",
            "ec2:AssociateRouteTable",
            "ec2:AttachInternetGateway",
            "ec2:AuthorizeSecurityGroupIngress",
            "ec2:CreateSecurityGroup",
            "ec2:CreateTags",
            "ec2:DeleteSecurityGroup",
            "ec2:Describe*",
            "ec2:RunInstances",
            "ec2:TerminateInstances",
            "elasticloadbalancing:*",
            "iam:GetRole",
            "iam:PassRole",
            "iam:CreateServiceLinkedRole",
            "route53:ChangeResourceRecordSets",
            "route53:CreateHostedZone",
            "route53:DeleteHostedZone",
            "route53:GetHostedZone",
            "route53:ListHostedZones",
            "s3:CreateBucket",
            "s3:DeleteBucket",
            "s3:GetObject",
            "s3:PutObject",
            "sts:AssumeRole",
            "sts:AssumeRoleWithWebIdentity",
        ],
        AccountRole::ControlPlane => &[
            "ec2:AttachVolume",
            "ec2:AuthorizeSecurityGroupIngress",
            "ec2:CreateSecurityGroup",
            "ec2:CreateTags",
            "ec2:CreateVolume",
            "ec2:DeleteVolume",
            "ec2:Describe*",
            "ec2:DetachVolume",
            "ec2:ModifyInstanceAttribute",
            "ec2:ModifyVolume",
            "elasticloadbalancing:*",
            "kms:DescribeKey",
        ],
        AccountRole::Worker => &["ec2:DescribeInstances", "ec2:DescribeRegions"],
        AccountRole::Support => &[
            "cloudtrail:DescribeTrails",
            "cloudtrail:LookupEvents",
            "cloudwatch:GetMetricData",
            "ec2:Describe*",
            "elasticloadbalancing:Describe*",
            "iam:GetRole",
            "iam:ListRoles",
            "route53:List*",
            "s3:GetBucketLocation",
            "s3:ListBucket",
            "sts:DecodeAuthorizationMessage",
        ],
    };

    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": actions,
            "Resource": "*"
        }]
    })
}

/// Web-identity trust restricted to the operator's service accounts
pub fn operator_role_trust_policy(
    role: OperatorRole,
    oidc_provider_arn: &str,
    oidc_provider_name: &str,
) -> Value {
    let subjects: Vec<String> = role
        .service_accounts()
        .iter()
        .map(|sa| format!("system:serviceaccount:{}:{}", role.namespace(), sa))
        .collect();

    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Federated": oidc_provider_arn },
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {
                "StringEquals": {
                    format!("{}:sub", oidc_provider_name): subjects
                }
            }
        }]
    })
}

pub fn operator_role_permission_policy(role: OperatorRole, spec: &ClusterSpec) -> Value {
    let actions: &[&str] = match role {
        OperatorRole::Ingress => &[
            "elasticloadbalancing:DescribeLoadBalancers",
            "route53:ChangeResourceRecordSets",
            "route53:ListHostedZones",
            "tag:GetResources",
        ],
        OperatorRole::ImageRegistry => &[
            "s3:CreateBucket",
            "s3:DeleteBucket",
            "s3:PutBucketTagging",
            "s3:GetBucketTagging",
            "s3:PutBucketPublicAccessBlock",
            "s3:GetBucketPublicAccessBlock",
            "s3:PutEncryptionConfiguration",
            "s3:GetEncryptionConfiguration",
            "s3:PutLifecycleConfiguration",
            "s3:GetLifecycleConfiguration",
            "s3:GetBucketLocation",
            "s3:ListBucket",
            "s3:GetObject",
            "s3:PutObject",
            "s3:DeleteObject",
            "s3:ListBucketMultipartUploads",
            "s3:AbortMultipartUpload",
            "s3:ListMultipartUploadParts",
        ],
        OperatorRole::EbsCsi => &[
            "ec2:AttachVolume",
            "ec2:CreateSnapshot",
            "ec2:CreateTags",
            "ec2:CreateVolume",
            "ec2:DeleteSnapshot",
            "ec2:DeleteTags",
            "ec2:DeleteVolume",
            "ec2:DescribeInstances",
            "ec2:DescribeSnapshots",
            "ec2:DescribeTags",
            "ec2:DescribeVolumes",
            "ec2:DescribeVolumesModifications",
            "ec2:DetachVolume",
            "ec2:ModifyVolume",
        ],
        OperatorRole::CloudNetworkConfig => &[
            "ec2:DescribeInstances",
            "ec2:DescribeInstanceStatus",
            "ec2:DescribeInstanceTypes",
            "ec2:UnassignPrivateIpAddresses",
            "ec2:AssignPrivateIpAddresses",
            "ec2:UnassignIpv6Addresses",
            "ec2:AssignIpv6Addresses",
            "ec2:DescribeSubnets",
            "ec2:DescribeNetworkInterfaces",
        ],
        OperatorRole::MachineApi => &[
            "ec2:CreateTags",
            "ec2:DescribeAvailabilityZones",
            "ec2:DescribeDhcpOptions",
            "ec2:DescribeImages",
            "ec2:DescribeInstances",
            "ec2:DescribeInstanceTypes",
            "ec2:DescribeInternetGateways",
            "ec2:DescribeSecurityGroups",
            "ec2:DescribeRegions",
            "ec2:DescribeSubnets",
            "ec2:DescribeVpcs",
            "ec2:RunInstances",
            "ec2:TerminateInstances",
            "elasticloadbalancing:DescribeLoadBalancers",
            "elasticloadbalancing:DescribeTargetGroups",
            "elasticloadbalancing:RegisterInstancesWithLoadBalancer",
            "elasticloadbalancing:RegisterTargets",
            "iam:PassRole",
            "iam:CreateServiceLinkedRole",
        ],
        OperatorRole::CloudCredential => &[
            "iam:GetUser",
            "iam:GetUserPolicy",
            "iam:ListAccessKeys",
        ],
    };

    let mut statements = vec![json!({
        "Effect": "Allow",
        "Action": actions,
        "Resource": "*"
    })];

    if let Some(key) = &spec.features.kms_key_arn {
        if matches!(role, OperatorRole::EbsCsi | OperatorRole::MachineApi) {
            statements.push(json!({
                "Effect": "Allow",
                "Action": [
                    "kms:Decrypt",
                    "kms:Encrypt",
                    "kms:GenerateDataKey",
                    "kms:GenerateDataKeyWithoutPlainText",
                    "kms:DescribeKey",
                    "kms:ReEncrypt*",
                    "kms:CreateGrant"
                ],
                "Resource": key
            }));
        }
    }

    json!({
        "Version": "2012-10-17",
        "Statement": statements
    })
}
