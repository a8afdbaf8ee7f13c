/// AWS IAM implementation of the identity backend
use async_trait::async_trait;
use aws_sdk_iam::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_iam::types::Tag;
use aws_sdk_iam::Client;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::policies::INLINE_POLICY_NAME;
use super::{
    IdentityBackend, IdentityError, ResourceBody, ResourceDescriptor, ResourceKind,
    ResourceRequest,
};
use crate::error::format_err_chain;

/// IAM-backed identity backend for one AWS account
#[derive(Clone)]
pub struct IamBackend {
    client: Client,
    account_id: String,
}

impl IamBackend {
    /// Load credentials from the default provider chain and resolve the account ID
    pub async fn from_env(region: &str, profile: Option<&str>) -> Result<Self, IdentityError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        let sts = aws_sdk_sts::Client::new(&config);
        let identity = sts.get_caller_identity().send().await.map_err(|e| {
            IdentityError::PermissionDenied(format!(
                "STS GetCallerIdentity failed: {}",
                format_err_chain(&e)
            ))
        })?;
        let account_id = identity.account().unwrap_or_default().to_string();

        info!(account_id = %account_id, arn = identity.arn().unwrap_or_default(), "using AWS identity");

        Ok(Self {
            client: Client::new(&config),
            account_id,
        })
    }

    /// Wrap an existing client
    pub fn new(client: Client, account_id: impl Into<String>) -> Self {
        Self {
            client,
            account_id: account_id.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn oidc_provider_arn(&self, name: &str) -> String {
        format!("arn:aws:iam::{}:oidc-provider/{}", self.account_id, name)
    }

    async fn find_role(&self, kind: ResourceKind, name: &str) -> Result<Option<ResourceDescriptor>, IdentityError> {
        match self.client.get_role().role_name(name).send().await {
            Ok(output) => Ok(output.role().map(|role| ResourceDescriptor {
                kind,
                name: role.role_name().to_string(),
                arn: role.arn().to_string(),
                tags: tags_to_map(role.tags()),
                created_at: to_chrono(role.create_date()),
            })),
            Err(e) => match classify(e, kind, name, "GetRole") {
                IdentityError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn find_oidc_provider(&self, name: &str) -> Result<Option<ResourceDescriptor>, IdentityError> {
        let arn = self.oidc_provider_arn(name);
        match self
            .client
            .get_open_id_connect_provider()
            .open_id_connect_provider_arn(&arn)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ResourceDescriptor {
                kind: ResourceKind::OidcProvider,
                name: name.to_string(),
                arn,
                tags: tags_to_map(output.tags()),
                created_at: output.create_date().and_then(to_chrono),
            })),
            Err(e) => match classify(e, ResourceKind::OidcProvider, name, "GetOpenIDConnectProvider") {
                IdentityError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create_oidc_provider(
        &self,
        request: &ResourceRequest,
        issuer_url: &str,
        client_ids: &[String],
        thumbprint: &str,
    ) -> Result<ResourceDescriptor, IdentityError> {
        let output = self
            .client
            .create_open_id_connect_provider()
            .url(issuer_url)
            .set_client_id_list(Some(client_ids.to_vec()))
            .thumbprint_list(thumbprint)
            .set_tags(Some(build_tags(&request.tags)?))
            .send()
            .await
            .map_err(|e| classify(e, request.kind, &request.name, "CreateOpenIDConnectProvider"))?;

        let arn = output
            .open_id_connect_provider_arn()
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.oidc_provider_arn(&request.name));

        info!(name = %request.name, arn = %arn, "OIDC provider created");

        Ok(ResourceDescriptor {
            kind: request.kind,
            name: request.name.clone(),
            arn,
            tags: request.tags.clone(),
            created_at: Some(Utc::now()),
        })
    }

    async fn create_role(
        &self,
        request: &ResourceRequest,
        path: &str,
        description: &str,
        trust_policy: &serde_json::Value,
        permission_policy: &serde_json::Value,
        permissions_boundary: Option<&str>,
    ) -> Result<ResourceDescriptor, IdentityError> {
        let output = self
            .client
            .create_role()
            .role_name(&request.name)
            .path(path)
            .description(description)
            .assume_role_policy_document(trust_policy.to_string())
            .set_permissions_boundary(permissions_boundary.map(|b| b.to_string()))
            .set_tags(Some(build_tags(&request.tags)?))
            .send()
            .await
            .map_err(|e| classify(e, request.kind, &request.name, "CreateRole"))?;

        let arn = output
            .role()
            .map(|r| r.arn().to_string())
            .ok_or_else(|| IdentityError::Other(format!("CreateRole returned no role for {}", request.name)))?;

        // A role without its permissions is useless to the cluster; undo the
        // create so the caller never records a half-built role.
        if let Err(e) = self.put_permissions(&request.name, permission_policy).await {
            warn!(role_name = %request.name, error = %e, "attaching permissions failed, removing role");
            if let Err(cleanup) = self.client.delete_role().role_name(&request.name).send().await {
                warn!(
                    role_name = %request.name,
                    error = %format_err_chain(&cleanup),
                    "could not remove half-created role"
                );
            }
            return Err(e);
        }

        info!(role_name = %request.name, role_arn = %arn, "IAM role created");

        Ok(ResourceDescriptor {
            kind: request.kind,
            name: request.name.clone(),
            arn,
            tags: request.tags.clone(),
            created_at: output.role().and_then(|r| to_chrono(r.create_date())),
        })
    }

    async fn put_permissions(&self, role_name: &str, policy: &serde_json::Value) -> Result<(), IdentityError> {
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(INLINE_POLICY_NAME)
            .policy_document(policy.to_string())
            .send()
            .await
            .map_err(|e| classify(e, ResourceKind::AccountRole, role_name, "PutRolePolicy"))?;
        Ok(())
    }

    /// Inline and managed policies must be gone before IAM accepts DeleteRole
    async fn delete_role(&self, descriptor: &ResourceDescriptor) -> Result<(), IdentityError> {
        let name = descriptor.name.as_str();
        let kind = descriptor.kind;

        let inline = self
            .client
            .list_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify(e, kind, name, "ListRolePolicies"))?;
        for policy_name in inline.policy_names() {
            debug!(role_name = %name, policy = %policy_name, "deleting inline policy");
            self.client
                .delete_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| classify(e, kind, name, "DeleteRolePolicy"))?;
        }

        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify(e, kind, name, "ListAttachedRolePolicies"))?;
        for policy_arn in attached.attached_policies().iter().filter_map(|p| p.policy_arn()) {
            debug!(role_name = %name, policy = %policy_arn, "detaching managed policy");
            self.client
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| classify(e, kind, name, "DetachRolePolicy"))?;
        }

        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify(e, kind, name, "DeleteRole"))?;

        info!(role_name = %name, "IAM role deleted");
        Ok(())
    }
}

#[async_trait]
impl IdentityBackend for IamBackend {
    async fn find_resource(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ResourceDescriptor>, IdentityError> {
        debug!(kind = %kind, name = %name, "looking up identity resource");
        match kind {
            ResourceKind::OidcProvider => self.find_oidc_provider(name).await,
            ResourceKind::AccountRole | ResourceKind::OperatorRole => self.find_role(kind, name).await,
        }
    }

    async fn create_resource(
        &self,
        request: &ResourceRequest,
    ) -> Result<ResourceDescriptor, IdentityError> {
        match &request.body {
            ResourceBody::OidcProvider {
                issuer_url,
                client_ids,
                thumbprint,
            } => {
                self.create_oidc_provider(request, issuer_url, client_ids, thumbprint)
                    .await
            }
            ResourceBody::Role {
                path,
                description,
                trust_policy,
                permission_policy,
                permissions_boundary,
            } => {
                self.create_role(
                    request,
                    path,
                    description,
                    trust_policy,
                    permission_policy,
                    permissions_boundary.as_deref(),
                )
                .await
            }
        }
    }

    async fn update_resource(
        &self,
        current: &ResourceDescriptor,
        request: &ResourceRequest,
    ) -> Result<ResourceDescriptor, IdentityError> {
        let tags = build_tags(&request.tags)?;
        match &request.body {
            ResourceBody::OidcProvider { thumbprint, .. } => {
                self.client
                    .update_open_id_connect_provider_thumbprint()
                    .open_id_connect_provider_arn(&current.arn)
                    .thumbprint_list(thumbprint)
                    .send()
                    .await
                    .map_err(|e| classify(e, current.kind, &current.name, "UpdateOpenIDConnectProviderThumbprint"))?;
                self.client
                    .tag_open_id_connect_provider()
                    .open_id_connect_provider_arn(&current.arn)
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|e| classify(e, current.kind, &current.name, "TagOpenIDConnectProvider"))?;
            }
            ResourceBody::Role {
                trust_policy,
                permission_policy,
                ..
            } => {
                self.client
                    .update_assume_role_policy()
                    .role_name(&current.name)
                    .policy_document(trust_policy.to_string())
                    .send()
                    .await
                    .map_err(|e| classify(e, current.kind, &current.name, "UpdateAssumeRolePolicy"))?;
                self.put_permissions(&current.name, permission_policy).await?;
                self.client
                    .tag_role()
                    .role_name(&current.name)
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|e| classify(e, current.kind, &current.name, "TagRole"))?;
            }
        }

        info!(kind = %current.kind, name = %current.name, "identity resource updated");

        let mut merged = current.tags.clone();
        merged.extend(request.tags.clone());
        Ok(ResourceDescriptor {
            tags: merged,
            ..current.clone()
        })
    }

    async fn delete_resource(&self, descriptor: &ResourceDescriptor) -> Result<(), IdentityError> {
        match descriptor.kind {
            ResourceKind::OidcProvider => {
                self.client
                    .delete_open_id_connect_provider()
                    .open_id_connect_provider_arn(&descriptor.arn)
                    .send()
                    .await
                    .map_err(|e| classify(e, descriptor.kind, &descriptor.name, "DeleteOpenIDConnectProvider"))?;
                info!(arn = %descriptor.arn, "OIDC provider deleted");
                Ok(())
            }
            ResourceKind::AccountRole | ResourceKind::OperatorRole => self.delete_role(descriptor).await,
        }
    }
}

/// Map an SDK error onto the backend error taxonomy
fn classify<E, R>(err: SdkError<E, R>, kind: ResourceKind, name: &str, action: &str) -> IdentityError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + 'static,
{
    let detail = format!("{} {}: {}", action, name, format_err_chain(&err));

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            return IdentityError::Transient(detail);
        }
        _ => {}
    }

    match err.code() {
        Some("NoSuchEntity") => IdentityError::NotFound {
            kind,
            name: name.to_string(),
        },
        Some("AccessDenied") | Some("AccessDeniedException") | Some("UnauthorizedOperation") => {
            IdentityError::PermissionDenied(detail)
        }
        Some("EntityAlreadyExists") | Some("DeleteConflict") | Some("UnmodifiableEntity") => {
            IdentityError::Conflict(detail)
        }
        Some("Throttling") | Some("ThrottlingException") | Some("ServiceFailure")
        | Some("ConcurrentModification") | Some("RequestLimitExceeded") => {
            IdentityError::Transient(detail)
        }
        _ => IdentityError::Other(detail),
    }
}

fn build_tags(tags: &BTreeMap<String, String>) -> Result<Vec<Tag>, IdentityError> {
    tags.iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| IdentityError::Other(format!("invalid tag {}: {}", key, e)))
        })
        .collect()
}

fn tags_to_map(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.key().to_string(), t.value().to_string()))
        .collect()
}

fn to_chrono(dt: &aws_sdk_iam::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}
