/// Read-only discovery of existing identity resources
use futures::future::try_join_all;
use tracing::{debug, info};

use super::plan::{required_resources, PlanEntry, PlanStatus, RequiredResource, ResourcePlan};
use crate::config::ClusterSpec;
use crate::error::ProvisionError;
use crate::identity::{IdentityBackend, IdentityError, ResourceDescriptor};
use crate::utils::{retry_with_backoff, RetryConfig};

pub struct Inspector<'a> {
    backend: &'a dyn IdentityBackend,
    retry: RetryConfig,
}

impl<'a> Inspector<'a> {
    pub fn new(backend: &'a dyn IdentityBackend, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }

    /// Build the resource plan for a cluster
    ///
    /// Fails as a whole if any lookup fails: a plan with holes is never returned.
    pub async fn inspect(&self, spec: &ClusterSpec) -> Result<ResourcePlan, ProvisionError> {
        let wanted_version = spec.role_version();
        let required = required_resources(spec);

        let entries = try_join_all(
            required
                .into_iter()
                .map(|resource| self.inspect_one(resource, &wanted_version)),
        )
        .await?;

        let plan = ResourcePlan::new(entries);
        info!(
            cluster = %spec.name,
            summary = ?plan.summary(),
            "identity resources inspected"
        );
        Ok(plan)
    }

    async fn inspect_one(
        &self,
        resource: RequiredResource,
        wanted_version: &str,
    ) -> Result<PlanEntry, ProvisionError> {
        let op = format!("find {}", resource.logical_name);
        let found = retry_with_backoff(
            &self.retry,
            &op,
            || self.backend.find_resource(resource.kind, &resource.name),
            IdentityError::is_transient,
        )
        .await
        .map_err(|e| match e {
            IdentityError::Transient(_) => ProvisionError::PartialPlan {
                resource: resource.logical_name.clone(),
                source: e,
            },
            other => ProvisionError::from_identity(other),
        })?;

        let wanted = resource.kind.is_versioned().then(|| wanted_version.to_string());
        let status = classify(found.as_ref(), wanted.as_deref());

        debug!(
            resource = %resource.logical_name,
            name = %resource.name,
            status = ?status,
            found_version = found.as_ref().and_then(|d| d.version()).unwrap_or("-"),
            "inspected"
        );

        Ok(PlanEntry {
            resource,
            status,
            existing: found,
            wanted_version: wanted,
            outcome: None,
        })
    }
}

/// Absent is ToCreate; unversioned or matching is Existing; anything else mismatches
fn classify(found: Option<&ResourceDescriptor>, wanted_version: Option<&str>) -> PlanStatus {
    match (found, wanted_version) {
        (None, _) => PlanStatus::ToCreate,
        (Some(_), None) => PlanStatus::Existing,
        (Some(descriptor), Some(wanted)) => match descriptor.version() {
            None => PlanStatus::Existing,
            Some(found) if found == wanted => PlanStatus::Existing,
            Some(_) => PlanStatus::VersionMismatch,
        },
    }
}
