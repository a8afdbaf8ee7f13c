//! Realizes the resource plan against the identity backend
//!
//! Resources are created depth by depth (OIDC provider, account roles,
//! operator roles). Within a depth a bounded pool of workers creates them
//! concurrently, and each worker appends its result to the run ledger the
//! moment its create call returns. The provisioner never deletes anything:
//! on failure the ledger holds exactly what was created.
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::plan::{
    Outcome, PlanStatus, ProvisionedResource, RequiredResource, ResourcePlan, RoleRef,
    OIDC_LOGICAL_NAME,
};
use super::report::{RunEvent, RunReporter};
use crate::config::ClusterSpec;
use crate::error::ProvisionError;
use crate::identity::policies;
use crate::identity::{IdentityBackend, IdentityError, ResourceDescriptor, ResourceKind, ResourceRequest};
use crate::utils::{retry_with_backoff, RetryConfig};

type DepthResult = (RequiredResource, Option<Result<ProvisionedResource, ProvisionError>>);

pub struct Provisioner<'a> {
    backend: &'a dyn IdentityBackend,
    reporter: &'a dyn RunReporter,
    max_parallel: usize,
    retry: RetryConfig,
    read_after_write: RetryConfig,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        backend: &'a dyn IdentityBackend,
        reporter: &'a dyn RunReporter,
        max_parallel: usize,
        retry: RetryConfig,
        read_after_write: RetryConfig,
    ) -> Self {
        Self {
            backend,
            reporter,
            max_parallel: max_parallel.max(1),
            retry,
            read_after_write,
        }
    }

    /// Create every ToCreate entry and record every Existing one as reused
    pub async fn provision(
        &self,
        spec: &ClusterSpec,
        plan: &mut ResourcePlan,
        ledger: &Mutex<Vec<ProvisionedResource>>,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        let mismatched = plan.mismatched();
        if !mismatched.is_empty() {
            return Err(mismatch_conflict(&mismatched));
        }

        let mut depths: Vec<u8> = plan.entries().iter().map(|e| e.resource.kind.depth()).collect();
        depths.sort_unstable();
        depths.dedup();

        for depth in depths {
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled {
                    stage: "provisioning".to_string(),
                });
            }

            let entries: Vec<_> = plan
                .entries()
                .iter()
                .filter(|e| e.resource.kind.depth() == depth)
                .cloned()
                .collect();

            for entry in entries.iter().filter(|e| e.status == PlanStatus::Existing) {
                if let Some(existing) = &entry.existing {
                    let reused = ProvisionedResource::reused(&entry.resource, existing);
                    debug!(resource = %reused.logical_name, arn = %reused.arn, "reusing");
                    self.reporter.report(RunEvent::ResourceResolved {
                        logical_name: reused.logical_name.clone(),
                        arn: Some(reused.arn.clone()),
                        outcome: Outcome::Reused,
                    });
                    ledger.lock().await.push(reused);
                    plan.record_outcome(entry.logical_name(), Outcome::Reused);
                }
            }

            let oidc = ledger
                .lock()
                .await
                .iter()
                .find(|r| r.kind == ResourceKind::OidcProvider)
                .cloned();

            let batch = entries
                .iter()
                .filter(|e| e.status == PlanStatus::ToCreate)
                .map(|e| Ok((e.resource.clone(), request_for(spec, &e.resource, oidc.as_ref())?)))
                .collect::<Result<Vec<_>, ProvisionError>>()?;

            if batch.is_empty() {
                continue;
            }

            let mut first_error = None;
            let mut created = Vec::new();
            for (resource, result) in self.create_batch(batch, ledger, cancel).await {
                match result {
                    Some(Ok(provisioned)) => {
                        plan.record_outcome(&resource.logical_name, Outcome::Created);
                        created.push(provisioned);
                    }
                    Some(Err(e)) => {
                        plan.record_outcome(&resource.logical_name, Outcome::Failed);
                        self.reporter.report(RunEvent::ResourceResolved {
                            logical_name: resource.logical_name.clone(),
                            arn: None,
                            outcome: Outcome::Failed,
                        });
                        first_error.get_or_insert(e);
                    }
                    None => debug!(resource = %resource.logical_name, "creation skipped"),
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled {
                    stage: "provisioning".to_string(),
                });
            }

            self.confirm_visible(&created).await?;
        }

        Ok(())
    }

    /// Create one depth's resources with at most `max_parallel` calls in flight
    async fn create_batch(
        &self,
        batch: Vec<(RequiredResource, ResourceRequest)>,
        ledger: &Mutex<Vec<ProvisionedResource>>,
        cancel: &CancellationToken,
    ) -> Vec<DepthResult> {
        let failed = AtomicBool::new(false);
        let failed = &failed;

        stream::iter(batch)
            .map(|(resource, request)| async move {
                if failed.load(Ordering::SeqCst) || cancel.is_cancelled() {
                    return (resource, None);
                }

                let op = format!("create {}", resource.logical_name);
                let result = retry_with_backoff(
                    &self.retry,
                    &op,
                    || self.backend.create_resource(&request),
                    IdentityError::is_transient,
                )
                .await;

                match result {
                    Ok(descriptor) => {
                        let provisioned = ProvisionedResource::created(&resource, &descriptor);
                        ledger.lock().await.push(provisioned.clone());
                        info!(
                            resource = %provisioned.logical_name,
                            arn = %provisioned.arn,
                            "created"
                        );
                        self.reporter.report(RunEvent::ResourceResolved {
                            logical_name: provisioned.logical_name.clone(),
                            arn: Some(provisioned.arn.clone()),
                            outcome: Outcome::Created,
                        });
                        (resource, Some(Ok(provisioned)))
                    }
                    Err(e) => {
                        failed.store(true, Ordering::SeqCst);
                        warn!(resource = %resource.logical_name, error = %e, "creation failed");
                        (resource, Some(Err(ProvisionError::from_identity(e))))
                    }
                }
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await
    }

    /// Read back freshly created resources; "not found" is expected for a while
    async fn confirm_visible(&self, created: &[ProvisionedResource]) -> Result<(), ProvisionError> {
        for resource in created {
            let backend = self.backend;
            let kind = resource.kind;
            let name = resource.name.as_str();
            let op = format!("confirm {}", resource.logical_name);

            retry_with_backoff(
                &self.read_after_write,
                &op,
                move || async move {
                    match backend.find_resource(kind, name).await {
                        Ok(Some(_)) => Ok(()),
                        Ok(None) => Err(IdentityError::NotFound {
                            kind,
                            name: name.to_string(),
                        }),
                        Err(e) => Err(e),
                    }
                },
                |e| e.is_not_found() || e.is_transient(),
            )
            .await
            .map_err(|e| match e {
                IdentityError::NotFound { .. } => ProvisionError::TransientBackend(format!(
                    "{} still not visible after creation",
                    resource.logical_name
                )),
                other => ProvisionError::from_identity(other),
            })?;
        }
        Ok(())
    }

    /// Rewrite VersionMismatch roles in place. Requires explicit confirmation.
    pub async fn upgrade_roles(
        &self,
        spec: &ClusterSpec,
        plan: &ResourcePlan,
        confirmed: bool,
    ) -> Result<Vec<ResourceDescriptor>, ProvisionError> {
        let mismatched = plan.mismatched();
        if mismatched.is_empty() {
            return Ok(Vec::new());
        }
        if !confirmed {
            return Err(mismatch_conflict(&mismatched));
        }

        let oidc = plan.get(OIDC_LOGICAL_NAME).and_then(|entry| {
            entry
                .existing
                .as_ref()
                .map(|d| ProvisionedResource::reused(&entry.resource, d))
        });

        let mut upgraded = Vec::with_capacity(mismatched.len());
        for entry in mismatched {
            let Some(current) = entry.existing.as_ref() else {
                continue;
            };
            let request = request_for(spec, &entry.resource, oidc.as_ref())?;
            let op = format!("upgrade {}", entry.logical_name());

            let descriptor = retry_with_backoff(
                &self.retry,
                &op,
                || self.backend.update_resource(current, &request),
                IdentityError::is_transient,
            )
            .await
            .map_err(ProvisionError::from_identity)?;

            info!(
                resource = %entry.logical_name(),
                from = entry.found_version().unwrap_or("-"),
                to = entry.wanted_version.as_deref().unwrap_or("-"),
                "role upgraded"
            );
            upgraded.push(descriptor);
        }

        Ok(upgraded)
    }
}

/// Build the backend request for one required resource
fn request_for(
    spec: &ClusterSpec,
    resource: &RequiredResource,
    oidc: Option<&ProvisionedResource>,
) -> Result<ResourceRequest, ProvisionError> {
    match resource.role {
        RoleRef::Oidc => spec
            .identity
            .oidc
            .as_ref()
            .map(|o| policies::oidc_provider_request(spec, o))
            .ok_or_else(|| ProvisionError::validation("identity.oidc", "required for the OIDC provider")),
        RoleRef::Account(role) => Ok(policies::account_role_request(spec, role)),
        RoleRef::Operator(role) => {
            let oidc = oidc.ok_or_else(|| {
                ProvisionError::Conflict(format!(
                    "{} needs an OIDC provider, but none is available",
                    resource.logical_name
                ))
            })?;
            Ok(policies::operator_role_request(spec, role, &oidc.arn, &oidc.name))
        }
    }
}

pub(crate) fn mismatch_conflict(mismatched: &[&super::plan::PlanEntry]) -> ProvisionError {
    let details: Vec<String> = mismatched
        .iter()
        .map(|e| {
            format!(
                "{} ({} is at {}, cluster needs {})",
                e.logical_name(),
                e.resource.name,
                e.found_version().unwrap_or("?"),
                e.wanted_version.as_deref().unwrap_or("?")
            )
        })
        .collect();
    ProvisionError::Conflict(format!(
        "identity resources at a different version, run upgrade-roles to update them: {}",
        details.join(", ")
    ))
}
