/// Explicit destruction of a cluster and its dedicated identity resources
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::inspector::Inspector;
use super::plan::{PlanStatus, ProvisionedResource};
use super::poller::ConvergencePoller;
use super::rollback::{ClusterDeletion, RollbackCoordinator, RollbackFailure};
use crate::config::ClusterSpec;
use crate::error::ProvisionError;
use crate::identity::ResourceKind;
use crate::ocm::{ClusterService, ServiceError};
use crate::utils::{retry_with_backoff, RetryConfig};

/// Account roles are shared between clusters and kept unless asked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownOptions {
    pub include_account_roles: bool,
    pub keep_oidc_provider: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownReport {
    pub cluster: ClusterDeletion,
    pub deleted: Vec<String>,
    pub failed: Vec<RollbackFailure>,
    /// Existing resources deliberately left in place
    pub kept: Vec<String>,
}

impl TeardownReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Teardown<'a> {
    service: &'a dyn ClusterService,
    inspector: Inspector<'a>,
    poller: ConvergencePoller<'a>,
    coordinator: RollbackCoordinator<'a>,
    retry: RetryConfig,
    deadline: Duration,
}

impl<'a> Teardown<'a> {
    pub fn new(
        service: &'a dyn ClusterService,
        inspector: Inspector<'a>,
        poller: ConvergencePoller<'a>,
        coordinator: RollbackCoordinator<'a>,
        retry: RetryConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            service,
            inspector,
            poller,
            coordinator,
            retry,
            deadline,
        }
    }

    /// Delete the cluster, wait for it to go, then delete its roles
    ///
    /// Identity resources are only touched once the cluster is confirmed gone.
    pub async fn run(
        &self,
        spec: &ClusterSpec,
        options: TeardownOptions,
        cancel: &CancellationToken,
    ) -> Result<TeardownReport, ProvisionError> {
        let cluster = self.delete_cluster(spec, cancel).await?;

        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled {
                stage: "teardown".to_string(),
            });
        }

        let plan = self.inspector.inspect(spec).await?;
        let mut selected = Vec::new();
        let mut kept = Vec::new();
        for entry in plan.entries() {
            let Some(existing) = entry.existing.as_ref() else {
                continue;
            };
            if entry.status == PlanStatus::ToCreate {
                continue;
            }
            let wanted = match entry.resource.kind {
                ResourceKind::OperatorRole => true,
                ResourceKind::OidcProvider => !options.keep_oidc_provider,
                ResourceKind::AccountRole => options.include_account_roles,
            };
            if wanted {
                selected.push(ProvisionedResource::created(&entry.resource, existing));
            } else {
                kept.push(existing.arn.clone());
            }
        }

        let owned: Vec<&ProvisionedResource> = selected.iter().collect();
        let (deleted, failed) = self.coordinator.delete_resources(&owned).await;

        info!(
            cluster = %spec.name,
            deleted = deleted.len(),
            failed = failed.len(),
            kept = kept.len(),
            "teardown finished"
        );

        Ok(TeardownReport {
            cluster,
            deleted,
            failed,
            kept,
        })
    }

    async fn delete_cluster(
        &self,
        spec: &ClusterSpec,
        cancel: &CancellationToken,
    ) -> Result<ClusterDeletion, ProvisionError> {
        let found = retry_with_backoff(
            &self.retry,
            "find cluster",
            || self.service.find_cluster(&spec.name),
            ServiceError::is_transient,
        )
        .await
        .map_err(ProvisionError::from_service)?;

        let Some(record) = found else {
            warn!(cluster = %spec.name, "no cluster with this name, cleaning up identity resources only");
            return Ok(ClusterDeletion::NotNeeded);
        };

        info!(cluster = %spec.name, cluster_id = %record.id, "deleting cluster");
        match retry_with_backoff(
            &self.retry,
            "delete cluster",
            || self.service.delete_cluster(&record.id),
            ServiceError::is_transient,
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ProvisionError::from_service(e)),
        }

        self.poller.wait_gone(&record.id, self.deadline, cancel).await?;
        Ok(ClusterDeletion::Deleted {
            cluster_id: record.id,
        })
    }
}
