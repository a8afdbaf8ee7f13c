//! Unwinds the identity resources a failed run created
//!
//! Only resources with `owned == true` are ever deleted. Deletion goes in
//! reverse creation order, one dependency depth at a time: a shallower depth
//! never starts before every deletion at the deeper one has returned.
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::plan::ProvisionedResource;
use super::poller::ConvergencePoller;
use super::report::{RunEvent, RunReporter};
use crate::error::format_err_chain;
use crate::identity::{IdentityBackend, IdentityError};
use crate::ocm::{ClusterService, ServiceError};
use crate::utils::{retry_with_backoff, RetryConfig};

/// One owned resource rollback could not delete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackFailure {
    pub logical_name: String,
    pub arn: String,
    pub error: String,
}

/// What happened to the cluster itself during rollback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum ClusterDeletion {
    /// No cluster had been accepted
    NotNeeded,
    Deleted { cluster_id: String },
    Failed { cluster_id: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackReport {
    pub cluster: ClusterDeletion,
    /// ARNs deleted, in deletion order
    pub deleted: Vec<String>,
    /// Exactly the owned resources whose deletion failed
    pub failed: Vec<RollbackFailure>,
    /// ARNs of owned resources left in place because the cluster survived
    pub not_attempted: Vec<String>,
    /// Reused resources left alone
    pub skipped: usize,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
            && self.not_attempted.is_empty()
            && !matches!(self.cluster, ClusterDeletion::Failed { .. })
    }

    /// Identifiers needing manual cleanup
    pub fn leftovers(&self) -> Vec<String> {
        let mut leftovers = Vec::new();
        if let ClusterDeletion::Failed { cluster_id, .. } = &self.cluster {
            leftovers.push(format!("cluster {}", cluster_id));
        }
        leftovers.extend(self.not_attempted.iter().cloned());
        leftovers.extend(self.failed.iter().map(|f| f.arn.clone()));
        leftovers
    }
}

pub struct RollbackCoordinator<'a> {
    identity: &'a dyn IdentityBackend,
    service: &'a dyn ClusterService,
    poller: ConvergencePoller<'a>,
    reporter: &'a dyn RunReporter,
    max_parallel: usize,
    retry: RetryConfig,
    teardown_deadline: Duration,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(
        identity: &'a dyn IdentityBackend,
        service: &'a dyn ClusterService,
        poller: ConvergencePoller<'a>,
        reporter: &'a dyn RunReporter,
        max_parallel: usize,
        retry: RetryConfig,
        teardown_deadline: Duration,
    ) -> Self {
        Self {
            identity,
            service,
            poller,
            reporter,
            max_parallel: max_parallel.max(1),
            retry,
            teardown_deadline,
        }
    }

    /// Delete the accepted cluster (if any), then every owned resource
    ///
    /// Never fails: everything that could not be cleaned up ends in the report.
    pub async fn rollback(
        &self,
        cluster_id: Option<&str>,
        ledger: &[ProvisionedResource],
    ) -> RollbackReport {
        let owned: Vec<&ProvisionedResource> = ledger.iter().filter(|r| r.owned).collect();
        let skipped = ledger.len() - owned.len();

        let cluster = match cluster_id {
            Some(id) => self.delete_cluster(id).await,
            None => ClusterDeletion::NotNeeded,
        };

        // Roles still in use by a live cluster cannot be deleted safely
        if let ClusterDeletion::Failed { cluster_id, .. } = &cluster {
            warn!(cluster_id = %cluster_id, "cluster still present, leaving identity resources in place");
            let not_attempted = owned.iter().rev().map(|r| r.arn.clone()).collect();
            return RollbackReport {
                cluster,
                deleted: Vec::new(),
                failed: Vec::new(),
                not_attempted,
                skipped,
            };
        }

        let (deleted, failed) = self.delete_resources(&owned).await;

        info!(
            deleted = deleted.len(),
            failed = failed.len(),
            skipped,
            "rollback finished"
        );

        RollbackReport {
            cluster,
            deleted,
            failed,
            not_attempted: Vec::new(),
            skipped,
        }
    }

    /// Delete owned resources deepest first; reverse creation order within a depth
    pub async fn delete_resources(
        &self,
        owned: &[&ProvisionedResource],
    ) -> (Vec<String>, Vec<RollbackFailure>) {
        let mut depths: Vec<u8> = owned.iter().map(|r| r.kind.depth()).collect();
        depths.sort_unstable_by(|a, b| b.cmp(a));
        depths.dedup();

        let mut deleted = Vec::new();
        let mut failed = Vec::new();

        for depth in depths {
            let batch: Vec<&ProvisionedResource> = owned
                .iter()
                .rev()
                .filter(|r| r.kind.depth() == depth)
                .copied()
                .collect();

            let results: Vec<(&ProvisionedResource, Result<(), IdentityError>)> = stream::iter(batch)
                .map(|resource| async move { (resource, self.delete_one(resource).await) })
                .buffer_unordered(self.max_parallel)
                .collect()
                .await;

            for (resource, result) in results {
                match result {
                    Ok(()) => {
                        self.reporter.report(RunEvent::ResourceDeleted {
                            logical_name: resource.logical_name.clone(),
                            arn: resource.arn.clone(),
                        });
                        deleted.push(resource.arn.clone());
                    }
                    Err(e) => {
                        warn!(resource = %resource.logical_name, arn = %resource.arn, error = %e, "rollback delete failed");
                        self.reporter.report(RunEvent::ResourceDeleteFailed {
                            logical_name: resource.logical_name.clone(),
                            arn: resource.arn.clone(),
                            error: e.to_string(),
                        });
                        failed.push(RollbackFailure {
                            logical_name: resource.logical_name.clone(),
                            arn: resource.arn.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        (deleted, failed)
    }

    async fn delete_one(&self, resource: &ProvisionedResource) -> Result<(), IdentityError> {
        let descriptor = resource.descriptor();
        let op = format!("delete {}", resource.logical_name);
        match retry_with_backoff(
            &self.retry,
            &op,
            || self.identity.delete_resource(&descriptor),
            IdentityError::is_transient,
        )
        .await
        {
            Ok(()) => {
                info!(resource = %resource.logical_name, arn = %resource.arn, "deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(resource = %resource.logical_name, "already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_cluster(&self, cluster_id: &str) -> ClusterDeletion {
        let requested = retry_with_backoff(
            &self.retry,
            "delete cluster",
            || self.service.delete_cluster(cluster_id),
            ServiceError::is_transient,
        )
        .await;

        if let Err(e) = requested {
            if !e.is_not_found() {
                return ClusterDeletion::Failed {
                    cluster_id: cluster_id.to_string(),
                    error: e.to_string(),
                };
            }
        }

        // Rollback itself is not interruptible
        let never = CancellationToken::new();
        match self
            .poller
            .wait_gone(cluster_id, self.teardown_deadline, &never)
            .await
        {
            Ok(()) => ClusterDeletion::Deleted {
                cluster_id: cluster_id.to_string(),
            },
            Err(e) => ClusterDeletion::Failed {
                cluster_id: cluster_id.to_string(),
                error: format_err_chain(&e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::report::NoopReporter;
    use crate::engine::testing::{fast_retry, fast_settings, FakeIdentity, FakeService};
    use crate::identity::ResourceKind;
    use crate::utils::TokioClock;
    use chrono::Utc;

    fn provisioned(identity: &FakeIdentity, kind: ResourceKind, name: &str, owned: bool) -> ProvisionedResource {
        identity.seed(kind, name, None);
        ProvisionedResource {
            logical_name: format!("{}/{}", kind, name),
            kind,
            name: name.to_string(),
            arn: format!("arn:aws:iam::123456789012:role/{}", name),
            created_at: Utc::now(),
            owned,
        }
    }

    fn ledger(identity: &FakeIdentity) -> Vec<ProvisionedResource> {
        vec![
            provisioned(identity, ResourceKind::OidcProvider, "oidc.example.com/abc", true),
            provisioned(identity, ResourceKind::AccountRole, "a-Installer-Role", true),
            provisioned(identity, ResourceKind::AccountRole, "a-Support-Role", false),
            provisioned(identity, ResourceKind::OperatorRole, "c-ingress", true),
            provisioned(identity, ResourceKind::OperatorRole, "c-ebs", true),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverse_order_and_owned_only() {
        let identity = FakeIdentity::new();
        let service = FakeService::new();
        let settings = fast_settings(1);
        let poller = ConvergencePoller::new(&service, &TokioClock, &NoopReporter, &settings.poll);
        let coordinator = RollbackCoordinator::new(
            &identity,
            &service,
            poller,
            &NoopReporter,
            1,
            fast_retry(),
            settings.poll.teardown_deadline(),
        );
        let ledger = ledger(&identity);

        let report = coordinator.rollback(None, &ledger).await;

        assert!(report.is_complete());
        assert_eq!(report.skipped, 1);
        let deleted: Vec<String> = identity.deleted().into_iter().map(|(_, n)| n).collect();
        assert_eq!(
            deleted,
            vec!["c-ebs", "c-ingress", "a-Installer-Role", "oidc.example.com/abc"]
        );
        assert!(identity.contains(ResourceKind::AccountRole, "a-Support-Role"));
        assert!(service.deletes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_entry_attempted_despite_failures() {
        let identity = FakeIdentity::new();
        let service = FakeService::new();
        let settings = fast_settings(2);
        let poller = ConvergencePoller::new(&service, &TokioClock, &NoopReporter, &settings.poll);
        let coordinator = RollbackCoordinator::new(
            &identity,
            &service,
            poller,
            &NoopReporter,
            2,
            fast_retry(),
            settings.poll.teardown_deadline(),
        );
        let ledger = ledger(&identity);
        identity.fail_delete_of("c-ingress");
        identity.fail_delete_of("oidc.example.com/abc");

        let report = coordinator.rollback(None, &ledger).await;

        assert!(!report.is_complete());
        assert_eq!(identity.calls().deletes, 4);
        let mut failed: Vec<&str> = report.failed.iter().map(|f| f.arn.as_str()).collect();
        failed.sort();
        assert_eq!(
            failed,
            vec![
                "arn:aws:iam::123456789012:role/c-ingress",
                "arn:aws:iam::123456789012:role/oidc.example.com/abc",
            ]
        );
        assert_eq!(report.deleted.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_deleted_counts_as_success() {
        let identity = FakeIdentity::new();
        let service = FakeService::new();
        let settings = fast_settings(1);
        let poller = ConvergencePoller::new(&service, &TokioClock, &NoopReporter, &settings.poll);
        let coordinator = RollbackCoordinator::new(
            &identity,
            &service,
            poller,
            &NoopReporter,
            1,
            fast_retry(),
            settings.poll.teardown_deadline(),
        );
        let mut ledger = ledger(&identity);
        ledger[3].name = "never-existed".to_string();

        let report = coordinator.rollback(None, &ledger).await;
        assert!(report.is_complete());
        assert_eq!(report.deleted.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cluster_deleted_before_roles() {
        let identity = FakeIdentity::new();
        let service = FakeService::new();
        service.seed_cluster("abc", "mycluster");
        let settings = fast_settings(1);
        let poller = ConvergencePoller::new(&service, &TokioClock, &NoopReporter, &settings.poll);
        let coordinator = RollbackCoordinator::new(
            &identity,
            &service,
            poller,
            &NoopReporter,
            1,
            fast_retry(),
            settings.poll.teardown_deadline(),
        );
        let ledger = ledger(&identity);

        let report = coordinator.rollback(Some("abc"), &ledger).await;
        assert_eq!(
            report.cluster,
            ClusterDeletion::Deleted {
                cluster_id: "abc".to_string()
            }
        );
        assert_eq!(report.deleted.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_cluster_keeps_roles() {
        let identity = FakeIdentity::new();
        let service = FakeService::new();
        service.seed_cluster("abc", "mycluster");
        service.never_disappear();
        let settings = fast_settings(1);
        let poller = ConvergencePoller::new(&service, &TokioClock, &NoopReporter, &settings.poll);
        let coordinator = RollbackCoordinator::new(
            &identity,
            &service,
            poller,
            &NoopReporter,
            1,
            fast_retry(),
            settings.poll.teardown_deadline(),
        );
        let ledger = ledger(&identity);

        let report = coordinator.rollback(Some("abc"), &ledger).await;
        assert!(!report.is_complete());
        assert_eq!(identity.calls().deletes, 0);
        assert!(report.failed.is_empty());
        assert_eq!(report.not_attempted.len(), 4);
        let leftovers = report.leftovers();
        assert_eq!(leftovers[0], "cluster abc");
        assert_eq!(leftovers.len(), 5);
    }
}
