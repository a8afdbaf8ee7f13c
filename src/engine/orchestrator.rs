//! The provisioning state machine
//!
//! ```text
//! Planning -> Provisioning -> Submitting -> Converging -> Verifying -> Done
//!     \____________\_____________\_____________\____________\
//!                                                            RollingBack -> Failed
//! ```
//!
//! Transitions are forward-only. Retries happen inside stage calls, never by
//! revisiting a state. Any stage error or cancellation sends the run to
//! RollingBack, and a run that entered RollingBack always ends Failed.
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::inspector::Inspector;
use super::plan::{ProvisionedResource, ResourcePlan};
use super::poller::ConvergencePoller;
use super::provisioner::{mismatch_conflict, Provisioner};
use super::report::{RunEvent, RunReporter};
use super::request::{build_cluster_request, validate_spec};
use super::rollback::{RollbackCoordinator, RollbackReport};
use super::teardown::{Teardown, TeardownOptions, TeardownReport};
use super::verify::Verifier;
use crate::config::{ClusterSpec, EngineSettings, ServiceLimits};
use crate::error::ProvisionError;
use crate::identity::{IdentityBackend, ResourceDescriptor};
use crate::ocm::{ClusterRecord, ClusterService};
use crate::utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planning,
    Provisioning,
    Submitting,
    Converging,
    Verifying,
    Done,
    RollingBack,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        match (self, to) {
            (Planning, Provisioning)
            | (Provisioning, Submitting)
            | (Submitting, Converging)
            | (Converging, Verifying)
            | (Verifying, Done)
            | (RollingBack, Failed) => true,
            (from, RollingBack) => !from.is_terminal() && from != RollingBack,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Planning => "planning",
            RunState::Provisioning => "provisioning",
            RunState::Submitting => "submitting",
            RunState::Converging => "converging",
            RunState::Verifying => "verifying",
            RunState::Done => "done",
            RunState::RollingBack => "rolling back",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything one run knows, owned by the orchestrator for the run's lifetime
pub struct ProvisioningRun<'s> {
    pub spec: &'s ClusterSpec,
    pub plan: ResourcePlan,
    /// Shared with provisioner workers, appended as each create returns
    pub resources: Mutex<Vec<ProvisionedResource>>,
    pub state: RunState,
    pub cluster_id: Option<String>,
}

impl<'s> ProvisioningRun<'s> {
    pub fn new(spec: &'s ClusterSpec) -> Self {
        Self {
            spec,
            plan: ResourcePlan::default(),
            resources: Mutex::new(Vec::new()),
            state: RunState::Planning,
            cluster_id: None,
        }
    }

    fn transition(&mut self, to: RunState, reporter: &dyn RunReporter) {
        if !self.state.can_transition(to) {
            error!(from = %self.state, to = %to, "illegal run state transition ignored");
            return;
        }
        info!(cluster = %self.spec.name, from = %self.state, to = %to, "run state");
        reporter.report(RunEvent::StateChanged {
            from: self.state,
            to,
        });
        self.state = to;
    }
}

/// Final result of a run
#[derive(Debug)]
pub enum RunOutcome {
    Done {
        cluster: ClusterRecord,
        resources: Vec<ProvisionedResource>,
    },
    Failed {
        error: ProvisionError,
        failed_in: RunState,
        rollback: RollbackReport,
    },
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done { .. })
    }

    /// Higher-severity error listing what rollback left behind, if anything
    pub fn rollback_error(&self) -> Option<ProvisionError> {
        match self {
            RunOutcome::Failed { rollback, .. } if !rollback.is_complete() => {
                Some(ProvisionError::RollbackIncomplete(rollback.leftovers()))
            }
            _ => None,
        }
    }
}

pub struct Orchestrator {
    identity: Arc<dyn IdentityBackend>,
    service: Arc<dyn ClusterService>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn RunReporter>,
    settings: EngineSettings,
    limits: ServiceLimits,
}

impl Orchestrator {
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        service: Arc<dyn ClusterService>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn RunReporter>,
        settings: EngineSettings,
        limits: ServiceLimits,
    ) -> Self {
        Self {
            identity,
            service,
            clock,
            reporter,
            settings,
            limits,
        }
    }

    fn inspector(&self) -> Inspector<'_> {
        Inspector::new(self.identity.as_ref(), self.settings.retry.to_config())
    }

    fn provisioner(&self) -> Provisioner<'_> {
        Provisioner::new(
            self.identity.as_ref(),
            self.reporter.as_ref(),
            self.settings.max_parallel,
            self.settings.retry.to_config(),
            self.settings.read_after_write.to_config(),
        )
    }

    fn poller(&self) -> ConvergencePoller<'_> {
        ConvergencePoller::new(
            self.service.as_ref(),
            self.clock.as_ref(),
            self.reporter.as_ref(),
            &self.settings.poll,
        )
    }

    fn rollback_coordinator(&self) -> RollbackCoordinator<'_> {
        RollbackCoordinator::new(
            self.identity.as_ref(),
            self.service.as_ref(),
            self.poller(),
            self.reporter.as_ref(),
            self.settings.max_parallel,
            self.settings.retry.to_config(),
            self.settings.poll.teardown_deadline(),
        )
    }

    /// Validate the ClusterSpec and inspect what already exists, without side effects
    pub async fn plan(&self, spec: &ClusterSpec) -> Result<ResourcePlan, ProvisionError> {
        validate_spec(spec, &self.limits)?;
        self.inspector().inspect(spec).await
    }

    /// Bring VersionMismatch roles up to the cluster's version
    pub async fn upgrade_roles(
        &self,
        spec: &ClusterSpec,
        confirmed: bool,
    ) -> Result<Vec<ResourceDescriptor>, ProvisionError> {
        let plan = self.plan(spec).await?;
        self.provisioner().upgrade_roles(spec, &plan, confirmed).await
    }

    /// Delete a cluster and the identity resources dedicated to it
    pub async fn destroy(
        &self,
        spec: &ClusterSpec,
        options: TeardownOptions,
        cancel: &CancellationToken,
    ) -> Result<TeardownReport, ProvisionError> {
        validate_spec(spec, &self.limits)?;
        Teardown::new(
            self.service.as_ref(),
            self.inspector(),
            self.poller(),
            self.rollback_coordinator(),
            self.settings.retry.to_config(),
            self.settings.poll.teardown_deadline(),
        )
        .run(spec, options, cancel)
        .await
    }

    /// Run a full provisioning attempt to Done or Failed
    pub async fn run(&self, spec: &ClusterSpec, cancel: CancellationToken) -> RunOutcome {
        let mut run = ProvisioningRun::new(spec);
        let reporter = self.reporter.as_ref();

        match self.drive(&mut run, &cancel).await {
            Ok(cluster) => {
                run.transition(RunState::Done, reporter);
                RunOutcome::Done {
                    cluster,
                    resources: run.resources.into_inner(),
                }
            }
            Err(error) => {
                let failed_in = run.state;
                warn!(cluster = %spec.name, stage = %failed_in, error = %error, "run failed, rolling back");
                run.transition(RunState::RollingBack, reporter);

                let ledger = run.resources.lock().await.clone();
                let rollback = self
                    .rollback_coordinator()
                    .rollback(run.cluster_id.as_deref(), &ledger)
                    .await;
                if !rollback.is_complete() {
                    error!(leftovers = ?rollback.leftovers(), "rollback incomplete, manual cleanup required");
                }

                run.transition(RunState::Failed, reporter);
                RunOutcome::Failed {
                    error,
                    failed_in,
                    rollback,
                }
            }
        }
    }

    async fn drive(
        &self,
        run: &mut ProvisioningRun<'_>,
        cancel: &CancellationToken,
    ) -> Result<ClusterRecord, ProvisionError> {
        let spec = run.spec;
        let reporter = self.reporter.as_ref();

        // Planning
        validate_spec(spec, &self.limits)?;
        run.plan = cancellable(cancel, RunState::Planning, self.inspector().inspect(spec)).await?;
        for entry in run.plan.entries() {
            reporter.report(RunEvent::Planned {
                logical_name: entry.logical_name().to_string(),
                status: entry.status,
            });
        }
        let mismatched = run.plan.mismatched();
        if !mismatched.is_empty() {
            return Err(mismatch_conflict(&mismatched));
        }

        run.transition(RunState::Provisioning, reporter);
        self.provisioner()
            .provision(spec, &mut run.plan, &run.resources, cancel)
            .await?;

        run.transition(RunState::Submitting, reporter);
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled {
                stage: RunState::Submitting.to_string(),
            });
        }
        let resources = run.resources.lock().await.clone();
        let payload = build_cluster_request(spec, &self.limits, &run.plan, &resources)?;
        // Not retried: a lost response could otherwise create two clusters
        let cluster_id = self
            .service
            .submit_create(&payload)
            .await
            .map_err(ProvisionError::from_service)?;
        info!(cluster = %spec.name, cluster_id = %cluster_id, "cluster accepted");
        reporter.report(RunEvent::ClusterAccepted {
            cluster_id: cluster_id.clone(),
        });
        run.cluster_id = Some(cluster_id.clone());

        run.transition(RunState::Converging, reporter);
        self.poller()
            .wait_ready(&cluster_id, self.settings.poll.deadline(), cancel)
            .await?;

        run.transition(RunState::Verifying, reporter);
        let verifier = Verifier::new(self.service.as_ref(), self.settings.retry.to_config());
        cancellable(cancel, RunState::Verifying, verifier.verify(spec, &cluster_id)).await
    }
}

/// Race a stage call against cancellation
async fn cancellable<T>(
    cancel: &CancellationToken,
    stage: RunState,
    fut: impl Future<Output = Result<T, ProvisionError>>,
) -> Result<T, ProvisionError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProvisionError::Cancelled { stage: stage.to_string() }),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::plan::Outcome;
    use crate::engine::testing::{fast_settings, spec_with, FakeIdentity, FakeService, RecordingReporter};
    use crate::identity::roles::{AccountRole, OperatorRole};
    use crate::identity::ResourceKind;
    use crate::ocm::{ClusterState, ServiceError};
    use crate::utils::TokioClock;
    use std::time::Duration;

    const SCENARIO_OPERATORS: [OperatorRole; 3] = [
        OperatorRole::Ingress,
        OperatorRole::ImageRegistry,
        OperatorRole::EbsCsi,
    ];

    fn scenario_spec() -> ClusterSpec {
        spec_with(&[AccountRole::Installer], &SCENARIO_OPERATORS)
    }

    struct Harness {
        identity: Arc<FakeIdentity>,
        service: Arc<FakeService>,
        reporter: Arc<RecordingReporter>,
        orchestrator: Orchestrator,
    }

    fn harness(service: FakeService, max_parallel: usize) -> Harness {
        let identity = Arc::new(FakeIdentity::new());
        let service = Arc::new(service);
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = Orchestrator::new(
            identity.clone(),
            service.clone(),
            Arc::new(TokioClock),
            reporter.clone(),
            fast_settings(max_parallel),
            ServiceLimits::default(),
        );
        Harness {
            identity,
            service,
            reporter,
            orchestrator,
        }
    }

    fn states(reporter: &RecordingReporter) -> Vec<RunState> {
        reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_state_machine_is_forward_only() {
        use RunState::*;
        assert!(Planning.can_transition(Provisioning));
        assert!(Verifying.can_transition(Done));
        assert!(!Provisioning.can_transition(Planning));
        assert!(!Planning.can_transition(Submitting));
        assert!(!Done.can_transition(RollingBack));
        assert!(!RollingBack.can_transition(Done));
        for state in [Planning, Provisioning, Submitting, Converging, Verifying] {
            assert!(state.can_transition(RollingBack));
        }
        assert!(RollingBack.can_transition(Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_cluster_reaches_done() {
        let h = harness(
            FakeService::new().with_statuses(
                vec![Ok(ClusterState::Waiting), Ok(ClusterState::Installing)],
                ClusterState::Ready,
            ),
            1,
        );
        let spec = scenario_spec();

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        let RunOutcome::Done { cluster, resources } = outcome else {
            panic!("expected Done, got {outcome:?}");
        };
        assert_eq!(cluster.id, "cluster-1");
        assert_eq!(resources.len(), 5);
        assert!(resources.iter().all(|r| r.owned));

        let kinds: Vec<ResourceKind> = h.identity.created().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::OidcProvider,
                ResourceKind::AccountRole,
                ResourceKind::OperatorRole,
                ResourceKind::OperatorRole,
                ResourceKind::OperatorRole,
            ]
        );
        assert_eq!(h.service.submitted().len(), 1);
        assert_eq!(
            states(&h.reporter),
            vec![
                RunState::Provisioning,
                RunState::Submitting,
                RunState::Converging,
                RunState::Verifying,
                RunState::Done,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_conflict_rolls_back_everything() {
        let service = FakeService::new();
        service.fail_submit(ServiceError::Conflict("cluster name already in use".to_string()));
        let h = harness(service, 1);
        let spec = scenario_spec();

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        let created: Vec<String> = h.identity.created().into_iter().map(|(_, n)| n).collect();
        let deleted: Vec<String> = h.identity.deleted().into_iter().map(|(_, n)| n).collect();
        let mut reversed = created.clone();
        reversed.reverse();
        assert_eq!(deleted, reversed);

        let kinds: Vec<ResourceKind> = h.identity.deleted().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::OperatorRole,
                ResourceKind::OperatorRole,
                ResourceKind::OperatorRole,
                ResourceKind::AccountRole,
                ResourceKind::OidcProvider,
            ]
        );

        match &outcome {
            RunOutcome::Failed {
                error,
                failed_in,
                rollback,
            } => {
                assert!(matches!(error, ProvisionError::Conflict(_)));
                assert_eq!(*failed_in, RunState::Submitting);
                assert!(rollback.failed.is_empty());
                assert!(rollback.is_complete());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(outcome.rollback_error().is_none());
        assert_eq!(states(&h.reporter).last(), Some(&RunState::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_resources_go_straight_to_submit() {
        let h = harness(FakeService::new(), 4);
        let spec = scenario_spec();
        h.identity.seed_all(&spec);

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        assert!(outcome.is_done());
        assert_eq!(h.identity.calls().creates, 0);
        assert_eq!(h.identity.calls().updates, 0);
        assert_eq!(h.identity.calls().deletes, 0);
        assert_eq!(h.service.submitted().len(), 1);

        let reused = h
            .reporter
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    RunEvent::ResourceResolved {
                        outcome: Outcome::Reused,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(reused, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cluster_failure_rolls_back() {
        let h = harness(
            FakeService::new().with_statuses(
                vec![Ok(ClusterState::Installing), Ok(ClusterState::Installing)],
                ClusterState::Error,
            ),
            2,
        );
        let spec = scenario_spec();

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        match outcome {
            RunOutcome::Failed {
                error, rollback, ..
            } => {
                assert!(matches!(error, ProvisionError::ConvergenceFailure { .. }));
                assert_eq!(rollback.deleted.len(), 5);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(h.service.status_calls(), 4);
        assert_eq!(h.service.deletes(), vec!["cluster-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_never_reaches_done() {
        let h = harness(
            FakeService::new().with_statuses(vec![], ClusterState::Installing),
            1,
        );
        let spec = scenario_spec();

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        match outcome {
            RunOutcome::Failed {
                error, failed_in, ..
            } => {
                assert!(matches!(error, ProvisionError::ConvergenceTimeout { .. }));
                assert_eq!(failed_in, RunState::Converging);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        let states = states(&h.reporter);
        assert!(states.contains(&RunState::RollingBack));
        assert!(!states.contains(&RunState::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_mismatch_fails_in_planning() {
        let h = harness(FakeService::new(), 1);
        let spec = scenario_spec();
        h.identity.seed(
            ResourceKind::AccountRole,
            &crate::identity::roles::account_role_name(
                &spec.identity.account_role_prefix,
                AccountRole::Installer,
            ),
            Some("4.11"),
        );

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        match outcome {
            RunOutcome::Failed {
                error,
                failed_in,
                rollback,
            } => {
                assert!(matches!(error, ProvisionError::Conflict(_)));
                assert_eq!(failed_in, RunState::Planning);
                assert!(rollback.deleted.is_empty());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(h.identity.calls().creates, 0);
        assert_eq!(h.identity.calls().updates, 0);
        assert!(h.service.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_spec_has_no_side_effects() {
        let h = harness(FakeService::new(), 1);
        let mut spec = scenario_spec();
        spec.region = "nowhere-1".to_string();

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                error: ProvisionError::Validation(_),
                ..
            }
        ));
        assert_eq!(h.identity.calls().finds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rollback_is_reported() {
        let service = FakeService::new();
        service.fail_submit(ServiceError::Rejected {
            status: 400,
            message: "invalid network".to_string(),
        });
        let h = harness(service, 1);
        let spec = scenario_spec();
        h.identity.fail_delete_of(&crate::identity::roles::account_role_name(
            &spec.identity.account_role_prefix,
            AccountRole::Installer,
        ));

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        match outcome.rollback_error() {
            Some(ProvisionError::RollbackIncomplete(leftovers)) => {
                assert_eq!(
                    leftovers,
                    vec!["arn:aws:iam::123456789012:role/ManagedOpenShift-Installer-Role".to_string()]
                );
            }
            other => panic!("expected RollbackIncomplete, got {other:?}"),
        }
        assert_eq!(h.identity.calls().deletes, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_while_converging() {
        let h = harness(
            FakeService::new().with_statuses(vec![], ClusterState::Installing),
            1,
        );
        let spec = scenario_spec();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(120)).await;
            trigger.cancel();
        });

        let outcome = h.orchestrator.run(&spec, cancel).await;

        match outcome {
            RunOutcome::Failed {
                error, rollback, ..
            } => {
                assert!(matches!(error, ProvisionError::Cancelled { .. }));
                assert!(rollback.is_complete());
                assert_eq!(rollback.deleted.len(), 5);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(h.service.deletes(), vec!["cluster-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_between_depths_rolls_back_created() {
        let h = harness(FakeService::new(), 1);
        let spec = scenario_spec();
        let cancel = CancellationToken::new();
        h.identity.cancel_after_creates(1, cancel.clone());

        let outcome = h.orchestrator.run(&spec, cancel).await;

        match outcome {
            RunOutcome::Failed {
                error,
                failed_in,
                rollback,
            } => {
                assert!(matches!(error, ProvisionError::Cancelled { .. }));
                assert_eq!(failed_in, RunState::Provisioning);
                assert!(rollback.is_complete());
                assert_eq!(rollback.deleted.len(), 1);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        let kinds: Vec<ResourceKind> = h.identity.deleted().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![ResourceKind::OidcProvider]);
        assert_eq!(h.identity.calls().creates, 1);
        assert!(h.service.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_backend_fails_planning() {
        let h = harness(FakeService::new(), 2);
        let spec = scenario_spec();
        h.identity.fail_finds_transiently(u32::MAX);

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        match outcome {
            RunOutcome::Failed {
                error,
                failed_in,
                rollback,
            } => {
                assert!(matches!(error, ProvisionError::PartialPlan { .. }));
                assert_eq!(failed_in, RunState::Planning);
                assert!(rollback.deleted.is_empty());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(h.identity.calls().creates, 0);
        assert!(h.service.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_operator_roles_fail_before_creating() {
        let h = harness(FakeService::new(), 2);
        let spec = spec_with(
            &[AccountRole::Installer],
            &[OperatorRole::Ingress, OperatorRole::Ingress],
        );

        let outcome = h.orchestrator.run(&spec, CancellationToken::new()).await;

        match outcome {
            RunOutcome::Failed {
                error, failed_in, ..
            } => {
                assert!(matches!(error, ProvisionError::Validation(_)));
                assert_eq!(failed_in, RunState::Planning);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(h.identity.calls().finds, 0);
        assert_eq!(h.identity.calls().creates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_validates_before_touching_anything() {
        let h = harness(FakeService::new(), 1);
        let mut spec = scenario_spec();
        spec.identity.operator_role_prefix = Some("€".repeat(22));

        let result = h
            .orchestrator
            .destroy(&spec, TeardownOptions::default(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ProvisionError::Validation(_))));
        assert_eq!(h.identity.calls().finds, 0);
        assert!(h.service.deletes().is_empty());
    }
}
