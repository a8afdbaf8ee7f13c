/// Convergence polling against the managed cluster service
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::report::{RunEvent, RunReporter};
use crate::config::PollSettings;
use crate::error::ProvisionError;
use crate::ocm::{ClusterService, ClusterStatus, ServiceError};
use crate::utils::{Clock, PollResult};

pub struct ConvergencePoller<'a> {
    service: &'a dyn ClusterService,
    clock: &'a dyn Clock,
    reporter: &'a dyn RunReporter,
    settings: &'a PollSettings,
}

impl<'a> ConvergencePoller<'a> {
    pub fn new(
        service: &'a dyn ClusterService,
        clock: &'a dyn Clock,
        reporter: &'a dyn RunReporter,
        settings: &'a PollSettings,
    ) -> Self {
        Self {
            service,
            clock,
            reporter,
            settings,
        }
    }

    /// Block until the cluster is ready, has failed, or the deadline passes
    ///
    /// NotFound right after submission is treated like any other transient
    /// error: tolerated up to `max_transient_errors` consecutive times.
    pub async fn wait_ready(
        &self,
        cluster_id: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<ClusterStatus, ProvisionError> {
        let polling = self
            .settings
            .polling(deadline, format!("Waiting for cluster {} to become ready", cluster_id));
        let errors = AtomicU32::new(0);
        let errors = &errors;
        let service = self.service;
        let reporter = self.reporter;
        let max_errors = self.settings.max_transient_errors;

        let poll = polling.poll(self.clock, move || async move {
            match service.get_status(cluster_id).await {
                Ok(status) => {
                    errors.store(0, Ordering::SeqCst);
                    debug!(cluster_id = %cluster_id, state = %status.state, "polled");
                    reporter.report(RunEvent::ClusterPolled {
                        cluster_id: cluster_id.to_string(),
                        state: status.state.to_string(),
                    });
                    if status.state.is_ready() {
                        Ok(Some(status))
                    } else if status.state.is_failed() {
                        Err(ProvisionError::ConvergenceFailure {
                            cluster_id: cluster_id.to_string(),
                            reason: status.reason(),
                        })
                    } else {
                        Ok(None)
                    }
                }
                Err(e) if e.is_transient() || e.is_not_found() => {
                    tolerate(cluster_id, e, errors, max_errors).map(|()| None)
                }
                Err(e) => Err(ProvisionError::PollFailure {
                    cluster_id: cluster_id.to_string(),
                    source: e,
                }),
            }
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProvisionError::Cancelled { stage: "converging".to_string() });
            }
            result = poll => result?,
        };

        match result {
            PollResult::Done(status) => Ok(status),
            PollResult::TimedOut { elapsed, attempts } => {
                warn!(cluster_id = %cluster_id, attempts, "cluster not ready before deadline");
                Err(ProvisionError::ConvergenceTimeout {
                    cluster_id: cluster_id.to_string(),
                    waited: elapsed,
                })
            }
        }
    }

    /// Block until the service no longer knows the cluster
    pub async fn wait_gone(
        &self,
        cluster_id: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        let polling = self
            .settings
            .polling(deadline, format!("Waiting for cluster {} to be deleted", cluster_id));
        let errors = AtomicU32::new(0);
        let errors = &errors;
        let service = self.service;
        let reporter = self.reporter;
        let max_errors = self.settings.max_transient_errors;

        let poll = polling.poll(self.clock, move || async move {
            match service.get_status(cluster_id).await {
                Err(e) if e.is_not_found() => Ok(Some(())),
                Ok(status) => {
                    errors.store(0, Ordering::SeqCst);
                    reporter.report(RunEvent::ClusterPolled {
                        cluster_id: cluster_id.to_string(),
                        state: status.state.to_string(),
                    });
                    Ok(None)
                }
                Err(e) if e.is_transient() => tolerate(cluster_id, e, errors, max_errors).map(|()| None),
                Err(e) => Err(ProvisionError::PollFailure {
                    cluster_id: cluster_id.to_string(),
                    source: e,
                }),
            }
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProvisionError::Cancelled { stage: "cluster deletion".to_string() });
            }
            result = poll => result?,
        };

        match result {
            PollResult::Done(()) => Ok(()),
            PollResult::TimedOut { elapsed, .. } => Err(ProvisionError::ConvergenceTimeout {
                cluster_id: cluster_id.to_string(),
                waited: elapsed,
            }),
        }
    }
}

/// Count one transient error; fail once more than `max` happen in a row
fn tolerate(
    cluster_id: &str,
    err: ServiceError,
    errors: &AtomicU32,
    max: u32,
) -> Result<(), ProvisionError> {
    let seen = errors.fetch_add(1, Ordering::SeqCst) + 1;
    if seen > max {
        return Err(ProvisionError::PollFailure {
            cluster_id: cluster_id.to_string(),
            source: err,
        });
    }
    warn!(cluster_id = %cluster_id, error = %err, seen, max, "transient poll error");
    Ok(())
}
