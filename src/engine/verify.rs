/// Post-create checks against the cluster the service reports as ready
use tracing::{debug, info};

use crate::config::ClusterSpec;
use crate::error::ProvisionError;
use crate::ocm::{ClusterRecord, ClusterService, ServiceError};
use crate::utils::{retry_with_backoff, RetryConfig};

pub struct Verifier<'a> {
    service: &'a dyn ClusterService,
    retry: RetryConfig,
}

impl<'a> Verifier<'a> {
    pub fn new(service: &'a dyn ClusterService, retry: RetryConfig) -> Self {
        Self { service, retry }
    }

    /// Confirm the cluster is ready, sized as asked, and its API answers
    pub async fn verify(
        &self,
        spec: &ClusterSpec,
        cluster_id: &str,
    ) -> Result<ClusterRecord, ProvisionError> {
        let record = retry_with_backoff(
            &self.retry,
            "get cluster",
            || self.service.get_cluster(cluster_id),
            ServiceError::is_transient,
        )
        .await
        .map_err(|e| ProvisionError::PollFailure {
            cluster_id: cluster_id.to_string(),
            source: e,
        })?;

        let mut failures = Vec::new();

        if !record.state.is_ready() {
            failures.push(format!("state is {}, expected ready", record.state));
        }

        let expected = spec.expected_compute_nodes();
        match (record.compute_nodes, record.autoscale) {
            (_, Some(scaling)) if spec.compute.autoscaling.is_some() => {
                if scaling.min_replicas != *expected.start() || scaling.max_replicas != *expected.end() {
                    failures.push(format!(
                        "autoscaling is {}-{}, expected {}-{}",
                        scaling.min_replicas,
                        scaling.max_replicas,
                        expected.start(),
                        expected.end()
                    ));
                }
            }
            (Some(nodes), _) => {
                if !expected.contains(&nodes) {
                    failures.push(format!(
                        "{} compute nodes, expected {}-{}",
                        nodes,
                        expected.start(),
                        expected.end()
                    ));
                }
            }
            (None, _) => failures.push("compute node count not reported".to_string()),
        }

        match &record.api_url {
            Some(api_url) => {
                let reachable = retry_with_backoff(
                    &self.retry,
                    "probe cluster API",
                    || async move {
                        match self.service.probe_api(api_url).await? {
                            true => Ok(()),
                            false => Err(ServiceError::Transient(format!("{} did not answer", api_url))),
                        }
                    },
                    ServiceError::is_transient,
                )
                .await;
                if let Err(e) = reachable {
                    failures.push(format!("API endpoint unreachable: {}", e));
                }
            }
            None => failures.push("no API URL reported".to_string()),
        }

        if !failures.is_empty() {
            debug!(cluster_id = %cluster_id, ?failures, "verification failed");
            return Err(ProvisionError::Verification {
                cluster_id: cluster_id.to_string(),
                failures,
            });
        }

        info!(
            cluster_id = %cluster_id,
            api_url = record.api_url.as_deref().unwrap_or("-"),
            "cluster verified"
        );
        Ok(record)
    }
}
