/// Configuration management for rosa-provisioner
pub mod cluster;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::{PollingConfig, RetryConfig};

pub use cluster::{
    Autoscaling, ClusterSpec, ComputeSpec, FeatureToggles, IdentitySpec, NetworkMode,
    NetworkSpec, OidcSpec, SecurityMode,
};

/// Main configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// The cluster to provision
    pub cluster: ClusterSpec,

    /// AWS credentials selection
    #[serde(default)]
    pub aws: AwsConfig,

    /// OpenShift Cluster Manager API
    #[serde(default)]
    pub ocm: OcmConfig,

    /// Service envelope used to validate requests before submission
    #[serde(default)]
    pub limits: ServiceLimits,

    /// Engine tunables: polling, retries, parallelism
    #[serde(default)]
    pub engine: EngineSettings,
}

/// AWS credentials selection (the default provider chain is always used)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Named profile from ~/.aws/config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// OpenShift Cluster Manager connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcmConfig {
    #[serde(default = "default_ocm_url")]
    pub url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Offline token (can also be set via OCM_TOKEN env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for OcmConfig {
    fn default() -> Self {
        Self {
            url: default_ocm_url(),
            token_url: default_token_url(),
            token: None,
        }
    }
}

/// Allowed sizing envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLimits {
    #[serde(default = "default_regions")]
    pub supported_regions: Vec<String>,

    #[serde(default = "default_instance_types")]
    pub instance_types: Vec<String>,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            supported_regions: default_regions(),
            instance_types: default_instance_types(),
            max_replicas: default_max_replicas(),
        }
    }
}

/// Engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Worker pool size for same-depth creations and deletions
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default)]
    pub poll: PollSettings,

    /// Retries for transient backend errors
    #[serde(default)]
    pub retry: RetrySettings,

    /// Retries for "not found" right after creation
    #[serde(default = "default_read_after_write")]
    pub read_after_write: RetrySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            poll: PollSettings::default(),
            retry: RetrySettings::default(),
            read_after_write: default_read_after_write(),
        }
    }
}

/// Convergence polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Deadline for a new cluster to become ready
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Deadline for a deleted cluster to disappear
    #[serde(default = "default_teardown_deadline_secs")]
    pub teardown_deadline_secs: u64,

    #[serde(default = "default_initial_interval_secs")]
    pub initial_interval_secs: u64,

    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive transient status errors tolerated before giving up
    #[serde(default = "default_max_transient_errors")]
    pub max_transient_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            teardown_deadline_secs: default_teardown_deadline_secs(),
            initial_interval_secs: default_initial_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            multiplier: default_multiplier(),
            max_transient_errors: default_max_transient_errors(),
        }
    }
}

impl PollSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn teardown_deadline(&self) -> Duration {
        Duration::from_secs(self.teardown_deadline_secs)
    }

    /// Polling loop with the configured backoff and the given deadline
    pub fn polling(&self, deadline: Duration, description: impl Into<String>) -> PollingConfig {
        PollingConfig::new(
            deadline,
            Duration::from_secs(self.initial_interval_secs),
            description,
        )
        .with_backoff(self.multiplier, Duration::from_secs(self.max_interval_secs))
    }
}

/// Bounded retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: 2.0,
        }
    }
}

fn default_ocm_url() -> String {
    "https://api.openshift.com".to_string()
}

fn default_token_url() -> String {
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token".to_string()
}

fn default_regions() -> Vec<String> {
    [
        "us-east-1",
        "us-east-2",
        "us-west-2",
        "ca-central-1",
        "eu-west-1",
        "eu-central-1",
        "ap-southeast-1",
        "ap-northeast-1",
    ]
    .iter()
    .map(|r| r.to_string())
    .collect()
}

fn default_instance_types() -> Vec<String> {
    [
        "m5.xlarge",
        "m5.2xlarge",
        "m5.4xlarge",
        "m6i.xlarge",
        "m6i.2xlarge",
        "r5.xlarge",
        "r5.2xlarge",
        "c5.2xlarge",
        "c5.4xlarge",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_max_replicas() -> u32 {
    180
}

fn default_max_parallel() -> usize {
    4
}

fn default_deadline_secs() -> u64 {
    60 * 60
}

fn default_teardown_deadline_secs() -> u64 {
    45 * 60
}

fn default_initial_interval_secs() -> u64 {
    10
}

fn default_max_interval_secs() -> u64 {
    60
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_transient_errors() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_read_after_write() -> RetrySettings {
    RetrySettings {
        max_attempts: 10,
        initial_delay_ms: 1_000,
        max_delay_ms: 5_000,
    }
}

impl ClusterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClusterConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the parts of the configuration the engine cannot run without
    ///
    /// Cross-field cluster constraints are checked by the request builder,
    /// which reports every violation at once.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster.name.is_empty() {
            anyhow::bail!("cluster.name cannot be empty");
        }

        if let Some(oidc) = &self.cluster.identity.oidc {
            let url = url::Url::parse(&oidc.issuer_url)
                .map_err(|e| anyhow::anyhow!("Invalid OIDC issuer URL {}: {}", oidc.issuer_url, e))?;
            if url.scheme() != "https" {
                anyhow::bail!("OIDC issuer URL must use https: {}", oidc.issuer_url);
            }
        }

        if self.engine.max_parallel == 0 {
            anyhow::bail!("engine.max_parallel must be at least 1");
        }

        if self.engine.poll.deadline_secs == 0 || self.engine.poll.teardown_deadline_secs == 0 {
            anyhow::bail!("engine.poll deadlines must be greater than zero");
        }

        Ok(())
    }

    /// Get the OCM offline token from config or environment
    pub fn get_ocm_token(&self) -> anyhow::Result<String> {
        self.ocm
            .token
            .clone()
            .or_else(|| std::env::var("OCM_TOKEN").ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "OCM token not found. Set OCM_TOKEN environment variable or specify ocm.token in config"
                )
            })
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            cluster: ClusterSpec {
                name: "mycluster".to_string(),
                region: "us-east-1".to_string(),
                version: "4.14.3".to_string(),
                security_mode: SecurityMode::Delegated,
                aws_account_id: None,
                network: NetworkSpec::default(),
                compute: ComputeSpec {
                    instance_type: "m5.xlarge".to_string(),
                    replicas: 3,
                    autoscaling: None,
                },
                features: FeatureToggles {
                    multi_az: true,
                    ..Default::default()
                },
                identity: IdentitySpec {
                    oidc: Some(OidcSpec {
                        issuer_url: "https://oidc.op1.openshiftapps.com/REPLACE-WITH-OIDC-CONFIG-ID"
                            .to_string(),
                        thumbprint: "917e732d330f9a12404f73d8bea36948b929dffc".to_string(),
                        client_ids: vec!["openshift".to_string(), "sts.amazonaws.com".to_string()],
                    }),
                    ..Default::default()
                },
            },
            aws: AwsConfig::default(),
            ocm: OcmConfig::default(),
            limits: ServiceLimits::default(),
            engine: EngineSettings::default(),
        }
    }
}
