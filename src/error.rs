use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::ocm::ServiceError;

/// One failed validation rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors surfaced by the provisioning engine
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid cluster configuration: {}", join(.0, "; "))]
    Validation(Vec<Violation>),

    #[error("could not inspect {resource}: {source}")]
    PartialPlan {
        resource: String,
        #[source]
        source: IdentityError,
    },

    #[error("backend unavailable: {0}")]
    TransientBackend(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cluster {cluster_id} did not become ready within {}s", .waited.as_secs())]
    ConvergenceTimeout { cluster_id: String, waited: Duration },

    #[error("cluster {cluster_id} failed: {reason}")]
    ConvergenceFailure { cluster_id: String, reason: String },

    #[error("lost track of cluster {cluster_id}: {source}")]
    PollFailure {
        cluster_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("cluster {cluster_id} failed verification: {}", .failures.join("; "))]
    Verification {
        cluster_id: String,
        failures: Vec<String>,
    },

    #[error("cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("rollback incomplete, manual cleanup required for: {}", .0.join(", "))]
    RollbackIncomplete(Vec<String>),

    #[error("identity backend: {0}")]
    Identity(IdentityError),

    #[error("cluster service: {0}")]
    Service(ServiceError),
}

impl ProvisionError {
    /// Single-violation validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![Violation::new(field, message)])
    }

    /// Lift an identity backend error into the engine taxonomy
    pub fn from_identity(err: IdentityError) -> Self {
        match err {
            IdentityError::Transient(msg) => Self::TransientBackend(msg),
            IdentityError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            IdentityError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Identity(other),
        }
    }

    /// Lift a cluster service error into the engine taxonomy
    pub fn from_service(err: ServiceError) -> Self {
        match err {
            ServiceError::Transient(msg) => Self::TransientBackend(msg),
            ServiceError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            ServiceError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Service(other),
        }
    }

    pub fn is_rollback_incomplete(&self) -> bool {
        matches!(self, Self::RollbackIncomplete(_))
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// Walk the full error chain and join all causes into one string.
///
/// AWS SDK errors often display as a bare "service error" with the useful
/// detail further down the chain.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !msg.ends_with(&cause_msg) {
            msg.push_str(": ");
            msg.push_str(&cause_msg);
        }
        source = cause.source();
    }
    msg
}
