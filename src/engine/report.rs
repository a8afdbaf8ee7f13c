/// Events the engine emits for the presentation layer
use super::plan::{Outcome, PlanStatus};
use super::RunState;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The run moved from one state to the next
    StateChanged { from: RunState, to: RunState },

    /// Inspector verdict for one resource
    Planned {
        logical_name: String,
        status: PlanStatus,
    },

    /// Terminal outcome of one resource in this run
    ResourceResolved {
        logical_name: String,
        arn: Option<String>,
        outcome: Outcome,
    },

    /// The managed service accepted the creation request
    ClusterAccepted { cluster_id: String },

    /// One convergence poll observed a state
    ClusterPolled { cluster_id: String, state: String },

    /// Rollback removed one owned resource
    ResourceDeleted { logical_name: String, arn: String },

    /// Rollback could not remove one owned resource
    ResourceDeleteFailed {
        logical_name: String,
        arn: String,
        error: String,
    },
}

/// Sink for run events. Rendering them is the caller's business.
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl RunReporter for NoopReporter {
    fn report(&self, _event: RunEvent) {}
}
