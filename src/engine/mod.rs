//! Provisioning engine: planning, ordered creation, submission, convergence,
//! verification and rollback of one cluster run.
pub mod inspector;
pub mod orchestrator;
pub mod plan;
pub mod poller;
pub mod provisioner;
pub mod report;
pub mod request;
pub mod rollback;
pub mod teardown;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{Orchestrator, ProvisioningRun, RunOutcome, RunState};
pub use plan::{Outcome, PlanStatus, ProvisionedResource, ResourcePlan};
pub use report::{NoopReporter, RunEvent, RunReporter};
pub use rollback::{ClusterDeletion, RollbackReport};
pub use teardown::{TeardownOptions, TeardownReport};
