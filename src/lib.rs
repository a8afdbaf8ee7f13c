//! rosa-provisioner: provisioning and identity-role orchestration for managed
//! OpenShift clusters on AWS using short-lived delegated credentials.
//!
//! The engine ([`engine::Orchestrator`]) consumes two capability traits,
//! [`identity::IdentityBackend`] and [`ocm::ClusterService`], and reports
//! progress through [`engine::RunReporter`]. Concrete AWS and OCM
//! implementations live beside the traits; the binary wires them together.
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ocm;
pub mod utils;

pub use error::{ProvisionError, Violation};
