/// Resource plan: what must exist, what already does, and what became of it
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::ClusterSpec;
use crate::identity::roles::{self, AccountRole, OperatorRole};
use crate::identity::{ResourceDescriptor, ResourceKind};

/// Which concrete resource a plan entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "role")]
pub enum RoleRef {
    Oidc,
    Account(AccountRole),
    Operator(OperatorRole),
}

/// One identity resource the cluster needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredResource {
    /// Stable key, e.g. `account-role/installer`
    pub logical_name: String,
    pub kind: ResourceKind,
    /// Deterministic backend name
    pub name: String,
    pub role: RoleRef,
}

pub const OIDC_LOGICAL_NAME: &str = "oidc-provider";

pub fn account_logical_name(role: AccountRole) -> String {
    format!("account-role/{}", role.key())
}

pub fn operator_logical_name(role: OperatorRole) -> String {
    format!("operator-role/{}", role.key())
}

/// Every identity resource a ClusterSpec requires, in dependency order
///
/// Direct mode needs none. Operator roles are only required when there is an
/// OIDC issuer for them to federate with.
pub fn required_resources(spec: &ClusterSpec) -> Vec<RequiredResource> {
    if !spec.is_delegated() {
        return Vec::new();
    }

    let mut required = Vec::new();

    if let Some(oidc) = &spec.identity.oidc {
        required.push(RequiredResource {
            logical_name: OIDC_LOGICAL_NAME.to_string(),
            kind: ResourceKind::OidcProvider,
            name: roles::oidc_provider_name(&oidc.issuer_url),
            role: RoleRef::Oidc,
        });
    }

    for &role in &spec.identity.account_roles {
        required.push(RequiredResource {
            logical_name: account_logical_name(role),
            kind: ResourceKind::AccountRole,
            name: roles::account_role_name(&spec.identity.account_role_prefix, role),
            role: RoleRef::Account(role),
        });
    }

    if spec.identity.oidc.is_some() {
        for &role in &spec.identity.operator_roles {
            required.push(RequiredResource {
                logical_name: operator_logical_name(role),
                kind: ResourceKind::OperatorRole,
                name: roles::operator_role_name(spec.operator_role_prefix(), role),
                role: RoleRef::Operator(role),
            });
        }
    }

    required
}

/// What the inspector found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Existing,
    ToCreate,
    VersionMismatch,
}

/// Terminal outcome of an entry within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Reused,
    Failed,
}

impl Outcome {
    /// Whether the resource is usable by the cluster
    pub fn is_resolved(self) -> bool {
        matches!(self, Outcome::Created | Outcome::Reused)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub resource: RequiredResource,
    pub status: PlanStatus,
    /// Descriptor of the resource found in the cloud, if any
    pub existing: Option<ResourceDescriptor>,
    /// Version demanded by the cluster, for versioned kinds
    pub wanted_version: Option<String>,
    pub outcome: Option<Outcome>,
}

impl PlanEntry {
    pub fn logical_name(&self) -> &str {
        &self.resource.logical_name
    }

    pub fn found_version(&self) -> Option<&str> {
        self.existing.as_ref().and_then(|d| d.version())
    }
}

/// Inspector output. Statuses are fixed once built; only outcomes change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourcePlan {
    entries: Vec<PlanEntry>,
}

impl ResourcePlan {
    pub fn new(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, logical_name: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.logical_name() == logical_name)
    }

    pub fn with_status(&self, status: PlanStatus) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }

    pub fn mismatched(&self) -> Vec<&PlanEntry> {
        self.with_status(PlanStatus::VersionMismatch).collect()
    }

    /// Record the terminal outcome of an entry. The first outcome wins.
    pub fn record_outcome(&mut self, logical_name: &str, outcome: Outcome) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.resource.logical_name == logical_name)
        {
            if entry.outcome.is_none() {
                entry.outcome = Some(outcome);
            }
        }
    }

    /// Entries not (yet) Created or Reused
    pub fn unresolved(&self) -> Vec<&PlanEntry> {
        self.entries
            .iter()
            .filter(|e| !e.outcome.is_some_and(Outcome::is_resolved))
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.unresolved().is_empty()
    }

    /// Counts per status, for reporting
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            let key = match entry.status {
                PlanStatus::Existing => "existing",
                PlanStatus::ToCreate => "to_create",
                PlanStatus::VersionMismatch => "version_mismatch",
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

/// An identity resource realized for this run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionedResource {
    pub logical_name: String,
    pub kind: ResourceKind,
    pub name: String,
    pub arn: String,
    pub created_at: DateTime<Utc>,
    /// Created by this run. Rollback only ever deletes owned resources.
    pub owned: bool,
}

impl ProvisionedResource {
    pub fn created(resource: &RequiredResource, descriptor: &ResourceDescriptor) -> Self {
        Self {
            logical_name: resource.logical_name.clone(),
            kind: resource.kind,
            name: descriptor.name.clone(),
            arn: descriptor.arn.clone(),
            created_at: descriptor.created_at.unwrap_or_else(Utc::now),
            owned: true,
        }
    }

    pub fn reused(resource: &RequiredResource, descriptor: &ResourceDescriptor) -> Self {
        Self {
            owned: false,
            created_at: descriptor.created_at.unwrap_or_else(Utc::now),
            ..Self::created(resource, descriptor)
        }
    }

    /// Descriptor handed back to the backend for deletion
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            kind: self.kind,
            name: self.name.clone(),
            arn: self.arn.clone(),
            tags: BTreeMap::new(),
            created_at: Some(self.created_at),
        }
    }
}
