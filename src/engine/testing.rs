//! In-memory identity backend and cluster service for engine tests
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::plan::required_resources;
use super::report::{RunEvent, RunReporter};
use crate::config::{ClusterConfig, ClusterSpec, EngineSettings, PollSettings, RetrySettings};
use crate::identity::roles::{self, AccountRole, OperatorRole};
use crate::identity::{
    IdentityBackend, IdentityError, ResourceDescriptor, ResourceKind, ResourceRequest,
};
use crate::ocm::models::AutoscaleCompute;
use crate::ocm::{ClusterPayload, ClusterRecord, ClusterService, ClusterState, ClusterStatus, ServiceError};
use crate::utils::RetryConfig;

pub const ACCOUNT_ID: &str = "123456789012";

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
    }
}

/// Example ClusterSpec restricted to the given roles
pub fn spec_with(account_roles: &[AccountRole], operator_roles: &[OperatorRole]) -> ClusterSpec {
    let mut spec = ClusterConfig::example().cluster;
    spec.identity.account_roles = account_roles.to_vec();
    spec.identity.operator_roles = operator_roles.to_vec();
    spec
}

/// Engine settings with millisecond retries and a 10 minute poll deadline
pub fn fast_settings(max_parallel: usize) -> EngineSettings {
    let fast = RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
    };
    EngineSettings {
        max_parallel,
        poll: PollSettings {
            deadline_secs: 600,
            teardown_deadline_secs: 600,
            initial_interval_secs: 10,
            max_interval_secs: 60,
            multiplier: 1.5,
            max_transient_errors: 3,
        },
        retry: fast.clone(),
        read_after_write: fast,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub finds: u32,
    pub creates: u32,
    pub updates: u32,
    pub deletes: u32,
}

#[derive(Default)]
struct IdentityState {
    resources: BTreeMap<(ResourceKind, String), ResourceDescriptor>,
    calls: CallCounts,
    created: Vec<(ResourceKind, String)>,
    deleted: Vec<(ResourceKind, String)>,
    transient_finds: u32,
    hide_after_create: u32,
    hidden: HashMap<String, u32>,
    failing_creates: HashSet<String>,
    failing_deletes: HashSet<String>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl RunReporter for RecordingReporter {
    fn report(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Identity backend holding resources in memory
#[derive(Default)]
pub struct FakeIdentity {
    state: Mutex<IdentityState>,
}

fn arn_for(kind: ResourceKind, name: &str) -> String {
    match kind {
        ResourceKind::OidcProvider => format!("arn:aws:iam::{}:oidc-provider/{}", ACCOUNT_ID, name),
        _ => format!("arn:aws:iam::{}:role/{}", ACCOUNT_ID, name),
    }
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing resource, optionally carrying a version tag
    pub fn seed(&self, kind: ResourceKind, name: &str, version: Option<&str>) {
        let mut tags = BTreeMap::new();
        if let Some(version) = version {
            tags.insert(roles::TAG_VERSION.to_string(), version.to_string());
        }
        let descriptor = ResourceDescriptor {
            kind,
            name: name.to_string(),
            arn: arn_for(kind, name),
            tags,
            created_at: None,
        };
        self.state
            .lock()
            .unwrap()
            .resources
            .insert((kind, name.to_string()), descriptor);
    }

    /// Every resource the ClusterSpec requires, at its role version
    pub fn seed_all(&self, spec: &ClusterSpec) {
        let version = spec.role_version();
        for resource in required_resources(spec) {
            let tag = resource.kind.is_versioned().then_some(version.as_str());
            self.seed(resource.kind, &resource.name, tag);
        }
    }

    pub fn fail_finds_transiently(&self, count: u32) {
        self.state.lock().unwrap().transient_finds = count;
    }

    /// Newly created resources stay invisible for this many lookups
    pub fn hide_new_resources(&self, lookups: u32) {
        self.state.lock().unwrap().hide_after_create = lookups;
    }

    pub fn fail_create_of(&self, name: &str) {
        self.state.lock().unwrap().failing_creates.insert(name.to_string());
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.state.lock().unwrap().failing_deletes.insert(name.to_string());
    }

    /// Cancel `token` as soon as `count` resources have been created
    pub fn cancel_after_creates(&self, count: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((count, token));
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn created(&self) -> Vec<(ResourceKind, String)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .resources
            .contains_key(&(kind, name.to_string()))
    }
}

#[async_trait]
impl IdentityBackend for FakeIdentity {
    async fn find_resource(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ResourceDescriptor>, IdentityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.finds += 1;

        if state.transient_finds > 0 {
            state.transient_finds -= 1;
            return Err(IdentityError::Transient("Throttling: rate exceeded".to_string()));
        }

        if let Some(remaining) = state.hidden.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }

        Ok(state.resources.get(&(kind, name.to_string())).cloned())
    }

    async fn create_resource(
        &self,
        request: &ResourceRequest,
    ) -> Result<ResourceDescriptor, IdentityError> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state.calls.creates += 1;

        if state.failing_creates.contains(&request.name) {
            return Err(IdentityError::PermissionDenied(format!(
                "CreateRole {}: not authorized",
                request.name
            )));
        }

        let key = (request.kind, request.name.clone());
        if state.resources.contains_key(&key) {
            return Err(IdentityError::Conflict(format!("{} already exists", request.name)));
        }

        let descriptor = ResourceDescriptor {
            kind: request.kind,
            name: request.name.clone(),
            arn: arn_for(request.kind, &request.name),
            tags: request.tags.clone(),
            created_at: Some(chrono::Utc::now()),
        };
        state.resources.insert(key.clone(), descriptor.clone());
        state.created.push(key);
        if let Some((count, token)) = &state.cancel_after {
            if state.created.len() >= *count {
                token.cancel();
            }
        }
        let hide = state.hide_after_create;
        if hide > 0 {
            state.hidden.insert(request.name.clone(), hide);
        }
        Ok(descriptor)
    }

    async fn update_resource(
        &self,
        current: &ResourceDescriptor,
        request: &ResourceRequest,
    ) -> Result<ResourceDescriptor, IdentityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.updates += 1;

        let key = (current.kind, current.name.clone());
        let stored = state.resources.get_mut(&key).ok_or(IdentityError::NotFound {
            kind: current.kind,
            name: current.name.clone(),
        })?;
        stored.tags.extend(request.tags.clone());
        Ok(stored.clone())
    }

    async fn delete_resource(&self, descriptor: &ResourceDescriptor) -> Result<(), IdentityError> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state.calls.deletes += 1;
        let key = (descriptor.kind, descriptor.name.clone());
        state.deleted.push(key.clone());

        if state.failing_deletes.contains(&descriptor.name) {
            return Err(IdentityError::Conflict(format!(
                "DeleteRole {}: cannot delete entity, must remove policies first",
                descriptor.name
            )));
        }

        match state.resources.remove(&key) {
            Some(_) => Ok(()),
            None => Err(IdentityError::NotFound {
                kind: descriptor.kind,
                name: descriptor.name.clone(),
            }),
        }
    }
}

struct FakeCluster {
    name: String,
    compute_nodes: Option<u32>,
    autoscale: Option<AutoscaleCompute>,
    deleted: bool,
}

struct ServiceState {
    clusters: BTreeMap<String, FakeCluster>,
    submit_error: Option<ServiceError>,
    delete_error: Option<ServiceError>,
    script: VecDeque<Result<ClusterState, ServiceError>>,
    steady: ClusterState,
    gone_after_delete: bool,
    compute_override: Option<u32>,
    api_url: Option<String>,
    probe_ok: bool,
    submitted: Vec<ClusterPayload>,
    deletes: Vec<String>,
    status_calls: u32,
}

/// Cluster service driven by a script of status answers
pub struct FakeService {
    state: Mutex<ServiceState>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeService {
    /// Clusters become ready on the first poll
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                clusters: BTreeMap::new(),
                submit_error: None,
                delete_error: None,
                script: VecDeque::new(),
                steady: ClusterState::Ready,
                gone_after_delete: true,
                compute_override: None,
                api_url: Some("https://api.mycluster.abcd.p1.openshiftapps.com:6443".to_string()),
                probe_ok: true,
                submitted: Vec::new(),
                deletes: Vec::new(),
                status_calls: 0,
            }),
        }
    }

    /// Answers for successive `get_status` calls; `steady` follows once exhausted
    pub fn with_statuses(self, script: Vec<Result<ClusterState, ServiceError>>, steady: ClusterState) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.script = script.into();
            state.steady = steady;
        }
        self
    }

    pub fn fail_submit(&self, err: ServiceError) {
        self.state.lock().unwrap().submit_error = Some(err);
    }

    pub fn fail_delete(&self, err: ServiceError) {
        self.state.lock().unwrap().delete_error = Some(err);
    }

    /// Deleted clusters keep answering with the steady state instead of disappearing
    pub fn never_disappear(&self) {
        self.state.lock().unwrap().gone_after_delete = false;
    }

    pub fn report_compute_nodes(&self, nodes: u32) {
        self.state.lock().unwrap().compute_override = Some(nodes);
    }

    pub fn set_probe(&self, reachable: bool) {
        self.state.lock().unwrap().probe_ok = reachable;
    }

    /// An already existing cluster, as seen by `find_cluster`
    pub fn seed_cluster(&self, id: &str, name: &str) {
        self.state.lock().unwrap().clusters.insert(
            id.to_string(),
            FakeCluster {
                name: name.to_string(),
                compute_nodes: Some(3),
                autoscale: None,
                deleted: false,
            },
        );
    }

    pub fn submitted(&self) -> Vec<ClusterPayload> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }
}

fn record(id: &str, cluster: &FakeCluster, state: &ServiceState) -> ClusterRecord {
    ClusterRecord {
        id: id.to_string(),
        name: cluster.name.clone(),
        state: state.steady,
        api_url: state.api_url.clone(),
        console_url: None,
        compute_nodes: state.compute_override.or(cluster.compute_nodes),
        autoscale: cluster.autoscale,
    }
}

#[async_trait]
impl ClusterService for FakeService {
    async fn submit_create(&self, payload: &ClusterPayload) -> Result<String, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(payload.clone());
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }
        let id = format!("cluster-{}", state.submitted.len());
        state.clusters.insert(
            id.clone(),
            FakeCluster {
                name: payload.name.clone(),
                compute_nodes: payload.nodes.compute,
                autoscale: payload.nodes.autoscale_compute,
                deleted: false,
            },
        );
        Ok(id)
    }

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterStatus, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;

        let gone = state.gone_after_delete
            && state.clusters.get(cluster_id).map_or(true, |c| c.deleted);
        if gone {
            return Err(ServiceError::NotFound(format!("cluster {} not found", cluster_id)));
        }

        match state.script.pop_front() {
            Some(Ok(cluster_state)) => Ok(ClusterStatus::new(cluster_state)),
            Some(Err(e)) => Err(e),
            None => Ok(ClusterStatus::new(state.steady)),
        }
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterRecord, ServiceError> {
        let state = self.state.lock().unwrap();
        match state.clusters.get(cluster_id) {
            Some(cluster) if !cluster.deleted => Ok(record(cluster_id, cluster, &state)),
            _ => Err(ServiceError::NotFound(format!("cluster {} not found", cluster_id))),
        }
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterRecord>, ServiceError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .clusters
            .iter()
            .find(|(_, c)| c.name == name && !c.deleted)
            .map(|(id, c)| record(id, c, &state)))
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(cluster_id.to_string());
        if let Some(err) = state.delete_error.clone() {
            return Err(err);
        }
        match state.clusters.get_mut(cluster_id) {
            Some(cluster) => {
                cluster.deleted = true;
                Ok(())
            }
            None => Err(ServiceError::NotFound(format!("cluster {} not found", cluster_id))),
        }
    }

    async fn probe_api(&self, _api_url: &str) -> Result<bool, ServiceError> {
        Ok(self.state.lock().unwrap().probe_ok)
    }
}
