//! In-memory stand-ins for the cluster, DNS and database collaborators.
//! Each fake keeps a journal of calls and supports failure injection so tests can
//! assert exact step ordering and partial-failure behaviour without a live cluster.
use std::{collections::{BTreeMap, HashSet}, sync::{Arc, Mutex, MutexGuard}};
use async_trait::async_trait;
use crate::{
    db::DatabaseProvisioner,
    dns::{DnsRecord, DnsUpdater},
    error::{ProvisionError, ProvisionResult},
    k8s::{ClusterGateway, NamespaceCreation},
    models::{NamespaceInfo, Role, RouteSet, RouteSpec, ServiceSpec, WorkloadSpec},
    orchestrator::{OrchestratorOptions, TenantOrchestrator},
    registry::InMemoryRegistry,
    resources::{BuilderConfig, ResourceKind, SpecBuilder},
    AppState,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|e| e.into_inner()) }

#[derive(Debug, Default)]
struct ClusterState {
    namespaces: BTreeMap<String, NamespaceInfo>,
    applied: BTreeMap<String, Vec<ResourceKind>>,
    workloads: BTreeMap<(String, String), WorkloadSpec>,
    services: BTreeMap<(String, String), ServiceSpec>,
    routes: BTreeMap<String, Vec<RouteSpec>>,
    fail_on: Option<ResourceKind>,
    unavailable: bool,
    race_on_create: HashSet<String>,
    calls: Vec<String>,
}

/// Fake control plane. Deleting a namespace cascades to everything inside it.
#[derive(Debug, Default)]
pub struct FakeCluster { state: Mutex<ClusterState> }

impl FakeCluster {
    pub fn new() -> Self { Self::default() }

    /// Make the next applies of `kind` fail with a resource apply error.
    pub fn fail_apply(&self, kind: ResourceKind) { lock(&self.state).fail_on = Some(kind); }
    pub fn set_unavailable(&self, down: bool) { lock(&self.state).unavailable = down; }
    /// Another actor creates `name` between the conflict check and our create.
    pub fn race_namespace_create(&self, name: &str) { lock(&self.state).race_on_create.insert(name.to_string()); }

    pub fn seed_namespace(&self, name: &str, labels: BTreeMap<String, String>) {
        lock(&self.state).namespaces.insert(name.to_string(), NamespaceInfo { name: name.to_string(), labels, created_at: None });
    }
    pub fn seed_route(&self, namespace: &str, route: RouteSpec) {
        lock(&self.state).routes.entry(namespace.to_string()).or_default().push(route);
    }

    pub fn has_namespace(&self, name: &str) -> bool { lock(&self.state).namespaces.contains_key(name) }
    /// Resource kinds applied in `namespace`, in application order.
    pub fn applied(&self, namespace: &str) -> Vec<ResourceKind> { lock(&self.state).applied.get(namespace).cloned().unwrap_or_default() }
    pub fn workload(&self, namespace: &str, name: &str) -> Option<WorkloadSpec> {
        lock(&self.state).workloads.get(&(namespace.to_string(), name.to_string())).cloned()
    }
    pub fn service(&self, namespace: &str, name: &str) -> Option<ServiceSpec> {
        lock(&self.state).services.get(&(namespace.to_string(), name.to_string())).cloned()
    }
    pub fn labels(&self, namespace: &str) -> BTreeMap<String, String> {
        lock(&self.state).namespaces.get(namespace).map(|ns| ns.labels.clone()).unwrap_or_default()
    }
    pub fn routes(&self, namespace: &str) -> Vec<RouteSpec> { lock(&self.state).routes.get(namespace).cloned().unwrap_or_default() }
    /// Journal of gateway calls, e.g. `create_namespace:acme`.
    pub fn calls(&self) -> Vec<String> { lock(&self.state).calls.clone() }

    fn enter(&self, call: String) -> ProvisionResult<MutexGuard<'_, ClusterState>> {
        let mut st = lock(&self.state);
        st.calls.push(call.clone());
        if st.unavailable { return Err(ProvisionError::ClusterUnavailable(format!("{call}: connection refused"))); }
        Ok(st)
    }

    fn record_apply(st: &mut ClusterState, namespace: &str, kind: ResourceKind) -> ProvisionResult<()> {
        if !st.namespaces.contains_key(namespace) { return Err(ProvisionError::resource_apply(kind.as_str(), namespace, "namespace not found")); }
        if st.fail_on == Some(kind) { return Err(ProvisionError::resource_apply(kind.as_str(), namespace, "injected failure")); }
        st.applied.entry(namespace.to_string()).or_default().push(kind);
        Ok(())
    }
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn get_namespace(&self, name: &str) -> ProvisionResult<Option<NamespaceInfo>> {
        let st = self.enter(format!("get_namespace:{name}"))?;
        Ok(st.namespaces.get(name).cloned())
    }

    async fn create_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<NamespaceCreation> {
        let mut st = self.enter(format!("create_namespace:{name}"))?;
        if st.race_on_create.remove(name) {
            st.namespaces.insert(name.to_string(), NamespaceInfo { name: name.to_string(), labels: labels.clone(), created_at: None });
            return Ok(NamespaceCreation::AlreadyExists);
        }
        if st.namespaces.contains_key(name) { return Ok(NamespaceCreation::AlreadyExists); }
        let info = NamespaceInfo { name: name.to_string(), labels: labels.clone(), created_at: Some(chrono::Utc::now()) };
        st.namespaces.insert(name.to_string(), info);
        Ok(NamespaceCreation::Created)
    }

    async fn label_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<()> {
        let mut st = self.enter(format!("label_namespace:{name}"))?;
        let ns = st.namespaces.get_mut(name).ok_or_else(|| ProvisionError::resource_apply("namespace", name, "namespace not found"))?;
        ns.labels.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn apply_workload(&self, namespace: &str, spec: &WorkloadSpec) -> ProvisionResult<()> {
        let mut st = self.enter(format!("apply_workload:{namespace}/{}", spec.name()))?;
        let kind = if spec.role == Role::Backend { ResourceKind::BackendWorkload } else { ResourceKind::FrontendWorkload };
        Self::record_apply(&mut st, namespace, kind)?;
        st.workloads.insert((namespace.to_string(), spec.name().to_string()), spec.clone());
        Ok(())
    }

    async fn apply_service(&self, namespace: &str, spec: &ServiceSpec) -> ProvisionResult<()> {
        let mut st = self.enter(format!("apply_service:{namespace}/{}", spec.name()))?;
        let kind = if spec.role == Role::Backend { ResourceKind::BackendService } else { ResourceKind::FrontendService };
        Self::record_apply(&mut st, namespace, kind)?;
        st.services.insert((namespace.to_string(), spec.name().to_string()), spec.clone());
        Ok(())
    }

    async fn apply_route(&self, namespace: &str, spec: &RouteSet) -> ProvisionResult<()> {
        let mut st = self.enter(format!("apply_route:{namespace}/{}", spec.name))?;
        Self::record_apply(&mut st, namespace, ResourceKind::Route)?;
        st.routes.insert(namespace.to_string(), spec.routes.clone());
        Ok(())
    }

    async fn list_routes(&self, namespace: &str) -> ProvisionResult<Vec<RouteSpec>> {
        let st = self.enter(format!("list_routes:{namespace}"))?;
        Ok(st.routes.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_all_routes(&self) -> ProvisionResult<Vec<RouteSpec>> {
        let st = self.enter("list_all_routes".to_string())?;
        Ok(st.routes.values().flatten().cloned().collect())
    }

    async fn list_namespaces(&self, label_selector: &str) -> ProvisionResult<Vec<NamespaceInfo>> {
        let st = self.enter(format!("list_namespaces:{label_selector}"))?;
        let wanted: Vec<(&str, &str)> = label_selector.split(',').filter_map(|kv| kv.split_once('=')).collect();
        Ok(st.namespaces.values().filter(|ns| wanted.iter().all(|(k, v)| ns.labels.get(*k).map(String::as_str) == Some(*v))).cloned().collect())
    }

    async fn delete_namespace(&self, name: &str) -> ProvisionResult<()> {
        let mut st = self.enter(format!("delete_namespace:{name}"))?;
        if st.namespaces.remove(name).is_none() { return Err(ProvisionError::NotFound(format!("namespace {name} not found"))); }
        st.applied.remove(name);
        st.routes.remove(name);
        st.workloads.retain(|(ns, _), _| ns != name);
        st.services.retain(|(ns, _), _| ns != name);
        Ok(())
    }
}

/// DNS updater that records every publish and can reject a chosen host.
#[derive(Debug, Default)]
pub struct RecordingDns { published: Mutex<Vec<DnsRecord>>, reject_host: Mutex<Option<String>> }

impl RecordingDns {
    pub fn new() -> Self { Self::default() }
    pub fn reject(&self, host: &str) { *lock(&self.reject_host) = Some(host.to_string()); }
    pub fn records(&self) -> Vec<DnsRecord> { lock(&self.published).clone() }
    pub fn hosts(&self) -> Vec<String> { self.records().into_iter().map(|r| r.host).collect() }
}

#[async_trait]
impl DnsUpdater for RecordingDns {
    async fn publish(&self, record: &DnsRecord) -> ProvisionResult<()> {
        if lock(&self.reject_host).as_deref() == Some(record.host.as_str()) {
            return Err(ProvisionError::DnsUpdate { host: record.host.clone(), cause: "REFUSED".into() });
        }
        lock(&self.published).push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingDatabase { created: Mutex<Vec<String>>, fail: Mutex<bool> }

impl RecordingDatabase {
    pub fn new() -> Self { Self::default() }
    pub fn fail(&self) { *lock(&self.fail) = true; }
    pub fn created(&self) -> Vec<String> { lock(&self.created).clone() }
}

#[async_trait]
impl DatabaseProvisioner for RecordingDatabase {
    async fn create_database(&self, tenant: &str) -> ProvisionResult<()> {
        if *lock(&self.fail) { return Err(ProvisionError::Database { tenant: tenant.into(), cause: "connection refused".into() }); }
        lock(&self.created).push(tenant.to_string());
        Ok(())
    }
}

/// An orchestrator wired to fresh fakes.
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub dns: Arc<RecordingDns>,
    pub registry: Arc<InMemoryRegistry>,
    pub orchestrator: Arc<TenantOrchestrator>,
}

impl Harness {
    pub fn new() -> Self { Self::with(BuilderConfig::default(), OrchestratorOptions::default()) }

    /// DNS publication disabled, as with `ENVIRONMENT=development`.
    pub fn development() -> Self {
        Self::with(BuilderConfig::default(), OrchestratorOptions { publish_dns: false, ..OrchestratorOptions::default() })
    }

    pub fn with(builder: BuilderConfig, options: OrchestratorOptions) -> Self {
        Self::assemble(builder, options, None)
    }

    pub fn with_database(db: Arc<RecordingDatabase>) -> Self {
        Self::assemble(BuilderConfig::default(), OrchestratorOptions::default(), Some(db))
    }

    fn assemble(builder: BuilderConfig, options: OrchestratorOptions, db: Option<Arc<RecordingDatabase>>) -> Self {
        let cluster = Arc::new(FakeCluster::new());
        let dns = Arc::new(RecordingDns::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let mut orchestrator = TenantOrchestrator::new(SpecBuilder::new(builder), cluster.clone(), registry.clone(), options).with_dns(dns.clone());
        if let Some(db) = db { orchestrator = orchestrator.with_database(db); }
        Self { cluster, dns, registry, orchestrator: Arc::new(orchestrator) }
    }

    pub fn state(&self) -> AppState { AppState { orchestrator: self.orchestrator.clone() } }
}

impl Default for Harness { fn default() -> Self { Self::new() } }
