//! Tenant orchestrator: sequences validation, conflict detection, namespace creation,
//! resource application and DNS publication into one provisioning workflow.
//!
//! Steps run strictly in order and the first failure aborts the rest. Nothing that was
//! applied before a failure is undone; a failed provision can leave a namespace holding a
//! subset of the tenant's resources, which a later removal cleans up in one cascade.
use std::{collections::{BTreeMap, HashSet}, str::FromStr, sync::Arc};
use chrono::Utc;
use tracing::{debug, info, warn};
use crate::{
    config::Settings,
    db::DatabaseProvisioner,
    dns::{DnsRecord, DnsUpdater, RecordType},
    error::{ProvisionError, ProvisionResult},
    k8s::{managed_selector, ClusterGateway, NamespaceCreation},
    models::{namespace_labels, NamespaceInfo, TenantDescriptor, TenantRecord, TenantResources},
    registry::TenantStore,
    resources::{derive_domains, is_dns_label, ResourceKind, SpecBuilder},
};

/// How a create request is judged to collide with an existing tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// The namespace must not exist yet and the tenant's hosts must be unrouted.
    /// A namespace appearing between the check and the create counts as a conflict.
    NamespaceIdentity,
    /// Only route hosts are checked; an existing namespace is reused.
    RouteHosts,
}

impl FromStr for ConflictPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "namespace" | "namespace-identity" => Ok(Self::NamespaceIdentity),
            "hosts" | "route-hosts" => Ok(Self::RouteHosts),
            other => Err(format!("unknown conflict policy {other:?} (expected namespace|hosts)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub conflict_policy: ConflictPolicy,
    /// False in development: no DNS updater call is made at all.
    pub publish_dns: bool,
    pub dns_zone: String,
    pub dns_ttl: u32,
    pub ingress_ip: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::NamespaceIdentity,
            publish_dns: true,
            dns_zone: "central.local.".into(),
            dns_ttl: 300,
            ingress_ip: "127.0.0.1".into(),
        }
    }
}

impl OrchestratorOptions {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            conflict_policy: s.conflict_policy,
            publish_dns: !s.is_development(),
            dns_zone: s.dns.zone.clone(),
            dns_ttl: s.dns.ttl,
            ingress_ip: s.dns.ingress_ip.clone(),
        }
    }
}

pub struct TenantOrchestrator {
    builder: SpecBuilder,
    cluster: Arc<dyn ClusterGateway>,
    registry: Arc<dyn TenantStore>,
    dns: Option<Arc<dyn DnsUpdater>>,
    database: Option<Arc<dyn DatabaseProvisioner>>,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for TenantOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantOrchestrator").field("builder", &self.builder).field("options", &self.options).finish_non_exhaustive()
    }
}

impl TenantOrchestrator {
    pub fn new(builder: SpecBuilder, cluster: Arc<dyn ClusterGateway>, registry: Arc<dyn TenantStore>, options: OrchestratorOptions) -> Self {
        Self { builder, cluster, registry, dns: None, database: None, options }
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsUpdater>) -> Self { self.dns = Some(dns); self }
    pub fn with_database(mut self, db: Arc<dyn DatabaseProvisioner>) -> Self { self.database = Some(db); self }

    pub fn builder(&self) -> &SpecBuilder { &self.builder }
    pub fn registry(&self) -> &Arc<dyn TenantStore> { &self.registry }

    /// Provision a tenant end to end and record it in the registry.
    #[tracing::instrument(level = "info", skip(self, descriptor), fields(tenant = %descriptor.name))]
    pub async fn provision(&self, descriptor: &TenantDescriptor) -> ProvisionResult<TenantRecord> {
        let resources = self.builder.build(descriptor).map_err(|e| { debug!(error=%e, step="validate", "tenant.validation_failed"); e })?;
        let ns = resources.namespace.as_str();

        self.check_conflicts(&resources).await?;

        let labels = namespace_labels(ns);
        debug!(namespace=%ns, step="namespace", "tenant.step.start");
        match self.cluster.create_namespace(ns, &labels).await? {
            NamespaceCreation::Created => info!(namespace=%ns, "namespace created"),
            NamespaceCreation::AlreadyExists => self.adopt_namespace(ns, &labels).await?,
        }

        if let Some(db) = &self.database {
            debug!(namespace=%ns, step="database", "tenant.step.start");
            db.create_database(ns).await.map_err(|e| { warn!(namespace=%ns, step="database", error=%e, "tenant.step.failed"); e })?;
        }

        self.apply_resources(&resources).await?;
        self.publish_dns(&resources).await?;

        let record = TenantRecord {
            name: ns.to_string(),
            domain: resources.domain.clone(),
            api_domain: resources.api_domain.clone(),
            labels,
            created_at: Some(Utc::now()),
        };
        self.registry.insert(record.clone());
        info!(namespace=%ns, domain=%record.domain, api_domain=%record.api_domain, "tenant provisioned");
        Ok(record)
    }

    /// Fast, descriptive pre-check. Racy by nature; the cluster's atomic create stays the final arbiter.
    async fn check_conflicts(&self, r: &TenantResources) -> ProvisionResult<()> {
        let ns = r.namespace.as_str();
        debug!(namespace=%ns, step="conflict_check", policy=?self.options.conflict_policy, "tenant.step.start");
        match self.options.conflict_policy {
            ConflictPolicy::NamespaceIdentity => {
                if self.cluster.namespace_exists(ns).await? {
                    return Err(ProvisionError::TenantConflict(format!("namespace {ns} already exists")));
                }
            }
            ConflictPolicy::RouteHosts => {
                if let Some(existing) = self.cluster.get_namespace(ns).await? {
                    if existing.is_managed() {
                        return Err(ProvisionError::TenantConflict(format!("tenant {ns} already exists")));
                    }
                    // Only a namespace that serves no routes yet can be taken over.
                    if let Some(route) = self.cluster.list_routes(ns).await?.first() {
                        return Err(ProvisionError::TenantConflict(format!("namespace {ns} already routes {}", route.host)));
                    }
                }
            }
        }
        let wanted: HashSet<&str> = [r.domain.as_str(), r.api_domain.as_str()].into_iter().collect();
        if let Some(taken) = self.cluster.list_all_routes().await?.into_iter().find(|route| wanted.contains(route.host.as_str())) {
            return Err(ProvisionError::TenantConflict(format!("host {} is already routed in the cluster", taken.host)));
        }
        Ok(())
    }

    /// The namespace appeared before our create. Under namespace identity that is a lost race;
    /// otherwise an unmanaged namespace is labelled and taken over.
    async fn adopt_namespace(&self, ns: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<()> {
        if self.options.conflict_policy == ConflictPolicy::NamespaceIdentity {
            warn!(namespace=%ns, "tenant.namespace_race_lost");
            return Err(ProvisionError::TenantConflict(format!("namespace {ns} already exists")));
        }
        if self.cluster.get_namespace(ns).await?.is_some_and(|existing| existing.is_managed()) {
            warn!(namespace=%ns, "tenant.namespace_race_lost");
            return Err(ProvisionError::TenantConflict(format!("tenant {ns} already exists")));
        }
        self.cluster.label_namespace(ns, labels).await?;
        info!(namespace=%ns, "namespace already present, adopted");
        Ok(())
    }

    async fn apply_resources(&self, r: &TenantResources) -> ProvisionResult<()> {
        let ns = r.namespace.as_str();
        const ORDER: [ResourceKind; 5] = [
            ResourceKind::BackendWorkload,
            ResourceKind::BackendService,
            ResourceKind::FrontendWorkload,
            ResourceKind::FrontendService,
            ResourceKind::Route,
        ];
        for kind in ORDER {
            debug!(namespace=%ns, resource_kind=%kind, "tenant.step.start");
            let res = match kind {
                ResourceKind::BackendWorkload => self.cluster.apply_workload(ns, &r.backend_workload).await,
                ResourceKind::BackendService => self.cluster.apply_service(ns, &r.backend_service).await,
                ResourceKind::FrontendWorkload => self.cluster.apply_workload(ns, &r.frontend_workload).await,
                ResourceKind::FrontendService => self.cluster.apply_service(ns, &r.frontend_service).await,
                ResourceKind::Route => match &r.route { Some(route) => self.cluster.apply_route(ns, route).await, None => continue },
            };
            if let Err(e) = res {
                warn!(namespace=%ns, resource_kind=%kind, error=%e, "tenant.step.failed");
                return Err(e);
            }
            info!(namespace=%ns, resource_kind=%kind, "resource applied");
        }
        Ok(())
    }

    async fn publish_dns(&self, r: &TenantResources) -> ProvisionResult<()> {
        let ns = r.namespace.as_str();
        if !self.options.publish_dns {
            debug!(namespace=%ns, step="dns", "tenant.dns.skipped_development");
            return Ok(());
        }
        let dns = self.dns.as_ref().ok_or_else(|| ProvisionError::DnsUpdate { host: r.domain.clone(), cause: "no DNS updater configured".into() })?;
        for host in [&r.domain, &r.api_domain] {
            let record = DnsRecord {
                zone: self.options.dns_zone.clone(),
                host: host.clone(),
                record_type: RecordType::A,
                value: self.options.ingress_ip.clone(),
                ttl: self.options.dns_ttl,
            };
            dns.publish(&record).await.map_err(|e| { warn!(namespace=%ns, step="dns", %host, error=%e, "tenant.step.failed"); e })?;
        }
        Ok(())
    }

    /// Delete the tenant namespace (cascading) and then drop the registry entry.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn deprovision(&self, name: &str) -> ProvisionResult<()> {
        if !is_dns_label(name) { return Err(ProvisionError::NotFound(format!("tenant {name} not found"))); }
        match self.cluster.get_namespace(name).await? {
            Some(ns) if ns.is_managed() => {}
            Some(_) => return Err(ProvisionError::NotFound(format!("namespace {name} is not a managed tenant"))),
            None => return Err(ProvisionError::NotFound(format!("tenant {name} not found"))),
        }
        self.cluster.delete_namespace(name).await?;
        self.registry.remove(name);
        info!(namespace=%name, "tenant removed");
        Ok(())
    }

    /// Read-only projection over the managed namespaces of the cluster.
    pub async fn list(&self) -> ProvisionResult<Vec<TenantRecord>> {
        let mut records: Vec<TenantRecord> = self.cluster.list_namespaces(&managed_selector()).await?.iter().map(|ns| self.record_for(ns)).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Registry first; on a miss ask the cluster and re-cache.
    pub async fn get(&self, name: &str) -> ProvisionResult<TenantRecord> {
        if let Some(hit) = self.registry.get(name) { return Ok(hit); }
        if !is_dns_label(name) { return Err(ProvisionError::NotFound(format!("tenant {name} not found"))); }
        match self.cluster.get_namespace(name).await? {
            Some(ns) if ns.is_managed() => {
                let record = self.record_for(&ns);
                self.registry.insert(record.clone());
                Ok(record)
            }
            _ => Err(ProvisionError::NotFound(format!("tenant {name} not found"))),
        }
    }

    /// Reload the registry from the cluster. Returns the number of tenants cached.
    pub async fn warm_registry(&self) -> ProvisionResult<usize> {
        let records = self.list().await?;
        let n = records.len();
        self.registry.replace_all(records);
        info!(tenants = n, "registry warmed from cluster");
        Ok(n)
    }

    fn record_for(&self, ns: &NamespaceInfo) -> TenantRecord {
        let (domain, api_domain) = derive_domains(&ns.name, &self.builder.config().main_domain);
        TenantRecord { name: ns.name.clone(), domain, api_domain, labels: ns.labels.clone(), created_at: ns.created_at }
    }
}
