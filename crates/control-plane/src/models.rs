use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use utoipa::ToSchema;

/// Label put on every namespace this service creates.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "tenant-control-plane";
pub const TENANT_LABEL: &str = "tenant";

/// Labels of a tenant namespace.
pub fn namespace_labels(tenant: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()), (TENANT_LABEL.to_string(), tenant.to_string())])
}

/// Input to provisioning. `domain` / `api_domain` are derived from the main domain when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TenantDescriptor {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub api_domain: Option<String>,
}

impl TenantDescriptor {
    pub fn named(name: impl Into<String>) -> Self { Self { name: name.into(), domain: None, api_domain: None } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Backend, Frontend }

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Backend => "backend",
            Role::Frontend => "frontend",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// One deployable component of a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub role: Role,
    pub image: String,
    pub replica_count: i32,
    pub container_port: i32,
    pub image_pull_policy: Option<String>,
    pub label_selector: BTreeMap<String, String>,
}

impl WorkloadSpec {
    pub fn name(&self) -> &'static str { self.role.as_str() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposureMode {
    ClusterInternal,
    NodePort { node_port: Option<i32> },
    ExternalNameAlias { target: String },
}

impl ExposureMode {
    /// Kubernetes service `type` for this mode.
    pub fn service_type(&self) -> &'static str {
        match self {
            ExposureMode::ClusterInternal => "ClusterIP",
            ExposureMode::NodePort { .. } => "NodePort",
            ExposureMode::ExternalNameAlias { .. } => "ExternalName",
        }
    }
}

/// Network exposure of a workload. Node port and external name target live inside
/// `ExposureMode`, so an alias can never carry a node port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub role: Role,
    pub exposure: ExposureMode,
    pub port: i32,
    pub target_port: i32,
    pub label_selector: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ServiceSpec {
    pub fn name(&self) -> &'static str { self.role.as_str() }
}

/// A single `host -> service:port` rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteSpec {
    pub host: String,
    pub service_name: String,
    pub port: i32,
}

/// All routes of one tenant, grouped under a single ingress object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSet {
    pub name: String,
    pub ingress_class: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub routes: Vec<RouteSpec>,
}

/// Full derived resource set of a tenant. Recomputed on every request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResources {
    pub namespace: String,
    pub domain: String,
    pub api_domain: String,
    pub backend_workload: WorkloadSpec,
    pub backend_service: ServiceSpec,
    pub frontend_workload: WorkloadSpec,
    pub frontend_service: ServiceSpec,
    pub route: Option<RouteSet>,
}

/// Registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TenantRecord {
    pub name: String,
    pub domain: String,
    pub api_domain: String,
    pub labels: BTreeMap<String, String>,
    #[schema(value_type = Option<String>)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Namespace as seen by the cluster gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NamespaceInfo {
    pub fn is_managed(&self) -> bool { self.labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE) }
}
