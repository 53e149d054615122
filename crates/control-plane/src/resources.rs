//! Resource spec builder: tenant descriptor in, full workload/service/route set out.
//! Pure and deterministic; validation happens here before any I/O.
use std::{collections::BTreeMap, str::FromStr};
use crate::{
    error::{ProvisionError, ProvisionResult},
    models::{ExposureMode, Role, RouteSet, RouteSpec, ServiceSpec, TenantDescriptor, TenantResources, WorkloadSpec},
};

pub const INGRESS_NAME: &str = "tenant-ingress";
pub const SERVICE_PORT: i32 = 80;
pub const EXTERNAL_DNS_HOSTNAME: &str = "external-dns.alpha.kubernetes.io/hostname";
pub const REWRITE_TARGET: &str = "nginx.ingress.kubernetes.io/rewrite-target";

/// How a tenant is reached from outside the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Cluster-internal services behind one ingress with a rule per host.
    Ingress,
    /// Backend aliased to the API domain, frontend on a node port announced through external-dns.
    Service,
}

impl FromStr for RoutingMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingress" => Ok(Self::Ingress),
            "service" | "nodeport" => Ok(Self::Service),
            other => Err(format!("unknown routing mode {other:?} (expected ingress|service)")),
        }
    }
}

/// Steps of resource application, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind { BackendWorkload, BackendService, FrontendWorkload, FrontendService, Route }

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BackendWorkload => "backend-workload",
            Self::BackendService => "backend-service",
            Self::FrontendWorkload => "frontend-workload",
            Self::FrontendService => "frontend-service",
            Self::Route => "route",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub main_domain: String,
    pub routing_mode: RoutingMode,
    pub backend_image: String,
    pub frontend_image: String,
    pub backend_port: i32,
    pub frontend_port: i32,
    pub replicas: i32,
    pub frontend_image_pull_policy: Option<String>,
    pub frontend_node_port: Option<i32>,
    pub ingress_class: Option<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            main_domain: crate::config::DEFAULT_MAIN_DOMAIN.into(),
            routing_mode: RoutingMode::Ingress,
            backend_image: "fastapi-backend".into(),
            frontend_image: "react-frontend".into(),
            backend_port: 8000,
            frontend_port: 3000,
            replicas: 2,
            frontend_image_pull_policy: None,
            frontend_node_port: None,
            ingress_class: None,
        }
    }
}

/// `{name}.{main}` and `api.{name}.{main}`. The only place tenant domains are derived,
/// shared by spec building and tenant listing.
pub fn derive_domains(name: &str, main_domain: &str) -> (String, String) {
    (format!("{name}.{main_domain}"), format!("api.{name}.{main_domain}"))
}

/// RFC 1123 label: lowercase alphanumerics and '-', 1..=63 chars, alphanumeric at both ends.
pub fn is_dns_label(s: &str) -> bool {
    let b = s.as_bytes();
    !b.is_empty() && b.len() <= 63
        && b.iter().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
        && b[0] != b'-' && b[b.len() - 1] != b'-'
}

pub fn is_hostname(s: &str) -> bool {
    !s.is_empty() && s.len() <= 253 && s.split('.').all(is_dns_label)
}

pub fn validate_name(name: &str) -> ProvisionResult<()> {
    if is_dns_label(name) { Ok(()) } else {
        Err(ProvisionError::Validation(format!("tenant name {name:?} must be a lowercase DNS label (a-z, 0-9, '-', at most 63 chars)")))
    }
}

#[derive(Debug, Clone)]
pub struct SpecBuilder { config: BuilderConfig }

impl SpecBuilder {
    pub fn new(config: BuilderConfig) -> Self { Self { config } }
    pub fn config(&self) -> &BuilderConfig { &self.config }

    /// Resolve the tenant's domain pair, falling back to the derived pair.
    pub fn resolve_domains(&self, d: &TenantDescriptor) -> ProvisionResult<(String, String)> {
        validate_name(&d.name)?;
        let (derived_domain, derived_api) = derive_domains(&d.name, &self.config.main_domain);
        let domain = d.domain.clone().unwrap_or(derived_domain);
        let api_domain = d.api_domain.clone().unwrap_or(derived_api);
        for (field, host) in [("domain", &domain), ("api_domain", &api_domain)] {
            if !is_hostname(host) { return Err(ProvisionError::Validation(format!("{field} {host:?} is not a valid lowercase hostname"))); }
        }
        if domain == api_domain { return Err(ProvisionError::Validation(format!("domain and api_domain must differ (both {domain:?})"))); }
        Ok((domain, api_domain))
    }

    pub fn build(&self, d: &TenantDescriptor) -> ProvisionResult<TenantResources> {
        let (domain, api_domain) = self.resolve_domains(d)?;
        let cfg = &self.config;
        let backend_workload = workload(Role::Backend, &cfg.backend_image, cfg.replicas, cfg.backend_port, None);
        let frontend_workload = workload(
            Role::Frontend,
            &cfg.frontend_image,
            cfg.replicas,
            cfg.frontend_port,
            cfg.frontend_image_pull_policy.clone(),
        );
        let (backend_exposure, frontend_exposure) = match cfg.routing_mode {
            RoutingMode::Ingress => (ExposureMode::ClusterInternal, ExposureMode::ClusterInternal),
            RoutingMode::Service => (
                ExposureMode::ExternalNameAlias { target: api_domain.clone() },
                ExposureMode::NodePort { node_port: cfg.frontend_node_port },
            ),
        };
        let backend_service = service(&backend_workload, backend_exposure, BTreeMap::new());
        let mut frontend_annotations = BTreeMap::new();
        if cfg.routing_mode == RoutingMode::Service { frontend_annotations.insert(EXTERNAL_DNS_HOSTNAME.to_string(), domain.clone()); }
        let frontend_service = service(&frontend_workload, frontend_exposure, frontend_annotations);
        let route = match cfg.routing_mode {
            RoutingMode::Ingress => Some(RouteSet {
                name: INGRESS_NAME.into(),
                ingress_class: cfg.ingress_class.clone(),
                annotations: BTreeMap::from([(REWRITE_TARGET.to_string(), "/".to_string())]),
                routes: vec![
                    RouteSpec { host: domain.clone(), service_name: frontend_service.name().into(), port: SERVICE_PORT },
                    RouteSpec { host: api_domain.clone(), service_name: backend_service.name().into(), port: SERVICE_PORT },
                ],
            }),
            RoutingMode::Service => None,
        };
        Ok(TenantResources {
            namespace: d.name.clone(),
            domain,
            api_domain,
            backend_workload,
            backend_service,
            frontend_workload,
            frontend_service,
            route,
        })
    }
}

fn workload(role: Role, image: &str, replicas: i32, port: i32, pull_policy: Option<String>) -> WorkloadSpec {
    WorkloadSpec {
        role,
        image: image.to_string(),
        replica_count: replicas,
        container_port: port,
        image_pull_policy: pull_policy,
        label_selector: BTreeMap::from([("app".to_string(), role.as_str().to_string())]),
    }
}

// Selector is copied from the workload so the pair can never drift apart.
fn service(w: &WorkloadSpec, exposure: ExposureMode, annotations: BTreeMap<String, String>) -> ServiceSpec {
    ServiceSpec { role: w.role, exposure, port: SERVICE_PORT, target_port: w.container_port, label_selector: w.label_selector.clone(), annotations }
}
