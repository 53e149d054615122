//! Cluster gateway: the narrow slice of the Kubernetes API that tenant provisioning needs.
use std::collections::BTreeMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec},
    core::v1::{Container, ContainerPort, Namespace, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec as K8sServiceSpec},
    networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
        ServiceBackendPort,
    },
};
use k8s_openapi::apimachinery::pkg::{apis::meta::v1::{LabelSelector, ObjectMeta}, util::intstr::IntOrString};
use kube::{
    Api, Client, Config,
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams, ResourceExt},
    config::{KubeConfigOptions, Kubeconfig},
};
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::{
    config::KubeSource,
    error::{ProvisionError, ProvisionResult},
    models::{ExposureMode, NamespaceInfo, Role, RouteSet, RouteSpec, ServiceSpec, WorkloadSpec, MANAGED_BY_LABEL, MANAGED_BY_VALUE},
    resources::ResourceKind,
};

pub const FIELD_MANAGER: &str = "tenant-control-plane";

/// Outcome of an idempotent namespace create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceCreation { Created, AlreadyExists }

/// Every call is a single network round trip; retries belong to the caller.
#[async_trait]
pub trait ClusterGateway: Send + Sync + 'static {
    async fn get_namespace(&self, name: &str) -> ProvisionResult<Option<NamespaceInfo>>;
    async fn namespace_exists(&self, name: &str) -> ProvisionResult<bool> { Ok(self.get_namespace(name).await?.is_some()) }
    /// "Already exists" is reported as `NamespaceCreation::AlreadyExists`, never as an error.
    async fn create_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<NamespaceCreation>;
    /// Set `labels` on an existing namespace, leaving other labels alone.
    async fn label_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<()>;
    async fn apply_workload(&self, namespace: &str, spec: &WorkloadSpec) -> ProvisionResult<()>;
    async fn apply_service(&self, namespace: &str, spec: &ServiceSpec) -> ProvisionResult<()>;
    async fn apply_route(&self, namespace: &str, spec: &RouteSet) -> ProvisionResult<()>;
    /// Routes served from one namespace.
    async fn list_routes(&self, namespace: &str) -> ProvisionResult<Vec<RouteSpec>>;
    async fn list_all_routes(&self) -> ProvisionResult<Vec<RouteSpec>>;
    async fn list_namespaces(&self, label_selector: &str) -> ProvisionResult<Vec<NamespaceInfo>>;
    /// Cascades to everything inside the namespace. `NotFound` if absent.
    async fn delete_namespace(&self, name: &str) -> ProvisionResult<()>;
}

/// Label selector matching namespaces created by this service.
pub fn managed_selector() -> String { format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}") }

#[derive(Clone)]
pub struct KubeGateway { client: Client }

impl std::fmt::Debug for KubeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("KubeGateway").finish_non_exhaustive() }
}

impl KubeGateway {
    pub fn new(client: Client) -> Self { Self { client } }

    /// Build a client from in-cluster credentials or a kubeconfig file.
    pub async fn connect(source: &KubeSource) -> Result<Self> {
        let config = match source {
            KubeSource::InCluster => {
                debug!("kube.config.in_cluster");
                Config::incluster().context("load in-cluster kube config")?
            }
            KubeSource::Kubeconfig { path, context } => {
                let opts = KubeConfigOptions { context: context.clone(), ..Default::default() };
                match path {
                    Some(p) => {
                        debug!(path=%p.display(), "kube.config.kubeconfig");
                        let kc = Kubeconfig::read_from(p).with_context(|| format!("read kubeconfig {}", p.display()))?;
                        Config::from_custom_kubeconfig(kc, &opts).await.context("build kube config")?
                    }
                    None => Config::from_kubeconfig(&opts).await.context("load default kubeconfig")?,
                }
            }
        };
        let client = Client::try_from(config).context("create kube client")?;
        info!("kube client ready");
        Ok(Self::new(client))
    }

    async fn apply<K>(&self, api: Api<K>, kind: ResourceKind, namespace: &str, name: &str, obj: &K) -> ProvisionResult<()>
    where K: kube::Resource + Clone + std::fmt::Debug + Serialize + serde::de::DeserializeOwned {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        match api.patch(name, &params, &Patch::Apply(obj)).await {
            Ok(_) => { debug!(%namespace, resource_kind=%kind, %name, "k8s.apply.ok"); Ok(()) }
            Err(e) => { warn!(%namespace, resource_kind=%kind, %name, error=%e, "k8s.apply.failed"); Err(apply_error(kind, namespace, e)) }
        }
    }
}

fn is_transport(e: &kube::Error) -> bool {
    match e {
        kube::Error::Api(ae) => ae.code == 401 || ae.code == 403,
        _ => true,
    }
}

fn api_code(e: &kube::Error) -> Option<u16> { if let kube::Error::Api(ae) = e { Some(ae.code) } else { None } }

fn unavailable(op: &str, e: kube::Error) -> ProvisionError { ProvisionError::ClusterUnavailable(format!("{op}: {e}")) }

fn apply_error(kind: ResourceKind, namespace: &str, e: kube::Error) -> ProvisionError {
    if is_transport(&e) { unavailable(&format!("apply {kind}"), e) } else { ProvisionError::resource_apply(kind.as_str(), namespace, e) }
}

fn namespace_info(ns: &Namespace) -> NamespaceInfo {
    NamespaceInfo { name: ns.name_any(), labels: ns.labels().clone(), created_at: ns.metadata.creation_timestamp.as_ref().map(|t| t.0) }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get_namespace(&self, name: &str) -> ProvisionResult<Option<NamespaceInfo>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = api.get_opt(name).await.map_err(|e| unavailable("read namespace", e))?;
        Ok(ns.as_ref().map(namespace_info))
    }

    async fn create_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<NamespaceCreation> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.create(&PostParams::default(), &namespace(name, labels)).await {
            Ok(_) => Ok(NamespaceCreation::Created),
            Err(e) if api_code(&e) == Some(409) => { debug!(namespace=%name, "k8s.namespace.exists"); Ok(NamespaceCreation::AlreadyExists) }
            Err(e) if is_transport(&e) => Err(unavailable("create namespace", e)),
            Err(e) => Err(ProvisionError::resource_apply("namespace", name, e)),
        }
    }

    async fn label_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> ProvisionResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = PatchParams::apply(FIELD_MANAGER).force();
        match api.patch(name, &params, &Patch::Apply(&namespace(name, labels))).await {
            Ok(_) => { debug!(namespace=%name, "k8s.namespace.labelled"); Ok(()) }
            Err(e) if is_transport(&e) => Err(unavailable("label namespace", e)),
            Err(e) => Err(ProvisionError::resource_apply("namespace", name, e)),
        }
    }

    async fn apply_workload(&self, ns: &str, spec: &WorkloadSpec) -> ProvisionResult<()> {
        let kind = match spec.role {
            Role::Backend => ResourceKind::BackendWorkload,
            Role::Frontend => ResourceKind::FrontendWorkload,
        };
        let api = Api::<Deployment>::namespaced(self.client.clone(), ns);
        self.apply(api, kind, ns, spec.name(), &deployment(ns, spec)).await
    }

    async fn apply_service(&self, ns: &str, spec: &ServiceSpec) -> ProvisionResult<()> {
        let kind = match spec.role {
            Role::Backend => ResourceKind::BackendService,
            Role::Frontend => ResourceKind::FrontendService,
        };
        let api = Api::<Service>::namespaced(self.client.clone(), ns);
        self.apply(api, kind, ns, spec.name(), &service(ns, spec)).await
    }

    async fn apply_route(&self, ns: &str, spec: &RouteSet) -> ProvisionResult<()> {
        let api = Api::<Ingress>::namespaced(self.client.clone(), ns);
        self.apply(api, ResourceKind::Route, ns, &spec.name, &ingress(ns, spec)).await
    }

    async fn list_routes(&self, ns: &str) -> ProvisionResult<Vec<RouteSpec>> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), ns);
        let list = api.list(&ListParams::default()).await.map_err(|e| unavailable("list ingresses", e))?;
        Ok(list.items.iter().flat_map(routes_of).collect())
    }

    async fn list_all_routes(&self) -> ProvisionResult<Vec<RouteSpec>> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(|e| unavailable("list ingresses", e))?;
        Ok(list.items.iter().flat_map(routes_of).collect())
    }

    async fn list_namespaces(&self, label_selector: &str) -> ProvisionResult<Vec<NamespaceInfo>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default().labels(label_selector)).await.map_err(|e| unavailable("list namespaces", e))?;
        Ok(list.items.iter().map(namespace_info).collect())
    }

    async fn delete_namespace(&self, name: &str) -> ProvisionResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if api_code(&e) == Some(404) => Err(ProvisionError::NotFound(format!("namespace {name} not found"))),
            Err(e) => Err(unavailable("delete namespace", e)),
        }
    }
}

fn meta(name: &str, namespace: Option<&str>, labels: BTreeMap<String, String>, annotations: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(labels),
        annotations: if annotations.is_empty() { None } else { Some(annotations.clone()) },
        ..Default::default()
    }
}

fn object_labels(selector: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = selector.clone();
    labels.insert(MANAGED_BY_LABEL.into(), MANAGED_BY_VALUE.into());
    labels
}

pub fn namespace(name: &str, labels: &BTreeMap<String, String>) -> Namespace {
    Namespace { metadata: meta(name, None, labels.clone(), &BTreeMap::new()), ..Default::default() }
}

pub fn deployment(namespace: &str, w: &WorkloadSpec) -> Deployment {
    Deployment {
        metadata: meta(w.name(), Some(namespace), object_labels(&w.label_selector), &BTreeMap::new()),
        spec: Some(DeploymentSpec {
            replicas: Some(w.replica_count),
            selector: LabelSelector { match_labels: Some(w.label_selector.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(w.label_selector.clone()), ..Default::default() }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: w.name().to_string(),
                        image: Some(w.image.clone()),
                        image_pull_policy: w.image_pull_policy.clone(),
                        ports: Some(vec![ContainerPort { container_port: w.container_port, ..Default::default() }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(namespace: &str, s: &ServiceSpec) -> Service {
    let (node_port, external_name) = match &s.exposure {
        ExposureMode::ClusterInternal => (None, None),
        ExposureMode::NodePort { node_port } => (*node_port, None),
        ExposureMode::ExternalNameAlias { target } => (None, Some(target.clone())),
    };
    Service {
        metadata: meta(s.name(), Some(namespace), object_labels(&s.label_selector), &s.annotations),
        spec: Some(K8sServiceSpec {
            type_: Some(s.exposure.service_type().to_string()),
            selector: Some(s.label_selector.clone()),
            external_name,
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".into()),
                port: s.port,
                target_port: Some(IntOrString::Int(s.target_port)),
                node_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn ingress(namespace: &str, r: &RouteSet) -> Ingress {
    let labels = BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())]);
    let rules = r.routes.iter().map(|route| IngressRule {
        host: Some(route.host.clone()),
        http: Some(HTTPIngressRuleValue { paths: vec![HTTPIngressPath {
            path: Some("/".into()),
            path_type: "Prefix".into(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: route.service_name.clone(),
                    port: Some(ServiceBackendPort { number: Some(route.port), name: None }),
                }),
                resource: None,
            },
        }] }),
    }).collect();
    Ingress {
        metadata: meta(&r.name, Some(namespace), labels, &r.annotations),
        spec: Some(IngressSpec { ingress_class_name: r.ingress_class.clone(), rules: Some(rules), ..Default::default() }),
        ..Default::default()
    }
}

/// Flatten an ingress back into host routes. Rules without a host or service backend are skipped.
pub fn routes_of(ing: &Ingress) -> Vec<RouteSpec> {
    let rules = ing.spec.as_ref().and_then(|s| s.rules.as_ref());
    rules.into_iter().flatten().filter_map(|rule| {
        let host = rule.host.clone()?;
        let path = rule.http.as_ref()?.paths.first()?;
        let svc = path.backend.service.as_ref()?;
        let port = svc.port.as_ref().and_then(|p| p.number).unwrap_or(0);
        Some(RouteSpec { host, service_name: svc.name.clone(), port })
    }).collect()
}
