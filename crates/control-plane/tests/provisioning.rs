use std::{collections::BTreeMap, sync::Arc};
use tenant_control_plane::{
    error::ProvisionError,
    models::{ExposureMode, RouteSpec, TenantDescriptor, MANAGED_BY_LABEL, MANAGED_BY_VALUE},
    orchestrator::{ConflictPolicy, OrchestratorOptions},
    registry::TenantStore,
    resources::{BuilderConfig, ResourceKind, RoutingMode},
    test_support::{Harness, RecordingDatabase},
};

const ALL_KINDS: [ResourceKind; 5] = [
    ResourceKind::BackendWorkload,
    ResourceKind::BackendService,
    ResourceKind::FrontendWorkload,
    ResourceKind::FrontendService,
    ResourceKind::Route,
];

#[tokio::test]
async fn provision_applies_resources_in_order() {
    let h = Harness::new();
    let record = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    assert_eq!(record.domain, "acme.central.local");
    assert_eq!(record.api_domain, "api.acme.central.local");
    assert_eq!(h.cluster.applied("acme"), ALL_KINDS.to_vec());
    let calls = h.cluster.calls();
    let create_at = calls.iter().position(|c| c == "create_namespace:acme").unwrap();
    let first_apply = calls.iter().position(|c| c.starts_with("apply_")).unwrap();
    assert!(create_at < first_apply, "namespace must exist before resources: {calls:?}");
    assert_eq!(h.cluster.routes("acme"), vec![
        RouteSpec { host: "acme.central.local".into(), service_name: "frontend".into(), port: 80 },
        RouteSpec { host: "api.acme.central.local".into(), service_name: "backend".into(), port: 80 },
    ]);
    assert_eq!(h.registry.get("acme").map(|r| r.domain), Some("acme.central.local".to_string()));
}

#[tokio::test]
async fn dns_published_for_domain_then_api_domain() {
    let h = Harness::new();
    h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    assert_eq!(h.dns.hosts(), vec!["acme.central.local".to_string(), "api.acme.central.local".to_string()]);
    let rec = &h.dns.records()[0];
    assert_eq!(rec.zone, "central.local.");
    assert_eq!(rec.value, "127.0.0.1");
    assert_eq!(rec.ttl, 300);
}

#[tokio::test]
async fn development_makes_no_dns_calls() {
    let h = Harness::development();
    h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    assert!(h.dns.records().is_empty());
    assert!(h.cluster.has_namespace("acme"));
}

#[tokio::test]
async fn duplicate_name_is_conflict_and_leaves_first_untouched() {
    let h = Harness::new();
    h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    let before = h.cluster.workload("acme", "backend");
    let calls_before = h.cluster.calls().len();
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(_)), "{err:?}");
    assert_eq!(h.cluster.workload("acme", "backend"), before);
    assert!(h.cluster.calls()[calls_before..].iter().all(|c| !c.starts_with("apply_") && !c.starts_with("create_")));
    assert_eq!(h.dns.records().len(), 2);
}

#[tokio::test]
async fn host_already_routed_elsewhere_is_conflict() {
    let h = Harness::new();
    let d = TenantDescriptor { name: "beta".into(), domain: Some("shop.example.com".into()), api_domain: None };
    h.orchestrator.provision(&d).await.unwrap();
    let clash = TenantDescriptor { name: "gamma".into(), domain: Some("shop.example.com".into()), api_domain: None };
    let err = h.orchestrator.provision(&clash).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(ref m) if m.contains("shop.example.com")), "{err:?}");
    assert!(!h.cluster.has_namespace("gamma"));
}

#[tokio::test]
async fn namespace_created_concurrently_is_conflict() {
    let h = Harness::new();
    h.cluster.race_namespace_create("acme");
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(_)), "{err:?}");
    assert!(h.cluster.applied("acme").is_empty());
    assert!(h.registry.is_empty());
}

fn route_hosts(cfg: BuilderConfig) -> Harness {
    Harness::with(cfg, OrchestratorOptions { conflict_policy: ConflictPolicy::RouteHosts, ..OrchestratorOptions::default() })
}

#[tokio::test]
async fn route_hosts_policy_adopts_unmanaged_namespace() {
    let h = route_hosts(BuilderConfig::default());
    h.cluster.seed_namespace("acme", BTreeMap::from([("team".to_string(), "web".to_string())]));
    h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    assert_eq!(h.cluster.applied("acme"), ALL_KINDS.to_vec());
    let labels = h.cluster.labels("acme");
    assert_eq!(labels.get(MANAGED_BY_LABEL).map(String::as_str), Some(MANAGED_BY_VALUE));
    assert_eq!(labels.get("team").map(String::as_str), Some("web"));
    let listed: Vec<String> = h.orchestrator.list().await.unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(listed, vec!["acme"]);
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(_)), "{err:?}");
    h.orchestrator.deprovision("acme").await.unwrap();
    assert!(!h.cluster.has_namespace("acme"));
}

#[tokio::test]
async fn route_hosts_policy_rejects_duplicate_in_service_mode() {
    let h = route_hosts(BuilderConfig { routing_mode: RoutingMode::Service, ..BuilderConfig::default() });
    h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(_)), "{err:?}");
    assert_eq!(h.dns.records().len(), 2);
    assert_eq!(h.cluster.applied("acme").len(), 4);
}

#[tokio::test]
async fn route_hosts_policy_keeps_out_of_routed_namespaces() {
    let h = route_hosts(BuilderConfig::default());
    h.cluster.seed_namespace("legacy", BTreeMap::new());
    h.cluster.seed_route("legacy", RouteSpec { host: "shop.example.com".into(), service_name: "web".into(), port: 80 });
    let err = h.orchestrator.provision(&TenantDescriptor::named("legacy")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(ref m) if m.contains("shop.example.com")), "{err:?}");
    assert!(h.cluster.calls().contains(&"list_routes:legacy".to_string()));
    assert!(h.cluster.applied("legacy").is_empty());
}

#[tokio::test]
async fn route_hosts_policy_lost_race_is_conflict() {
    let h = route_hosts(BuilderConfig::default());
    h.cluster.race_namespace_create("acme");
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TenantConflict(_)), "{err:?}");
    assert!(h.cluster.applied("acme").is_empty());
}

#[tokio::test]
async fn invalid_name_touches_nothing() {
    let h = Harness::new();
    let err = h.orchestrator.provision(&TenantDescriptor::named("Not Valid")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Validation(_)));
    assert!(h.cluster.calls().is_empty());
    assert!(h.dns.records().is_empty());
}

#[tokio::test]
async fn frontend_service_failure_keeps_earlier_resources() {
    let h = Harness::new();
    h.cluster.fail_apply(ResourceKind::FrontendService);
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    match err {
        ProvisionError::ResourceApply { resource_kind, namespace, .. } => {
            assert_eq!(resource_kind, "frontend-service");
            assert_eq!(namespace, "acme");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.cluster.applied("acme"), vec![ResourceKind::BackendWorkload, ResourceKind::BackendService, ResourceKind::FrontendWorkload]);
    assert!(h.cluster.has_namespace("acme"));
    assert!(h.dns.records().is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn dns_failure_leaves_resources_but_no_registry_entry() {
    let h = Harness::new();
    h.dns.reject("api.acme.central.local");
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::DnsUpdate { ref host, .. } if host == "api.acme.central.local"), "{err:?}");
    assert_eq!(h.cluster.applied("acme"), ALL_KINDS.to_vec());
    assert_eq!(h.dns.hosts(), vec!["acme.central.local".to_string()]);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn dns_failure_on_domain_skips_api_domain() {
    let h = Harness::new();
    h.dns.reject("acme.central.local");
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::DnsUpdate { ref host, .. } if host == "acme.central.local"), "{err:?}");
    assert!(h.dns.hosts().is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn cluster_outage_is_reported() {
    let h = Harness::new();
    h.cluster.set_unavailable(true);
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::ClusterUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn service_mode_exposes_without_ingress() {
    let cfg = BuilderConfig { routing_mode: RoutingMode::Service, frontend_node_port: Some(30080), ..BuilderConfig::default() };
    let h = Harness::with(cfg, OrchestratorOptions::default());
    h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap();
    assert_eq!(h.cluster.applied("acme"), ALL_KINDS[..4].to_vec());
    assert!(h.cluster.routes("acme").is_empty());
    let backend = h.cluster.service("acme", "backend").unwrap();
    assert_eq!(backend.exposure, ExposureMode::ExternalNameAlias { target: "api.acme.central.local".into() });
    let frontend = h.cluster.service("acme", "frontend").unwrap();
    assert_eq!(frontend.exposure, ExposureMode::NodePort { node_port: Some(30080) });
}

#[tokio::test]
async fn database_created_after_namespace() {
    let db = Arc::new(RecordingDatabase::new());
    let h = Harness::with_database(db.clone());
    h.orchestrator.provision(&TenantDescriptor::named("acme-corp")).await.unwrap();
    assert_eq!(db.created(), vec!["acme-corp".to_string()]);
}

#[tokio::test]
async fn database_failure_stops_before_resources() {
    let db = Arc::new(RecordingDatabase::new());
    db.fail();
    let h = Harness::with_database(db);
    let err = h.orchestrator.provision(&TenantDescriptor::named("acme")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Database { .. }), "{err:?}");
    assert!(h.cluster.has_namespace("acme"));
    assert!(h.cluster.applied("acme").is_empty());
}

#[tokio::test]
async fn concurrent_distinct_tenants_both_succeed() {
    let h = Harness::new();
    let alpha = TenantDescriptor::named("alpha");
    let bravo = TenantDescriptor::named("bravo");
    let (a, b) = tokio::join!(
        h.orchestrator.provision(&alpha),
        h.orchestrator.provision(&bravo),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(h.cluster.applied("alpha"), ALL_KINDS.to_vec());
    assert_eq!(h.cluster.applied("bravo"), ALL_KINDS.to_vec());
    assert_eq!(h.registry.len(), 2);
}
