use serial_test::serial;
use tenant_control_plane::{
    config::{KubeSource, Settings},
    orchestrator::{ConflictPolicy, OrchestratorOptions},
    resources::RoutingMode,
};

const KEYS: &[&str] = &["MAIN_DOMAIN", "ENVIRONMENT", "KUBERNETES_SERVICE_HOST", "ROUTING_MODE", "CONFLICT_POLICY", "DNS_TTL", "CORS_ORIGINS"];

fn clear() { for k in KEYS { std::env::remove_var(k); } }

#[test]
#[serial]
fn from_env_defaults() {
    clear();
    let s = Settings::from_env().unwrap();
    assert_eq!(s.main_domain, "central.local");
    assert!(!s.is_development());
    assert!(matches!(s.kube, KubeSource::Kubeconfig { .. }));
    assert_eq!(s.builder.routing_mode, RoutingMode::Ingress);
    assert!(OrchestratorOptions::from_settings(&s).publish_dns);
}

#[test]
#[serial]
fn from_env_development_in_cluster() {
    clear();
    std::env::set_var("MAIN_DOMAIN", "tenants.example.org");
    std::env::set_var("ENVIRONMENT", "development");
    std::env::set_var("KUBERNETES_SERVICE_HOST", "10.0.0.1");
    std::env::set_var("ROUTING_MODE", "service");
    std::env::set_var("CONFLICT_POLICY", "hosts");
    std::env::set_var("CORS_ORIGINS", "http://a.test, http://b.test");
    let s = Settings::from_env().unwrap();
    clear();
    assert_eq!(s.kube, KubeSource::InCluster);
    assert_eq!(s.builder.main_domain, "tenants.example.org");
    assert_eq!(s.dns.zone, "tenants.example.org.");
    assert_eq!(s.builder.routing_mode, RoutingMode::Service);
    assert_eq!(s.cors_origins, vec!["http://a.test", "http://b.test"]);
    let opts = OrchestratorOptions::from_settings(&s);
    assert!(!opts.publish_dns);
    assert_eq!(opts.conflict_policy, ConflictPolicy::RouteHosts);
}

#[test]
#[serial]
fn from_env_rejects_bad_numbers() {
    clear();
    std::env::set_var("DNS_TTL", "soon");
    let err = Settings::from_env().unwrap_err();
    clear();
    assert_eq!(err.key, "DNS_TTL");
}
