//! Environment-sourced process configuration.
use std::{net::SocketAddr, path::PathBuf, str::FromStr};
use tracing::debug;
use crate::{orchestrator::ConflictPolicy, resources::{BuilderConfig, RoutingMode}};

pub const DEFAULT_MAIN_DOMAIN: &str = "central.local";
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://tenant1.central.local:3000", "http://api.tenant1.central.local", "http://localhost:3000"];

#[derive(Debug, thiserror::Error)]
#[error("config error: {key}: {message}")]
pub struct ConfigError { pub key: &'static str, pub message: String }

/// Where cluster credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeSource {
    InCluster,
    /// `path = None` lets the client resolve the default kubeconfig location.
    Kubeconfig { path: Option<PathBuf>, context: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub enabled: bool,
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl DatabaseSettings {
    /// Connection URL of the `postgres` maintenance database.
    pub fn admin_url(&self) -> String { format!("postgres://{}:{}@{}:{}/postgres", self.user, self.password, self.host, self.port) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub server: String,
    pub zone: String,
    pub ttl: u32,
    pub ingress_ip: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub main_domain: String,
    pub environment: String,
    pub kube: KubeSource,
    pub database: DatabaseSettings,
    pub dns: DnsSettings,
    pub builder: BuilderConfig,
    pub conflict_policy: ConflictPolicy,
    pub cors_origins: Vec<String>,
    pub bind_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let main_domain = get("MAIN_DOMAIN").unwrap_or_else(|| DEFAULT_MAIN_DOMAIN.to_string());
        let environment = get("ENVIRONMENT").unwrap_or_else(|| "production".to_string());
        let kube = if get("KUBERNETES_SERVICE_HOST").is_some() { KubeSource::InCluster } else {
            KubeSource::Kubeconfig { path: get("KUBECONFIG").map(PathBuf::from), context: get("KUBE_CONTEXT") }
        };
        let database = DatabaseSettings {
            enabled: get("TENANT_DATABASES").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
            host: get("DB_HOST").unwrap_or_else(|| "localhost".into()),
            user: get("DB_USER").unwrap_or_else(|| "postgres".into()),
            password: get("DB_PASSWORD").unwrap_or_else(|| "password".into()),
            port: parse_or("DB_PORT", get("DB_PORT"), 5432)?,
        };
        let dns = DnsSettings {
            api_url: get("DNS_API_URL"),
            api_key: get("DNS_API_KEY"),
            server: get("DNS_SERVER").unwrap_or_else(|| "localhost".into()),
            zone: get("DNS_ZONE").unwrap_or_else(|| format!("{main_domain}.")),
            ttl: parse_or("DNS_TTL", get("DNS_TTL"), 300)?,
            ingress_ip: get("INGRESS_IP").unwrap_or_else(|| "127.0.0.1".into()),
        };
        let defaults = BuilderConfig::default();
        let builder = BuilderConfig {
            main_domain: main_domain.clone(),
            routing_mode: parse_or("ROUTING_MODE", get("ROUTING_MODE"), RoutingMode::Ingress)?,
            backend_image: get("BACKEND_IMAGE").unwrap_or(defaults.backend_image),
            frontend_image: get("FRONTEND_IMAGE").unwrap_or(defaults.frontend_image),
            backend_port: parse_or("BACKEND_PORT", get("BACKEND_PORT"), defaults.backend_port)?,
            frontend_port: parse_or("FRONTEND_PORT", get("FRONTEND_PORT"), defaults.frontend_port)?,
            replicas: parse_or("REPLICAS", get("REPLICAS"), defaults.replicas)?,
            frontend_image_pull_policy: get("FRONTEND_IMAGE_PULL_POLICY"),
            frontend_node_port: get("FRONTEND_NODE_PORT").map(|v| parse_value("FRONTEND_NODE_PORT", &v)).transpose()?,
            ingress_class: get("INGRESS_CLASS"),
        };
        let conflict_policy = parse_or("CONFLICT_POLICY", get("CONFLICT_POLICY"), ConflictPolicy::NamespaceIdentity)?;
        let cors_origins = match get("CORS_ORIGINS") {
            Some(list) => list.split(',').filter_map(|s| { let t = s.trim(); if t.is_empty() { None } else { Some(t.to_string()) } }).collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };
        let bind_addr = parse_or("BIND_ADDR", get("BIND_ADDR"), SocketAddr::from(([0, 0, 0, 0], 8000)))?;
        let settings = Self { main_domain, environment, kube, database, dns, builder, conflict_policy, cors_origins, bind_addr };
        debug!(main_domain=%settings.main_domain, environment=%settings.environment, routing_mode=?settings.builder.routing_mode, "config.loaded");
        Ok(settings)
    }

    /// DNS publication is skipped entirely in development.
    pub fn is_development(&self) -> bool { self.environment.eq_ignore_ascii_case("development") }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where T::Err: std::fmt::Display {
    raw.parse::<T>().map_err(|e| ConfigError { key, message: format!("invalid value {raw:?}: {e}") })
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where T::Err: std::fmt::Display {
    match raw { Some(v) => parse_value(key, &v), None => Ok(default) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.main_domain, "central.local");
        assert!(!s.is_development());
        assert_eq!(s.dns.zone, "central.local.");
        assert_eq!(s.dns.ttl, 300);
        assert_eq!(s.database.port, 5432);
        assert!(!s.database.enabled);
        assert_eq!(s.builder.routing_mode, RoutingMode::Ingress);
        assert_eq!(s.conflict_policy, ConflictPolicy::NamespaceIdentity);
        assert_eq!(s.cors_origins.len(), 3);
        assert_eq!(s.kube, KubeSource::Kubeconfig { path: None, context: None });
    }

    #[test]
    fn in_cluster_detection_and_overrides() {
        let s = settings(&[
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
            ("ENVIRONMENT", "development"),
            ("MAIN_DOMAIN", "example.org"),
            ("ROUTING_MODE", "service"),
            ("CORS_ORIGINS", "http://a, ,http://b"),
        ]).unwrap();
        assert_eq!(s.kube, KubeSource::InCluster);
        assert!(s.is_development());
        assert_eq!(s.builder.main_domain, "example.org");
        assert_eq!(s.builder.routing_mode, RoutingMode::Service);
        assert_eq!(s.cors_origins, vec!["http://a".to_string(), "http://b".to_string()]);
    }

    #[test]
    fn invalid_number_is_reported_with_key() {
        let err = settings(&[("DNS_TTL", "soon")]).unwrap_err();
        assert_eq!(err.key, "DNS_TTL");
        let err = settings(&[("CONFLICT_POLICY", "sometimes")]).unwrap_err();
        assert_eq!(err.key, "CONFLICT_POLICY");
    }
}
