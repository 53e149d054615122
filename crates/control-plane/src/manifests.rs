//! Static YAML rendering of a tenant's resources, for manual `kubectl apply`.
//! Uses the same object conversion as the live gateway.
use serde::Serialize;
use crate::{k8s, models::{namespace_labels, TenantResources}};

/// One rendered object, named after the file it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest { pub file_name: &'static str, pub yaml: String }

fn to_yaml<T: Serialize>(obj: &T) -> Result<String, serde_yaml::Error> { serde_yaml::to_string(obj) }

/// Render every object of `r` in application order, namespace first.
pub fn render(r: &TenantResources) -> Result<Vec<Manifest>, serde_yaml::Error> {
    let ns = r.namespace.as_str();
    let labels = namespace_labels(ns);
    let mut out = vec![
        Manifest { file_name: "namespace.yaml", yaml: to_yaml(&k8s::namespace(ns, &labels))? },
        Manifest { file_name: "backend-deployment.yaml", yaml: to_yaml(&k8s::deployment(ns, &r.backend_workload))? },
        Manifest { file_name: "backend-service.yaml", yaml: to_yaml(&k8s::service(ns, &r.backend_service))? },
        Manifest { file_name: "frontend-deployment.yaml", yaml: to_yaml(&k8s::deployment(ns, &r.frontend_workload))? },
        Manifest { file_name: "frontend-service.yaml", yaml: to_yaml(&k8s::service(ns, &r.frontend_service))? },
    ];
    if let Some(route) = &r.route {
        out.push(Manifest { file_name: "ingress.yaml", yaml: to_yaml(&k8s::ingress(ns, route))? });
    }
    Ok(out)
}

/// Join manifests into one multi-document stream.
pub fn to_stream(manifests: &[Manifest]) -> String {
    manifests.iter().map(|m| m.yaml.trim_end()).collect::<Vec<_>>().join("\n---\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::TenantDescriptor, resources::{BuilderConfig, RoutingMode, SpecBuilder}};

    #[test]
    fn ingress_mode_renders_six_documents() {
        let r = SpecBuilder::new(BuilderConfig::default()).build(&TenantDescriptor::named("acme")).unwrap();
        let m = render(&r).unwrap();
        let files: Vec<_> = m.iter().map(|m| m.file_name).collect();
        assert_eq!(files, vec![
            "namespace.yaml",
            "backend-deployment.yaml",
            "backend-service.yaml",
            "frontend-deployment.yaml",
            "frontend-service.yaml",
            "ingress.yaml",
        ]);
        let stream = to_stream(&m);
        assert_eq!(stream.matches("\n---\n").count(), 5);
        assert!(stream.contains("host: acme.central.local"));
        assert!(stream.contains("host: api.acme.central.local"));
    }

    #[test]
    fn service_mode_has_no_ingress() {
        let cfg = BuilderConfig { routing_mode: RoutingMode::Service, ..BuilderConfig::default() };
        let r = SpecBuilder::new(cfg).build(&TenantDescriptor::named("acme")).unwrap();
        let m = render(&r).unwrap();
        assert_eq!(m.len(), 5);
        let backend: serde_yaml::Value = serde_yaml::from_str(&m[2].yaml).unwrap();
        assert_eq!(backend["spec"]["type"], serde_yaml::Value::from("ExternalName"));
    }
}
