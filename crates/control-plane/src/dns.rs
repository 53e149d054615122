//! DNS updater: replaces a single record set in a zone through the DNS server's HTTP API.
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use crate::{config::DnsSettings, error::{ProvisionError, ProvisionResult}};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType { A, Aaaa, Cname }

impl RecordType {
    pub fn as_str(self) -> &'static str { match self { Self::A => "A", Self::Aaaa => "AAAA", Self::Cname => "CNAME" } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub zone: String,
    pub host: String,
    pub record_type: RecordType,
    pub value: String,
    pub ttl: u32,
}

/// Record-replace against a zone. One call per host; calls are not transactional.
#[async_trait]
pub trait DnsUpdater: Send + Sync + 'static {
    async fn publish(&self, record: &DnsRecord) -> ProvisionResult<()>;
}

fn fqdn(name: &str) -> String { if name.ends_with('.') { name.to_string() } else { format!("{name}.") } }

/// PATCH body replacing the record set of `record.host`.
pub fn rrset_patch(record: &DnsRecord) -> Value {
    json!({
        "rrsets": [{
            "name": fqdn(&record.host),
            "type": record.record_type.as_str(),
            "ttl": record.ttl,
            "changetype": "REPLACE",
            "records": [{ "content": record.value, "disabled": false }]
        }]
    })
}

#[derive(Debug, Clone)]
pub struct HttpDnsUpdater { client: reqwest::Client, base_url: String, server: String, api_key: Option<String> }

impl HttpDnsUpdater {
    pub fn new(base_url: impl Into<String>, server: impl Into<String>, api_key: Option<String>) -> ProvisionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProvisionError::DnsUpdate { host: "-".into(), cause: format!("http client: {e}") })?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), server: server.into(), api_key })
    }

    /// `None` when no DNS API URL is configured.
    pub fn from_settings(s: &DnsSettings) -> Option<ProvisionResult<Self>> {
        s.api_url.as_ref().map(|url| Self::new(url.clone(), s.server.clone(), s.api_key.clone()))
    }

    fn zone_url(&self, zone: &str) -> String { format!("{}/api/v1/servers/{}/zones/{}", self.base_url, self.server, fqdn(zone)) }
}

#[async_trait]
impl DnsUpdater for HttpDnsUpdater {
    async fn publish(&self, record: &DnsRecord) -> ProvisionResult<()> {
        let url = self.zone_url(&record.zone);
        debug!(%url, host=%record.host, record_type=record.record_type.as_str(), "dns.publish.attempt");
        let mut req = self.client.patch(&url).json(&rrset_patch(record));
        if let Some(key) = &self.api_key { req = req.header("X-API-Key", key); }
        let err = |cause: String| ProvisionError::DnsUpdate { host: record.host.clone(), cause };
        let resp = req.send().await.map_err(|e| err(format!("transport: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            info!(host=%record.host, value=%record.value, ttl=record.ttl, "dns record replaced");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(host=%record.host, %status, body=%body, "dns.publish.rejected");
        Err(err(format!("server rejected update with {status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::patch, extract::{State, Path}, http::{StatusCode, HeaderMap}, Json};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn spawn_dns(status: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/api/v1/servers/:server/zones/:zone", patch(move |
                State(seen): State<Seen>,
                Path((_server, zone)): Path<(String, String)>,
                headers: HeaderMap,
                Json(body): Json<Value>,
            | async move {
                let key = headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::to_string);
                seen.lock().unwrap().push((zone, key, body));
                (status, "rejected")
            }))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
        (format!("http://{addr}"), seen)
    }

    fn record(host: &str) -> DnsRecord {
        DnsRecord { zone: "central.local".into(), host: host.into(), record_type: RecordType::A, value: "10.0.0.5".into(), ttl: 300 }
    }

    #[test]
    fn patch_body_replaces_fqdn_rrset() {
        let v = rrset_patch(&record("acme.central.local"));
        assert_eq!(v["rrsets"][0]["name"], "acme.central.local.");
        assert_eq!(v["rrsets"][0]["changetype"], "REPLACE");
        assert_eq!(v["rrsets"][0]["type"], "A");
        assert_eq!(v["rrsets"][0]["ttl"], 300);
        assert_eq!(v["rrsets"][0]["records"][0]["content"], "10.0.0.5");
    }

    #[tokio::test]
    async fn publish_sends_patch_with_api_key() {
        let (url, seen) = spawn_dns(StatusCode::NO_CONTENT).await;
        let dns = HttpDnsUpdater::new(url, "localhost", Some("secret".into())).unwrap();
        dns.publish(&record("acme.central.local")).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "central.local.");
        assert_eq!(seen[0].1.as_deref(), Some("secret"));
        assert_eq!(seen[0].2["rrsets"][0]["name"], "acme.central.local.");
    }

    #[tokio::test]
    async fn rejected_update_maps_to_dns_error() {
        let (url, _seen) = spawn_dns(StatusCode::UNPROCESSABLE_ENTITY).await;
        let dns = HttpDnsUpdater::new(url, "localhost", None).unwrap();
        let err = dns.publish(&record("api.acme.central.local")).await.unwrap_err();
        match err {
            ProvisionError::DnsUpdate { host, cause } => { assert_eq!(host, "api.acme.central.local"); assert!(cause.contains("422")); }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
