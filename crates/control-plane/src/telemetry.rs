use prometheus::{TextEncoder, Encoder, Registry, IntCounterVec, HistogramVec, HistogramOpts, opts};
use once_cell::sync::Lazy;
use axum::{response::IntoResponse, http::StatusCode};
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(opts!("http_requests_total", "HTTP request count"), &["method", "path", "status"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(HistogramOpts::new("http_request_duration_seconds", "HTTP request latency"), &["method", "path"]).unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});
pub static TENANT_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(opts!("tenant_operations_total", "Tenant operations by outcome"), &["operation", "outcome"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

/// Record one tenant operation; `outcome` is `ok` or the error code.
pub fn record_operation<T>(operation: &str, result: &Result<T, crate::error::ProvisionError>) {
    let outcome = match result { Ok(_) => "ok", Err(e) => e.code() };
    TENANT_OPERATIONS.with_label_values(&[operation, outcome]).inc();
}

/// Collapse tenant names out of request paths to keep label cardinality bounded.
pub fn normalize_path(path: &str) -> String {
    let segs: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match segs.as_slice() {
        ["", "tenants", _] => "/tenants/:name".to_string(),
        ["", "remove-namespace", _] => "/remove-namespace/:name".to_string(),
        _ => if path.is_empty() { "/".to_string() } else { path.to_string() },
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() { return StatusCode::INTERNAL_SERVER_ERROR.into_response(); }
    ([("Content-Type","text/plain; version=0.0.4")], buf).into_response()
}

/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let base = fmt::layer().with_target(false);
    if std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false) {
        tracing_subscriber::registry().with(env).with(base.json()).try_init()?;
    } else {
        tracing_subscriber::registry().with(env).with(base.compact()).try_init()?;
    }
    Ok(())
}
