//! Binary entrypoint for the Tenant Control Plane service.
use std::{sync::Arc, time::Duration};
use anyhow::Context;
use axum::{http::{Request, HeaderValue, header}, middleware::{self, Next}, response::Response, body::Body};
use tower_http::{limit::RequestBodyLimitLayer, cors::{AllowHeaders, AllowMethods, CorsLayer}};
use tracing::{info, warn};
use uuid::Uuid;
use tenant_control_plane::{
    build_router, AppState,
    config::Settings,
    db::PgDatabaseProvisioner,
    dns::HttpDnsUpdater,
    k8s::KubeGateway,
    orchestrator::{OrchestratorOptions, TenantOrchestrator},
    registry::InMemoryRegistry,
    resources::SpecBuilder,
    telemetry::{init_logging, normalize_path, HTTP_REQUESTS, HTTP_REQUEST_DURATION},
};

const MAX_BODY_BYTES: usize = 64 * 1024;

async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path_label = normalize_path(req.uri().path());
    let req_id = Uuid::new_v4();
    let start = std::time::Instant::now();
    let mut resp = next.run(req).await;
    let status = resp.status().as_u16().to_string();
    HTTP_REQUESTS.with_label_values(&[method.as_str(), path_label.as_str(), status.as_str()]).inc();
    HTTP_REQUEST_DURATION.with_label_values(&[method.as_str(), path_label.as_str()]).observe(start.elapsed().as_secs_f64());
    if let Ok(v) = HeaderValue::from_str(&req_id.to_string()) { resp.headers_mut().insert("x-request-id", v); }
    resp
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| match HeaderValue::from_str(o) {
        Ok(v) => Some(v),
        Err(_) => { warn!(origin=%o, "cors.origin_ignored"); None }
    }).collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([header::HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(600))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info")?;
    let settings = Settings::from_env()?;
    info!(
        main_domain=%settings.main_domain,
        environment=%settings.environment,
        conflict_policy=?settings.conflict_policy,
        "starting tenant control plane"
    );

    let cluster = KubeGateway::connect(&settings.kube).await.context("connect to kubernetes")?;
    let registry = Arc::new(InMemoryRegistry::new());
    let mut orchestrator = TenantOrchestrator::new(
        SpecBuilder::new(settings.builder.clone()),
        Arc::new(cluster),
        registry,
        OrchestratorOptions::from_settings(&settings),
    );
    match HttpDnsUpdater::from_settings(&settings.dns) {
        Some(updater) => orchestrator = orchestrator.with_dns(Arc::new(updater?)),
        None if settings.is_development() => info!("development environment, DNS publication disabled"),
        None => anyhow::bail!("DNS_API_URL must be set outside development"),
    }
    if settings.database.enabled {
        let db = PgDatabaseProvisioner::connect_lazy(&settings.database)?;
        orchestrator = orchestrator.with_database(Arc::new(db));
        info!(host=%settings.database.host, "per-tenant databases enabled");
    }
    let orchestrator = Arc::new(orchestrator);
    if let Err(e) = orchestrator.warm_registry().await { warn!(error=%e, "registry.warm_failed"); }

    let app = build_router(AppState { orchestrator })
        .layer(cors_layer(&settings.cors_origins))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn(track_metrics));

    let addr = settings.bind_addr;
    info!(%addr, "tenant control plane listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error=%e, "shutdown.signal_unavailable");
            std::future::pending::<()>().await;
        }
        info!(target: "shutdown.signal", "received Ctrl+C");
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
