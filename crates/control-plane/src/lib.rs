pub mod config;
pub mod db;
pub mod dns;
pub mod error;
pub mod handlers;
pub mod k8s;
pub mod manifests;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod resources;
pub mod telemetry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::sync::Arc;
use axum::{Router, routing::{get, post, delete}};
use handlers::{
    health::{health, root},
    tenants::{create_tenant, list_tenants, get_tenant, remove_tenant},
};
use utoipa::OpenApi;
use crate::{orchestrator::TenantOrchestrator, telemetry::metrics_handler};

#[derive(Clone)]
pub struct AppState { pub orchestrator: Arc<TenantOrchestrator> }

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::root,
        handlers::health::health,
        handlers::tenants::create_tenant,
        handlers::tenants::list_tenants,
        handlers::tenants::get_tenant,
        handlers::tenants::remove_tenant,
    ),
    components(schemas(
        error::ApiErrorBody,
        models::TenantDescriptor,
        models::TenantRecord,
        handlers::health::HealthResponse,
        handlers::health::RootResponse,
        handlers::tenants::CreateTenantResponse,
        handlers::tenants::ListTenantsResponse,
        handlers::tenants::MessageResponse,
    )),
    tags( (name = "tenants", description = "Tenant Control Plane API") )
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let openapi = ApiDoc::openapi();
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(|| async move { axum::Json(openapi.clone()) }))
        .route("/tenants", post(create_tenant).get(list_tenants))
        .route("/tenants/:name", get(get_tenant).delete(remove_tenant))
        // Legacy paths kept for existing clients.
        .route("/create-tenant/", post(create_tenant))
        .route("/list-namespaces", get(list_tenants))
        .route("/remove-namespace/:name", delete(remove_tenant))
        .with_state(state)
}
