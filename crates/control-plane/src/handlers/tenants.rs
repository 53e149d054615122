use axum::{Json, http::StatusCode, extract::{Path, State, rejection::JsonRejection}};
use serde::Serialize;
use utoipa::ToSchema;
use crate::{AppState, models::{TenantDescriptor, TenantRecord}, error::{ApiError, ApiErrorBody, ApiResult}, telemetry::record_operation};

#[derive(Serialize, ToSchema)]
pub struct CreateTenantResponse { pub name: String, pub domain: String, pub api_domain: String, pub message: String }

#[derive(Serialize, ToSchema)]
pub struct ListTenantsResponse { pub namespaces: Vec<TenantRecord> }

#[derive(Serialize, ToSchema)]
pub struct MessageResponse { pub message: String }

/// Provision a tenant
#[utoipa::path(post, path = "/tenants", request_body = TenantDescriptor, responses(
    (status = 201, body = CreateTenantResponse),
    (status = 400, body = ApiErrorBody, description = "invalid descriptor or tenant conflict"),
    (status = 500, body = ApiErrorBody, description = "cluster or DNS failure")
))]
#[tracing::instrument(level = "info", skip(state, body), fields(tenant = tracing::field::Empty))]
pub async fn create_tenant(
    State(state): State<AppState>,
    body: Result<Json<TenantDescriptor>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateTenantResponse>)> {
    let Json(descriptor) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    tracing::Span::current().record("tenant", descriptor.name.as_str());
    let result = state.orchestrator.provision(&descriptor).await;
    record_operation("create", &result);
    let record = result?;
    let message = format!("Tenant {} successfully created with domains {} and {}.", record.name, record.domain, record.api_domain);
    Ok((StatusCode::CREATED, Json(CreateTenantResponse { name: record.name, domain: record.domain, api_domain: record.api_domain, message })))
}

/// List managed tenants
#[utoipa::path(get, path = "/tenants", responses( (status = 200, body = ListTenantsResponse), (status = 500, body = ApiErrorBody) ))]
#[tracing::instrument(level = "debug", skip(state))]
pub async fn list_tenants(State(state): State<AppState>) -> ApiResult<Json<ListTenantsResponse>> {
    let result = state.orchestrator.list().await;
    record_operation("list", &result);
    Ok(Json(ListTenantsResponse { namespaces: result? }))
}

/// Look up one tenant
#[utoipa::path(
    get, path = "/tenants/{name}",
    params(("name" = String, Path, description = "Tenant name")),
    responses( (status = 200, body = TenantRecord), (status = 404, body = ApiErrorBody) )
)]
#[tracing::instrument(level = "debug", skip(state))]
pub async fn get_tenant(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<TenantRecord>> {
    let result = state.orchestrator.get(&name).await;
    record_operation("get", &result);
    Ok(Json(result?))
}

/// Remove a tenant and everything in its namespace
#[utoipa::path(
    delete, path = "/tenants/{name}",
    params(("name" = String, Path, description = "Tenant name")),
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, body = ApiErrorBody),
        (status = 500, body = ApiErrorBody)
    )
)]
#[tracing::instrument(level = "info", skip(state))]
pub async fn remove_tenant(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<MessageResponse>> {
    let result = state.orchestrator.deprovision(&name).await;
    record_operation("remove", &result);
    result?;
    Ok(Json(MessageResponse { message: format!("Namespace {name} deleted successfully") }))
}
