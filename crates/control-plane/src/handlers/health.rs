use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse { pub status: &'static str }

#[derive(Serialize, ToSchema)]
pub struct RootResponse { pub message: &'static str }

/// Health check endpoint
#[utoipa::path(get, path = "/health", responses( (status = 200, body = HealthResponse) ))]
pub async fn health() -> Json<HealthResponse> { Json(HealthResponse { status: "ok" }) }

/// Static root payload
#[utoipa::path(get, path = "/", responses( (status = 200, body = RootResponse) ))]
pub async fn root() -> Json<RootResponse> { Json(RootResponse { message: "hello world" }) }
