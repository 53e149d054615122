use axum::{response::{IntoResponse, Response}, Json, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;
use std::fmt::{Display, Formatter};

/// Failure of a tenant operation. Anything after validation may leave partially
/// applied cluster state behind; nothing is rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid tenant: {0}")]
    Validation(String),
    #[error("tenant conflict: {0}")]
    TenantConflict(String),
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),
    #[error("failed to apply {resource_kind} in namespace {namespace}: {cause}")]
    ResourceApply { resource_kind: String, namespace: String, cause: String },
    #[error("dns update failed for {host}: {cause}")]
    DnsUpdate { host: String, cause: String },
    #[error("database provisioning failed for {tenant}: {cause}")]
    Database { tenant: String, cause: String },
    #[error("not found: {0}")]
    NotFound(String),
}

impl ProvisionError {
    pub fn resource_apply(resource_kind: impl Into<String>, namespace: impl Into<String>, cause: impl Display) -> Self {
        Self::ResourceApply { resource_kind: resource_kind.into(), namespace: namespace.into(), cause: cause.to_string() }
    }

    /// Stable machine-readable code, also used as the metrics outcome label.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::TenantConflict(_) => "tenant_conflict",
            Self::ClusterUnavailable(_) => "cluster_unavailable",
            Self::ResourceApply { .. } => "resource_apply_error",
            Self::DnsUpdate { .. } => "dns_update_error",
            Self::Database { .. } => "database_error",
            Self::NotFound(_) => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::TenantConflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorBody { pub code: &'static str, pub message: String }

#[derive(Debug, Clone)]
pub struct ApiError { pub status: StatusCode, pub code: &'static str, pub message: String }

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }
    pub fn bad_request(msg: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "bad_request", msg) }
    pub fn internal(msg: impl Into<String>) -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg) }
}

impl From<ProvisionError> for ApiError {
    fn from(e: ProvisionError) -> Self { Self::new(e.status(), e.code(), e.to_string()) }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}: {}", self.code, self.message) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { code: self.code, message: self.message };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
