//! Super-admin IAM: permission catalog, role bundles and delegated accounts.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use chrono::Utc;

use academia_core::{GrantId, PermissionId, RoleId};
use academia_infra::iam::{CreateGrantRequest, CreateRoleRequest, UpdateGrantRequest, UpdateRoleRequest};

use crate::app::dto::CreatePermissionRequest;
use crate::app::errors::ApiError;
use crate::app::routes::{requires_any, requires_roles, SUPER_ADMIN_ONLY};
use crate::app::services::AppServices;
use crate::context::CurrentPrincipal;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router(services: &Arc<AppServices>) -> Router {
    let s = services;
    let delegated = |route: MethodRouter, permission: &'static str| {
        requires_roles(requires_any(route, s, &[permission]), SUPER_ADMIN_ONLY)
    };

    Router::new()
        // Permission catalog
        .route("/iam/permissions", requires_any(get(list_permissions), s, &["users:read"]))
        .route("/iam/permissions", requires_any(post(create_permission), s, &["system:manage"]))
        .route(
            "/iam/permissions/:id",
            requires_any(delete(delete_permission), s, &["system:manage"]),
        )
        // Role bundles
        .route("/iam/roles", requires_any(get(list_roles), s, &["system:manage"]))
        .route("/iam/roles", requires_any(post(create_role), s, &["system:manage"]))
        .route("/iam/roles/:id", requires_any(get(get_role), s, &["system:manage"]))
        .route("/iam/roles/:id", requires_any(put(update_role), s, &["system:manage"]))
        .route("/iam/roles/:id", requires_any(delete(delete_role), s, &["system:manage"]))
        // Delegated accounts
        .route("/iam/delegated-accounts", delegated(get(list_delegated), "users:read"))
        .route("/iam/delegated-accounts", delegated(post(create_delegated), "users:create"))
        .route("/iam/delegated-accounts/:id", delegated(get(get_delegated), "users:read"))
        .route("/iam/delegated-accounts/:id", delegated(put(update_delegated), "users:update"))
        .route(
            "/iam/delegated-accounts/:id/suspend",
            delegated(post(suspend_delegated), "users:update"),
        )
        .route(
            "/iam/delegated-accounts/:id/unsuspend",
            delegated(post(unsuspend_delegated), "users:update"),
        )
        .route(
            "/iam/delegated-accounts/:id/revoke",
            delegated(post(revoke_delegated), "users:update"),
        )
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission catalog
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.iam.get_all_permissions().await?))
}

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let permission = services
        .iam
        .create_permission(&req.resource, &req.action, req.description, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<PermissionId>,
) -> Result<impl IntoResponse, ApiError> {
    services.iam.delete_permission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.iam.list_roles().await?))
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = services.iam.create_role(req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.iam.get_role(id).await?))
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.iam.update_role(id, req, Utc::now()).await?))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
) -> Result<impl IntoResponse, ApiError> {
    services.iam.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Delegated accounts
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_delegated(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.iam.list_delegated_accounts(Utc::now()).await?))
}

pub async fn create_delegated(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<CreateGrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let grant = services
        .iam
        .create_delegated_account(req, principal.user_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn get_delegated(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.iam.get_delegated_account(id, Utc::now()).await?))
}

pub async fn update_delegated(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<GrantId>,
    Json(req): Json<UpdateGrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .iam
            .update_delegated_account(id, req, Utc::now())
            .await?,
    ))
}

pub async fn suspend_delegated(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .iam
            .suspend_delegated_account(id, principal.user_id, Utc::now())
            .await?,
    ))
}

pub async fn unsuspend_delegated(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .iam
            .unsuspend_delegated_account(id, principal.user_id, Utc::now())
            .await?,
    ))
}

pub async fn revoke_delegated(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .iam
            .revoke_delegated_account(id, principal.user_id, Utc::now())
            .await?,
    ))
}
