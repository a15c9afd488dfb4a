//! Tenant-scoped endpoints. Every handler here runs behind the school context
//! guard, so a [`CurrentSchool`] is always available.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put, MethodRouter},
    Json, Router,
};
use chrono::Utc;

use academia_auth::Permission;
use academia_core::GrantId;
use academia_infra::iam::{CreateGrantRequest, UpdateGrantRequest};

use crate::app::dto::{PermissionCheckQuery, PermissionCheckView};
use crate::app::errors::ApiError;
use crate::app::routes::{requires_roles, requires_school_permission, SCHOOL_ADMINS};
use crate::app::services::AppServices;
use crate::context::{CurrentPrincipal, CurrentSchool};
use crate::guards::require_school_permission;

pub fn router() -> Router {
    let admins = |route: MethodRouter, permission: &'static str| {
        requires_roles(requires_school_permission(route, permission), SCHOOL_ADMINS)
    };

    Router::new()
        .route("/school/context", get(context))
        .route("/school/check", get(check_permission))
        .route("/school/admins", admins(get(list_admins), "users:read"))
        .route("/school/admins", admins(post(create_admin), "users:create"))
        .route("/school/admins/:id", admins(get(get_admin), "users:read"))
        .route("/school/admins/:id", admins(put(update_admin), "users:update"))
        .route("/school/admins/:id/suspend", admins(post(suspend_admin), "users:update"))
        .route("/school/admins/:id/unsuspend", admins(post(unsuspend_admin), "users:update"))
        .route("/school/admins/:id/revoke", admins(post(revoke_admin), "users:update"))
}

/// GET /school/context
pub async fn context(school: CurrentSchool) -> impl IntoResponse {
    Json(school.0)
}

/// GET /school/check?permission=resource:action
pub async fn check_permission(
    CurrentPrincipal(principal): CurrentPrincipal,
    school: CurrentSchool,
    Query(query): Query<PermissionCheckQuery>,
) -> impl IntoResponse {
    let permission = Permission::from(query.permission.trim());
    let outcome = require_school_permission(&principal, &school.0, &permission);
    Json(PermissionCheckView {
        school_id: school.school_id(),
        permission: permission.to_string(),
        allowed: outcome.is_ok(),
        reason: outcome.err().map(|err| err.to_string()),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Delegated school admins
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_admins(
    Extension(services): Extension<Arc<AppServices>>,
    school: CurrentSchool,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .school_admins
            .list(school.school_id(), Utc::now())
            .await?,
    ))
}

pub async fn create_admin(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    school: CurrentSchool,
    Json(req): Json<CreateGrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let grant = services
        .school_admins
        .create(school.school_id(), req, principal.user_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn get_admin(
    Extension(services): Extension<Arc<AppServices>>,
    school: CurrentSchool,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .school_admins
            .get(school.school_id(), id, Utc::now())
            .await?,
    ))
}

pub async fn update_admin(
    Extension(services): Extension<Arc<AppServices>>,
    school: CurrentSchool,
    Path(id): Path<GrantId>,
    Json(req): Json<UpdateGrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .school_admins
            .update(school.school_id(), id, req, Utc::now())
            .await?,
    ))
}

pub async fn suspend_admin(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    school: CurrentSchool,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .school_admins
            .suspend(school.school_id(), id, principal.user_id, Utc::now())
            .await?,
    ))
}

pub async fn unsuspend_admin(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    school: CurrentSchool,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .school_admins
            .unsuspend(school.school_id(), id, principal.user_id, Utc::now())
            .await?,
    ))
}

pub async fn revoke_admin(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    school: CurrentSchool,
    Path(id): Path<GrantId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        services
            .school_admins
            .revoke(school.school_id(), id, principal.user_id, Utc::now())
            .await?,
    ))
}
