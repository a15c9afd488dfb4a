//! Super-admin school management.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use academia_auth::School;
use academia_core::SchoolId;

use crate::app::dto::CreateSchoolRequest;
use crate::app::errors::ApiError;
use crate::app::routes::requires_any;
use crate::app::services::AppServices;

pub fn router(services: &Arc<AppServices>) -> Router {
    Router::new()
        .route("/schools", requires_any(get(list_schools), services, &["schools:read"]))
        .route("/schools", requires_any(post(create_school), services, &["schools:create"]))
        .route("/schools/:id", requires_any(get(get_school), services, &["schools:read"]))
        .route(
            "/schools/:id",
            requires_any(delete(deactivate_school), services, &["schools:delete"]),
        )
}

/// GET /schools
pub async fn list_schools(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    let schools = services.stores.schools.list().await?;
    Ok(Json(schools))
}

/// GET /schools/:id
pub async fn get_school(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<SchoolId>,
) -> Result<impl IntoResponse, ApiError> {
    let school = services
        .stores
        .schools
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("school".to_string()))?;
    Ok(Json(school))
}

/// POST /schools
pub async fn create_school(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreateSchoolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let school = School::new(&req.name, &req.code, Utc::now())?;
    services.stores.schools.insert(school.clone()).await?;
    info!(event = "school_created", school_id = %school.id, code = %school.code);
    Ok((StatusCode::CREATED, Json(school)))
}

/// DELETE /schools/:id - marks the school inactive; rows are never removed.
pub async fn deactivate_school(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<SchoolId>,
) -> Result<impl IntoResponse, ApiError> {
    let mut school = services
        .stores
        .schools
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("school".to_string()))?;
    school.deactivate(Utc::now());
    services.stores.schools.update(&school).await?;
    info!(event = "school_deactivated", school_id = %school.id);
    Ok(Json(school))
}
