//! Session endpoints: password login, explicit refresh, logout, current user.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;

use crate::app::dto::{LoginRequest, SessionView};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::CurrentPrincipal;
use crate::middleware::{CookieSettings, SessionEnded, REFRESH_COOKIE};

pub fn router() -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, pair) = services
        .sessions
        .login(&req.email, &req.password, Utc::now())
        .await?;

    let cookies = CookieSettings::from(&services.config);
    Ok((cookies.with_session(jar, &pair), Json(SessionView::new(&user, &pair))))
}

/// POST /auth/refresh - rotate the pair held in the refresh cookie.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthenticated("refresh token missing".to_string()))?;

    let (user, pair) = services.sessions.refresh(&token, Utc::now()).await?;

    let cookies = CookieSettings::from(&services.config);
    Ok((cookies.with_session(jar, &pair), Json(SessionView::new(&user, &pair))))
}

/// POST /auth/logout
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    services.sessions.logout(principal.user_id, Utc::now()).await?;

    let cookies = CookieSettings::from(&services.config);
    Ok((
        cookies.cleared(jar),
        Extension(SessionEnded),
        Json(serde_json::json!({ "loggedOut": true })),
    ))
}

/// GET /auth/me
pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> impl IntoResponse {
    Json(principal)
}
