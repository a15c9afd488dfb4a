use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;

use academia_auth::Principal;
use academia_infra::{SessionService, TokenPair};

use crate::app::errors::ApiError;
use crate::config::AppConfig;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Paths the session middleware never touches.
const AUTH_EXEMPT_PREFIXES: [&str; 8] = [
    "/auth/login",
    "/auth/register",
    "/auth/refresh",
    "/auth/forgot-password",
    "/auth/reset-password",
    "/auth/verify-email",
    "/auth/csrf-token",
    "/super-admin/auth/login",
];

pub fn is_auth_exempt(path: &str) -> bool {
    AUTH_EXEMPT_PREFIXES.iter().any(|prefix| under_prefix(path, prefix))
}

/// `path` is `prefix` itself or a sub-path of it; `/authors` is not under `/auth`.
pub(crate) fn under_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Attributes shared by both session cookies.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
    pub access_max_age_secs: i64,
    pub refresh_max_age_secs: i64,
}

impl From<&AppConfig> for CookieSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            secure: config.secure_cookies(),
            access_max_age_secs: config.access_ttl.num_seconds(),
            refresh_max_age_secs: config.refresh_ttl.num_seconds(),
        }
    }
}

impl CookieSettings {
    fn cookie(&self, name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }

    /// Add both session cookies for a freshly issued pair.
    pub fn with_session(&self, jar: CookieJar, pair: &TokenPair) -> CookieJar {
        jar.add(self.cookie(ACCESS_COOKIE, pair.access_token.clone(), self.access_max_age_secs))
            .add(self.cookie(REFRESH_COOKIE, pair.refresh_token.clone(), self.refresh_max_age_secs))
    }

    /// Expire both session cookies.
    pub fn cleared(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build((ACCESS_COOKIE, "")).path("/"))
            .remove(Cookie::build((REFRESH_COOKIE, "")).path("/"))
    }
}

/// Response marker: the handler ended the session, so a silent refresh must
/// not put cookies back.
#[derive(Debug, Clone, Copy)]
pub struct SessionEnded;

#[derive(Clone)]
pub struct SessionState {
    pub sessions: SessionService,
    pub cookies: CookieSettings,
}

/// Resolve the caller from the session cookies.
///
/// Never rejects: an anonymous request continues without a [`Principal`], and
/// rejection is left to the guards. A silent refresh sets both cookies on the
/// response unless the handler marked it with [`SessionEnded`].
pub async fn session_middleware(
    State(state): State<SessionState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if is_auth_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let access = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    if access.is_none() && refresh.is_none() {
        return next.run(req).await;
    }

    let outcome = state
        .sessions
        .authenticate(access.as_deref(), refresh.as_deref(), Utc::now())
        .await;

    if let Some(user) = outcome.result.user() {
        req.extensions_mut().insert(Principal::from(user));
    }
    req.extensions_mut().insert(outcome.result);

    let response = next.run(req).await;
    match outcome.rotated {
        Some(_) if response.extensions().get::<SessionEnded>().is_some() => response,
        Some(pair) => (state.cookies.with_session(jar, &pair), response).into_response(),
        None => response,
    }
}

/// Reject anonymous requests with 401.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, ApiError> {
    if req.extensions().get::<Principal>().is_none() {
        return Err(ApiError::unauthenticated());
    }
    Ok(next.run(req).await)
}
