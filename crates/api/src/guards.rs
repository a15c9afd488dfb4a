//! Route guards: tenant resolution, roles, super-admin permissions and
//! school-scoped permissions.
//!
//! Guards run as `route_layer` middleware, after routing, so path parameters
//! are available to them.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, Query, RawPathParams, Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::warn;

use academia_auth::{
    authorize_in_school, classify, Permission, PermissionDecision, Principal, RequiredPermissions,
    Role, SchoolContext,
};
use academia_core::SchoolId;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::middleware::under_prefix;

pub const SCHOOL_ID_HEADER: &str = "x-school-id";

/// Largest JSON body buffered while looking for a `schoolId` field.
const MAX_SCHOOL_BODY: usize = 2 * 1024 * 1024;

/// Prefixes that never need a tenant.
const TENANT_EXEMPT_PREFIXES: [&str; 5] = ["/auth", "/super-admin", "/system", "/health", "/iam-proxy"];

pub fn is_tenant_exempt(path: &str) -> bool {
    TENANT_EXEMPT_PREFIXES.iter().any(|prefix| under_prefix(path, prefix))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant id extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Candidate tenant ids, in decreasing priority.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchoolIdSources {
    pub header: Option<String>,
    pub path: Option<String>,
    pub body: Option<String>,
    pub query: Option<String>,
}

impl SchoolIdSources {
    /// Header, then route parameter, then body, then query string.
    pub fn select(&self) -> Result<Option<SchoolId>, ApiError> {
        let candidate = [&self.header, &self.path, &self.body, &self.query]
            .into_iter()
            .flatten()
            .map(|raw| raw.trim())
            .find(|raw| !raw.is_empty());

        candidate
            .map(|raw| {
                raw.parse::<SchoolId>()
                    .map_err(|_| ApiError::Validation(format!("invalid school id '{raw}'")))
            })
            .transpose()
    }

    fn has_priority_source(&self) -> bool {
        self.header.is_some() || self.path.is_some()
    }
}

fn header_school_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SCHOOL_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn path_school_id(params: Option<&RawPathParams>) -> Option<String> {
    params?
        .iter()
        .find(|(key, _)| *key == "schoolId" || *key == "school_id")
        .map(|(_, value)| value.to_string())
}

fn query_school_id(req: &Request) -> Option<String> {
    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(req.uri()).ok()?;
    query
        .get("schoolId")
        .or_else(|| query.get("school_id"))
        .cloned()
}

fn body_school_id(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value
        .get("schoolId")
        .or_else(|| value.get("school_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Buffer a JSON body to read its `schoolId`, then put it back.
async fn buffered_body_school_id(req: Request) -> Result<(Request, Option<String>), ApiError> {
    if !is_json(req.headers()) {
        return Ok((req, None));
    }
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_SCHOOL_BODY)
        .await
        .map_err(|_| ApiError::Validation("request body too large".to_string()))?;
    let found = body_school_id(&bytes);
    Ok((Request::from_parts(parts, Body::from(bytes)), found))
}

// ─────────────────────────────────────────────────────────────────────────────
// School context guard
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve and authorize the tenant of a request.
///
/// Anonymous requests pass through untouched so that the auth guard behind
/// this one answers 401. On success the [`SchoolContext`] and [`SchoolId`]
/// are inserted as extensions.
pub async fn school_context_guard(
    State(services): State<Arc<AppServices>>,
    params: Option<RawPathParams>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    if req.method() == Method::OPTIONS || is_tenant_exempt(&path) {
        return Ok(next.run(req).await);
    }

    let Some(principal) = req.extensions().get::<Principal>().cloned() else {
        return Ok(next.run(req).await);
    };
    if principal.system {
        return Ok(next.run(req).await);
    }

    let mut sources = SchoolIdSources {
        header: header_school_id(req.headers()),
        path: path_school_id(params.as_ref()),
        query: query_school_id(&req),
        ..SchoolIdSources::default()
    };
    let mut req = req;
    if !sources.has_priority_source() {
        let (rebuilt, body) = buffered_body_school_id(req).await?;
        req = rebuilt;
        sources.body = body;
    }

    let school_id = sources.select()?.ok_or(ApiError::MissingSchoolId)?;

    let resolver = &services.school_context;
    let context = resolver
        .get_school_context(principal.user_id, Some(school_id), Utc::now())
        .await
        .map_err(|err| {
            warn!(event = "school_context_failed", user_id = %principal.user_id, %school_id, error = %err);
            ApiError::SchoolContextFailure
        })?
        .ok_or_else(|| {
            warn!(event = "school_context_unresolved", user_id = %principal.user_id, %school_id);
            ApiError::SchoolContextUnresolved
        })?;

    let allowed = resolver
        .validate_school_access(principal.user_id, school_id)
        .await
        .map_err(|err| {
            warn!(event = "school_context_failed", user_id = %principal.user_id, %school_id, error = %err);
            ApiError::SchoolContextFailure
        })?;
    if !allowed {
        warn!(event = "school_access_denied", user_id = %principal.user_id, %school_id);
        return Err(ApiError::SchoolAccessDenied);
    }

    req.extensions_mut().insert(school_id);
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles guard
// ─────────────────────────────────────────────────────────────────────────────

/// Require any of the given roles.
pub async fn roles_guard(
    State(roles): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(ApiError::unauthenticated)?;
    if !principal.has_any_role(roles) {
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        warn!(event = "role_denied", user_id = %principal.user_id, required = ?names);
        return Err(ApiError::Forbidden(format!("requires role: {}", names.join(" or "))));
    }
    Ok(next.run(req).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Super-admin permission guard
// ─────────────────────────────────────────────────────────────────────────────

/// Permission metadata of one route plus the services needed to check it.
#[derive(Clone)]
pub struct PermissionGuard {
    services: Arc<AppServices>,
    required: Arc<RequiredPermissions>,
}

impl PermissionGuard {
    pub fn new(services: Arc<AppServices>, required: RequiredPermissions) -> Self {
        Self {
            services,
            required: Arc::new(required),
        }
    }
}

/// Super-admins pass; delegated super-admins pass when their grant covers the
/// route's permissions; everyone else is denied.
pub async fn permission_guard(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(ApiError::unauthenticated)?;
    let required = guard.required.as_ref();

    let allowed = match classify(&principal, required) {
        PermissionDecision::Allow => true,
        PermissionDecision::Deny => false,
        PermissionDecision::CheckDelegation => {
            let now = Utc::now();
            let mut outcomes = Vec::with_capacity(required.permissions.len());
            for permission in &required.permissions {
                let granted = guard
                    .services
                    .iam
                    .check_delegated_account_access(&principal.email, permission.as_str(), now)
                    .await?;
                outcomes.push(granted);
            }
            required.satisfied_by(&outcomes)
        }
    };

    if !allowed {
        warn!(
            event = "permission_denied",
            user_id = %principal.user_id,
            required = ?required.names(),
            mode = ?required.mode,
        );
        return Err(ApiError::InsufficientPermissions(required.names()));
    }
    Ok(next.run(req).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// School permission guard
// ─────────────────────────────────────────────────────────────────────────────

/// Check `resource:action` against the resolved school context.
pub fn require_school_permission(
    principal: &Principal,
    context: &SchoolContext,
    required: &Permission,
) -> Result<(), ApiError> {
    authorize_in_school(principal, context, required).map_err(|err| {
        warn!(
            event = "school_permission_denied",
            user_id = %principal.user_id,
            school_id = %context.school_id,
            required = %required,
        );
        ApiError::from(err)
    })
}

/// Middleware form of [`require_school_permission`]; must run behind the
/// school context guard.
pub async fn school_permission_guard(
    State(required): State<Permission>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(ApiError::unauthenticated)?;
    let context = req
        .extensions()
        .get::<SchoolContext>()
        .ok_or(ApiError::SchoolContextUnresolved)?;
    require_school_permission(principal, context, &required)?;
    Ok(next.run(req).await)
}
