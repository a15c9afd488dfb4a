use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use academia_auth::AuthzError;
use academia_core::DomainError;
use academia_infra::{IamError, SchoolContextError, SessionError, StoreError};

const INTERNAL_MESSAGE: &str = "Internal server error";
const MAX_ERROR_BODY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account locked until {}", .until.to_rfc3339_opts(SecondsFormat::Secs, true))]
    AccountLocked { until: DateTime<Utc> },

    #[error("x-school-id header is required")]
    MissingSchoolId,

    #[error("{0}")]
    Validation(String),

    #[error("permission '{0}' does not exist")]
    UnknownPermission(String),

    #[error("user does not belong to this school")]
    SchoolMismatch,

    #[error("{0}")]
    Conflict(String),

    #[error("unable to resolve school context")]
    SchoolContextUnresolved,

    #[error("access denied to this school")]
    SchoolAccessDenied,

    #[error("Failed to verify school context")]
    SchoolContextFailure,

    #[error("insufficient permissions: requires {}", .0.join(", "))]
    InsufficientPermissions(Vec<String>),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        ApiError::Unauthenticated("authentication required".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountLocked { .. } => StatusCode::LOCKED,
            ApiError::MissingSchoolId
            | ApiError::Validation(_)
            | ApiError::UnknownPermission(_)
            | ApiError::SchoolMismatch => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::SchoolContextUnresolved
            | ApiError::SchoolAccessDenied
            | ApiError::SchoolContextFailure
            | ApiError::InsufficientPermissions(_)
            | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::AccountLocked { .. } => "account_locked",
            ApiError::MissingSchoolId => "missing_school_id",
            ApiError::Validation(_) => "validation_error",
            ApiError::UnknownPermission(_) => "unknown_permission",
            ApiError::SchoolMismatch => "school_mismatch",
            ApiError::Conflict(_) => "conflict",
            ApiError::SchoolContextUnresolved => "school_context_unresolved",
            ApiError::SchoolAccessDenied => "school_access_denied",
            ApiError::SchoolContextFailure => "school_context_failure",
            ApiError::InsufficientPermissions(_) => "insufficient_permissions",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

/// Client-facing message of an error response, read by [`error_envelope`].
#[derive(Debug, Clone)]
pub struct ErrorMessage(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(event = "internal_error", detail = %detail);
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };
        let mut response = json_error(self.status(), self.code(), message.clone());
        response.extensions_mut().insert(ErrorMessage(message));
        response
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions from service errors
// ─────────────────────────────────────────────────────────────────────────────

impl From<IamError> for ApiError {
    fn from(err: IamError) -> Self {
        match err {
            IamError::Validation(msg) => ApiError::Validation(msg),
            IamError::UnknownPermission(name) => ApiError::UnknownPermission(name),
            IamError::SchoolMismatch => ApiError::SchoolMismatch,
            IamError::Conflict(msg) => ApiError::Conflict(msg),
            IamError::NotFound(what) => ApiError::NotFound(what),
            IamError::Store(err) => err.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredentials => ApiError::InvalidCredentials,
            SessionError::AccountLocked { until } => ApiError::AccountLocked { until },
            SessionError::InactiveAccount => ApiError::Forbidden("account is not active".to_string()),
            SessionError::InvalidRefreshToken | SessionError::Token(_) => {
                ApiError::Unauthenticated("invalid or expired session".to_string())
            }
            SessionError::Password(err) => ApiError::Internal(err.to_string()),
            SessionError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<SchoolContextError> for ApiError {
    fn from(err: SchoolContextError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(what) => ApiError::NotFound(what),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => ApiError::Validation(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::TenantMismatch => ApiError::SchoolAccessDenied,
            AuthzError::Forbidden(required) => ApiError::InsufficientPermissions(required),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error envelope
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub timestamp: String,
    pub path: String,
    pub method: String,
    pub message: String,
}

/// Rewrite every 4xx/5xx response into an [`ErrorEnvelope`] and log it.
///
/// Error responses produced by extractor rejections carry a plain-text body,
/// which becomes the message.
pub async fn error_envelope(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let message = match parts.extensions.remove::<ErrorMessage>() {
        Some(ErrorMessage(message)) => message,
        None if status.is_server_error() => INTERNAL_MESSAGE.to_string(),
        None => {
            let bytes = axum::body::to_bytes(body, MAX_ERROR_BODY)
                .await
                .unwrap_or_default();
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                text
            }
        }
    };

    if status.is_server_error() {
        tracing::error!(event = "request_failed", %method, %path, status = status.as_u16(), %message);
    } else {
        tracing::warn!(event = "request_rejected", %method, %path, status = status.as_u16(), %message);
    }

    let envelope = ErrorEnvelope {
        status_code: status.as_u16(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        path,
        method,
        message,
    };

    let mut rewritten = (status, Json(envelope)).into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rewritten.headers_mut().append(name, value.clone());
        }
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::unauthenticated().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::AccountLocked { until: Utc::now() }.status(),
            StatusCode::LOCKED
        );
        assert_eq!(ApiError::MissingSchoolId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::SchoolMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("dup".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::SchoolContextUnresolved.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("role".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_permissions_names_everything_required() {
        let err = ApiError::InsufficientPermissions(vec!["schools:delete".into()]);
        assert_eq!(err.to_string(), "insufficient permissions: requires schools:delete");
    }

    #[test]
    fn internal_errors_hide_detail() {
        let response = ApiError::Internal("connection refused".into()).into_response();
        let message = response.extensions().get::<ErrorMessage>().unwrap();
        assert_eq!(message.0, "Internal server error");
    }

    #[test]
    fn iam_errors_keep_their_kind() {
        assert!(matches!(
            ApiError::from(IamError::UnknownPermission("x:y".into())),
            ApiError::UnknownPermission(_)
        ));
        assert!(matches!(
            ApiError::from(IamError::Store(StoreError::Backend("boom".into()))),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            ApiError::from(SessionError::InvalidRefreshToken),
            ApiError::Unauthenticated(_)
        ));
    }
}
