//! Typed request context extracted by handlers.
//!
//! The session middleware inserts the [`Principal`]; the school context guard
//! inserts the [`SchoolContext`] and its [`SchoolId`]. Handlers never read
//! untyped request state.

use axum::{extract::FromRequestParts, http::request::Parts};

use academia_auth::{Principal, SchoolContext};
use academia_core::SchoolId;

use crate::app::errors::ApiError;

/// Authenticated caller; rejects with 401 when the request is anonymous.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(ApiError::unauthenticated)
    }
}

/// Resolved tenant of a tenant-scoped route.
#[derive(Debug, Clone)]
pub struct CurrentSchool(pub SchoolContext);

impl CurrentSchool {
    pub fn school_id(&self) -> SchoolId {
        self.0.school_id
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentSchool
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SchoolContext>()
            .cloned()
            .map(CurrentSchool)
            .ok_or(ApiError::SchoolContextUnresolved)
    }
}
