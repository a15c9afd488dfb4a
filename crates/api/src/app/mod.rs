//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores and services, startup seeding
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: `ApiError` and the error envelope

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use academia_infra::Stores;

use crate::config::AppConfig;
use crate::guards;
use crate::middleware::{self, CookieSettings, SessionState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Build the services and the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig, stores: Stores) -> Result<Router, StartupError> {
    let services = Arc::new(services::build_services(config, stores).await?);
    Ok(router(services))
}

/// Route tree over already-built services.
///
/// Layer order, outermost first: error envelope, tracing, session cookies,
/// then per-area route guards.
pub fn router(services: Arc<AppServices>) -> Router {
    let session = SessionState {
        sessions: services.sessions.clone(),
        cookies: CookieSettings::from(&services.config),
    };

    // Super-admin area: auth required, permission metadata per route.
    let admin = routes::schools::router(&services)
        .merge(routes::iam::router(&services))
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    // Tenant area: resolve the school first, so anonymous calls still end in 401.
    let tenant = routes::school::router()
        .route_layer(axum_middleware::from_fn(middleware::require_auth))
        .route_layer(axum_middleware::from_fn_with_state(
            services.clone(),
            guards::school_context_guard,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::auth::router())
        .merge(admin)
        .merge(tenant)
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(errors::error_envelope))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn_with_state(
                    session,
                    middleware::session_middleware,
                )),
        )
}
