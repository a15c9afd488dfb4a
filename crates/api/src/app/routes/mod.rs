use std::sync::Arc;

use axum::{middleware, routing::MethodRouter};

use academia_auth::{Permission, RequiredPermissions, Role};

use crate::app::services::AppServices;
use crate::guards::{self, PermissionGuard};

pub mod auth;
pub mod iam;
pub mod school;
pub mod schools;
pub mod system;

pub(crate) const SUPER_ADMIN_ONLY: &[Role] = &[Role::SuperAdmin];
pub(crate) const SCHOOL_ADMINS: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin];

/// Attach super-admin permission metadata to a route (any one suffices).
pub(crate) fn requires_any(
    route: MethodRouter,
    services: &Arc<AppServices>,
    permissions: &[&'static str],
) -> MethodRouter {
    let required = RequiredPermissions::any(permissions.iter().copied());
    route.route_layer(middleware::from_fn_with_state(
        PermissionGuard::new(services.clone(), required),
        guards::permission_guard,
    ))
}

pub(crate) fn requires_roles(route: MethodRouter, roles: &'static [Role]) -> MethodRouter {
    route.route_layer(middleware::from_fn_with_state(roles, guards::roles_guard))
}

/// Attach a school-scoped `resource:action` requirement to a tenant route.
pub(crate) fn requires_school_permission(route: MethodRouter, permission: &'static str) -> MethodRouter {
    route.route_layer(middleware::from_fn_with_state(
        Permission::from(permission),
        guards::school_permission_guard,
    ))
}
