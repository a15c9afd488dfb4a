use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use academia_core::SchoolId;

use crate::Role;

/// Wildcard segment (`*`), matched independently per segment.
pub const WILDCARD: &str = "*";

/// Resources that delegated grants and the permission catalog may name.
pub const CATALOG_RESOURCES: [&str; 7] = [
    "schools", "users", "analytics", "audit", "system", "settings", WILDCARD,
];

/// Actions that delegated grants and the permission catalog may name.
pub const CATALOG_ACTIONS: [&str; 6] = ["create", "read", "update", "delete", "manage", WILDCARD];

/// Permission string.
///
/// Permissions are modeled as opaque strings of colon-separated segments:
/// `resource:action` for grants and the catalog, `resource:action:{schoolId}`
/// for tenant-scoped, role-derived permissions. A segment equal to `"*"`
/// matches any value in that position, and the bare `"*"` matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("permission '{0}' must have the form resource:action")]
    Malformed(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Build a catalog permission, validating both segments.
    pub fn catalog(resource: &str, action: &str) -> Result<Self, PermissionParseError> {
        if !CATALOG_RESOURCES.contains(&resource) {
            return Err(PermissionParseError::UnknownResource(resource.to_string()));
        }
        if !CATALOG_ACTIONS.contains(&action) {
            return Err(PermissionParseError::UnknownAction(action.to_string()));
        }
        Ok(Self::new(format!("{resource}:{action}")))
    }

    /// Parse and validate a `resource:action` string against the catalog grammar.
    pub fn parse_catalog(s: &str) -> Result<Self, PermissionParseError> {
        let mut parts = s.trim().split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(resource), Some(action), None) if !resource.is_empty() && !action.is_empty() => {
                Self::catalog(resource, action)
            }
            _ => Err(PermissionParseError::Malformed(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == WILDCARD
    }

    pub fn resource(&self) -> &str {
        self.as_str().split(':').next().unwrap_or_default()
    }

    pub fn action(&self) -> Option<&str> {
        self.as_str().split(':').nth(1)
    }

    /// Whether this (granted) permission covers `required`.
    pub fn covers(&self, required: &str) -> bool {
        matches_permission(self.as_str(), required)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// Match a granted permission pattern against a required permission.
///
/// - exact string equality matches;
/// - the bare wildcard `*` matches everything;
/// - otherwise both sides are split on `:` and must have the same number of
///   segments, each granted segment being `*` or equal to the required one.
pub fn matches_permission(granted: &str, required: &str) -> bool {
    if granted == required || granted == WILDCARD {
        return true;
    }

    let granted_parts: Vec<&str> = granted.split(':').collect();
    let required_parts: Vec<&str> = required.split(':').collect();
    if granted_parts.len() != required_parts.len() {
        return false;
    }

    granted_parts
        .iter()
        .zip(required_parts.iter())
        .all(|(g, r)| *g == WILDCARD || g == r)
}

/// Whether any of `granted` covers `required`.
pub fn any_matches<'a, I>(granted: I, required: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    granted.into_iter().any(|g| matches_permission(g, required))
}

/// Every `resource:action` pair of the catalog grammar (wildcard rows included).
pub fn catalog_pairs() -> impl Iterator<Item = (&'static str, &'static str)> {
    CATALOG_RESOURCES
        .into_iter()
        .flat_map(|r| CATALOG_ACTIONS.into_iter().map(move |a| (r, a)))
}

const CRUD: [&str; 4] = ["create", "read", "update", "delete"];

const SCHOOL_ADMIN_RESOURCES: [&str; 11] = [
    "students", "staff", "classes", "attendance", "fees", "library", "hostel", "exams",
    "reports", "settings", "users",
];

const TEACHER_PERMISSIONS: [&str; 9] = [
    "students:read",
    "classes:read",
    "attendance:create",
    "attendance:read",
    "attendance:update",
    "exams:create",
    "exams:read",
    "exams:update",
    "library:read",
];

const STUDENT_PERMISSIONS: [&str; 5] = [
    "classes:read",
    "attendance:read",
    "exams:read",
    "fees:read",
    "library:read",
];

const PARENT_PERMISSIONS: [&str; 4] = [
    "students:read",
    "attendance:read",
    "exams:read",
    "fees:read",
];

/// Role-derived permissions inside one school.
///
/// Every entry is scoped as `resource:action:{school_id}`. Delegated roles
/// derive nothing here; their capabilities come from their grants.
pub fn derive_permissions(role: Role, school_id: SchoolId) -> BTreeSet<String> {
    let scoped = |p: &str| format!("{p}:{school_id}");

    match role {
        Role::SuperAdmin => BTreeSet::from([scoped("*:*")]),
        Role::SchoolAdmin => SCHOOL_ADMIN_RESOURCES
            .iter()
            .flat_map(|r| CRUD.iter().map(move |a| format!("{r}:{a}:{school_id}")))
            .collect(),
        Role::Teacher => TEACHER_PERMISSIONS.iter().map(|p| scoped(p)).collect(),
        Role::Student => STUDENT_PERMISSIONS.iter().map(|p| scoped(p)).collect(),
        Role::Parent => PARENT_PERMISSIONS.iter().map(|p| scoped(p)).collect(),
        Role::DelegatedSuperAdmin | Role::DelegatedSchoolAdmin => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn resource_wildcard_matches_any_action() {
        assert!(matches_permission("schools:*", "schools:create"));
    }

    #[test]
    fn action_wildcard_matches_any_resource() {
        assert!(matches_permission("*:read", "schools:read"));
    }

    #[test]
    fn different_resource_does_not_match() {
        assert!(!matches_permission("users:create", "schools:create"));
    }

    #[test]
    fn bare_wildcard_matches_scoped_strings() {
        assert!(matches_permission("*", "students:create:abc"));
    }

    #[test]
    fn segment_count_must_agree() {
        assert!(!matches_permission("students:create", "students:create:abc"));
        assert!(!matches_permission("*:*", "students:create:abc"));
    }

    #[test]
    fn catalog_grammar_is_enforced() {
        assert!(Permission::parse_catalog("schools:read").is_ok());
        assert!(Permission::parse_catalog("*:*").is_ok());
        assert_eq!(
            Permission::parse_catalog("students:read"),
            Err(PermissionParseError::UnknownResource("students".into()))
        );
        assert_eq!(
            Permission::parse_catalog("schools:explode"),
            Err(PermissionParseError::UnknownAction("explode".into()))
        );
        assert!(matches!(
            Permission::parse_catalog("schools"),
            Err(PermissionParseError::Malformed(_))
        ));
    }

    #[test]
    fn catalog_pairs_cover_grammar() {
        assert_eq!(catalog_pairs().count(), CATALOG_RESOURCES.len() * CATALOG_ACTIONS.len());
    }

    #[test]
    fn school_admin_permissions_are_scoped_to_school() {
        let school = SchoolId::new();
        let perms = derive_permissions(Role::SchoolAdmin, school);
        assert!(perms.contains(&format!("students:create:{school}")));
        assert!(perms.iter().all(|p| p.ends_with(&school.to_string())));
    }

    #[test]
    fn delegated_roles_derive_nothing() {
        let school = SchoolId::new();
        assert!(derive_permissions(Role::DelegatedSuperAdmin, school).is_empty());
        assert!(derive_permissions(Role::DelegatedSchoolAdmin, school).is_empty());
    }

    #[test]
    fn derivation_is_pure() {
        let school = SchoolId::new();
        assert_eq!(
            derive_permissions(Role::Teacher, school),
            derive_permissions(Role::Teacher, school)
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    proptest! {
        #[test]
        fn exact_and_wildcards_always_match(resource in segment(), action in segment()) {
            let required = format!("{resource}:{action}");
            prop_assert!(matches_permission(&required, &required));
            prop_assert!(matches_permission("*", &required));
            prop_assert!(matches_permission("*:*", &required));
            let resource_wildcard = format!("{}:*", resource);
            let action_wildcard = format!("*:{}", action);
            prop_assert!(matches_permission(&resource_wildcard, &required));
            prop_assert!(matches_permission(&action_wildcard, &required));
        }

        #[test]
        fn other_resource_never_matches(a in segment(), b in segment(), action in segment()) {
            prop_assume!(a != b);
            let granted = format!("{a}:{action}");
            let required = format!("{b}:{action}");
            prop_assert!(!matches_permission(&granted, &required));
        }
    }
}
