//! Per-request school (tenant) context.

use std::collections::BTreeSet;

use serde::Serialize;

use academia_core::SchoolId;

use crate::permissions::{any_matches, derive_permissions};
use crate::{Permission, Role, School, User};

/// Resolved tenant plus the caller's permissions inside it.
///
/// Derived, never persisted: rebuilt on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolContext {
    pub school_id: SchoolId,
    pub school: School,
    pub user_role: Role,
    pub permissions: BTreeSet<String>,
    pub is_super_admin: bool,
    pub is_school_admin: bool,
}

impl SchoolContext {
    /// Build the context for `user` operating inside `school`.
    ///
    /// Returns `None` for a user without any role.
    pub fn build(user: &User, school: School) -> Option<Self> {
        let user_role = user.primary_role()?;
        let school_id = school.id;

        let permissions = user
            .roles
            .iter()
            .flat_map(|role| derive_permissions(*role, school_id))
            .collect();

        Some(Self {
            school_id,
            school,
            user_role,
            permissions,
            is_super_admin: user.has_role(Role::SuperAdmin),
            is_school_admin: user.has_role(Role::SchoolAdmin) && user.school_id == Some(school_id),
        })
    }

    /// Add grant-sourced `resource:action` permissions, scoped to this school.
    pub fn extend_with_grant<'a, I>(&mut self, granted: I)
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        let school_id = self.school_id;
        self.permissions
            .extend(granted.into_iter().map(|p| format!("{}:{school_id}", p.as_str())));
    }

    /// Whether the caller may perform `resource:action` inside this school.
    pub fn has_permission(&self, resource_action: &str) -> bool {
        if self.is_super_admin {
            return true;
        }
        let scoped = format!("{resource_action}:{}", self.school_id);
        any_matches(self.permissions.iter().map(String::as_str), &scoped)
    }
}

/// Tenant-isolation policy: super-admins reach every school, everyone else
/// only their own.
pub fn can_access_school(user: &User, school_id: SchoolId) -> bool {
    user.has_role(Role::SuperAdmin) || user.school_id == Some(school_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn school() -> School {
        School::new("Green Valley", "GV", Utc::now()).unwrap()
    }

    #[test]
    fn school_admin_of_own_school() {
        let s = school();
        let user = User::new("admin@gv.edu", vec![Role::SchoolAdmin], Some(s.id), Utc::now()).unwrap();
        let ctx = SchoolContext::build(&user, s.clone()).unwrap();
        assert!(ctx.is_school_admin);
        assert!(!ctx.is_super_admin);
        assert_eq!(ctx.user_role, Role::SchoolAdmin);
        assert!(ctx.has_permission("students:create"));
        assert!(!ctx.has_permission("schools:delete"));
    }

    #[test]
    fn school_admin_of_other_school_is_not_school_admin_here() {
        let s = school();
        let user = User::new("admin@other.edu", vec![Role::SchoolAdmin], None, Utc::now()).unwrap();
        let ctx = SchoolContext::build(&user, s).unwrap();
        assert!(!ctx.is_school_admin);
    }

    #[test]
    fn super_admin_has_every_permission() {
        let s = school();
        let user = User::new("root@academia.io", vec![Role::SuperAdmin], None, Utc::now()).unwrap();
        let ctx = SchoolContext::build(&user, s).unwrap();
        assert!(ctx.is_super_admin);
        assert!(ctx.has_permission("anything:goes"));
    }

    #[test]
    fn grant_permissions_are_scoped() {
        let s = school();
        let user = User::new("d@gv.edu", vec![Role::DelegatedSchoolAdmin], Some(s.id), Utc::now()).unwrap();
        let mut ctx = SchoolContext::build(&user, s).unwrap();
        assert!(!ctx.has_permission("students:read"));
        ctx.extend_with_grant(&[Permission::from("students:*")]);
        assert!(ctx.has_permission("students:read"));
        assert!(!ctx.has_permission("fees:read"));
    }

    #[test]
    fn access_policy() {
        let s = school();
        let other = SchoolId::new();
        let teacher = User::new("t@gv.edu", vec![Role::Teacher], Some(s.id), Utc::now()).unwrap();
        let root = User::new("root@academia.io", vec![Role::SuperAdmin], None, Utc::now()).unwrap();
        assert!(can_access_school(&teacher, s.id));
        assert!(!can_access_school(&teacher, other));
        assert!(can_access_school(&root, other));
    }
}
