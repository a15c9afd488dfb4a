use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PermissionParseError;

/// Role held by a user.
///
/// The wire form is kebab-case (`super-admin`, `delegated-school-admin`, ...),
/// which is also what tokens carry and what stores persist.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SuperAdmin,
    SchoolAdmin,
    Teacher,
    Student,
    Parent,
    DelegatedSuperAdmin,
    DelegatedSchoolAdmin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::SuperAdmin,
        Role::SchoolAdmin,
        Role::Teacher,
        Role::Student,
        Role::Parent,
        Role::DelegatedSuperAdmin,
        Role::DelegatedSchoolAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::SchoolAdmin => "school-admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::DelegatedSuperAdmin => "delegated-super-admin",
            Role::DelegatedSchoolAdmin => "delegated-school-admin",
        }
    }

    /// Rank used to pick a user's primary role when several are held.
    fn precedence(&self) -> u8 {
        match self {
            Role::SuperAdmin => 0,
            Role::DelegatedSuperAdmin => 1,
            Role::SchoolAdmin => 2,
            Role::DelegatedSchoolAdmin => 3,
            Role::Teacher => 4,
            Role::Parent => 5,
            Role::Student => 6,
        }
    }

    /// The most privileged role of a set (what tokens carry as `role`).
    pub fn primary(roles: &[Role]) -> Option<Role> {
        roles.iter().copied().min_by_key(Role::precedence)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| PermissionParseError::UnknownRole(s.to_string()))
    }
}
