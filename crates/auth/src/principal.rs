use serde::{Deserialize, Serialize};

use academia_core::{SchoolId, UserId};

use crate::{Role, User};

/// Identity of an authenticated caller, as seen by guards and handlers.
///
/// Built once per request from the loaded [`User`]; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub roles: Vec<Role>,
    pub school_id: Option<SchoolId>,
    /// Synthetic internal caller (jobs, maintenance); bypasses tenant resolution.
    #[serde(default)]
    pub system: bool,
}

impl Principal {
    pub fn system() -> Self {
        Self {
            user_id: UserId::from_uuid(uuid::Uuid::nil()),
            email: "system".to_string(),
            roles: vec![Role::SuperAdmin],
            school_id: None,
            system: true,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(Role::SuperAdmin)
    }

    pub fn is_delegated_super_admin(&self) -> bool {
        self.has_role(Role::DelegatedSuperAdmin)
    }

    pub fn primary_role(&self) -> Option<Role> {
        Role::primary(&self.roles)
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            roles: user.roles.clone(),
            school_id: user.school_id,
            system: false,
        }
    }
}
