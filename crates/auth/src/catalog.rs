//! Permission catalog and RBAC role bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use academia_core::{DomainError, DomainResult, Entity, PermissionId, RoleId};

use crate::Permission;

/// Catalog entry: a known `resource:action` capability.
///
/// A grant may only carry permission strings that exist here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDefinition {
    pub id: PermissionId,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PermissionDefinition {
    pub fn new(
        resource: &str,
        action: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let permission = Permission::catalog(resource.trim(), action.trim())
            .map_err(|e| DomainError::validation(e.to_string()))?;

        Ok(Self {
            id: PermissionId::new(),
            name: permission.as_str().to_string(),
            resource: resource.trim().to_string(),
            action: action.trim().to_string(),
            description,
            created_at: now,
        })
    }

    pub fn permission(&self) -> Permission {
        Permission::new(self.name.clone())
    }
}

impl Entity for PermissionDefinition {
    type Id = PermissionId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Named bundle of catalog permissions (coarse RBAC outside delegation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleDefinition {
    pub fn new(
        name: &str,
        description: Option<String>,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("role name is required"));
        }

        Ok(Self {
            id: RoleId::new(),
            name: name.to_string(),
            description,
            permissions: dedup(permissions),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_permissions(&mut self, permissions: Vec<String>, now: DateTime<Utc>) {
        self.permissions = dedup(permissions);
        self.updated_at = now;
    }
}

impl Entity for RoleDefinition {
    type Id = RoleId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

fn dedup(mut permissions: Vec<String>) -> Vec<String> {
    permissions.sort();
    permissions.dedup();
    permissions
}
