use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use academia_auth::{
    normalize_email, DelegatedGrant, PermissionDefinition, RoleDefinition, School, User,
};
use academia_core::{Entity, GrantId, PermissionId, RoleId, SchoolId, UserId};

use super::{
    CatalogStore, GrantFilter, GrantStore, SchoolStore, StoreError, StoreResult, UserStore,
};

/// Id-keyed in-memory table for tests/dev.
#[derive(Debug)]
pub struct InMemoryTable<T: Entity> {
    inner: RwLock<HashMap<T::Id, T>>,
}

impl<T: Entity> InMemoryTable<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Entity> Default for InMemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

impl<T> InMemoryTable<T>
where
    T: Entity + Clone,
{
    pub fn get(&self, id: T::Id) -> StoreResult<Option<T>> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    pub fn find<P>(&self, predicate: P) -> StoreResult<Option<T>>
    where
        P: Fn(&T) -> bool,
    {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().find(|v| predicate(v)).cloned())
    }

    pub fn filter<P>(&self, predicate: P) -> StoreResult<Vec<T>>
    where
        P: Fn(&T) -> bool,
    {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().filter(|v| predicate(v)).cloned().collect())
    }

    /// Insert `value` unless `clashes` matches an existing row.
    ///
    /// The check and the insert happen under one write lock.
    pub fn insert_unique<P>(&self, value: T, clashes: P, what: &str) -> StoreResult<()>
    where
        P: Fn(&T, &T) -> bool,
    {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        if map.contains_key(&value.id()) || map.values().any(|existing| clashes(existing, &value)) {
            return Err(StoreError::Conflict(format!("{what} already exists")));
        }
        map.insert(value.id(), value);
        Ok(())
    }

    pub fn replace(&self, value: &T, what: &str) -> StoreResult<()> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        match map.get_mut(&value.id()) {
            Some(slot) => {
                *slot = value.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("{what} {}", value.id()))),
        }
    }

    pub fn remove(&self, id: T::Id) -> StoreResult<bool> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(&id).is_some())
    }
}

/// One struct implementing every store trait over in-memory tables.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    users: InMemoryTable<User>,
    schools: InMemoryTable<School>,
    grants: InMemoryTable<DelegatedGrant>,
    permissions: InMemoryTable<PermissionDefinition>,
    roles: InMemoryTable<RoleDefinition>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryStores {
    async fn get(&self, id: UserId) -> StoreResult<Option<User>> {
        self.users.get(id)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        self.users.find(|u| u.email == email)
    }

    async fn insert(&self, user: User) -> StoreResult<()> {
        self.users
            .insert_unique(user, |a, b| a.email == b.email, "user with this email")
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        self.users.replace(user, "user")
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let mut users = self.users.filter(|_| true)?;
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}

#[async_trait]
impl SchoolStore for InMemoryStores {
    async fn get(&self, id: SchoolId) -> StoreResult<Option<School>> {
        self.schools.get(id)
    }

    async fn list(&self) -> StoreResult<Vec<School>> {
        let mut schools = self.schools.filter(|_| true)?;
        schools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schools)
    }

    async fn insert(&self, school: School) -> StoreResult<()> {
        self.schools
            .insert_unique(school, |a, b| a.code == b.code, "school with this code")
    }

    async fn update(&self, school: &School) -> StoreResult<()> {
        self.schools.replace(school, "school")
    }
}

#[async_trait]
impl GrantStore for InMemoryStores {
    async fn get(&self, id: GrantId) -> StoreResult<Option<DelegatedGrant>> {
        self.grants.get(id)
    }

    async fn find_by_email(
        &self,
        filter: GrantFilter,
        email: &str,
    ) -> StoreResult<Option<DelegatedGrant>> {
        let email = normalize_email(email);
        self.grants.find(|g| filter.matches(g) && g.email == email)
    }

    async fn insert(&self, grant: DelegatedGrant) -> StoreResult<()> {
        self.grants.insert_unique(
            grant,
            |a, b| a.scope == b.scope && a.email == b.email,
            "delegated grant for this email",
        )
    }

    async fn update(&self, grant: &DelegatedGrant) -> StoreResult<()> {
        self.grants.replace(grant, "delegated grant")
    }

    async fn list(&self, filter: GrantFilter) -> StoreResult<Vec<DelegatedGrant>> {
        let mut grants = self.grants.filter(|g| filter.matches(g))?;
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStores {
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionDefinition>> {
        let mut permissions = self.permissions.filter(|_| true)?;
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionDefinition>> {
        self.permissions.get(id)
    }

    async fn find_permission(&self, name: &str) -> StoreResult<Option<PermissionDefinition>> {
        self.permissions.find(|p| p.name == name)
    }

    async fn insert_permission(&self, permission: PermissionDefinition) -> StoreResult<()> {
        self.permissions
            .insert_unique(permission, |a, b| a.name == b.name, "permission")
    }

    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool> {
        self.permissions.remove(id)
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>> {
        let mut roles = self.roles.filter(|_| true)?;
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Option<RoleDefinition>> {
        self.roles.get(id)
    }

    async fn insert_role(&self, role: RoleDefinition) -> StoreResult<()> {
        self.roles.insert_unique(role, |a, b| a.name == b.name, "role")
    }

    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<()> {
        // Renames must not collide with another role.
        let clash = self.roles.find(|r| r.name == role.name && r.id != role.id)?;
        if clash.is_some() {
            return Err(StoreError::Conflict("role already exists".to_string()));
        }
        self.roles.replace(role, "role")
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        self.roles.remove(id)
    }
}
