//! Storage backends for groups, roles and relationships.
//!
//! The engine only needs ordinary CRUD plus a few load-by-criteria lookups;
//! hosts back this with their own data store. [`MemoryGroupStorage`] is the
//! reference implementation used by tests and simple deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Group, GroupContent, GroupId, GroupRole, GroupType, SiteRole, UserId};

/// Trait for group storage backends.
///
/// Missing entities are reported as `Ok(None)` or empty vectors, never as
/// errors; calculators must stay resilient to partially-configured sites.
#[async_trait]
pub trait GroupStorage: Send + Sync {
    /// All known group types.
    async fn group_types(&self) -> Result<Vec<GroupType>>;

    /// Load a group type by id.
    async fn group_type(&self, id: &str) -> Result<Option<GroupType>>;

    /// Save a group type.
    async fn save_group_type(&self, group_type: GroupType) -> Result<()>;

    /// Delete a group type. Roles owned by the type are removed as well.
    async fn delete_group_type(&self, id: &str) -> Result<()>;

    /// Load a group role by id.
    async fn group_role(&self, id: &str) -> Result<Option<GroupRole>>;

    /// All roles owned by a group type.
    async fn roles_for_type(&self, group_type: &str) -> Result<Vec<GroupRole>>;

    /// All roles synchronized from a site-wide role.
    async fn synchronized_roles(&self, site_role: &str) -> Result<Vec<GroupRole>>;

    /// Save a group role.
    async fn save_group_role(&self, role: GroupRole) -> Result<()>;

    /// Delete a group role.
    async fn delete_group_role(&self, id: &str) -> Result<()>;

    /// All site-wide roles.
    async fn site_roles(&self) -> Result<Vec<SiteRole>>;

    /// Load a site-wide role by id.
    async fn site_role(&self, id: &str) -> Result<Option<SiteRole>>;

    /// Save a site-wide role.
    async fn save_site_role(&self, role: SiteRole) -> Result<()>;

    /// Delete a site-wide role.
    async fn delete_site_role(&self, id: &str) -> Result<()>;

    /// Load a group by id.
    async fn group(&self, id: GroupId) -> Result<Option<Group>>;

    /// All groups.
    async fn groups(&self) -> Result<Vec<Group>>;

    /// Save a group.
    async fn save_group(&self, group: Group) -> Result<()>;

    /// Delete a group. Content relationships of the group are removed too.
    async fn delete_group(&self, id: GroupId) -> Result<()>;

    /// All membership records of a user.
    async fn memberships_of(&self, user: UserId) -> Result<Vec<GroupContent>>;

    /// The membership record of a user in a group, if any.
    async fn membership(&self, group: GroupId, user: UserId) -> Result<Option<GroupContent>>;

    /// All content relationships of a group.
    async fn content_of_group(&self, group: GroupId) -> Result<Vec<GroupContent>>;

    /// Save a content relationship.
    async fn save_group_content(&self, content: GroupContent) -> Result<()>;

    /// Delete a content relationship.
    async fn delete_group_content(&self, id: u64) -> Result<()>;
}

/// In-memory group storage for testing and simple deployments.
#[derive(Default)]
pub struct MemoryGroupStorage {
    group_types: RwLock<HashMap<String, GroupType>>,
    group_roles: RwLock<HashMap<String, GroupRole>>,
    site_roles: RwLock<HashMap<String, SiteRole>>,
    groups: RwLock<HashMap<GroupId, Group>>,
    content: RwLock<HashMap<u64, GroupContent>>,
}

impl MemoryGroupStorage {
    /// Create an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStorage for MemoryGroupStorage {
    async fn group_types(&self) -> Result<Vec<GroupType>> {
        let types = self.group_types.read().unwrap();
        let mut list: Vec<_> = types.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn group_type(&self, id: &str) -> Result<Option<GroupType>> {
        let types = self.group_types.read().unwrap();
        Ok(types.get(id).cloned())
    }

    async fn save_group_type(&self, group_type: GroupType) -> Result<()> {
        let mut types = self.group_types.write().unwrap();
        types.insert(group_type.id.clone(), group_type);
        Ok(())
    }

    async fn delete_group_type(&self, id: &str) -> Result<()> {
        let mut types = self.group_types.write().unwrap();
        types.remove(id);
        drop(types);

        let mut roles = self.group_roles.write().unwrap();
        roles.retain(|_, role| role.group_type != id);
        Ok(())
    }

    async fn group_role(&self, id: &str) -> Result<Option<GroupRole>> {
        let roles = self.group_roles.read().unwrap();
        Ok(roles.get(id).cloned())
    }

    async fn roles_for_type(&self, group_type: &str) -> Result<Vec<GroupRole>> {
        let roles = self.group_roles.read().unwrap();
        let mut list: Vec<_> = roles
            .values()
            .filter(|role| role.group_type == group_type)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn synchronized_roles(&self, site_role: &str) -> Result<Vec<GroupRole>> {
        let roles = self.group_roles.read().unwrap();
        let mut list: Vec<_> = roles
            .values()
            .filter(|role| role.synchronized_from.as_deref() == Some(site_role))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn save_group_role(&self, role: GroupRole) -> Result<()> {
        let mut roles = self.group_roles.write().unwrap();
        roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn delete_group_role(&self, id: &str) -> Result<()> {
        let mut roles = self.group_roles.write().unwrap();
        roles.remove(id);
        Ok(())
    }

    async fn site_roles(&self) -> Result<Vec<SiteRole>> {
        let roles = self.site_roles.read().unwrap();
        let mut list: Vec<_> = roles.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn site_role(&self, id: &str) -> Result<Option<SiteRole>> {
        let roles = self.site_roles.read().unwrap();
        Ok(roles.get(id).cloned())
    }

    async fn save_site_role(&self, role: SiteRole) -> Result<()> {
        let mut roles = self.site_roles.write().unwrap();
        roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn delete_site_role(&self, id: &str) -> Result<()> {
        let mut roles = self.site_roles.write().unwrap();
        roles.remove(id);
        Ok(())
    }

    async fn group(&self, id: GroupId) -> Result<Option<Group>> {
        let groups = self.groups.read().unwrap();
        Ok(groups.get(&id).cloned())
    }

    async fn groups(&self) -> Result<Vec<Group>> {
        let groups = self.groups.read().unwrap();
        let mut list: Vec<_> = groups.values().cloned().collect();
        list.sort_by_key(|g| g.id);
        Ok(list)
    }

    async fn save_group(&self, group: Group) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        groups.insert(group.id, group);
        Ok(())
    }

    async fn delete_group(&self, id: GroupId) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        groups.remove(&id);
        drop(groups);

        let mut content = self.content.write().unwrap();
        content.retain(|_, c| c.group != id);
        Ok(())
    }

    async fn memberships_of(&self, user: UserId) -> Result<Vec<GroupContent>> {
        let content = self.content.read().unwrap();
        let mut list: Vec<_> = content
            .values()
            .filter(|c| c.is_membership() && c.entity_owner == user)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.id);
        Ok(list)
    }

    async fn membership(&self, group: GroupId, user: UserId) -> Result<Option<GroupContent>> {
        let content = self.content.read().unwrap();
        Ok(content
            .values()
            .find(|c| c.is_membership() && c.group == group && c.entity_owner == user)
            .cloned())
    }

    async fn content_of_group(&self, group: GroupId) -> Result<Vec<GroupContent>> {
        let content = self.content.read().unwrap();
        let mut list: Vec<_> = content
            .values()
            .filter(|c| c.group == group)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.id);
        Ok(list)
    }

    async fn save_group_content(&self, record: GroupContent) -> Result<()> {
        let mut content = self.content.write().unwrap();
        content.insert(record.id, record);
        Ok(())
    }

    async fn delete_group_content(&self, id: u64) -> Result<()> {
        let mut content = self.content.write().unwrap();
        content.remove(&id);
        Ok(())
    }
}
