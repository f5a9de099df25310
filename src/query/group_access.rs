//! Query-access conditions for group rows.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::access::has_site_permission;
use crate::calculator::ChainPermissionCalculator;
use crate::error::Result;
use crate::model::{Group, Principal, UserId};
use crate::permission::{
    CacheMetadata, Scope, GROUP_PERMISSIONS_CONTEXT, USER_CONTEXT, USER_PERMISSIONS_CONTEXT,
};
use crate::storage::GroupStorage;

use super::condition::{AccessConditions, ConditionGroup, Row};
use super::{
    Operation, ADMINISTER_GROUP, BYPASS_GROUP_ACCESS, DELETE_GROUP, EDIT_GROUP,
    VIEW_ANY_UNPUBLISHED_GROUP, VIEW_GROUP, VIEW_OWN_UNPUBLISHED_GROUP,
};

/// Compiles a principal's group permissions into conditions over group rows
/// (`id`, `type`, `uid`, `status`).
pub struct GroupQueryAccessHandler {
    chain: Arc<ChainPermissionCalculator>,
    storage: Arc<dyn GroupStorage>,
    bypass_permission: String,
}

impl GroupQueryAccessHandler {
    /// Create a handler with the default bypass permission.
    pub fn new(chain: Arc<ChainPermissionCalculator>, storage: Arc<dyn GroupStorage>) -> Self {
        Self {
            chain,
            storage,
            bypass_permission: BYPASS_GROUP_ACCESS.to_string(),
        }
    }

    /// Override the site-wide bypass permission.
    pub fn with_bypass_permission(mut self, permission: impl Into<String>) -> Self {
        self.bypass_permission = permission.into();
        self
    }

    /// The canonical row layout the compiled conditions reference.
    pub fn row_for_group(group: &Group) -> Row {
        Row::from([
            ("id".to_string(), json!(group.id)),
            ("type".to_string(), json!(group.group_type)),
            ("uid".to_string(), json!(group.owner)),
            ("status".to_string(), json!(group.published)),
        ])
    }

    /// Compile the conditions equivalent to "may `principal` perform
    /// `operation` on this row".
    pub async fn get_conditions(
        &self,
        operation: Operation,
        principal: &Principal,
    ) -> Result<AccessConditions> {
        let mut cache = CacheMetadata::permanent();
        cache.add_context(USER_PERMISSIONS_CONTEXT);

        if has_site_permission(self.storage.as_ref(), principal, &self.bypass_permission).await? {
            debug!(user = principal.id, "Bypass permission held, no conditions");
            return Ok(AccessConditions::unrestricted(cache));
        }
        cache.add_context(GROUP_PERMISSIONS_CONTEXT);

        let calculated = self.chain.calculate_permissions(principal).await?;
        cache.merge(calculated.cache());

        // Member groups are governed by their group scope exclusively; every
        // type-scope condition excludes them.
        let member_gids: Vec<u64> = if principal.is_anonymous() {
            Vec::new()
        } else {
            self.storage
                .memberships_of(principal.id)
                .await?
                .iter()
                .map(|m| m.group)
                .collect()
        };
        let exclusions: Vec<Value> = member_gids.iter().map(|gid| json!(gid)).collect();

        let mut admin_types = Vec::new();
        let mut any_types = Vec::new();
        let mut published_types = Vec::new();
        let mut any_unpublished_types = Vec::new();
        let mut own_unpublished_types = Vec::new();

        for group_type in self.storage.group_types().await? {
            let scope = Scope::group_type(&group_type.id);
            let Some(permissions) = calculated.permissions_for(&scope) else {
                continue;
            };
            let id = json!(group_type.id);

            if permissions.contains(ADMINISTER_GROUP) {
                admin_types.push(id);
                continue;
            }
            match operation {
                Operation::View => {
                    if permissions.contains(VIEW_GROUP) {
                        published_types.push(id.clone());
                    }
                    if permissions.contains(VIEW_ANY_UNPUBLISHED_GROUP) {
                        any_unpublished_types.push(id);
                    } else if permissions.contains(VIEW_OWN_UNPUBLISHED_GROUP) {
                        own_unpublished_types.push(id);
                    }
                }
                Operation::Update => {
                    if permissions.contains(EDIT_GROUP) {
                        any_types.push(id);
                    }
                }
                Operation::Delete => {
                    if permissions.contains(DELETE_GROUP) {
                        any_types.push(id);
                    }
                }
            }
        }

        let mut admin_groups = Vec::new();
        let mut any_groups = Vec::new();
        let mut published_groups = Vec::new();
        let mut any_unpublished_groups = Vec::new();
        let mut own_unpublished_groups = Vec::new();

        for gid in &member_gids {
            let scope = Scope::group(*gid);
            let Some(permissions) = calculated.permissions_for(&scope) else {
                continue;
            };
            let id = json!(gid);

            if permissions.contains(ADMINISTER_GROUP) {
                admin_groups.push(id);
                continue;
            }
            match operation {
                Operation::View => {
                    if permissions.contains(VIEW_GROUP) {
                        published_groups.push(id.clone());
                    }
                    if permissions.contains(VIEW_ANY_UNPUBLISHED_GROUP) {
                        any_unpublished_groups.push(id);
                    } else if permissions.contains(VIEW_OWN_UNPUBLISHED_GROUP) {
                        own_unpublished_groups.push(id);
                    }
                }
                Operation::Update => {
                    if permissions.contains(EDIT_GROUP) {
                        any_groups.push(id);
                    }
                }
                Operation::Delete => {
                    if permissions.contains(DELETE_GROUP) {
                        any_groups.push(id);
                    }
                }
            }
        }

        let mut or = ConditionGroup::or();
        let mut owner_condition = false;

        if !admin_types.is_empty() {
            or.add_group(type_branch(admin_types, &exclusions, None, None));
        }
        if !any_types.is_empty() {
            or.add_group(type_branch(any_types, &exclusions, None, None));
        }
        if !published_types.is_empty() {
            or.add_group(type_branch(published_types, &exclusions, Some(true), None));
        }
        if !any_unpublished_types.is_empty() {
            or.add_group(type_branch(
                any_unpublished_types,
                &exclusions,
                Some(false),
                None,
            ));
        }
        if !own_unpublished_types.is_empty() {
            owner_condition = true;
            or.add_group(type_branch(
                own_unpublished_types,
                &exclusions,
                Some(false),
                Some(principal.id),
            ));
        }

        if !admin_groups.is_empty() {
            or.add_group(group_branch(admin_groups, None, None));
        }
        if !any_groups.is_empty() {
            or.add_group(group_branch(any_groups, None, None));
        }
        if !published_groups.is_empty() {
            or.add_group(group_branch(published_groups, Some(true), None));
        }
        if !any_unpublished_groups.is_empty() {
            or.add_group(group_branch(any_unpublished_groups, Some(false), None));
        }
        if !own_unpublished_groups.is_empty() {
            owner_condition = true;
            or.add_group(group_branch(
                own_unpublished_groups,
                Some(false),
                Some(principal.id),
            ));
        }

        if owner_condition {
            cache.add_context(USER_CONTEXT);
        }
        if or.conditions.is_empty() {
            return Ok(AccessConditions::new(ConditionGroup::always_false(), cache));
        }
        Ok(AccessConditions::new(or, cache))
    }
}

/// Condition over all groups of the given types, minus member groups.
fn type_branch(
    types: Vec<Value>,
    exclusions: &[Value],
    status: Option<bool>,
    owner: Option<UserId>,
) -> ConditionGroup {
    let mut branch = ConditionGroup::and().field_in("type", types);
    if !exclusions.is_empty() {
        branch = branch.field_not_in("id", exclusions.to_vec());
    }
    if let Some(status) = status {
        branch = branch.field_equals("status", json!(status));
    }
    if let Some(uid) = owner {
        branch = branch.field_equals("uid", json!(uid));
    }
    branch
}

/// Condition over specific member groups.
fn group_branch(groups: Vec<Value>, status: Option<bool>, owner: Option<UserId>) -> ConditionGroup {
    let mut branch = ConditionGroup::and().field_in("id", groups);
    if let Some(status) = status {
        branch = branch.field_equals("status", json!(status));
    }
    if let Some(uid) = owner {
        branch = branch.field_equals("uid", json!(uid));
    }
    branch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupContent, GroupType, SiteRole};
    use crate::storage::MemoryGroupStorage;
    use crate::synchronizer::GroupRoleSynchronizer;

    async fn setup() -> (Arc<MemoryGroupStorage>, GroupQueryAccessHandler) {
        let storage = Arc::new(MemoryGroupStorage::new());
        let synchronizer = GroupRoleSynchronizer::new(storage.clone() as Arc<dyn GroupStorage>);
        synchronizer
            .install_group_type(GroupType::new("default", "Default"))
            .await
            .unwrap();

        let chain = Arc::new(ChainPermissionCalculator::new(
            storage.clone() as Arc<dyn GroupStorage>
        ));
        let handler = GroupQueryAccessHandler::new(chain, storage.clone());
        (storage, handler)
    }

    async fn grant(storage: &Arc<MemoryGroupStorage>, role_id: &str, permission: &str) {
        let mut role = storage.group_role(role_id).await.unwrap().unwrap();
        role.permissions.insert(permission.to_string());
        storage.save_group_role(role).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_permissions_compiles_to_always_false() {
        let (_storage, handler) = setup().await;

        let user = Principal::authenticated(7, vec![]);
        let conditions = handler.get_conditions(Operation::View, &user).await.unwrap();

        assert!(conditions.is_always_false());
        // Denial still carries cache metadata.
        assert!(conditions.cache.contexts.contains(USER_PERMISSIONS_CONTEXT));
        assert!(conditions.cache.contexts.contains(GROUP_PERMISSIONS_CONTEXT));
        assert!(conditions.cache.tags.contains("group_permissions"));
    }

    #[tokio::test]
    async fn test_view_selects_published_rows_of_granted_types() {
        let (storage, handler) = setup().await;
        grant(&storage, "default-outsider", VIEW_GROUP).await;

        let user = Principal::authenticated(7, vec![]);
        let conditions = handler.get_conditions(Operation::View, &user).await.unwrap();

        let published = GroupQueryAccessHandler::row_for_group(&Group::new(1, "default", 2));
        let draft = GroupQueryAccessHandler::row_for_group(&Group::unpublished(2, "default", 2));
        assert!(conditions.matches(&published));
        assert!(!conditions.matches(&draft));
    }

    #[tokio::test]
    async fn test_member_groups_excluded_from_type_scope() {
        let (storage, handler) = setup().await;
        grant(&storage, "default-outsider", VIEW_GROUP).await;

        storage.save_group(Group::new(1, "default", 2)).await.unwrap();
        storage.save_group(Group::new(2, "default", 2)).await.unwrap();
        storage
            .save_group_content(GroupContent::membership(10, 1, 7))
            .await
            .unwrap();

        let user = Principal::authenticated(7, vec![]);
        let conditions = handler.get_conditions(Operation::View, &user).await.unwrap();

        // The membership grants nothing, so the member group is not
        // selectable even though the outsider scope would allow it.
        let member_group = GroupQueryAccessHandler::row_for_group(&Group::new(1, "default", 2));
        let other_group = GroupQueryAccessHandler::row_for_group(&Group::new(2, "default", 2));
        assert!(!conditions.matches(&member_group));
        assert!(conditions.matches(&other_group));
    }

    #[tokio::test]
    async fn test_owner_conditions_add_user_context() {
        let (storage, handler) = setup().await;
        grant(&storage, "default-outsider", VIEW_OWN_UNPUBLISHED_GROUP).await;

        let user = Principal::authenticated(7, vec![]);
        let conditions = handler.get_conditions(Operation::View, &user).await.unwrap();
        assert!(conditions.cache.contexts.contains(USER_CONTEXT));

        let own_draft = GroupQueryAccessHandler::row_for_group(&Group::unpublished(1, "default", 7));
        let foreign_draft =
            GroupQueryAccessHandler::row_for_group(&Group::unpublished(2, "default", 2));
        assert!(conditions.matches(&own_draft));
        assert!(!conditions.matches(&foreign_draft));
    }

    #[tokio::test]
    async fn test_bypass_is_unrestricted_with_user_permissions_context() {
        let (storage, handler) = setup().await;

        let mut role = SiteRole::new("administrator", "Administrator");
        role.permissions.insert(BYPASS_GROUP_ACCESS.to_string());
        storage.save_site_role(role).await.unwrap();

        let admin = Principal::authenticated(9, vec!["administrator".to_string()]);
        let conditions = handler.get_conditions(Operation::View, &admin).await.unwrap();

        assert!(conditions.is_unrestricted());
        assert_eq!(
            conditions.cache.contexts.iter().collect::<Vec<_>>(),
            vec![USER_PERMISSIONS_CONTEXT]
        );
    }

    #[tokio::test]
    async fn test_update_ignores_status() {
        let (storage, handler) = setup().await;
        grant(&storage, "default-outsider", EDIT_GROUP).await;

        let user = Principal::authenticated(7, vec![]);
        let conditions = handler.get_conditions(Operation::Update, &user).await.unwrap();

        let draft = GroupQueryAccessHandler::row_for_group(&Group::unpublished(1, "default", 2));
        assert!(conditions.matches(&draft));
    }
}
