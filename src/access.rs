//! Single-entity access checks.
//!
//! The entity-access hook point: given one group or content record, decide
//! whether a principal may perform an operation on it. The query-access
//! handlers compile the same logic into condition trees; the two paths must
//! agree row for row, which the integration tests verify exhaustively.

use std::sync::Arc;

use crate::calculator::ChainPermissionCalculator;
use crate::error::Result;
use crate::model::{Group, GroupContent, Principal};
use crate::permission::Scope;
use crate::query::{
    plugin_admin_permission, plugin_any_permission, plugin_own_permission, Operation,
    ADMINISTER_GROUP, BYPASS_GROUP_ACCESS, DELETE_GROUP, EDIT_GROUP, VIEW_ANY_UNPUBLISHED_GROUP,
    VIEW_GROUP, VIEW_OWN_UNPUBLISHED_GROUP,
};
use crate::storage::GroupStorage;

/// Check a site-wide permission through the principal's site roles.
pub async fn has_site_permission(
    storage: &dyn GroupStorage,
    principal: &Principal,
    permission: &str,
) -> Result<bool> {
    for role_id in &principal.roles {
        if let Some(role) = storage.site_role(role_id).await? {
            if role.permissions.contains(permission) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Evaluates single-entity access for groups and group content.
pub struct AccessChecker {
    chain: Arc<ChainPermissionCalculator>,
    storage: Arc<dyn GroupStorage>,
    bypass_permission: String,
}

impl AccessChecker {
    /// Create a checker with the default bypass permission.
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

    /// Whether the principal may perform the operation on a group.
    pub async fn group_access(
        &self,
        principal: &Principal,
        operation: Operation,
        group: &Group,
    ) -> Result<bool> {
        if has_site_permission(self.storage.as_ref(), principal, &self.bypass_permission).await? {
            return Ok(true);
        }

        let calculated = self.chain.calculate_permissions(principal).await?;
        let scope = self.scope_for(principal, group.id, &group.group_type).await?;
        let Some(permissions) = calculated.permissions_for(&scope).cloned() else {
            return Ok(false);
        };

        if permissions.contains(ADMINISTER_GROUP) {
            return Ok(true);
        }

        Ok(match operation {
            Operation::View => {
                if group.published {
                    permissions.contains(VIEW_GROUP)
                } else {
                    permissions.contains(VIEW_ANY_UNPUBLISHED_GROUP)
                        || (group.owner == principal.id
                            && permissions.contains(VIEW_OWN_UNPUBLISHED_GROUP))
                }
            }
            Operation::Update => permissions.contains(EDIT_GROUP),
            Operation::Delete => permissions.contains(DELETE_GROUP),
        })
    }

    /// Whether the principal may perform the operation on a content record.
    pub async fn content_access(
        &self,
        principal: &Principal,
        operation: Operation,
        content: &GroupContent,
    ) -> Result<bool> {
        if has_site_permission(self.storage.as_ref(), principal, &self.bypass_permission).await? {
            return Ok(true);
        }

        // A record pointing at a missing group grants nothing.
        let Some(group) = self.storage.group(content.group).await? else {
            return Ok(false);
        };
        // Permission strings only take effect for plugins installed on the
        // group's type; the query compiler emits branches per installed
        // plugin, and this path must agree with it.
        let Some(group_type) = self.storage.group_type(&group.group_type).await? else {
            return Ok(false);
        };
        if !group_type.plugins.contains(&content.plugin) {
            return Ok(false);
        }

        let calculated = self.chain.calculate_permissions(principal).await?;
        let scope = self.scope_for(principal, group.id, &group.group_type).await?;
        let Some(permissions) = calculated.permissions_for(&scope).cloned() else {
            return Ok(false);
        };

        if permissions.contains(&plugin_admin_permission(&content.plugin)) {
            return Ok(true);
        }
        if permissions.contains(&plugin_any_permission(operation, &content.plugin)) {
            return Ok(true);
        }
        Ok(content.entity_owner == principal.id
            && permissions.contains(&plugin_own_permission(operation, &content.plugin)))
    }

    /// Member scope when a membership exists, type scope otherwise.
    ///
    /// The member scope governs exclusively for a member's groups, even when
    /// it grants less than the type scope would.
    async fn scope_for(
        &self,
        principal: &Principal,
        group: crate::model::GroupId,
        group_type: &str,
    ) -> Result<Scope> {
        if !principal.is_anonymous()
            && self.storage.membership(group, principal.id).await?.is_some()
        {
            Ok(Scope::group(group))
        } else {
            Ok(Scope::group_type(group_type))
        }
    }
}
