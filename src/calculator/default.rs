//! Default calculator: permissions granted through a group type's internal
//! roles and the explicit roles stored on memberships.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Principal;
use crate::permission::{
    role_cache_tag, RefinablePermissionSet, Scope, GROUP_PERMISSIONS_TAG, GROUP_TYPE_LIST_TAG,
};
use crate::storage::GroupStorage;

use super::PermissionCalculator;

/// Reads permissions granted directly to the internal anonymous, outsider
/// and member roles, plus the explicit roles on the principal's memberships.
pub struct DefaultPermissionCalculator {
    storage: Arc<dyn GroupStorage>,
}

impl DefaultPermissionCalculator {
    /// Create a calculator over the given storage.
    pub fn new(storage: Arc<dyn GroupStorage>) -> Self {
        Self { storage }
    }

    /// Contribution of one internal role to a type-keyed scope.
    ///
    /// A missing role contributes nothing; the scope entry is recorded
    /// regardless so every known group type appears in the result.
    async fn add_internal_role(
        &self,
        set: &mut RefinablePermissionSet,
        scope: Scope,
        role_id: &str,
    ) -> Result<()> {
        set.ensure_scope(scope.clone());
        if let Some(role) = self.storage.group_role(role_id).await? {
            set.add_permissions(scope, role.permissions.iter().cloned());
            set.add_cache_tag(role_cache_tag(&role.id));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionCalculator for DefaultPermissionCalculator {
    async fn anonymous_permissions(&self) -> Result<RefinablePermissionSet> {
        let mut set = RefinablePermissionSet::new();
        set.add_cache_tag(GROUP_TYPE_LIST_TAG);
        set.add_cache_tag(GROUP_PERMISSIONS_TAG);

        for group_type in self.storage.group_types().await? {
            let scope = Scope::group_type(&group_type.id);
            self.add_internal_role(&mut set, scope, &group_type.anonymous_role_id())
                .await?;
        }
        Ok(set)
    }

    async fn outsider_permissions(&self, _principal: &Principal) -> Result<RefinablePermissionSet> {
        let mut set = RefinablePermissionSet::new();
        set.add_cache_tag(GROUP_TYPE_LIST_TAG);
        set.add_cache_tag(GROUP_PERMISSIONS_TAG);

        for group_type in self.storage.group_types().await? {
            let scope = Scope::group_type(&group_type.id);
            self.add_internal_role(&mut set, scope, &group_type.outsider_role_id())
                .await?;
        }
        Ok(set)
    }

    async fn member_permissions(&self, principal: &Principal) -> Result<RefinablePermissionSet> {
        let mut set = RefinablePermissionSet::new();
        set.add_cache_tag(GROUP_PERMISSIONS_TAG);

        // Tags only cover roles actually consulted for this principal's
        // memberships; adding a role to an unrelated type must not change
        // this result's invalidation set.
        for membership in self.storage.memberships_of(principal.id).await? {
            let scope = Scope::group(membership.group);
            set.ensure_scope(scope.clone());
            set.add_cache_tag(membership.cache_tag());

            if let Some(group) = self.storage.group(membership.group).await? {
                if let Some(group_type) = self.storage.group_type(&group.group_type).await? {
                    self.add_internal_role(&mut set, scope.clone(), &group_type.member_role_id())
                        .await?;
                }
            }

            for role_id in &membership.roles {
                if let Some(role) = self.storage.group_role(role_id).await? {
                    set.add_permissions(scope.clone(), role.permissions.iter().cloned());
                    set.add_cache_tag(role_cache_tag(&role.id));
                }
            }
        }
        Ok(set)
    }
}
