//! Synchronized calculator: outsider permissions contributed by group roles
//! that mirror the principal's site-wide roles.
//!
//! Kept separate from [`super::DefaultPermissionCalculator`] because its
//! results subscribe to different invalidation tags (one per synchronized
//! role consulted).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Principal;
use crate::permission::{
    role_cache_tag, RefinablePermissionSet, Scope, GROUP_PERMISSIONS_TAG, GROUP_TYPE_LIST_TAG,
};
use crate::storage::GroupStorage;
use crate::synchronizer::group_role_id;

use super::PermissionCalculator;

/// Folds synchronized-role grants into the outsider audience.
pub struct SynchronizedPermissionCalculator {
    storage: Arc<dyn GroupStorage>,
}

impl SynchronizedPermissionCalculator {
    /// Create a calculator over the given storage.
    pub fn new(storage: Arc<dyn GroupStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PermissionCalculator for SynchronizedPermissionCalculator {
    async fn outsider_permissions(&self, principal: &Principal) -> Result<RefinablePermissionSet> {
        let mut set = RefinablePermissionSet::new();
        set.add_cache_tag(GROUP_TYPE_LIST_TAG);
        set.add_cache_tag(GROUP_PERMISSIONS_TAG);

        for group_type in self.storage.group_types().await? {
            let scope = Scope::group_type(&group_type.id);
            set.ensure_scope(scope.clone());

            for site_role in &principal.roles {
                let role_id = group_role_id(&group_type.id, site_role);
                if let Some(role) = self.storage.group_role(&role_id).await? {
                    set.add_permissions(scope.clone(), role.permissions.iter().cloned());
                    set.add_cache_tag(role_cache_tag(&role.id));
                }
            }
        }
        Ok(set)
    }
}
