//! Synchronization of site-wide roles into per-type group roles.
//!
//! Outsider permission contributions can come from roles defined outside the
//! group context. For every (group type, site role) pair a "synchronized"
//! group role mirrors the site role's existence, label and weight; the host
//! invokes the lifecycle handlers here from its own entity hooks.
//!
//! Synchronization is best-effort maintenance: a failure on one pair is
//! logged and skipped, never aborting the triggering save or rolling back
//! other pairs.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{GroupRole, GroupType, SiteRole};
use crate::storage::GroupStorage;

/// Derive the canonical id of a synchronized group role.
///
/// Deterministic and stable across process restarts; the id is used as a
/// storage key.
pub fn group_role_id(group_type: &str, site_role: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"group_role_sync");
    hasher.update(site_role.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{group_type}-{}", &digest[..8])
}

/// Maintains synchronized group roles across entity lifecycle events.
pub struct GroupRoleSynchronizer {
    storage: Arc<dyn GroupStorage>,
}

impl GroupRoleSynchronizer {
    /// Create a synchronizer over the given storage.
    pub fn new(storage: Arc<dyn GroupStorage>) -> Self {
        Self { storage }
    }

    /// Derive the synchronized role id for a (group type, site role) pair.
    pub fn group_role_id(&self, group_type: &str, site_role: &str) -> String {
        group_role_id(group_type, site_role)
    }

    /// Install a new group type.
    ///
    /// Saves the type together with its three internal roles, then creates
    /// synchronized roles for every existing site role.
    pub async fn install_group_type(&self, group_type: GroupType) -> Result<()> {
        let type_id = group_type.id.clone();

        self.storage.save_group_type(group_type.clone()).await?;
        for (role_id, label) in [
            (group_type.anonymous_role_id(), "Anonymous"),
            (group_type.outsider_role_id(), "Outsider"),
            (group_type.member_role_id(), "Member"),
        ] {
            self.storage
                .save_group_role(GroupRole::internal(role_id, &type_id, label))
                .await?;
        }

        let site_roles = self.storage.site_roles().await?;
        for site_role in &site_roles {
            if let Err(e) = self.create_synchronized_role(&group_type, site_role).await {
                warn!(
                    group_type = %type_id,
                    site_role = %site_role.id,
                    error = %e,
                    "Skipping synchronized role creation"
                );
            }
        }
        Ok(())
    }

    /// Remove a group type and the roles it owns.
    pub async fn remove_group_type(&self, id: &str) -> Result<()> {
        self.storage.delete_group_type(id).await
    }

    /// React to a new site-wide role: mirror it into every group type.
    pub async fn site_role_created(&self, role: &SiteRole) -> Result<()> {
        let group_types = self.storage.group_types().await?;
        for group_type in &group_types {
            if let Err(e) = self.create_synchronized_role(group_type, role).await {
                warn!(
                    group_type = %group_type.id,
                    site_role = %role.id,
                    error = %e,
                    "Skipping synchronized role creation"
                );
            }
        }
        Ok(())
    }

    /// React to a site-wide role update: mirror label and weight.
    ///
    /// Permissions granted to the synchronized roles are left untouched.
    pub async fn site_role_updated(&self, role: &SiteRole) -> Result<()> {
        let synchronized = self.storage.synchronized_roles(&role.id).await?;
        for mut group_role in synchronized {
            group_role.label = role.label.clone();
            group_role.weight = role.weight;
            if let Err(e) = self.storage.save_group_role(group_role).await {
                warn!(site_role = %role.id, error = %e, "Skipping synchronized role update");
            }
        }
        Ok(())
    }

    /// React to a site-wide role deletion: remove its synchronized roles.
    pub async fn site_role_deleted(&self, role_id: &str) -> Result<()> {
        let synchronized = self.storage.synchronized_roles(role_id).await?;
        for group_role in synchronized {
            if let Err(e) = self.storage.delete_group_role(&group_role.id).await {
                warn!(site_role = %role_id, error = %e, "Skipping synchronized role deletion");
            }
        }
        Ok(())
    }

    /// Import explicitly shipped role definitions.
    ///
    /// A file-defined role takes priority over one the synchronizer would
    /// auto-generate for the same id; later lifecycle events skip creation
    /// when the id is already taken.
    pub async fn import_roles(&self, roles: Vec<GroupRole>) -> Result<()> {
        for role in roles {
            debug!(role = %role.id, "Importing role definition");
            self.storage.save_group_role(role).await?;
        }
        Ok(())
    }

    async fn create_synchronized_role(
        &self,
        group_type: &GroupType,
        site_role: &SiteRole,
    ) -> Result<()> {
        let id = group_role_id(&group_type.id, &site_role.id);

        // An explicitly shipped role targeting this id wins over auto-creation.
        if self.storage.group_role(&id).await?.is_some() {
            debug!(role = %id, "Synchronized role id already taken, skipping");
            return Ok(());
        }

        let role = GroupRole {
            id,
            group_type: group_type.id.clone(),
            label: site_role.label.clone(),
            weight: site_role.weight,
            internal: false,
            synchronized_from: Some(site_role.id.clone()),
            permissions: Default::default(),
        };
        self.storage.save_group_role(role).await
    }
}
