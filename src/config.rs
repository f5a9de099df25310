//! Configuration for the palisade authorization engine.
//!
//! Besides tunables, the configuration doubles as the seeding format a host
//! uses to ship an initial site layout: site roles, group types with their
//! content plugins, permission grants for the internal roles, and custom
//! group roles. [`Config::install`] applies the seed through the same
//! lifecycle paths the host would invoke at runtime.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::AccessChecker;
use crate::calculator::ChainPermissionCalculator;
use crate::error::{ConfigError, Result};
use crate::model::{GroupRole, GroupType, SiteRole};
use crate::query::{GroupContentQueryAccessHandler, GroupQueryAccessHandler, BYPASS_GROUP_ACCESS};
use crate::storage::GroupStorage;
use crate::synchronizer::GroupRoleSynchronizer;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access: AccessConfig,
    pub site_roles: Vec<SiteRoleConfig>,
    pub group_types: Vec<GroupTypeConfig>,
    pub roles: Vec<GroupRoleConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.access.bypass_permission.is_empty() {
            return Err(ConfigError::MissingField("access.bypass_permission".to_string()).into());
        }
        if self.access.permission_cache_capacity == 0 {
            return Err(
                ConfigError::Invalid("permission_cache_capacity must be > 0".to_string()).into(),
            );
        }

        let mut type_ids = BTreeSet::new();
        for group_type in &self.group_types {
            if group_type.id.is_empty() {
                return Err(ConfigError::MissingField("group_types.id".to_string()).into());
            }
            if !type_ids.insert(group_type.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate group type '{}'",
                    group_type.id
                ))
                .into());
            }
        }

        // Custom roles must target a group type declared in the same file.
        for role in &self.roles {
            if !type_ids.contains(role.group_type.as_str()) {
                return Err(ConfigError::UnknownGroupType(role.group_type.clone()).into());
            }
        }

        Ok(())
    }

    /// Apply the seed to storage.
    ///
    /// Idempotence is the storage layer's concern; re-installing overwrites
    /// previously seeded definitions with the file's contents.
    pub async fn install(&self, storage: Arc<dyn GroupStorage>) -> Result<()> {
        let synchronizer = GroupRoleSynchronizer::new(storage.clone());

        for site_role in &self.site_roles {
            storage.save_site_role(site_role.to_role()).await?;
        }

        for group_type_config in &self.group_types {
            let group_type = group_type_config.to_group_type();
            info!(group_type = %group_type.id, "Installing group type");
            synchronizer.install_group_type(group_type.clone()).await?;

            for (role_id, permissions) in [
                (group_type.anonymous_role_id(), &group_type_config.anonymous),
                (group_type.outsider_role_id(), &group_type_config.outsider),
                (group_type.member_role_id(), &group_type_config.member),
            ] {
                if permissions.is_empty() {
                    continue;
                }
                let mut role = storage
                    .group_role(&role_id)
                    .await?
                    .ok_or_else(|| ConfigError::UnknownRole(role_id.clone()))?;
                role.permissions.extend(permissions.iter().cloned());
                storage.save_group_role(role).await?;
            }
        }

        let custom = self.roles.iter().map(GroupRoleConfig::to_role).collect();
        synchronizer.import_roles(custom).await?;

        Ok(())
    }

    /// Calculator chain sized by the `[access]` section.
    pub fn build_chain(&self, storage: Arc<dyn GroupStorage>) -> Arc<ChainPermissionCalculator> {
        Arc::new(ChainPermissionCalculator::with_capacity(
            storage,
            self.access.permission_cache_capacity,
        ))
    }

    /// Access checker honoring the configured bypass permission.
    pub fn build_checker(
        &self,
        chain: Arc<ChainPermissionCalculator>,
        storage: Arc<dyn GroupStorage>,
    ) -> AccessChecker {
        AccessChecker::new(chain, storage)
            .with_bypass_permission(self.access.bypass_permission.clone())
    }

    /// Group query-access handler honoring the configured bypass permission.
    pub fn build_group_handler(
        &self,
        chain: Arc<ChainPermissionCalculator>,
        storage: Arc<dyn GroupStorage>,
    ) -> GroupQueryAccessHandler {
        GroupQueryAccessHandler::new(chain, storage)
            .with_bypass_permission(self.access.bypass_permission.clone())
    }

    /// Content query-access handler honoring the configured bypass permission.
    pub fn build_content_handler(
        &self,
        chain: Arc<ChainPermissionCalculator>,
        storage: Arc<dyn GroupStorage>,
    ) -> GroupContentQueryAccessHandler {
        GroupContentQueryAccessHandler::new(chain, storage)
            .with_bypass_permission(self.access.bypass_permission.clone())
    }
}

/// Access-check tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Site-wide permission that bypasses all group access control.
    pub bypass_permission: String,
    /// Capacity of the per-principal calculated-permissions cache.
    pub permission_cache_capacity: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            bypass_permission: BYPASS_GROUP_ACCESS.to_string(),
            permission_cache_capacity: 10_000,
        }
    }
}

/// Seed definition of a site-wide role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteRoleConfig {
    pub id: String,
    pub label: String,
    pub weight: i32,
    pub permissions: Vec<String>,
}

impl SiteRoleConfig {
    fn to_role(&self) -> SiteRole {
        let mut role = SiteRole::new(&self.id, &self.label);
        role.weight = self.weight;
        role.permissions.extend(self.permissions.iter().cloned());
        role
    }
}

/// Seed definition of a group type.
///
/// The `anonymous`/`outsider`/`member` lists grant permissions to the
/// internal roles created alongside the type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupTypeConfig {
    pub id: String,
    pub label: String,
    pub plugins: Vec<String>,
    pub anonymous: Vec<String>,
    pub outsider: Vec<String>,
    pub member: Vec<String>,
}

impl GroupTypeConfig {
    fn to_group_type(&self) -> GroupType {
        let mut group_type = GroupType::new(&self.id, &self.label);
        group_type.plugins.extend(self.plugins.iter().cloned());
        group_type
    }
}

/// Seed definition of a custom (assignable) group role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRoleConfig {
    pub id: String,
    pub group_type: String,
    pub label: String,
    pub weight: i32,
    pub permissions: Vec<String>,
}

impl GroupRoleConfig {
    fn to_role(&self) -> GroupRole {
        let mut role = GroupRole::new(&self.id, &self.group_type, &self.label);
        role.weight = self.weight;
        role.permissions.extend(self.permissions.iter().cloned());
        role
    }
}
