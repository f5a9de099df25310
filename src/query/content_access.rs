//! Query-access conditions for group content rows.
//!
//! Content rows (`gid`, `group_type`, `plugin_id`, `uid`) carry no published
//! flag, so unlike group rows there is no status axis; access splits per
//! plugin into administer / any / own tiers.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::access::has_site_permission;
use crate::calculator::ChainPermissionCalculator;
use crate::error::Result;
use crate::model::{Group, GroupContent, Principal, UserId};
use crate::permission::{
    CacheMetadata, Scope, GROUP_PERMISSIONS_CONTEXT, USER_CONTEXT, USER_PERMISSIONS_CONTEXT,
};
use crate::storage::GroupStorage;

use super::condition::{AccessConditions, ConditionGroup, Row};
use super::{
    plugin_admin_permission, plugin_any_permission, plugin_own_permission, Operation,
    BYPASS_GROUP_ACCESS,
};

/// Per-plugin accumulation of contributing types and member groups.
#[derive(Default)]
struct PluginBuckets {
    any_types: Vec<Value>,
    own_types: Vec<Value>,
    any_groups: Vec<Value>,
    own_groups: Vec<Value>,
}

/// Compiles a principal's group permissions into conditions over content
/// relationship rows.
pub struct GroupContentQueryAccessHandler {
    chain: Arc<ChainPermissionCalculator>,
    storage: Arc<dyn GroupStorage>,
    bypass_permission: String,
}

impl GroupContentQueryAccessHandler {
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
    ///
    /// `group_type` is denormalized from the owning group so type-scope
    /// conditions need no join.
    pub fn row_for_content(content: &GroupContent, group: &Group) -> Row {
        Row::from([
            ("gid".to_string(), json!(content.group)),
            ("group_type".to_string(), json!(group.group_type)),
            ("plugin_id".to_string(), json!(content.plugin)),
            ("uid".to_string(), json!(content.entity_owner)),
        ])
    }

    /// Compile the conditions equivalent to "may `principal` perform
    /// `operation` on this content row".
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

        let mut buckets: BTreeMap<String, PluginBuckets> = BTreeMap::new();

        for group_type in self.storage.group_types().await? {
            let scope = Scope::group_type(&group_type.id);
            let Some(permissions) = calculated.permissions_for(&scope) else {
                continue;
            };
            for plugin in &group_type.plugins {
                let bucket = buckets.entry(plugin.clone()).or_default();
                if permissions.contains(&plugin_admin_permission(plugin))
                    || permissions.contains(&plugin_any_permission(operation, plugin))
                {
                    bucket.any_types.push(json!(group_type.id));
                } else if permissions.contains(&plugin_own_permission(operation, plugin)) {
                    bucket.own_types.push(json!(group_type.id));
                }
            }
        }

        for gid in &member_gids {
            let scope = Scope::group(*gid);
            let Some(permissions) = calculated.permissions_for(&scope) else {
                continue;
            };
            let Some(group) = self.storage.group(*gid).await? else {
                continue;
            };
            let Some(group_type) = self.storage.group_type(&group.group_type).await? else {
                continue;
            };
            for plugin in &group_type.plugins {
                let bucket = buckets.entry(plugin.clone()).or_default();
                if permissions.contains(&plugin_admin_permission(plugin))
                    || permissions.contains(&plugin_any_permission(operation, plugin))
                {
                    bucket.any_groups.push(json!(gid));
                } else if permissions.contains(&plugin_own_permission(operation, plugin)) {
                    bucket.own_groups.push(json!(gid));
                }
            }
        }

        let mut or = ConditionGroup::or();
        let mut owner_condition = false;

        for (plugin, bucket) in buckets {
            if !bucket.any_types.is_empty() {
                or.add_group(plugin_type_branch(
                    &plugin,
                    bucket.any_types,
                    &exclusions,
                    None,
                ));
            }
            if !bucket.own_types.is_empty() {
                owner_condition = true;
                or.add_group(plugin_type_branch(
                    &plugin,
                    bucket.own_types,
                    &exclusions,
                    Some(principal.id),
                ));
            }
            if !bucket.any_groups.is_empty() {
                or.add_group(plugin_group_branch(&plugin, bucket.any_groups, None));
            }
            if !bucket.own_groups.is_empty() {
                owner_condition = true;
                or.add_group(plugin_group_branch(
                    &plugin,
                    bucket.own_groups,
                    Some(principal.id),
                ));
            }
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

fn plugin_type_branch(
    plugin: &str,
    types: Vec<Value>,
    exclusions: &[Value],
    owner: Option<UserId>,
) -> ConditionGroup {
    let mut branch = ConditionGroup::and()
        .field_equals("plugin_id", json!(plugin))
        .field_in("group_type", types);
    if !exclusions.is_empty() {
        branch = branch.field_not_in("gid", exclusions.to_vec());
    }
    if let Some(uid) = owner {
        branch = branch.field_equals("uid", json!(uid));
    }
    branch
}

fn plugin_group_branch(plugin: &str, groups: Vec<Value>, owner: Option<UserId>) -> ConditionGroup {
    let mut branch = ConditionGroup::and()
        .field_equals("plugin_id", json!(plugin))
        .field_in("gid", groups);
    if let Some(uid) = owner {
        branch = branch.field_equals("uid", json!(uid));
    }
    branch
}
