//! Calculated permission sets with attached cache metadata.
//!
//! A permission computation produces one entry per scope: a group type id
//! for the anonymous/outsider audiences, a group id for the member audience.
//! All collections are BTree-ordered so that repeated computation with
//! unchanged inputs yields bit-for-bit identical results.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::GroupId;

/// Max-age value meaning "permanent until tag invalidation".
pub const CACHE_PERMANENT: i64 = -1;

/// Cache tag carried by every permission computation.
pub const GROUP_PERMISSIONS_TAG: &str = "group_permissions";

/// Cache tag invalidated when the set of group types changes.
pub const GROUP_TYPE_LIST_TAG: &str = "config:group_type_list";

/// Cache context for results varying by group permission fingerprint.
pub const GROUP_PERMISSIONS_CONTEXT: &str = "user.group_permissions";

/// Cache context for results varying by site-wide permissions.
pub const USER_PERMISSIONS_CONTEXT: &str = "user.permissions";

/// Cache context for results varying by the exact user (ownership checks).
pub const USER_CONTEXT: &str = "user";

/// Cache tag for a group role's configuration.
pub fn role_cache_tag(role_id: &str) -> String {
    format!("config:group.role.{role_id}")
}

/// Grouping key of one permission set entry.
///
/// Anonymous and outsider results share the `GroupType` key space, so two
/// computations for different audiences can be compared for set-equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Permissions that apply to every group of a type (anonymous/outsider).
    GroupType(String),
    /// Permissions that apply to one specific group (member).
    Group(GroupId),
}

impl Scope {
    /// Scope for a group type id.
    pub fn group_type(id: impl Into<String>) -> Self {
        Scope::GroupType(id.into())
    }

    /// Scope for a specific group.
    pub fn group(id: GroupId) -> Self {
        Scope::Group(id)
    }
}

/// Invalidation tags, variation contexts and max-age for a computed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Variation axes (e.g. `user.group_permissions`).
    pub contexts: BTreeSet<String>,
    /// Invalidation keys (e.g. `config:group.role.default-outsider`).
    pub tags: BTreeSet<String>,
    /// Seconds, or [`CACHE_PERMANENT`].
    pub max_age: i64,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self::permanent()
    }
}

impl CacheMetadata {
    /// Metadata with no contexts or tags and a permanent max-age.
    pub fn permanent() -> Self {
        Self {
            contexts: BTreeSet::new(),
            tags: BTreeSet::new(),
            max_age: CACHE_PERMANENT,
        }
    }

    /// Add a cache tag.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    /// Add a cache context.
    pub fn add_context(&mut self, context: impl Into<String>) {
        self.contexts.insert(context.into());
    }

    /// Merge another metadata set into this one.
    ///
    /// Contexts and tags are unioned (duplicates collapse); the max-age
    /// becomes the smaller of the two, with [`CACHE_PERMANENT`] acting as
    /// the largest possible value.
    pub fn merge(&mut self, other: &CacheMetadata) {
        self.contexts.extend(other.contexts.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
        self.max_age = merge_max_age(self.max_age, other.max_age);
    }
}

fn merge_max_age(a: i64, b: i64) -> i64 {
    match (a, b) {
        (CACHE_PERMANENT, other) => other,
        (other, CACHE_PERMANENT) => other,
        (a, b) => a.min(b),
    }
}

/// Mutable accumulator for permission computation.
///
/// Calculators contribute partial results into one of these; the chain
/// merges them and [finalizes](RefinablePermissionSet::finalize) the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefinablePermissionSet {
    items: BTreeMap<Scope, BTreeSet<String>>,
    cache: CacheMetadata,
}

impl RefinablePermissionSet {
    /// Create an empty set with permanent cache metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scope entry, creating an empty permission set if absent.
    ///
    /// Every known group type must appear in anonymous/outsider results even
    /// when it grants nothing, so calculators call this for each type.
    pub fn ensure_scope(&mut self, scope: Scope) -> &mut BTreeSet<String> {
        self.items.entry(scope).or_default()
    }

    /// Union permissions into a scope entry.
    pub fn add_permissions<I, S>(&mut self, scope: Scope, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.items.entry(scope).or_default();
        entry.extend(permissions.into_iter().map(Into::into));
    }

    /// Add a cache tag to the attached metadata.
    pub fn add_cache_tag(&mut self, tag: impl Into<String>) {
        self.cache.add_tag(tag);
    }

    /// Add a cache context to the attached metadata.
    pub fn add_cache_context(&mut self, context: impl Into<String>) {
        self.cache.add_context(context);
    }

    /// Merge another refinable set into this one.
    ///
    /// Permission strings are unioned per scope; entries for disjoint scopes
    /// never overwrite each other. Cache metadata is unioned.
    pub fn merge(&mut self, other: &RefinablePermissionSet) {
        for (scope, permissions) in &other.items {
            let entry = self.items.entry(scope.clone()).or_default();
            entry.extend(permissions.iter().cloned());
        }
        self.cache.merge(&other.cache);
    }

    /// Merge an already-finalized set into this one.
    pub fn merge_calculated(&mut self, other: &CalculatedPermissions) {
        for (scope, permissions) in other.items() {
            let entry = self.items.entry(scope.clone()).or_default();
            entry.extend(permissions.iter().cloned());
        }
        self.cache.merge(other.cache());
    }

    /// Mutable access to the cache metadata.
    pub fn cache_mut(&mut self) -> &mut CacheMetadata {
        &mut self.cache
    }

    /// Finalize into an immutable calculated set.
    pub fn finalize(self) -> CalculatedPermissions {
        CalculatedPermissions {
            items: self.items,
            cache: self.cache,
        }
    }
}

/// Immutable result of a permission computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedPermissions {
    items: BTreeMap<Scope, BTreeSet<String>>,
    cache: CacheMetadata,
}

impl CalculatedPermissions {
    /// Permission strings for a scope, if the scope was computed.
    pub fn permissions_for(&self, scope: &Scope) -> Option<&BTreeSet<String>> {
        self.items.get(scope)
    }

    /// Whether the given scope grants a permission.
    pub fn has_permission(&self, scope: &Scope, permission: &str) -> bool {
        self.items
            .get(scope)
            .is_some_and(|perms| perms.contains(permission))
    }

    /// All computed scope keys, in deterministic order.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.items.keys()
    }

    /// The computed entries.
    pub fn items(&self) -> &BTreeMap<Scope, BTreeSet<String>> {
        &self.items
    }

    /// Attached cache metadata.
    pub fn cache(&self) -> &CacheMetadata {
        &self.cache
    }

    /// Compare permission entries only, ignoring cache metadata.
    ///
    /// Anonymous and outsider results may legitimately differ in contexts
    /// while granting the same access.
    pub fn same_permissions(&self, other: &CalculatedPermissions) -> bool {
        self.items == other.items
    }
}
