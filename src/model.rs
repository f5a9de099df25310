//! Core data model for group-scoped authorization.
//!
//! These are plain value structs: an immutable snapshot of the identities,
//! types, roles and relationships a permission computation runs over. The
//! host system owns their persistence; see [`crate::storage::GroupStorage`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// Numeric user id. Id 0 is the anonymous user.
pub type UserId = u64;

/// Numeric group id.
pub type GroupId = u64;

/// Plugin id of the membership relationship.
pub const MEMBERSHIP_PLUGIN: &str = "group_membership";

/// The acting identity for a permission computation.
///
/// Immutable for the duration of one computation; group memberships are
/// derived from storage rather than carried on the principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User id; 0 means anonymous.
    pub id: UserId,
    /// Site-wide role ids held by this user.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// Create the anonymous principal.
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            roles: BTreeSet::new(),
        }
    }

    /// Create an authenticated principal with the given site-wide roles.
    pub fn authenticated(id: UserId, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    /// Whether this is the anonymous user.
    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }

    /// Check if the principal holds a specific site-wide role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// A site-wide role, defined outside any group context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRole {
    /// Role id.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Ordering weight.
    #[serde(default)]
    pub weight: i32,
    /// Site-wide permission strings granted by this role.
    #[serde(default)]
    pub permissions: HashSet<String>,
}

impl SiteRole {
    /// Create a site role with no permissions.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            weight: 0,
            permissions: HashSet::new(),
        }
    }
}

/// A named category of group.
///
/// Every group type owns exactly three internal roles (anonymous, outsider,
/// member), created atomically with the type and removed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupType {
    /// Type id.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Installed content-enabler plugin ids.
    #[serde(default)]
    pub plugins: BTreeSet<String>,
}

impl GroupType {
    /// Create a group type with no content plugins installed.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            plugins: BTreeSet::new(),
        }
    }

    /// Id of the internal role applied to anonymous users.
    pub fn anonymous_role_id(&self) -> String {
        format!("{}-anonymous", self.id)
    }

    /// Id of the internal role applied to authenticated non-members.
    pub fn outsider_role_id(&self) -> String {
        format!("{}-outsider", self.id)
    }

    /// Id of the internal role applied to members.
    pub fn member_role_id(&self) -> String {
        format!("{}-member", self.id)
    }
}

/// A role scoped to one group type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRole {
    /// Role id, unique across all group types.
    pub id: String,
    /// Id of the owning group type.
    pub group_type: String,
    /// Human-readable label.
    pub label: String,
    /// Ordering weight.
    #[serde(default)]
    pub weight: i32,
    /// Internal roles (anonymous/outsider/member) are implicit and cannot be
    /// assigned to a membership.
    #[serde(default)]
    pub internal: bool,
    /// Id of the site-wide role this role mirrors, if synchronized.
    #[serde(default)]
    pub synchronized_from: Option<String>,
    /// Permission strings granted by this role.
    #[serde(default)]
    pub permissions: HashSet<String>,
}

impl GroupRole {
    /// Create an assignable (non-internal) role.
    pub fn new(
        id: impl Into<String>,
        group_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            group_type: group_type.into(),
            label: label.into(),
            weight: 0,
            internal: false,
            synchronized_from: None,
            permissions: HashSet::new(),
        }
    }

    /// Create one of the three internal roles of a group type.
    pub fn internal(
        id: impl Into<String>,
        group_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            internal: true,
            ..Self::new(id, group_type, label)
        }
    }

    /// Grant additional permissions to this role.
    pub fn grant(mut self, permissions: impl IntoIterator<Item = &'static str>) -> Self {
        self.permissions
            .extend(permissions.into_iter().map(str::to_string));
        self
    }

    /// Whether this role mirrors a site-wide role.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized_from.is_some()
    }
}

/// An instance of a group type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id.
    pub id: GroupId,
    /// Id of the group type.
    pub group_type: String,
    /// Owner user id.
    pub owner: UserId,
    /// Published status.
    pub published: bool,
}

impl Group {
    /// Create a published group.
    pub fn new(id: GroupId, group_type: impl Into<String>, owner: UserId) -> Self {
        Self {
            id,
            group_type: group_type.into(),
            owner,
            published: true,
        }
    }

    /// Create an unpublished group.
    pub fn unpublished(id: GroupId, group_type: impl Into<String>, owner: UserId) -> Self {
        Self {
            published: false,
            ..Self::new(id, group_type, owner)
        }
    }
}

/// A relationship record linking a group to a target entity.
///
/// Memberships are group content with the [`MEMBERSHIP_PLUGIN`] plugin and
/// the member's uid as `entity_id`/`entity_owner`; only memberships carry
/// assigned group role ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContent {
    /// Relationship record id.
    pub id: u64,
    /// Id of the group this record belongs to.
    pub group: GroupId,
    /// Content-enabler plugin id.
    pub plugin: String,
    /// Id of the target entity.
    pub entity_id: String,
    /// Owner uid of the target entity.
    pub entity_owner: UserId,
    /// Assigned group role ids (memberships only).
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl GroupContent {
    /// Create a content relationship for an arbitrary entity.
    pub fn new(
        id: u64,
        group: GroupId,
        plugin: impl Into<String>,
        entity_id: impl Into<String>,
        entity_owner: UserId,
    ) -> Self {
        Self {
            id,
            group,
            plugin: plugin.into(),
            entity_id: entity_id.into(),
            entity_owner,
            roles: BTreeSet::new(),
        }
    }

    /// Create a membership record for a user.
    pub fn membership(id: u64, group: GroupId, user: UserId) -> Self {
        Self::new(id, group, MEMBERSHIP_PLUGIN, user.to_string(), user)
    }

    /// Assign additional group roles to this membership.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Whether this record is a membership.
    pub fn is_membership(&self) -> bool {
        self.plugin == MEMBERSHIP_PLUGIN
    }

    /// Cache tag invalidated when this record changes.
    pub fn cache_tag(&self) -> String {
        format!("group_content:{}", self.id)
    }
}
