//! Compilation of permission sets into query-access condition trees.
//!
//! Listing queries (and views) must return only rows the principal may
//! access, without a per-row callback. The handlers here translate the same
//! permission logic used for single-entity checks into AND/OR condition
//! trees over row fields, with cache metadata equivalent to the permission
//! sets consulted.

mod condition;
mod content_access;
mod group_access;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AccessError;

pub use condition::{
    AccessConditions, Condition, ConditionGroup, Conjunction, FieldCondition, Operator, Row,
};
pub use content_access::GroupContentQueryAccessHandler;
pub use group_access::GroupQueryAccessHandler;

/// Permission granting full control over groups of a type.
pub const ADMINISTER_GROUP: &str = "administer group";
/// Permission to view published groups.
pub const VIEW_GROUP: &str = "view group";
/// Permission to view any unpublished group.
pub const VIEW_ANY_UNPUBLISHED_GROUP: &str = "view any unpublished group";
/// Permission to view unpublished groups the principal owns.
pub const VIEW_OWN_UNPUBLISHED_GROUP: &str = "view own unpublished group";
/// Permission to edit groups.
pub const EDIT_GROUP: &str = "edit group";
/// Permission to delete groups.
pub const DELETE_GROUP: &str = "delete group";

/// Default site-wide permission that bypasses all group access control.
pub const BYPASS_GROUP_ACCESS: &str = "bypass group access";

/// Operations a query-access handler can compile conditions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    View,
    Update,
    Delete,
}

impl Operation {
    /// The operation verb as it appears inside permission strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Operation::View),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(AccessError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Permission granting full control over a plugin's content in a group.
pub fn plugin_admin_permission(plugin: &str) -> String {
    format!("administer {plugin}")
}

/// Per-operation permission over any of a plugin's content.
pub fn plugin_any_permission(operation: Operation, plugin: &str) -> String {
    format!("{operation} any {plugin} entity")
}

/// Per-operation permission over a plugin's content the principal owns.
pub fn plugin_own_permission(operation: Operation, plugin: &str) -> String {
    format!("{operation} own {plugin} entity")
}
