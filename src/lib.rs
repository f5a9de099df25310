//! Palisade: group-scoped permission calculation and query access control.
//!
//! Computes per-audience permission sets (anonymous, outsider, member,
//! authenticated) over group types and memberships, keeps group roles
//! synchronized with site-wide roles, and compiles permissions into
//! condition trees a host can splice into listing queries.

pub mod access;
pub mod calculator;
pub mod config;
pub mod error;
pub mod model;
pub mod permission;
pub mod query;
pub mod storage;
pub mod synchronizer;

pub use access::{has_site_permission, AccessChecker};
pub use calculator::{
    ChainPermissionCalculator, DefaultPermissionCalculator, PermissionCalculator,
    SynchronizedPermissionCalculator,
};
pub use config::Config;
pub use error::{AccessError, ConfigError, PalisadeError, Result, StorageError};
pub use model::{
    Group, GroupContent, GroupId, GroupRole, GroupType, Principal, SiteRole, UserId,
    MEMBERSHIP_PLUGIN,
};
pub use permission::{
    role_cache_tag, CacheMetadata, CalculatedPermissions, RefinablePermissionSet, Scope,
    CACHE_PERMANENT,
    GROUP_PERMISSIONS_CONTEXT, GROUP_PERMISSIONS_TAG, GROUP_TYPE_LIST_TAG, USER_CONTEXT,
    USER_PERMISSIONS_CONTEXT,
};
pub use query::{
    AccessConditions, Condition, ConditionGroup, Conjunction, FieldCondition,
    GroupContentQueryAccessHandler, GroupQueryAccessHandler, Operation, Operator, Row,
    ADMINISTER_GROUP, BYPASS_GROUP_ACCESS, DELETE_GROUP, EDIT_GROUP, VIEW_ANY_UNPUBLISHED_GROUP,
    VIEW_GROUP, VIEW_OWN_UNPUBLISHED_GROUP,
};
pub use storage::{GroupStorage, MemoryGroupStorage};
pub use synchronizer::{group_role_id, GroupRoleSynchronizer};
