//! Permission calculators for the four audience scopes.
//!
//! Calculators contribute partial [`RefinablePermissionSet`]s for the
//! anonymous, outsider and member audiences; the
//! [`ChainPermissionCalculator`] merges the contributions of an explicit,
//! ordered calculator list and is the public entry point.

mod chain;
mod default;
mod synchronized;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Principal;
use crate::permission::RefinablePermissionSet;

pub use chain::ChainPermissionCalculator;
pub use default::DefaultPermissionCalculator;
pub use synchronized::SynchronizedPermissionCalculator;

/// A contributor of partial permission sets.
///
/// Each method defaults to an empty contribution, so implementations only
/// override the audiences they care about.
#[async_trait]
pub trait PermissionCalculator: Send + Sync {
    /// Permissions for the anonymous audience, keyed by group type id.
    async fn anonymous_permissions(&self) -> Result<RefinablePermissionSet> {
        Ok(RefinablePermissionSet::new())
    }

    /// Permissions for the outsider audience, keyed by group type id.
    async fn outsider_permissions(&self, _principal: &Principal) -> Result<RefinablePermissionSet> {
        Ok(RefinablePermissionSet::new())
    }

    /// Permissions for the member audience, keyed by group id.
    async fn member_permissions(&self, _principal: &Principal) -> Result<RefinablePermissionSet> {
        Ok(RefinablePermissionSet::new())
    }
}
