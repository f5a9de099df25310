//! Chain calculator: the public facade over an ordered calculator list.

use std::sync::Arc;

use moka::sync::Cache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::model::Principal;
use crate::permission::{
    CalculatedPermissions, RefinablePermissionSet, GROUP_PERMISSIONS_CONTEXT,
};
use crate::storage::GroupStorage;

use super::{DefaultPermissionCalculator, PermissionCalculator, SynchronizedPermissionCalculator};

const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Merges the contributions of an ordered list of calculators and memoizes
/// the finalized results.
///
/// Results are keyed by a fingerprint of the principal's roles and
/// memberships. The memo only spans unchanged configuration; the host's
/// cache-tag invalidation bus is expected to call
/// [`invalidate`](ChainPermissionCalculator::invalidate) when a consulted
/// role, membership or group type changes.
pub struct ChainPermissionCalculator {
    calculators: Vec<Arc<dyn PermissionCalculator>>,
    storage: Arc<dyn GroupStorage>,
    cache: Cache<String, Arc<CalculatedPermissions>>,
}

impl ChainPermissionCalculator {
    /// Create a chain with the built-in default and synchronized calculators.
    pub fn new(storage: Arc<dyn GroupStorage>) -> Self {
        Self::with_capacity(storage, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a chain with the built-in calculators and an explicit memo
    /// capacity (see `AccessConfig::permission_cache_capacity`).
    pub fn with_capacity(storage: Arc<dyn GroupStorage>, capacity: u64) -> Self {
        let calculators: Vec<Arc<dyn PermissionCalculator>> = vec![
            Arc::new(DefaultPermissionCalculator::new(storage.clone())),
            Arc::new(SynchronizedPermissionCalculator::new(storage.clone())),
        ];
        Self {
            calculators,
            storage,
            cache: Cache::new(capacity),
        }
    }

    /// Create a chain with an explicit calculator list, in merge order.
    pub fn with_calculators(
        storage: Arc<dyn GroupStorage>,
        calculators: Vec<Arc<dyn PermissionCalculator>>,
    ) -> Self {
        Self {
            calculators,
            storage,
            cache: Cache::new(DEFAULT_CACHE_CAPACITY),
        }
    }

    /// Append an additional calculator to the chain.
    pub fn register(&mut self, calculator: Arc<dyn PermissionCalculator>) {
        self.calculators.push(calculator);
        self.cache.invalidate_all();
    }

    /// Drop all memoized results.
    ///
    /// Invoked by the host when a cache tag produced by this engine is
    /// invalidated.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    /// Permissions of the anonymous audience, one entry per group type.
    pub async fn calculate_anonymous_permissions(&self) -> Result<Arc<CalculatedPermissions>> {
        if let Some(hit) = self.cache.get("anonymous") {
            debug!(key = "anonymous", "Permission cache hit");
            return Ok(hit);
        }

        let mut set = RefinablePermissionSet::new();
        for calculator in &self.calculators {
            set.merge(&calculator.anonymous_permissions().await?);
        }

        let calculated = Arc::new(set.finalize());
        self.cache
            .insert("anonymous".to_string(), calculated.clone());
        Ok(calculated)
    }

    /// Outsider permissions of a principal, one entry per group type.
    pub async fn calculate_outsider_permissions(
        &self,
        principal: &Principal,
    ) -> Result<Arc<CalculatedPermissions>> {
        let key = format!("outsider:{}", self.fingerprint(principal).await?);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "Permission cache hit");
            return Ok(hit);
        }

        let mut set = RefinablePermissionSet::new();
        for calculator in &self.calculators {
            set.merge(&calculator.outsider_permissions(principal).await?);
        }

        let calculated = Arc::new(set.finalize());
        self.cache.insert(key, calculated.clone());
        Ok(calculated)
    }

    /// Member permissions of a principal, one entry per group they belong to.
    pub async fn calculate_member_permissions(
        &self,
        principal: &Principal,
    ) -> Result<Arc<CalculatedPermissions>> {
        let key = format!("member:{}", self.fingerprint(principal).await?);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "Permission cache hit");
            return Ok(hit);
        }

        let mut set = RefinablePermissionSet::new();
        for calculator in &self.calculators {
            set.merge(&calculator.member_permissions(principal).await?);
        }

        let calculated = Arc::new(set.finalize());
        self.cache.insert(key, calculated.clone());
        Ok(calculated)
    }

    /// Merged outsider and member permissions for an authenticated principal.
    pub async fn calculate_authenticated_permissions(
        &self,
        principal: &Principal,
    ) -> Result<Arc<CalculatedPermissions>> {
        let key = format!("authenticated:{}", self.fingerprint(principal).await?);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "Permission cache hit");
            return Ok(hit);
        }

        let outsider = self.calculate_outsider_permissions(principal).await?;
        let member = self.calculate_member_permissions(principal).await?;

        let mut set = RefinablePermissionSet::new();
        set.merge_calculated(&outsider);
        set.merge_calculated(&member);
        set.add_cache_context(GROUP_PERMISSIONS_CONTEXT);

        let calculated = Arc::new(set.finalize());
        self.cache.insert(key, calculated.clone());
        Ok(calculated)
    }

    /// Merged permissions for any principal.
    ///
    /// Anonymous principals get the anonymous set; everyone else the
    /// authenticated (outsider plus member) set.
    pub async fn calculate_permissions(
        &self,
        principal: &Principal,
    ) -> Result<Arc<CalculatedPermissions>> {
        if principal.is_anonymous() {
            self.calculate_anonymous_permissions().await
        } else {
            self.calculate_authenticated_permissions(principal).await
        }
    }

    /// Fingerprint of a principal's roles and memberships.
    ///
    /// Two principals with the same fingerprint compute identical results,
    /// which lets cache entries be shared between them.
    async fn fingerprint(&self, principal: &Principal) -> Result<String> {
        let mut hasher = Sha256::new();
        for role in &principal.roles {
            hasher.update(role.as_bytes());
            hasher.update([0]);
        }
        hasher.update([0xff]);
        for membership in self.storage.memberships_of(principal.id).await? {
            hasher.update(membership.group.to_le_bytes());
            for role in &membership.roles {
                hasher.update(role.as_bytes());
                hasher.update([0]);
            }
            hasher.update([0xfe]);
        }
        // Ownership conditions vary per user id, so the fingerprint does too.
        hasher.update(principal.id.to_le_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}
