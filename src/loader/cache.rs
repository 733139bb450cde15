//! Shared content cache: ready units, completed tiers and the dedupe ledger.
//!
//! Queue draining, window expansion and offline downloads all write here, so
//! the three structures sit behind one lock and are only reachable through
//! this API. Writes are insert-only during a session; `clear` is reserved for
//! teardown.

use std::collections::{BTreeMap, HashSet};

use tokio::sync::RwLock;

use crate::types::{Seed, SeedRange, Unit, unique_locators};

#[derive(Default)]
struct CacheInner {
    units: BTreeMap<Seed, Unit>,
    completed_tiers: Vec<String>,
    ledger: HashSet<String>,
}

/// Concurrency-safe store for everything the loader has materialized
#[derive(Default)]
pub(crate) struct ContentCache {
    inner: RwLock<CacheInner>,
}

impl ContentCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert units keyed by their own seed. Returns how many were new.
    pub(crate) async fn insert_units(&self, units: Vec<Unit>) -> usize {
        let mut inner = self.inner.write().await;
        let mut added = 0;
        for unit in units {
            if inner.units.insert(unit.seed, unit).is_none() {
                added += 1;
            }
        }
        added
    }

    pub(crate) async fn get(&self, seed: Seed) -> Option<Unit> {
        self.inner.read().await.units.get(&seed).cloned()
    }

    /// Cached units in `[start, start + count)`, in seed order
    pub(crate) async fn range(&self, start: Seed, count: u32) -> Vec<Unit> {
        if count == 0 {
            return Vec::new();
        }
        let end = start.saturating_add(count - 1);
        self.inner
            .read()
            .await
            .units
            .range(start..=end)
            .map(|(_, unit)| unit.clone())
            .collect()
    }

    pub(crate) async fn contains_all(&self, range: SeedRange) -> bool {
        let inner = self.inner.read().await;
        (range.start..=range.end).all(|seed| inner.units.contains_key(&seed))
    }

    /// Distinct audio locators referenced by cached units inside `range`
    pub(crate) async fn audio_locators(&self, range: SeedRange) -> Vec<String> {
        let inner = self.inner.read().await;
        unique_locators(inner.units.range(range.start..=range.end).map(|(_, u)| u))
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.units.len()
    }

    /// Record a tier as complete. Returns true the first time only.
    pub(crate) async fn mark_tier_complete(&self, tier: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.completed_tiers.iter().any(|t| t == tier) {
            return false;
        }
        inner.completed_tiers.push(tier.to_string());
        true
    }

    pub(crate) async fn is_tier_complete(&self, tier: &str) -> bool {
        self.inner
            .read()
            .await
            .completed_tiers
            .iter()
            .any(|t| t == tier)
    }

    /// Completed tiers in the order they completed
    pub(crate) async fn completed_tiers(&self) -> Vec<String> {
        self.inner.read().await.completed_tiers.clone()
    }

    /// Claim a ledger key before doing the work it names.
    ///
    /// Returns false if the key is already claimed or satisfied, in which case
    /// the caller must not fetch.
    pub(crate) async fn try_claim(&self, key: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.ledger.contains(key) {
            return false;
        }
        inner.ledger.insert(key.to_string());
        true
    }

    /// Give a claimed key back after the work failed
    pub(crate) async fn release(&self, key: &str) {
        self.inner.write().await.ledger.remove(key);
    }

    #[cfg(test)]
    pub(crate) async fn is_claimed(&self, key: &str) -> bool {
        self.inner.read().await.ledger.contains(key)
    }

    pub(crate) async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.units.clear();
        inner.completed_tiers.clear();
        inner.ledger.clear();
    }
}
