//! Write-through wallet projection using Moka.
//!
//! Holds each project's entry set so summaries can be served without a
//! store round trip. Appends are applied here before the durable write
//! completes; a rejected write invalidates the project's projection.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::entry::LedgerEntry;
use super::summary::WalletSummary;
use crate::scope::ProjectScope;

/// Default cache capacity (number of projects).
const DEFAULT_CAPACITY: u64 = 1_000;

/// Default time-to-live for a projection (1 minute).
const DEFAULT_TTL_SECS: u64 = 60;

/// Cached entry sets keyed by project.
#[derive(Clone)]
pub struct WalletProjection {
    cache: Cache<ProjectScope, Arc<Vec<LedgerEntry>>>,
}

impl WalletProjection {
    /// Creates a projection with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a projection with custom capacity and TTL.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { cache }
    }

    /// Returns the cached entry set for a project.
    #[must_use]
    pub fn get(&self, scope: &ProjectScope) -> Option<Arc<Vec<LedgerEntry>>> {
        self.cache.get(scope)
    }

    /// Returns the cached summary for a project.
    #[must_use]
    pub fn summary(&self, scope: &ProjectScope) -> Option<WalletSummary> {
        self.get(scope).map(|entries| WalletSummary::fold(entries.iter()))
    }

    /// Replaces a project's entry set with what the store returned.
    pub fn put(&self, scope: ProjectScope, entries: Vec<LedgerEntry>) {
        self.cache.insert(scope, Arc::new(entries));
    }

    /// Applies an entry before it is durable.
    ///
    /// Only touches projects that are already cached; an uncached project is
    /// loaded from the store on the next read anyway.
    pub fn apply_optimistic(&self, entry: &LedgerEntry) {
        let scope = entry.scope();
        if let Some(current) = self.cache.get(&scope) {
            if current.iter().any(|e| e.id == entry.id) {
                return;
            }
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(entry.clone());
            self.cache.insert(scope, Arc::new(next));
        }
    }

    /// Drops a project's projection so the next read refetches.
    pub fn invalidate(&self, scope: &ProjectScope) {
        self.cache.invalidate(scope);
    }
}

impl Default for WalletProjection {
    fn default() -> Self {
        Self::new()
    }
}
