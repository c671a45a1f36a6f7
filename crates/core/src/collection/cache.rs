//! Last-known collection state using Moka.
//!
//! Written through on every successful collection read or write so the
//! offline settlement path has totals to work from when the store cannot
//! run transactions.

use mavuno_shared::types::CollectionId;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::types::{HarvestCollection, Picker};

/// Default cache capacity (number of collections).
const DEFAULT_CAPACITY: u64 = 500;

/// Default time-to-live (1 day).
const DEFAULT_TTL_SECS: u64 = 86_400;

/// Cache of collections and their pickers.
#[derive(Clone)]
pub struct CollectionCache {
    collections: Cache<CollectionId, Arc<HarvestCollection>>,
    pickers: Cache<CollectionId, Arc<Vec<Picker>>>,
}

impl CollectionCache {
    /// Creates a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a cache with custom capacity and TTL.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        Self {
            collections: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            pickers: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Last-known state of a collection.
    #[must_use]
    pub fn collection(&self, id: CollectionId) -> Option<HarvestCollection> {
        self.collections.get(&id).map(|c| c.as_ref().clone())
    }

    /// Last-known pickers of a collection.
    #[must_use]
    pub fn pickers(&self, id: CollectionId) -> Option<Vec<Picker>> {
        self.pickers.get(&id).map(|p| p.as_ref().clone())
    }

    /// Records the latest state of a collection.
    pub fn put_collection(&self, collection: &HarvestCollection) {
        self.collections
            .insert(collection.id, Arc::new(collection.clone()));
    }

    /// Records the latest pickers of a collection.
    pub fn put_pickers(&self, id: CollectionId, pickers: &[Picker]) {
        self.pickers.insert(id, Arc::new(pickers.to_vec()));
    }
}

impl Default for CollectionCache {
    fn default() -> Self {
        Self::new()
    }
}
