//! Identity cache for rebuilt features.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::node::Feature;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Features by id. Hits are returned as-is, never revalidated.
#[cfg_attr(test, mockall::automock)]
pub trait FeatureCache: Send + Sync {
    fn get(&self, id: &str) -> Option<Arc<Feature>>;

    fn put(&self, feature: Arc<Feature>);
}

/// Bounded, least-recently-used [`FeatureCache`].
pub struct LruFeatureCache {
    cache: Mutex<LruCache<String, Arc<Feature>>>,
}

impl LruFeatureCache {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl Default for LruFeatureCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl FeatureCache for LruFeatureCache {
    fn get(&self, id: &str) -> Option<Arc<Feature>> {
        self.cache.lock().get(id).cloned()
    }

    fn put(&self, feature: Arc<Feature>) {
        self.cache.lock().put(feature.id.clone(), feature);
    }
}
