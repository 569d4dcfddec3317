//! Level cache: geometry and statistics per view, stored separately.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use atlas_shared::{AdminLevel, AggregateSet, Domain, FeatureCollection};
use dashmap::DashMap;

/// `(domain, level, parent)`. Geometry is keyed with no domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub domain: Option<Domain>,
    pub level: AdminLevel,
    pub parent_id: Option<i64>,
}

impl ViewKey {
    pub fn geometry(level: AdminLevel, parent_id: Option<i64>) -> Self {
        Self {
            domain: None,
            level,
            parent_id,
        }
    }

    pub fn stats(domain: Domain, level: AdminLevel, parent_id: Option<i64>) -> Self {
        Self {
            domain: Some(domain),
            level,
            parent_id,
        }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.domain {
            Some(domain) => write!(f, "{domain}/")?,
            None => f.write_str("geometry/")?,
        }
        match self.parent_id {
            Some(parent) => write!(f, "{}/{parent}", self.level),
            None => write!(f, "{}/all", self.level),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CacheEntry {
    Geometry(Arc<FeatureCollection>),
    Stats(Arc<AggregateSet>),
}

/// Concurrency-safe view cache shared by a session and its prefetch task.
///
/// Every write names the epoch it was computed under; writes from before the
/// last [`LevelCache::invalidate_all`] are dropped.
#[derive(Debug, Default)]
pub struct LevelCache {
    entries: DashMap<ViewKey, CacheEntry>,
    epoch: AtomicU64,
}

impl LevelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &ViewKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &ViewKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn geometry(&self, key: &ViewKey) -> Option<Arc<FeatureCollection>> {
        match self.get(key)? {
            CacheEntry::Geometry(collection) => Some(collection),
            CacheEntry::Stats(_) => None,
        }
    }

    pub fn stats(&self, key: &ViewKey) -> Option<Arc<AggregateSet>> {
        match self.get(key)? {
            CacheEntry::Stats(stats) => Some(stats),
            CacheEntry::Geometry(_) => None,
        }
    }

    pub fn put(&self, key: ViewKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Store `entry` only if no invalidation happened since `epoch`.
    pub fn put_if_current(&self, key: ViewKey, entry: CacheEntry, epoch: u64) -> bool {
        if self.epoch() != epoch {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    /// Drop everything and start a new epoch. Returns the number of entries
    /// removed.
    pub fn invalidate_all(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
