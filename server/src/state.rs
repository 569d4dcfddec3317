use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use atlas_shared::{AdminLevel, AdminTree, AggregateSet, AtlasError, DistrictLineage, Domain};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{
    aggregate_cache_ttl_secs, country_name, max_aggregate_cache_entries, query_timeout,
};
use crate::error::ApiError;
use crate::store::Store;

/// Aggregates are cached per domain instance, level and parent filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    pub domain: Domain,
    pub level: AdminLevel,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CachedAggregate {
    pub set: Arc<AggregateSet>,
    /// Census year actually used, when the domain picked one.
    pub year: Option<i32>,
    pub inherited: usize,
    pub cached_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub tree: Arc<AdminTree>,
    pub lineage: Arc<Vec<DistrictLineage>>,
    pub store: Store,
    pub aggregate_cache: Arc<DashMap<AggregateKey, CachedAggregate>>,
    pub query_timeout: Duration,
    pub cache_ttl_secs: i64,
    pub max_cache_entries: usize,
    pub country_name: Arc<str>,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    aggregate_requests_total: AtomicU64,
    aggregate_cache_hits_total: AtomicU64,
    aggregate_cache_misses_total: AtomicU64,
    inherited_units_total: AtomicU64,
    geometry_skipped_total: AtomicU64,
    point_lookups_total: AtomicU64,
    spatial_unavailable_total: AtomicU64,
    store_timeouts_total: AtomicU64,
    cache_invalidations_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub aggregate_requests_total: u64,
    pub aggregate_cache_hits_total: u64,
    pub aggregate_cache_misses_total: u64,
    pub inherited_units_total: u64,
    pub geometry_skipped_total: u64,
    pub point_lookups_total: u64,
    pub spatial_unavailable_total: u64,
    pub store_timeouts_total: u64,
    pub cache_invalidations_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            aggregate_requests_total: self.aggregate_requests_total.load(Ordering::Relaxed),
            aggregate_cache_hits_total: self.aggregate_cache_hits_total.load(Ordering::Relaxed),
            aggregate_cache_misses_total: self
                .aggregate_cache_misses_total
                .load(Ordering::Relaxed),
            inherited_units_total: self.inherited_units_total.load(Ordering::Relaxed),
            geometry_skipped_total: self.geometry_skipped_total.load(Ordering::Relaxed),
            point_lookups_total: self.point_lookups_total.load(Ordering::Relaxed),
            spatial_unavailable_total: self.spatial_unavailable_total.load(Ordering::Relaxed),
            store_timeouts_total: self.store_timeouts_total.load(Ordering::Relaxed),
            cache_invalidations_total: self.cache_invalidations_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_aggregate_request(&self) {
        self.aggregate_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.aggregate_cache_hits_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.aggregate_cache_misses_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inherited_units(&self, count: u64) {
        self.inherited_units_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_geometry_skipped(&self, count: u64) {
        self.geometry_skipped_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_point_lookup(&self) {
        self.point_lookups_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spatial_unavailable(&self) {
        self.spatial_unavailable_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_timeout(&self) {
        self.store_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_invalidation(&self) {
        self.cache_invalidations_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(store: Store, tree: AdminTree, lineage: Vec<DistrictLineage>) -> Self {
        Self {
            tree: Arc::new(tree),
            lineage: Arc::new(lineage),
            store,
            aggregate_cache: Arc::new(DashMap::new()),
            query_timeout: query_timeout(),
            cache_ttl_secs: aggregate_cache_ttl_secs(),
            max_cache_entries: max_aggregate_cache_entries(),
            country_name: Arc::from(country_name()),
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }

    /// Read the hierarchy and lineage from `store` and build the state once.
    pub async fn load(store: Store) -> Result<Self, ApiError> {
        let units = store.units().await?;
        let tree = AdminTree::new(units)?;
        let lineage = store.lineage().await?;

        let unknown = lineage
            .iter()
            .filter(|row| tree.get(row.current_unit_id).is_none() || tree.get(row.parent_unit_id).is_none())
            .count();
        if unknown > 0 {
            warn!(unknown, "lineage rows reference units outside the hierarchy");
        }
        info!(
            units = tree.len(),
            lineage = lineage.len(),
            backend = store.backend(),
            "administrative hierarchy loaded"
        );
        Ok(Self::new(store, tree, lineage))
    }

    /// Run a store call under the configured query timeout.
    pub async fn timed<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.query_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                self.observability.record_store_timeout();
                let millis = u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(AtlasError::Timeout { millis }.into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use atlas_shared::AdminTree;

    use super::AppState;
    use crate::error::ApiError;
    use crate::store::Store;
    use crate::store::memory::tests::sample_store;

    pub(crate) fn sample_state() -> AppState {
        let store = sample_store();
        let tree = AdminTree::new(store.units()).expect("valid sample tree");
        let lineage = store.lineage();
        AppState::new(Store::Memory(Arc::new(store)), tree, lineage)
    }

    #[tokio::test]
    async fn load_builds_tree_from_store() {
        let state = AppState::load(Store::Memory(Arc::new(sample_store())))
            .await
            .expect("load sample state");
        assert_eq!(state.tree.len(), 27);
        assert_eq!(state.lineage.len(), 1);
    }

    #[tokio::test]
    async fn timed_reports_timeouts_distinctly() {
        let mut state = sample_state();
        state.query_timeout = Duration::from_millis(10);
        let result: Result<(), ApiError> = state
            .timed(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(ApiError::Engine(atlas_shared::AtlasError::Timeout { millis: 10 }))
        ));
        assert_eq!(state.observability.snapshot().store_timeouts_total, 1);
    }
}
