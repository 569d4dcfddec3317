//! A map session: navigation state, cached views and background prefetch.
//!
//! Geometry and statistics are fetched (or read from the level cache)
//! independently and joined locally for the current breadcrumb frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use atlas_shared::api::UnitDetail;
use atlas_shared::{
    AdminLevel, AggregateSet, AtlasError, Domain, Feature, FeatureCollection, boundary_collection,
    join,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, LevelCache, ViewKey};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::guard::{RequestGuard, Slot};
use crate::locate::PointLocator;
use crate::navigator::{DrillDownFrame, InteractionMode, NavOutcome, Navigator, UnitRef};
use crate::prefetch::{PrefetchJob, PrefetchReport, prefetch_children};
use crate::source::DataSource;

/// The joined view currently on screen.
pub struct LoadedView {
    pub frame: DrillDownFrame,
    pub domain: Option<Domain>,
    pub collection: FeatureCollection,
    /// Statistics that had no matching geometry.
    pub unmatched_stats: usize,
    /// Both halves came from the level cache.
    pub from_cache: bool,
    locator: PointLocator,
}

impl LoadedView {
    pub fn locate(&self, lng: f64, lat: f64) -> Option<&Feature> {
        self.locator.locate_feature(&self.collection, lng, lat)
    }
}

pub struct MapSession<S: DataSource> {
    source: Arc<S>,
    config: ClientConfig,
    cache: Arc<LevelCache>,
    guard: RequestGuard,
    navigator: Mutex<Navigator>,
    domain: RwLock<Option<Domain>>,
    view: RwLock<Option<Arc<LoadedView>>>,
    loading: AtomicBool,
    prefetch: Mutex<Option<JoinHandle<PrefetchReport>>>,
    /// Locator over the cached country-level districts and the collection it
    /// was built from.
    root_locator: Mutex<Option<(Arc<FeatureCollection>, PointLocator)>>,
}

impl<S: DataSource> MapSession<S> {
    pub fn new(source: S, config: ClientConfig) -> Self {
        let navigator = Navigator::new(&config.country_name);
        Self {
            source: Arc::new(source),
            config,
            cache: Arc::new(LevelCache::new()),
            guard: RequestGuard::new(),
            navigator: Mutex::new(navigator),
            domain: RwLock::new(None),
            view: RwLock::new(None),
            loading: AtomicBool::new(false),
            prefetch: Mutex::new(None),
            root_locator: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &LevelCache {
        &self.cache
    }

    /// True while a foreground fetch is outstanding. Cache hits never set it.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn select_domain(&self, domain: Option<Domain>) {
        *self.domain.write().await = domain;
    }

    pub async fn set_mode(&self, mode: InteractionMode) {
        self.navigator.lock().await.set_mode(mode);
    }

    pub async fn breadcrumbs(&self) -> Vec<DrillDownFrame> {
        self.navigator.lock().await.breadcrumbs().to_vec()
    }

    pub async fn current_view(&self) -> Option<Arc<LoadedView>> {
        self.view.read().await.clone()
    }

    /// Load and join the view for the top breadcrumb frame.
    ///
    /// Fails with [`Superseded`](crate::ClientError::Superseded) when another load started while
    /// this one was fetching; the newer load owns the visible state.
    pub async fn load_current(&self) -> Result<Arc<LoadedView>> {
        let ticket = self.guard.begin(Slot::View);
        let frame = self.navigator.lock().await.current().clone();
        let domain = *self.domain.read().await;
        let epoch = self.cache.epoch();

        let geometry_key = ViewKey::geometry(frame.level, frame.region_id);
        let stats_key = domain.map(|d| ViewKey::stats(d, frame.level, frame.region_id));
        let cached_geometry = self.cache.geometry(&geometry_key);
        let cached_stats = stats_key.and_then(|key| self.cache.stats(&key));
        let from_cache = cached_geometry.is_some() && (stats_key.is_none() || cached_stats.is_some());

        if !from_cache {
            self.loading.store(true, Ordering::Release);
        }
        let fetched = self
            .fetch_halves(&frame, domain, cached_geometry, cached_stats, epoch)
            .await;
        if self.guard.is_current(ticket) {
            self.loading.store(false, Ordering::Release);
        }
        let (geometry, stats) = self.guard.settle(ticket, fetched)??;

        let (collection, unmatched_stats) = match stats {
            Some(stats) => {
                let outcome = join(geometry.features.clone(), &stats, frame.region_id);
                (outcome.collection, outcome.unmatched_stats)
            }
            None => (boundary_collection(geometry.features.clone()), 0),
        };
        let view = Arc::new(LoadedView {
            locator: PointLocator::build(&collection),
            frame,
            domain,
            collection,
            unmatched_stats,
            from_cache,
        });
        *self.view.write().await = Some(view.clone());
        debug!(
            level = %view.frame.level,
            region = ?view.frame.region_id,
            features = view.collection.len(),
            from_cache,
            "view loaded"
        );

        if view.frame.is_root() && view.frame.level == AdminLevel::District {
            self.spawn_prefetch(domain, &view.collection).await;
        }
        Ok(view)
    }

    async fn fetch_halves(
        &self,
        frame: &DrillDownFrame,
        domain: Option<Domain>,
        cached_geometry: Option<Arc<FeatureCollection>>,
        cached_stats: Option<Arc<AggregateSet>>,
        epoch: u64,
    ) -> Result<(Arc<FeatureCollection>, Option<Arc<AggregateSet>>)> {
        let geometry = match cached_geometry {
            Some(geometry) => geometry,
            None => {
                let collection = Arc::new(
                    self.source
                        .boundaries(frame.level, frame.region_id)
                        .await?,
                );
                self.cache.put_if_current(
                    ViewKey::geometry(frame.level, frame.region_id),
                    CacheEntry::Geometry(collection.clone()),
                    epoch,
                );
                collection
            }
        };

        let stats = match (domain, cached_stats) {
            (None, _) => None,
            (Some(_), Some(stats)) => Some(stats),
            (Some(domain), None) => {
                let response = self
                    .source
                    .metric_data(domain, frame.level, frame.region_id)
                    .await?;
                let stats = Arc::new(response.into_stats());
                self.cache.put_if_current(
                    ViewKey::stats(domain, frame.level, frame.region_id),
                    CacheEntry::Stats(stats.clone()),
                    epoch,
                );
                Some(stats)
            }
        };
        Ok((geometry, stats))
    }

    async fn spawn_prefetch(&self, domain: Option<Domain>, collection: &FeatureCollection) {
        let parents: Vec<i64> = collection.features.iter().map(Feature::unit_id).collect();
        let job = PrefetchJob {
            epoch: self.cache.epoch(),
            domain,
            child_level: AdminLevel::Constituency,
            parents,
            batch_size: self.config.prefetch_batch_size,
            batch_delay: self.config.prefetch_batch_delay,
        };
        let handle = tokio::spawn(prefetch_children(self.source.clone(), self.cache.clone(), job));
        if let Some(previous) = self.prefetch.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Wait for the most recent prefetch run, if one was started.
    pub async fn wait_for_prefetch(&self) -> Option<PrefetchReport> {
        let handle = self.prefetch.lock().await.take()?;
        handle.await.ok()
    }

    async fn unit_ref(&self, unit_id: i64) -> Result<UnitRef> {
        let view = self
            .current_view()
            .await
            .ok_or(AtlasError::not_found("unit", unit_id))?;
        let feature = view
            .collection
            .find(unit_id)
            .ok_or(AtlasError::not_found("unit", unit_id))?;
        Ok(UnitRef {
            id: unit_id,
            name: feature.properties.name.clone(),
            level: feature.properties.level,
            // Boundary-only views have no statistics to be missing.
            has_data: view.domain.is_none() || !feature.properties.no_data,
        })
    }

    /// Drill into a unit of the current view.
    pub async fn drill_into(&self, unit_id: i64) -> Result<NavOutcome> {
        let unit = self.unit_ref(unit_id).await?;
        Ok(self.navigator.lock().await.drill_into(&unit))
    }

    pub async fn navigate_to_breadcrumb(&self, index: isize) -> NavOutcome {
        self.navigator.lock().await.navigate_to_breadcrumb(index)
    }

    pub async fn back(&self) -> NavOutcome {
        self.navigator.lock().await.back()
    }

    /// Move to the children of whichever unit contains the point.
    ///
    /// The loaded view is searched first, then the cached country-level
    /// districts. Otherwise the server is asked for the district holding the
    /// point; a server without spatial support leaves navigation unchanged so
    /// the user can continue by boundaries.
    pub async fn navigate_to_point(&self, lng: f64, lat: f64) -> Result<NavOutcome> {
        let ticket = self.guard.begin(Slot::Point);

        let local = self.current_view().await.and_then(|view| {
            view.locate(lng, lat).map(|feature| UnitRef {
                id: feature.unit_id(),
                name: feature.properties.name.clone(),
                level: feature.properties.level,
                has_data: !feature.properties.no_data,
            })
        });
        let local = match local {
            Some(unit) => Some(unit),
            None => self.locate_district(lng, lat).await,
        };
        if let Some(unit) = local {
            return Ok(self.navigator.lock().await.navigate_to_unit(&unit));
        }

        let response = match self
            .source
            .point_lookup(lng, lat, Some(AdminLevel::District))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_spatial_unavailable() => {
                warn!(lng, lat, "point lookup unavailable, staying on boundary navigation");
                return Ok(NavOutcome::Unchanged);
            }
            Err(e) => return Err(e),
        };
        let response = self.guard.settle(ticket, response)?;
        let Some(district) = response
            .units
            .into_iter()
            .find(|u| u.level == AdminLevel::District)
        else {
            return Ok(NavOutcome::Unchanged);
        };
        let unit = UnitRef {
            id: district.id,
            name: district.name,
            level: district.level,
            has_data: true,
        };
        Ok(self.navigator.lock().await.navigate_to_unit(&unit))
    }

    /// Search the cached country-level district geometry.
    async fn locate_district(&self, lng: f64, lat: f64) -> Option<UnitRef> {
        let districts = self
            .cache
            .geometry(&ViewKey::geometry(AdminLevel::District, None))?;
        let mut slot = self.root_locator.lock().await;
        let stale = slot
            .as_ref()
            .is_none_or(|(built_from, _)| !Arc::ptr_eq(built_from, &districts));
        if stale {
            *slot = Some((districts.clone(), PointLocator::build(&districts)));
        }
        let (collection, locator) = slot.as_ref()?;
        locator
            .locate_feature(collection, lng, lat)
            .map(|feature| UnitRef {
                id: feature.unit_id(),
                name: feature.properties.name.clone(),
                level: feature.properties.level,
                has_data: true,
            })
    }

    pub async fn unit_detail(&self, unit_id: i64) -> Result<UnitDetail> {
        let ticket = self.guard.begin(Slot::Detail);
        let detail = self.source.unit(unit_id).await?;
        self.guard.settle(ticket, detail)
    }

    /// Drop every cached view, e.g. after the data source changed. Running
    /// prefetches stop writing.
    pub async fn invalidate(&self) -> usize {
        let removed = self.cache.invalidate_all();
        *self.view.write().await = None;
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use atlas_shared::{AdminLevel, Domain};

    use super::MapSession;
    use crate::cache::ViewKey;
    use crate::config::ClientConfig;
    use crate::error::ClientError;
    use crate::navigator::NavOutcome;
    use crate::source::DataSource;
    use crate::testing::{DISTRICTS, FakeSource};

    const ELECTION: Domain = Domain::Elections { election_id: 1 };

    fn session(source: FakeSource) -> MapSession<FakeSource> {
        MapSession::new(source, ClientConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn root_view_joins_and_prefetches_children() {
        let session = session(FakeSource::new());
        session.select_domain(Some(ELECTION)).await;

        let view = session.load_current().await.expect("root view");
        assert!(!view.from_cache);
        assert_eq!(view.collection.len(), 3);
        assert!(view.collection.find(12).expect("no-data district kept").properties.no_data);
        assert_eq!(
            view.collection
                .find(10)
                .and_then(|f| f.properties.stats.as_ref())
                .map(|s| s.total_count),
            Some(10)
        );

        let report = session.wait_for_prefetch().await.expect("prefetch ran");
        assert_eq!(report.fetched, DISTRICTS.len());
        assert_eq!(report.failed, 0);
        for district in DISTRICTS {
            assert!(session.cache().contains(&ViewKey::geometry(AdminLevel::Constituency, Some(district))));
            assert!(session.cache().contains(&ViewKey::stats(ELECTION, AdminLevel::Constituency, Some(district))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_does_no_io_and_sets_no_loading_flag() {
        let session = session(FakeSource::new());
        session.select_domain(Some(ELECTION)).await;
        session.load_current().await.expect("first load");
        session.wait_for_prefetch().await;
        let boundary_calls = session.source.boundary_calls();
        let stats_calls = session.source.stats_calls();

        let view = session.load_current().await.expect("second load");
        assert!(view.from_cache);
        assert!(!session.is_loading());
        session.wait_for_prefetch().await;
        // The prefetch pass also finds everything cached.
        assert_eq!(session.source.boundary_calls(), boundary_calls);
        assert_eq!(session.source.stats_calls(), stats_calls);
    }

    #[tokio::test(start_paused = true)]
    async fn drill_down_uses_prefetched_level_and_parent_filter() {
        let session = session(FakeSource::new());
        session.select_domain(Some(ELECTION)).await;
        session.load_current().await.expect("root view");
        session.wait_for_prefetch().await;

        assert!(matches!(
            session.drill_into(10).await.expect("drill"),
            NavOutcome::Navigated(ref frame) if frame.level == AdminLevel::Constituency
        ));
        let view = session.load_current().await.expect("constituency view");
        assert!(view.from_cache);
        let ids: Vec<i64> = view.collection.features.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![100, 101]);

        // No data: detail, not navigation.
        session.navigate_to_breadcrumb(-1).await;
        session.load_current().await.expect("root again");
        assert_eq!(session.drill_into(12).await.expect("drill"), NavOutcome::ShowDetail(12));
        assert!(matches!(
            session.drill_into(999).await,
            Err(ClientError::Engine(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_never_overwrites_newer_view() {
        let source = FakeSource::new();
        source.delay_next_stats(Duration::from_secs(5));
        let session = Arc::new(session(source));
        session.select_domain(Some(ELECTION)).await;

        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.load_current().await.map(|v| v.frame.clone()) })
        };
        tokio::task::yield_now().await;
        session.select_domain(Some(Domain::Issues { year: None })).await;
        let fresh = session.load_current().await.expect("fresh load");
        assert_eq!(fresh.domain, Some(Domain::Issues { year: None }));

        let stale = slow.await.expect("join");
        assert!(matches!(stale, Err(ClientError::Superseded)));
        let visible = session.current_view().await.expect("view");
        assert_eq!(visible.domain, Some(Domain::Issues { year: None }));
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_failures_are_counted_not_surfaced() {
        let mut source = FakeSource::new();
        source.failing_parents = HashSet::from([11]);
        let session = session(source);
        session.select_domain(Some(ELECTION)).await;

        session.load_current().await.expect("root view loads despite prefetch failure");
        let report = session.wait_for_prefetch().await.expect("prefetch ran");
        assert_eq!(report.failed, 1);
        assert_eq!(report.fetched, 2);
        assert!(!session.cache().contains(&ViewKey::geometry(AdminLevel::Constituency, Some(11))));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_clears_cache_and_stops_prefetch_writes() {
        let config = ClientConfig {
            prefetch_batch_size: 1,
            ..ClientConfig::default()
        };
        let session = MapSession::new(FakeSource::new(), config);
        session.select_domain(Some(ELECTION)).await;
        session.load_current().await.expect("root view");

        assert!(session.invalidate().await >= 2);
        let report = session.wait_for_prefetch().await.expect("prefetch ran");
        assert!(report.abandoned);
        assert!(session.current_view().await.is_none());
        assert!(!session.cache().contains(&ViewKey::geometry(AdminLevel::District, None)));
    }

    #[tokio::test(start_paused = true)]
    async fn point_navigation_prefers_loaded_geometry_then_falls_back() {
        let session = session(FakeSource::new());
        session.select_domain(Some(ELECTION)).await;
        session.load_current().await.expect("root view");

        let outcome = session.navigate_to_point(1.5, 0.5).await.expect("point");
        assert!(matches!(outcome, NavOutcome::Navigated(ref f) if f.region_id == Some(11)));
        assert_eq!(session.source.point_calls(), 0);

        // Nothing loaded: the server is asked for the district, not the
        // finest unit under the point.
        session.invalidate().await;
        let outcome = session.navigate_to_point(2.75, 0.5).await.expect("point");
        assert!(matches!(
            outcome,
            NavOutcome::Navigated(ref f)
                if f.region_id == Some(12) && f.level == AdminLevel::Constituency
        ));
        assert_eq!(
            *session.source.point_levels.lock().expect("levels"),
            vec![Some(AdminLevel::District)]
        );
        let crumbs = session.breadcrumbs().await;
        assert_eq!(crumbs.len(), 2);

        let mut no_spatial = FakeSource::new();
        no_spatial.spatial = false;
        let session = super::MapSession::new(no_spatial, ClientConfig::default());
        assert_eq!(
            session.navigate_to_point(0.5, 0.5).await.expect("fallback"),
            NavOutcome::Unchanged
        );
        assert_eq!(session.breadcrumbs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn click_outside_drilled_view_uses_cached_districts() {
        let mut source = FakeSource::new();
        source.spatial = false;
        let session = session(source);
        session.select_domain(Some(ELECTION)).await;
        session.load_current().await.expect("root view");
        session.wait_for_prefetch().await;
        session.drill_into(10).await.expect("drill");
        session.load_current().await.expect("district 10 view");

        let outcome = session.navigate_to_point(1.25, 0.5).await.expect("point");
        assert!(matches!(outcome, NavOutcome::Navigated(ref f) if f.region_id == Some(11)));
        assert_eq!(session.source.point_calls(), 0);
        let crumbs = session.breadcrumbs().await;
        assert_eq!(crumbs.last().and_then(|f| f.region_id), Some(11));
    }

    #[tokio::test]
    async fn fake_point_lookup_matches_the_server_shape() {
        let source = FakeSource::new();
        let response = source.point_lookup(1.75, 0.5, None).await.expect("lookup");
        let ids: Vec<i64> = response.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![11, 111]);
        assert_eq!(response.primary.map(|p| p.id), Some(111));
    }

    #[tokio::test(start_paused = true)]
    async fn geometry_only_view_without_domain() {
        let session = session(FakeSource::new());
        let view = session.load_current().await.expect("boundaries");
        assert_eq!(view.collection.len(), 3);
        assert!(view.collection.features.iter().all(|f| f.properties.stats.is_none()));
        assert_eq!(session.source.stats_calls(), 0);
        // Boundary-only browsing still drills, including into unit 12.
        assert!(matches!(
            session.drill_into(12).await.expect("drill"),
            NavOutcome::Navigated(ref f) if f.region_id == Some(12)
        ));
        let detail = session.unit_detail(10).await.expect("detail");
        assert_eq!(detail.unit.id, 10);
    }
}
