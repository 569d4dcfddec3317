//! Background warm-up of the level below the country view.

use std::sync::Arc;
use std::time::Duration;

use atlas_shared::{AdminLevel, AtlasError, Domain};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, LevelCache, ViewKey};
use crate::error::ClientError;
use crate::source::DataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefetchReport {
    pub fetched: usize,
    pub already_cached: usize,
    pub failed: usize,
    /// Set when the cache was invalidated mid-run.
    pub abandoned: bool,
}

/// One prefetch run: the children at `child_level` of every parent,
/// fetched `batch_size` parents at a time with `batch_delay` between batches.
#[derive(Debug, Clone)]
pub struct PrefetchJob {
    /// Cache epoch the run belongs to; it stops once the cache moves on.
    pub epoch: u64,
    pub domain: Option<Domain>,
    pub child_level: AdminLevel,
    pub parents: Vec<i64>,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

/// Run `job` against `source`, writing into `cache`.
///
/// Failures are logged and counted, never returned.
pub async fn prefetch_children<S: DataSource>(
    source: Arc<S>,
    cache: Arc<LevelCache>,
    job: PrefetchJob,
) -> PrefetchReport {
    let PrefetchJob {
        epoch,
        domain,
        child_level,
        parents,
        batch_size,
        batch_delay,
    } = job;
    let mut report = PrefetchReport::default();
    let batch_size = batch_size.max(1);

    for (batch_idx, batch) in parents.chunks(batch_size).enumerate() {
        if batch_idx > 0 {
            tokio::time::sleep(batch_delay).await;
        }
        if cache.epoch() != epoch {
            report.abandoned = true;
            break;
        }

        let fetches = batch.iter().map(|&parent| {
            let source = source.clone();
            let cache = cache.clone();
            async move { prefetch_one(&*source, &cache, domain, child_level, parent, epoch).await }
        });
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(0) => report.already_cached += 1,
                Ok(_) => report.fetched += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "prefetch failed");
                }
            }
        }
    }

    debug!(
        level = %child_level,
        fetched = report.fetched,
        already_cached = report.already_cached,
        failed = report.failed,
        abandoned = report.abandoned,
        "prefetch finished"
    );
    report
}

/// Returns how many cache entries were written.
async fn prefetch_one<S: DataSource>(
    source: &S,
    cache: &LevelCache,
    domain: Option<Domain>,
    level: AdminLevel,
    parent: i64,
    epoch: u64,
) -> Result<usize, AtlasError> {
    let geometry_key = ViewKey::geometry(level, Some(parent));
    let mut written = 0;

    if !cache.contains(&geometry_key) {
        let collection = source
            .boundaries(level, Some(parent))
            .await
            .map_err(|e| failure(&geometry_key, &e))?;
        if cache.put_if_current(geometry_key, CacheEntry::Geometry(Arc::new(collection)), epoch) {
            written += 1;
        }
    }

    if let Some(domain) = domain {
        let stats_key = ViewKey::stats(domain, level, Some(parent));
        if !cache.contains(&stats_key) {
            let response = source
                .metric_data(domain, level, Some(parent))
                .await
                .map_err(|e| failure(&stats_key, &e))?;
            if cache.put_if_current(stats_key, CacheEntry::Stats(Arc::new(response.into_stats())), epoch) {
                written += 1;
            }
        }
    }
    Ok(written)
}

fn failure(key: &ViewKey, err: &ClientError) -> AtlasError {
    AtlasError::PrefetchFailure {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
