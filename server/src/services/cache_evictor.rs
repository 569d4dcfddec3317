use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::CACHE_EVICTION_INTERVAL_SECS;
use crate::state::AppState;

/// Remove aggregates older than the TTL. Returns how many were evicted.
pub fn evict_expired(state: &AppState) -> usize {
    let before = state.aggregate_cache.len();
    let now = Utc::now();

    state.aggregate_cache.retain(|_, cached| {
        now.signed_duration_since(cached.cached_at).num_seconds() < state.cache_ttl_secs
    });

    before.saturating_sub(state.aggregate_cache.len())
}

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(CACHE_EVICTION_INTERVAL_SECS));

    loop {
        interval.tick().await;

        let evicted = evict_expired(&state);
        if evicted > 0 {
            info!(
                "evicted {evicted} stale aggregate cache entries ({} remaining)",
                state.aggregate_cache.len()
            );
        }
    }
}
