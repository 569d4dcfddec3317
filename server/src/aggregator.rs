//! Request-level aggregation pipeline: validate, fetch raw records, aggregate,
//! back-fill split districts, cache.

use std::sync::Arc;

use atlas_shared::api::DataQuery;
use atlas_shared::metric::{census_for_year, public_issues, public_results};
use atlas_shared::{
    AdminLevel, AggregateRequest, AtlasError, Domain, SURVEY_STORAGE_LEVEL, aggregate,
    resolve_inheritance,
};
use chrono::Utc;
use futures::future::try_join;
use tracing::debug;

use crate::error::ApiError;
use crate::state::{AggregateKey, AppState, CachedAggregate};

/// Parse and validate a data query without touching the store.
pub fn aggregate_key(state: &AppState, query: &DataQuery) -> Result<AggregateKey, ApiError> {
    let level = AdminLevel::from_number(query.level)?;
    let domain = Domain::from_parts(&query.domain, query.entity_id, query.year)?;
    if let Some(parent_id) = query.parent_id {
        state.tree.require(parent_id)?;
    }
    Ok(AggregateKey {
        domain,
        level,
        parent_id: query.parent_id,
    })
}

/// Aggregate for `key`, serving from the cache while the entry is fresh.
pub async fn aggregate_for(state: &AppState, key: AggregateKey) -> Result<CachedAggregate, ApiError> {
    state.observability.record_aggregate_request();

    if let Some(cached) = fresh_entry(state, &key) {
        state.observability.record_cache_hit();
        return Ok(cached);
    }
    state.observability.record_cache_miss();

    let (records, storage_level, with_turnout, year) = match key.domain {
        Domain::Elections { election_id } => {
            let (election, results) = try_join(
                state.timed(state.store.election(election_id)),
                state.timed(state.store.election_results(election_id)),
            )
            .await?;
            let election =
                election.ok_or_else(|| AtlasError::not_found("election", election_id))?;
            (
                public_results(&results),
                election.storage_level(),
                true,
                election.year,
            )
        }
        Domain::Demographics { year } => {
            let rows = state.timed(state.store.demographics(year)).await?;
            let (used, records) = census_for_year(&rows, year);
            (records, SURVEY_STORAGE_LEVEL, false, used)
        }
        Domain::Issues { year } => {
            let rows = state.timed(state.store.issues(year)).await?;
            (public_issues(&rows, year), SURVEY_STORAGE_LEVEL, false, year)
        }
    };

    let request = AggregateRequest {
        target_level: key.level,
        parent_id: key.parent_id,
        storage_level,
        with_turnout,
    };
    let mut set = aggregate(&state.tree, &records, &request)?;
    let inherited = resolve_inheritance(
        &state.tree,
        key.level,
        key.parent_id,
        &state.lineage,
        &mut set,
    );
    if inherited > 0 {
        state.observability.record_inherited_units(inherited as u64);
    }
    debug!(
        domain = %key.domain,
        level = %key.level,
        parent_id = ?key.parent_id,
        storage_level = %storage_level,
        records = records.len(),
        units = set.len(),
        inherited,
        "aggregate computed"
    );

    let entry = CachedAggregate {
        set: Arc::new(set),
        year,
        inherited,
        cached_at: Utc::now(),
    };
    cache_aggregate(state, key, entry.clone());
    Ok(entry)
}

fn fresh_entry(state: &AppState, key: &AggregateKey) -> Option<CachedAggregate> {
    let cached = state.aggregate_cache.get(key)?;
    let age = Utc::now()
        .signed_duration_since(cached.cached_at)
        .num_seconds();
    (age < state.cache_ttl_secs).then(|| cached.clone())
}

fn cache_aggregate(state: &AppState, key: AggregateKey, entry: CachedAggregate) {
    if !state.aggregate_cache.contains_key(&key) {
        while state.aggregate_cache.len() >= state.max_cache_entries {
            if !evict_oldest_entry(state) {
                break;
            }
        }
    }
    state.aggregate_cache.insert(key, entry);
}

fn evict_oldest_entry(state: &AppState) -> bool {
    let Some(oldest) = state
        .aggregate_cache
        .iter()
        .min_by_key(|entry| entry.value().cached_at)
        .map(|entry| *entry.key())
    else {
        return false;
    };
    state.aggregate_cache.remove(&oldest).is_some()
}

/// Drop every cached aggregate. Returns how many entries were removed.
pub fn invalidate_all(state: &AppState) -> usize {
    let removed = state.aggregate_cache.len();
    state.aggregate_cache.clear();
    state.observability.record_cache_invalidation();
    removed
}

#[cfg(test)]
mod tests {
    use atlas_shared::api::DataQuery;
    use atlas_shared::aggregate::grand_total;
    use atlas_shared::{AdminLevel, AtlasError, Domain};

    use super::{aggregate_for, aggregate_key, invalidate_all};
    use crate::error::ApiError;
    use crate::state::tests::sample_state;

    fn query(domain: &str, entity_id: Option<i64>, level: i64) -> DataQuery {
        DataQuery {
            domain: domain.to_string(),
            entity_id,
            level,
            parent_id: None,
            year: None,
        }
    }

    #[test]
    fn validation_rejects_bad_input_before_data_access() {
        let state = sample_state();
        assert!(matches!(
            aggregate_key(&state, &query("elections", Some(1), 7)),
            Err(ApiError::Engine(AtlasError::InvalidLevel(7)))
        ));
        assert!(matches!(
            aggregate_key(&state, &query("weather", None, 2)),
            Err(ApiError::Engine(AtlasError::InvalidDomain(_)))
        ));
        let mut unknown_parent = query("issues", None, 3);
        unknown_parent.parent_id = Some(4242);
        assert!(matches!(
            aggregate_key(&state, &unknown_parent),
            Err(ApiError::Engine(AtlasError::NotFound { id: 4242, .. }))
        ));
    }

    #[tokio::test]
    async fn unknown_election_is_not_found() {
        let state = sample_state();
        let key = aggregate_key(&state, &query("elections", Some(99), 2)).expect("valid key");
        assert!(matches!(
            aggregate_for(&state, key).await,
            Err(ApiError::Engine(AtlasError::NotFound { kind: "election", id: 99 }))
        ));
    }

    #[tokio::test]
    async fn split_district_inherits_and_cache_serves_repeats() {
        let state = sample_state();
        let key = aggregate_key(&state, &query("elections", Some(1), 2)).expect("valid key");

        let first = aggregate_for(&state, key).await.expect("aggregate 2011");
        let gulu = &first.set[&10];
        let omoro = &first.set[&11];
        assert!(gulu.has_data());
        assert!(omoro.inherited);
        assert_eq!(omoro.inherited_from.as_deref(), Some("Gulu"));
        assert_eq!(omoro.total_count, gulu.total_count);
        assert_eq!(first.inherited, 1);

        let second = aggregate_for(&state, key).await.expect("cached");
        assert!(std::sync::Arc::ptr_eq(&first.set, &second.set));
        let snapshot = state.observability.snapshot();
        assert_eq!(snapshot.aggregate_cache_hits_total, 1);
        assert_eq!(snapshot.aggregate_cache_misses_total, 1);

        assert_eq!(invalidate_all(&state), 1);
        assert!(state.aggregate_cache.is_empty());
    }

    #[tokio::test]
    async fn district_elections_keep_their_total_below_storage_level() {
        let state = sample_state();
        let districts = aggregate_for(
            &state,
            crate::state::AggregateKey {
                domain: Domain::Elections { election_id: 3 },
                level: AdminLevel::District,
                parent_id: None,
            },
        )
        .await
        .expect("aggregate districts");
        assert!(districts.set.values().all(|r| r.has_data()));

        let key = aggregate_key(&state, &query("elections", Some(3), 3)).expect("valid key");
        let constituencies = aggregate_for(&state, key).await.expect("aggregate");
        assert_eq!(grand_total(&districts.set), 4110);
        assert_eq!(grand_total(&constituencies.set), 4110);
        assert!(constituencies.set.keys().all(|&id| {
            state.tree.get(id).map(|u| u.level) == Some(AdminLevel::District)
        }));
    }

    #[tokio::test]
    async fn demographics_report_the_census_year_used() {
        let state = sample_state();
        let key = aggregate_key(&state, &query("demographics", None, 1)).expect("valid key");
        let result = aggregate_for(&state, key).await.expect("aggregate");
        assert_eq!(result.year, Some(2024));
        assert!(result.set.values().all(|r| r.measures.contains_key("male")));
    }

    #[tokio::test]
    async fn cache_never_exceeds_its_capacity() {
        let mut state = sample_state();
        state.max_cache_entries = 2;
        for level in 1..=4 {
            let key = aggregate_key(&state, &query("issues", None, level)).expect("valid key");
            aggregate_for(&state, key).await.expect("aggregate");
        }
        assert_eq!(state.aggregate_cache.len(), 2);
    }
}
