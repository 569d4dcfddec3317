use tracing::{info, warn};

use atlas_shared::{AdminLevel, Domain};

use crate::aggregator::aggregate_for;
use crate::state::{AggregateKey, AppState};

/// Precompute the national district view for every election, the first
/// thing a map session requests.
pub async fn warm_cache(state: &AppState) {
    let elections = match state.timed(state.store.elections()).await {
        Ok(elections) => elections,
        Err(e) => {
            warn!(error = %e, "failed to list elections for cache warm-up");
            return;
        }
    };

    let mut warmed = 0usize;
    for election in elections {
        let key = AggregateKey {
            domain: Domain::Elections {
                election_id: election.id,
            },
            level: AdminLevel::District,
            parent_id: None,
        };
        match aggregate_for(state, key).await {
            Ok(_) => warmed += 1,
            Err(e) => warn!(error = %e, election_id = election.id, "failed to warm aggregate"),
        }
    }
    info!(warmed, "aggregate cache warmed");
}
