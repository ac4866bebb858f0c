use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::snapshot_cache::SnapshotCache;
use crate::state_queries::{QueryError, TableQuery};
use crate::store::StoreGateway;

/// Owner of one logical table: its latest-batch cache and its store handle
///
/// Every query against the table goes through [`TableDispatcher::run_query`],
/// which answers from the cache when the query allows it and a batch has been
/// cached, and from the store otherwise. A single request never mixes the two.
pub struct TableDispatcher<T> {
    table: String,
    cache: SnapshotCache<T>,
    store: Arc<dyn StoreGateway>,
}

impl<T: Clone + Send + Sync + 'static> TableDispatcher<T> {
    pub fn new(table: impl Into<String>, store: Arc<dyn StoreGateway>) -> Self {
        Self {
            table: table.into(),
            cache: SnapshotCache::new(),
            store,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn StoreGateway> {
        &self.store
    }

    /// Replace the cached batch
    pub async fn replace_snapshot(&self, items: Vec<T>) {
        debug!("Setting {} cache with {} records", self.table, items.len());
        self.cache.set(items).await;
    }

    /// Copy of up to `limit` cached records (0 = all)
    pub async fn snapshot(&self, limit: usize) -> Vec<T> {
        self.cache.get(limit).await
    }

    pub async fn snapshot_len(&self) -> usize {
        self.cache.len().await
    }

    /// Answer `query` from the cache or the store
    pub async fn run_query(&self, query: &dyn TableQuery<T>) -> Result<Vec<T>, QueryError> {
        let start = Instant::now();

        // One copy decides the path, so a concurrent replace cannot slip an
        // empty batch in between the check and the filter
        let snapshot = if query.allows_cache() {
            Some(self.cache.get(0).await).filter(|batch| !batch.is_empty())
        } else {
            None
        };

        let (path, result) = match snapshot {
            Some(batch) => {
                debug!("Running {} query on {} cache", query.name(), self.table);
                ("cache", query.from_cache(batch))
            }
            None => {
                debug!("Running {} query on {} store", query.name(), self.table);
                (
                    "store",
                    query.from_server(&self.table, self.store.as_ref()).await,
                )
            }
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(
            "states.query.total",
            "path" => path,
            "query" => query.name(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("states.query.duration_ms", "path" => path, "query" => query.name())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_queries::{LatestBatchQuery, NearbyQuery, TrackKey, TrackQuery};
    use crate::states::{DataSource, Position, State};
    use crate::store::testing::RecordingStore;
    use chrono::Utc;

    fn state_at(callsign: &str, lat: f64, lon: f64) -> State {
        let mut state = State::new(Utc::now(), DataSource::OpenskyNetwork);
        state.flight.icao = callsign.to_string();
        state.geography.position = Position::new(lat, lon);
        state
    }

    fn dispatcher() -> (Arc<RecordingStore>, TableDispatcher<State>) {
        let store = Arc::new(RecordingStore::new());
        let dispatcher = TableDispatcher::new("state", store.clone() as Arc<dyn StoreGateway>);
        (store, dispatcher)
    }

    #[tokio::test]
    async fn test_empty_cache_falls_back_to_store() {
        let (store, dispatcher) = dispatcher();
        store.push_response(vec![state_at("AAA", 1.0, 1.0).to_row()]);

        let query = LatestBatchQuery::new(0, None, None, None, None).unwrap();
        let result = dispatcher.run_query(&query).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_filled_cache_skips_store() {
        let (store, dispatcher) = dispatcher();
        dispatcher
            .replace_snapshot(vec![state_at("AAA", 1.0, 1.0), state_at("BBB", 2.0, 2.0)])
            .await;

        let query = LatestBatchQuery::new(0, None, None, None, None).unwrap();
        let result = dispatcher.run_query(&query).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_results_do_not_alias_snapshot() {
        let (_store, dispatcher) = dispatcher();
        dispatcher
            .replace_snapshot(vec![state_at("BBB", 50.0, -170.0)])
            .await;

        // Shifting longitudes into 160..200 must only touch the returned copy
        let query =
            LatestBatchQuery::new(0, Some(0.0), Some(60.0), Some(160.0), Some(200.0)).unwrap();
        let result = dispatcher.run_query(&query).await.unwrap();
        assert_eq!(result[0].geography.position.longitude, 190.0);

        let cached = dispatcher.snapshot(0).await;
        assert_eq!(cached[0].geography.position.longitude, -170.0);
    }

    #[tokio::test]
    async fn test_track_always_uses_store() {
        let (store, dispatcher) = dispatcher();
        dispatcher
            .replace_snapshot(vec![state_at("KLM1001", 1.0, 1.0)])
            .await;

        let query = TrackQuery::new(TrackKey::Flight, "KLM1001", "1h", 0).unwrap();
        let result = dispatcher.run_query(&query).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (store, dispatcher) = dispatcher();
        store.push_error("timeout");

        let query = NearbyQuery::new(0.0, 0.0, 10.0, 0).unwrap();
        let err = dispatcher.run_query(&query).await.unwrap_err();
        assert!(matches!(err, QueryError::Upstream(_)));
    }
}
