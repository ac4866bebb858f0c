use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state_queries::{
    LatestBatchQuery, NearbyQuery, QueryError, TrackKey, TrackQuery, validate_limit,
};
use crate::state_search::{SearchCriterion, search_records};
use crate::states::{MapState, STATE_COLUMNS, STATE_ORDER_KEY, State, state_column_names};
use crate::store::{Row, StoreGateway, oversize_value};
use crate::table_dispatcher::TableDispatcher;

/// Default name of the state table
pub const STATE_TABLE: &str = "state";

/// Repository for aircraft states, backed by the latest-batch cache and the store
pub struct StateRepository {
    dispatcher: TableDispatcher<State>,
    track_key: TrackKey,
}

impl StateRepository {
    pub fn new(store: Arc<dyn StoreGateway>, track_key: TrackKey) -> Self {
        Self::with_table(STATE_TABLE, store, track_key)
    }

    pub fn with_table(
        table: impl Into<String>,
        store: Arc<dyn StoreGateway>,
        track_key: TrackKey,
    ) -> Self {
        Self {
            dispatcher: TableDispatcher::new(table, store),
            track_key,
        }
    }

    pub fn table(&self) -> &str {
        self.dispatcher.table()
    }

    pub fn track_key(&self) -> TrackKey {
        self.track_key
    }

    /// Create the state table unless it already exists
    pub async fn ensure_exists(&self) -> Result<()> {
        let table = self.table();
        if self.dispatcher.store().exists(table).await? {
            debug!("Table {} already exists", table);
            return Ok(());
        }

        let column_defs: Vec<String> = STATE_COLUMNS
            .iter()
            .map(|(name, column_type)| format!("{} {}", name, column_type))
            .collect();
        let engine_clauses = vec![
            "ENGINE MergeTree".to_string(),
            format!("ORDER BY ({})", STATE_ORDER_KEY.join(", ")),
            "SETTINGS index_granularity = 8192".to_string(),
        ];

        self.dispatcher
            .store()
            .create_table(table, &column_defs, &engine_clauses)
            .await
            .with_context(|| format!("Failed to create table {}", table))?;
        info!("Created table {}", table);
        Ok(())
    }

    /// Make `states` the latest batch, then append them to the store
    ///
    /// The cache is replaced before the insert starts, so readers see the new
    /// batch even if persisting it fails. States with a text value wider than
    /// its fixed-width column are dropped first, since one of them would make
    /// the store refuse the whole insert.
    pub async fn insert_batch(&self, states: Vec<State>) -> Result<usize> {
        let (states, rows): (Vec<State>, Vec<Row>) = states
            .into_iter()
            .map(|state| {
                let row = state.to_row();
                (state, row)
            })
            .filter(|(state, row)| match oversize_value(&STATE_COLUMNS, row) {
                None => true,
                Some((column, width, len)) => {
                    warn!(
                        "Dropping state {:?}: {} holds {} bytes, at most {} fit",
                        state.flight.icao, column, len, width
                    );
                    false
                }
            })
            .unzip();

        let count = states.len();
        if count == 0 {
            self.dispatcher.replace_snapshot(states).await;
            warn!("Received an empty batch, nothing to insert into {}", self.table());
            return Ok(0);
        }

        self.dispatcher.replace_snapshot(states).await;

        self.dispatcher
            .store()
            .insert(self.table(), rows, &state_column_names())
            .await
            .with_context(|| format!("Failed to insert {} states into {}", count, self.table()))?;
        info!("Inserted {} states into {}", count, self.table());
        Ok(count)
    }

    /// Latest batch, optionally restricted to a bounding box
    pub async fn get_latest_batch(
        &self,
        limit: i64,
        lat_min: Option<f64>,
        lat_max: Option<f64>,
        lon_min: Option<f64>,
        lon_max: Option<f64>,
    ) -> Result<Vec<State>, QueryError> {
        let query = LatestBatchQuery::new(limit, lat_min, lat_max, lon_min, lon_max)?;
        self.dispatcher.run_query(&query).await
    }

    /// Latest batch projected for map display
    pub async fn get_latest_batch_map(
        &self,
        limit: i64,
        lat_min: Option<f64>,
        lat_max: Option<f64>,
        lon_min: Option<f64>,
        lon_max: Option<f64>,
    ) -> Result<Vec<MapState>, QueryError> {
        let states = self
            .get_latest_batch(limit, lat_min, lat_max, lon_min, lon_max)
            .await?;
        Ok(states.iter().map(MapState::from).collect())
    }

    /// States of the latest batch within `radius_km` of a point
    pub async fn get_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        limit: i64,
    ) -> Result<Vec<State>, QueryError> {
        let query = NearbyQuery::new(latitude, longitude, radius_km, limit)?;
        self.dispatcher.run_query(&query).await
    }

    /// History of one aircraft over the trailing `duration`, newest first
    pub async fn get_track(
        &self,
        key: &str,
        duration: &str,
        limit: i64,
    ) -> Result<Vec<State>, QueryError> {
        let query = TrackQuery::new(self.track_key, key, duration, limit)?;
        self.dispatcher.run_query(&query).await
    }

    /// The aircraft's state in the latest batch, if it is part of it
    pub async fn get_last_known(&self, key: &str) -> Result<Option<State>, QueryError> {
        let key = self.track_key.normalize(key)?;
        let batch = self.get_latest_batch(0, None, None, None, None).await?;
        let found = batch
            .into_iter()
            .find(|state| self.track_key.matches(state, &key));
        if found.is_none() {
            debug!("No {} {} in the latest batch", self.track_key, key);
        }
        Ok(found)
    }

    /// Like [`StateRepository::get_last_known`], failing with `NotFound` when absent
    pub async fn require_last_known(&self, key: &str) -> Result<State, QueryError> {
        self.get_last_known(key).await?.ok_or_else(|| {
            QueryError::NotFound(format!(
                "No state for {} {} in the latest batch",
                self.track_key,
                key.trim()
            ))
        })
    }

    /// States of the latest batch matching every criterion
    pub async fn search(
        &self,
        criteria: &[SearchCriterion],
        limit: i64,
    ) -> Result<Vec<State>, QueryError> {
        let limit = validate_limit(limit)?;
        let batch = self.get_latest_batch(0, None, None, None, None).await?;
        let found = search_records(batch, criteria, limit);
        debug!("Search matched {} states", found.len());
        Ok(found)
    }

    /// Total number of rows in the state table
    pub async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table());
        let rows = self.dispatcher.store().query(&sql).await?;
        let value = rows
            .first()
            .and_then(|row| row.first())
            .ok_or_else(|| anyhow!("COUNT query on {} returned no rows", self.table()))?;
        // UInt64 is quoted in JSON output
        match value {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| anyhow!("Invalid row count {}", n)),
            Value::String(s) => s
                .parse::<u64>()
                .with_context(|| format!("Invalid row count {:?}", s)),
            other => Err(anyhow!("Invalid row count {}", other)),
        }
    }
}
