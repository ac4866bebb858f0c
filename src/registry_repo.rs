//! Airline, airport and aircraft registries
//!
//! Each registry is a small reference table that changes rarely. On startup
//! an existing table is read whole into its cache; a missing one is created
//! and seeded from a [`RegistrySource`]. Lookups by exact key are answered
//! from the cache when it holds the table and from the store otherwise.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aircraft::Aircraft;
use crate::airlines::Airline;
use crate::airports::Airport;
use crate::feeds::RegistrySource;
use crate::state_queries::{
    AirlineKey, AirportKey, KeyLookupQuery, QueryError, RecordKey, RegistrationKey,
    validate_limit,
};
use crate::state_search::{AircraftField, SearchCriterion, search_records};
use crate::store::{Row, StoreGateway, oversize_value};
use crate::table_dispatcher::TableDispatcher;

/// A record kept in one registry table
pub trait RegistryRecord: Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    /// `(name, type)` pairs in row order
    const COLUMNS: &'static [(&'static str, &'static str)];
    const ENGINE_CLAUSES: &'static [&'static str];

    /// Flatten into a store row in [`RegistryRecord::COLUMNS`] order
    fn to_row(&self) -> Row;

    /// Rebuild a record from a full store row
    fn from_row(row: &[Value]) -> Result<Self>;
}

/// One registry table behind its dispatcher
pub struct RegistryTable<T> {
    dispatcher: TableDispatcher<T>,
}

impl<T: RegistryRecord> RegistryTable<T> {
    pub fn new(store: Arc<dyn StoreGateway>) -> Self {
        Self {
            dispatcher: TableDispatcher::new(T::TABLE, store),
        }
    }

    pub fn table(&self) -> &str {
        self.dispatcher.table()
    }

    fn column_list() -> String {
        T::COLUMNS
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Read an existing table into the cache; false when there is no table
    pub async fn load_existing(&self) -> Result<bool> {
        let table = self.table();
        let store = self.dispatcher.store();
        if !store.exists(table).await? {
            return Ok(false);
        }

        let sql = format!("SELECT {} FROM {}", Self::column_list(), table);
        let rows = store
            .query(&sql)
            .await
            .with_context(|| format!("Failed to read table {}", table))?;
        let records = rows
            .iter()
            .map(|row| T::from_row(row))
            .collect::<Result<Vec<T>>>()
            .with_context(|| format!("Failed to decode table {}", table))?;

        info!("Loaded {} records from {}", records.len(), table);
        self.dispatcher.replace_snapshot(records).await;
        Ok(true)
    }

    /// Create the table, cache `records` and insert them
    ///
    /// Records with a text value wider than its fixed-width column are
    /// dropped first. Returns the number of records inserted.
    pub async fn create(&self, records: Vec<T>) -> Result<usize> {
        let table = self.table();
        let column_defs: Vec<String> = T::COLUMNS
            .iter()
            .map(|(name, column_type)| format!("{} {}", name, column_type))
            .collect();
        let engine_clauses: Vec<String> =
            T::ENGINE_CLAUSES.iter().map(|c| c.to_string()).collect();
        self.dispatcher
            .store()
            .create_table(table, &column_defs, &engine_clauses)
            .await
            .with_context(|| format!("Failed to create table {}", table))?;
        info!("Created table {}", table);

        let before = records.len();
        let (records, rows): (Vec<T>, Vec<Row>) = records
            .into_iter()
            .map(|record| {
                let row = record.to_row();
                (record, row)
            })
            .filter(|(_, row)| match oversize_value(T::COLUMNS, row) {
                None => true,
                Some((column, width, len)) => {
                    debug!(
                        "Dropping {} record: {} holds {} bytes, at most {} fit",
                        table, column, len, width
                    );
                    false
                }
            })
            .unzip();
        if records.len() < before {
            warn!(
                "Dropped {} of {} {} records wider than their columns",
                before - records.len(),
                before,
                table
            );
        }

        let count = records.len();
        self.dispatcher.replace_snapshot(records).await;
        if count == 0 {
            warn!("No records to insert into {}", table);
            return Ok(0);
        }

        let column_names: Vec<String> =
            T::COLUMNS.iter().map(|(name, _)| name.to_string()).collect();
        self.dispatcher
            .store()
            .insert(table, rows, &column_names)
            .await
            .with_context(|| format!("Failed to insert {} records into {}", count, table))?;
        info!("Inserted {} records into {}", count, table);
        Ok(count)
    }

    /// The record carrying `key`
    pub async fn lookup<K: RecordKey<T> + 'static>(&self, key: K) -> Result<T, QueryError> {
        let query = KeyLookupQuery::new(key);
        let found = self.dispatcher.run_query(&query).await?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::NotFound(format!("No {}", query.key())))
    }

    /// Every cached record, reading the table first when nothing is cached
    pub async fn records(&self) -> Result<Vec<T>> {
        if self.dispatcher.snapshot_len().await == 0 {
            self.load_existing().await?;
        }
        Ok(self.dispatcher.snapshot(0).await)
    }
}

/// Repository over the airline, airport and aircraft registries
pub struct RegistryRepository {
    airlines: RegistryTable<Airline>,
    airports: RegistryTable<Airport>,
    aircraft: RegistryTable<Aircraft>,
}

impl RegistryRepository {
    pub fn new(store: Arc<dyn StoreGateway>) -> Self {
        Self {
            airlines: RegistryTable::new(store.clone()),
            airports: RegistryTable::new(store.clone()),
            aircraft: RegistryTable::new(store),
        }
    }

    /// Load every registry table, creating and seeding missing ones from `source`
    ///
    /// Without a source, missing tables are created empty.
    pub async fn ensure_exists(&self, source: Option<&dyn RegistrySource>) -> Result<()> {
        if !self.airlines.load_existing().await? {
            let records = match source {
                Some(source) => source.fetch_airlines().await?,
                None => Vec::new(),
            };
            self.airlines.create(records).await?;
        }
        if !self.airports.load_existing().await? {
            let records = match source {
                Some(source) => source.fetch_airports().await?,
                None => Vec::new(),
            };
            self.airports.create(records).await?;
        }
        if !self.aircraft.load_existing().await? {
            let records = match source {
                Some(source) => source.fetch_aircraft().await?,
                None => Vec::new(),
            };
            self.aircraft.create(records).await?;
        }
        Ok(())
    }

    /// Airline matching either code, case-insensitively
    pub async fn get_airline(
        &self,
        iata: Option<&str>,
        icao: Option<&str>,
    ) -> Result<Airline, QueryError> {
        self.airlines.lookup(AirlineKey::new(iata, icao)?).await
    }

    /// Airport by IATA (3 characters) or ICAO (4 characters) code
    pub async fn get_airport(&self, code: &str) -> Result<Airport, QueryError> {
        self.airports.lookup(AirportKey::new(code)?).await
    }

    /// Aircraft by registration, ignoring case and dashes
    pub async fn get_aircraft(&self, registration: &str) -> Result<Aircraft, QueryError> {
        self.aircraft
            .lookup(RegistrationKey::new(registration)?)
            .await
    }

    /// Registered aircraft matching every criterion
    pub async fn search_aircraft(
        &self,
        criteria: &[SearchCriterion<AircraftField>],
        limit: i64,
    ) -> Result<Vec<Aircraft>, QueryError> {
        let limit = validate_limit(limit)?;
        let aircraft = self.aircraft.records().await?;
        let found = search_records(aircraft, criteria, limit);
        debug!("Aircraft search matched {} records", found.len());
        Ok(found)
    }
}
