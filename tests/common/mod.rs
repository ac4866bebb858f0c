//! Common helpers for repository and ingestion integration tests
//!
//! `MemoryStore` stands in for ClickHouse: it keeps created tables and
//! inserted rows, and answers queries from a queue of canned results, falling
//! back to every row inserted so far.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use skytrack::states::{DataSource, Position, State};
use skytrack::store::{Row, StoreGateway};

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Vec<String>>,
    rows: Mutex<Vec<Row>>,
    queries: Mutex<Vec<String>>,
    canned: Mutex<VecDeque<Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by the next query instead of the stored rows
    pub fn push_response(&self, rows: Vec<Row>) {
        self.canned.lock().unwrap().push_back(rows);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().iter().any(|t| t == table))
    }

    async fn create_table(
        &self,
        name: &str,
        _column_defs: &[String],
        _engine_clauses: &[String],
    ) -> Result<()> {
        self.tables.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>, _column_names: &[String]) -> Result<()> {
        if !self.tables.lock().unwrap().iter().any(|t| t == table) {
            return Err(anyhow!("Table {} does not exist", table));
        }
        self.rows.lock().unwrap().extend(rows);
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(sql.to_string());
        match self.canned.lock().unwrap().pop_front() {
            Some(rows) => Ok(rows),
            None => Ok(self.rows.lock().unwrap().clone()),
        }
    }
}

/// A state stamped with the current whole second, as the store keeps it
pub fn state_at(callsign: &str, latitude: f64, longitude: f64) -> State {
    let mut state = State::new(Utc::now().trunc_subsecs(0), DataSource::OpenskyNetwork);
    state.flight.icao = callsign.to_string();
    state.geography.position = Position::new(latitude, longitude);
    state
}
