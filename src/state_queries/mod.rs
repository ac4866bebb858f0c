//! Query strategies over a state or registry table
//!
//! Each strategy is a short-lived value: it validates its arguments on
//! construction, is run once by the [`TableDispatcher`](crate::table_dispatcher::TableDispatcher)
//! against either the cached snapshot or the store, and is then dropped.

mod latest_batch;
mod lookup;
mod nearby;
mod track;

pub use latest_batch::{BoundingBox, LatestBatchQuery};
pub use lookup::{AirlineKey, AirportKey, KeyLookupQuery, RecordKey, RegistrationKey};
pub use nearby::NearbyQuery;
pub use track::{TRACK_COLUMNS, TrackKey, TrackQuery};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::store::StoreGateway;

/// Why a query could not produce a result
#[derive(Debug)]
pub enum QueryError {
    /// Arguments were rejected before any I/O happened
    Validation(String),
    /// The strategy cannot run on the requested path
    Unsupported(String),
    /// The store failed or returned rows that could not be decoded
    Upstream(anyhow::Error),
    /// A lookup by key found nothing
    NotFound(String),
}

impl QueryError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        debug!("Rejected query: {}", message);
        QueryError::Validation(message)
    }

    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Validation(_) => "validation",
            QueryError::Unsupported(_) => "unsupported",
            QueryError::Upstream(_) => "upstream",
            QueryError::NotFound(_) => "not_found",
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Validation(msg) => write!(f, "Invalid query: {}", msg),
            QueryError::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            QueryError::Upstream(err) => write!(f, "Store error: {:#}", err),
            QueryError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Upstream(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for QueryError {
    fn from(err: anyhow::Error) -> Self {
        QueryError::Upstream(err)
    }
}

/// A question that can be answered from the latest snapshot, the store, or both
#[async_trait]
pub trait TableQuery<T>: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Whether the snapshot of the latest batch is enough to answer
    fn allows_cache(&self) -> bool;

    /// Answer from a private copy of the cached batch
    fn from_cache(&self, snapshot: Vec<T>) -> Result<Vec<T>, QueryError>;

    /// Answer by querying `table` in the store
    async fn from_server(&self, table: &str, store: &dyn StoreGateway)
    -> Result<Vec<T>, QueryError>;

    /// Decode one row returned by [`TableQuery::from_server`]'s SQL
    fn decode_row(&self, row: &[Value]) -> Result<T, QueryError>;
}

/// Convert a caller-supplied limit, rejecting negatives
pub(crate) fn validate_limit(limit: i64) -> Result<usize, QueryError> {
    usize::try_from(limit)
        .map_err(|_| QueryError::validation(format!("Limit must be >= 0 (got {})", limit)))
}

/// Keep the first `limit` items (0 = all)
pub(crate) fn truncate<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 {
        items.truncate(limit);
    }
    items
}

/// SQL predicate selecting the most recent batch of `table`
pub(crate) fn latest_batch_predicate(table: &str) -> String {
    format!("time = (SELECT MAX(time) FROM {})", table)
}

pub(crate) fn limit_clause(limit: usize) -> String {
    if limit > 0 {
        format!(" LIMIT {}", limit)
    } else {
        String::new()
    }
}
