use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{QueryError, TableQuery, limit_clause, validate_limit};
use crate::states::{
    DataSource, State, format_store_time, row_bool, row_opt_f64, row_opt_str, row_position,
    row_str, row_time,
};
use crate::store::StoreGateway;

static FLIGHT_ICAO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{1,8}$").expect("valid flight designator regex"));

static ICAO24_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-F]{6}$").expect("valid ICAO24 regex"));

/// Columns selected for a track, in decode order
pub const TRACK_COLUMNS: [&str; 9] = [
    "time",
    "data_source",
    "flight__icao",
    "aircraft__icao24",
    "geography__position",
    "geography__baro_altitude",
    "geography__heading",
    "geography__speed_horizontal",
    "geography__is_on_ground",
];

/// Which identifier tracks and last-known lookups are keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKey {
    /// ICAO flight designator, e.g. "KLM1001"
    #[default]
    Flight,
    /// 24-bit transponder address, e.g. "484A5E"
    Icao24,
}

impl TrackKey {
    pub fn column(&self) -> &'static str {
        match self {
            TrackKey::Flight => "flight__icao",
            TrackKey::Icao24 => "aircraft__icao24",
        }
    }

    /// Width of the FixedString column holding the key
    fn width(&self) -> usize {
        match self {
            TrackKey::Flight => 8,
            TrackKey::Icao24 => 6,
        }
    }

    /// Trim and upper-case a key, rejecting anything that is not well formed
    pub fn normalize(&self, key: &str) -> Result<String, QueryError> {
        let key = key.trim().to_ascii_uppercase();
        if key.is_empty() {
            return Err(QueryError::validation("Key must not be empty"));
        }
        let well_formed = match self {
            TrackKey::Flight => FLIGHT_ICAO_RE.is_match(&key),
            TrackKey::Icao24 => ICAO24_RE.is_match(&key),
        };
        if !well_formed {
            return Err(QueryError::validation(format!(
                "Malformed {} key: {:?}",
                self, key
            )));
        }
        Ok(key)
    }

    /// Whether `state` carries this (already normalized) key
    pub fn matches(&self, state: &State, key: &str) -> bool {
        match self {
            TrackKey::Flight => state.flight.icao.eq_ignore_ascii_case(key),
            TrackKey::Icao24 => state
                .aircraft
                .icao24
                .as_deref()
                .is_some_and(|icao24| icao24.eq_ignore_ascii_case(key)),
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Flight => write!(f, "flight"),
            TrackKey::Icao24 => write!(f, "icao24"),
        }
    }
}

impl FromStr for TrackKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flight" | "callsign" => Ok(TrackKey::Flight),
            "icao24" => Ok(TrackKey::Icao24),
            other => Err(format!(
                "Unknown track key kind {:?} (expected \"flight\" or \"icao24\")",
                other
            )),
        }
    }
}

/// Parse "5h20m", "1d", "90s" or a bare number of seconds
pub(crate) fn parse_relative_duration(input: &str) -> Result<Duration, QueryError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(QueryError::validation("Duration must not be empty"));
    }
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| QueryError::validation(format!("Malformed duration {:?}: {}", input, e)));
    }
    humantime::parse_duration(input)
        .map_err(|e| QueryError::validation(format!("Malformed duration {:?}: {}", input, e)))
}

/// History of one aircraft over a trailing window, newest first
///
/// The cache only ever holds the latest batch, so this query always goes to
/// the store.
#[derive(Debug, Clone)]
pub struct TrackQuery {
    key_kind: TrackKey,
    key: String,
    cutoff: DateTime<Utc>,
    limit: usize,
}

impl TrackQuery {
    /// Build the query, resolving `duration` against the current time
    pub fn new(key_kind: TrackKey, key: &str, duration: &str, limit: i64) -> Result<Self, QueryError> {
        Self::new_at(key_kind, key, duration, limit, Utc::now())
    }

    pub(crate) fn new_at(
        key_kind: TrackKey,
        key: &str,
        duration: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, QueryError> {
        let limit = validate_limit(limit)?;
        let key = key_kind.normalize(key)?;
        let window = parse_relative_duration(duration)?;
        let window = chrono::Duration::from_std(window)
            .map_err(|_| QueryError::validation(format!("Duration too large: {:?}", duration)))?;
        let cutoff = now
            .checked_sub_signed(window)
            .ok_or_else(|| QueryError::validation(format!("Duration too large: {:?}", duration)))?
            .trunc_subsecs(0);

        Ok(Self {
            key_kind,
            key,
            cutoff,
            limit,
        })
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub(crate) fn build_sql(&self, table: &str) -> String {
        // FixedString columns only compare equal to values of the same width
        format!(
            "SELECT {} FROM {} WHERE {} = toFixedString('{}', {}) AND time >= toDateTime('{}', 'UTC') ORDER BY time DESC{}",
            TRACK_COLUMNS.join(", "),
            table,
            self.key_kind.column(),
            self.key,
            self.key_kind.width(),
            format_store_time(&self.cutoff),
            limit_clause(self.limit)
        )
    }
}

#[async_trait]
impl TableQuery<State> for TrackQuery {
    fn name(&self) -> &'static str {
        "track"
    }

    fn allows_cache(&self) -> bool {
        false
    }

    fn from_cache(&self, _snapshot: Vec<State>) -> Result<Vec<State>, QueryError> {
        error!("Track query was routed to the cache for key {}", self.key);
        Err(QueryError::Unsupported(
            "Track query cannot be answered from the latest-batch cache".to_string(),
        ))
    }

    async fn from_server(
        &self,
        table: &str,
        store: &dyn StoreGateway,
    ) -> Result<Vec<State>, QueryError> {
        let sql = self.build_sql(table);
        debug!("Querying store with \"{}\"", sql);

        let rows = store.query(&sql).await?;
        let states = rows
            .iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Retrieved {} track states for {} since {}",
            states.len(),
            self.key,
            self.cutoff
        );
        Ok(states)
    }

    fn decode_row(&self, row: &[Value]) -> Result<State, QueryError> {
        if row.len() != TRACK_COLUMNS.len() {
            return Err(QueryError::Upstream(anyhow::anyhow!(
                "Track row has {} columns, expected {}",
                row.len(),
                TRACK_COLUMNS.len()
            )));
        }

        let decode = || -> anyhow::Result<State> {
            let data_source: DataSource = row_str(&row[1], "data_source")?.parse()?;
            let mut state = State::new(row_time(&row[0], "time")?, data_source);
            state.flight.icao = row_str(&row[2], "flight__icao")?;
            state.aircraft.icao24 = row_opt_str(&row[3], "aircraft__icao24")?;
            state.geography.position = row_position(&row[4], "geography__position")?;
            state.geography.baro_altitude = row_opt_f64(&row[5], "geography__baro_altitude")?;
            state.geography.heading = row_opt_f64(&row[6], "geography__heading")?;
            state.geography.speed_horizontal =
                row_opt_f64(&row[7], "geography__speed_horizontal")?;
            state.geography.is_on_ground = row_bool(&row[8], "geography__is_on_ground")?;
            Ok(state)
        };

        decode().map_err(QueryError::Upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::StateStatus;
    use crate::store::testing::RecordingStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_cache_path_is_unsupported() {
        let query = TrackQuery::new(TrackKey::Flight, "KLM1001", "1h", 0).unwrap();
        assert!(!query.allows_cache());
        assert!(matches!(
            query.from_cache(Vec::new()),
            Err(QueryError::Unsupported(_))
        ));

        let mut state = State::new(now(), DataSource::OpenskyNetwork);
        state.flight.icao = "KLM1001".to_string();
        assert!(matches!(
            query.from_cache(vec![state]),
            Err(QueryError::Unsupported(_))
        ));
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(parse_relative_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_relative_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_relative_duration("5h20m").unwrap(),
            Duration::from_secs(5 * 3600 + 20 * 60)
        );
        assert_eq!(parse_relative_duration("1d").unwrap(), Duration::from_secs(86400));
        assert!(parse_relative_duration("").is_err());
        assert!(parse_relative_duration("soon").is_err());
        assert!(parse_relative_duration("-5m").is_err());
    }

    #[test]
    fn test_cutoff_resolved_at_construction() {
        let query = TrackQuery::new_at(TrackKey::Flight, "klm1001", "5h20m", 0, now()).unwrap();
        assert_eq!(
            query.cutoff(),
            Utc.with_ymd_and_hms(2025, 6, 1, 6, 40, 0).unwrap()
        );
    }

    #[test]
    fn test_key_validation() {
        assert!(TrackQuery::new(TrackKey::Flight, "", "1h", 0).is_err());
        assert!(TrackQuery::new(TrackKey::Flight, "KLM1001'; DROP", "1h", 0).is_err());
        assert!(TrackQuery::new(TrackKey::Flight, "TOOLONGKEY", "1h", 0).is_err());
        assert!(TrackQuery::new(TrackKey::Icao24, "484A5", "1h", 0).is_err());
        assert!(TrackQuery::new(TrackKey::Icao24, "48ZA5E", "1h", 0).is_err());
        assert!(TrackQuery::new(TrackKey::Icao24, "484a5e", "1h", 0).is_ok());
        assert!(TrackQuery::new(TrackKey::Flight, "KLM1001", "1h", -1).is_err());
    }

    #[test]
    fn test_sql() {
        let query = TrackQuery::new_at(TrackKey::Flight, "klm1001", "1h", 50, now()).unwrap();
        assert_eq!(
            query.build_sql("state"),
            "SELECT time, data_source, flight__icao, aircraft__icao24, geography__position, \
             geography__baro_altitude, geography__heading, geography__speed_horizontal, \
             geography__is_on_ground FROM state WHERE flight__icao = toFixedString('KLM1001', 8) \
             AND time >= toDateTime('2025-06-01 11:00:00', 'UTC') ORDER BY time DESC LIMIT 50"
        );

        let query = TrackQuery::new_at(TrackKey::Icao24, "484a5e", "30m", 0, now()).unwrap();
        assert!(
            query
                .build_sql("state")
                .contains("WHERE aircraft__icao24 = toFixedString('484A5E', 6)")
        );
    }

    #[tokio::test]
    async fn test_server_path_decodes_projection() {
        let store = RecordingStore::new();
        store.push_response(vec![vec![
            json!("2025-06-01 11:59:00"),
            json!("OPENSKY_NETWORK"),
            json!("KLM1001\u{0}"),
            json!("484A5E"),
            json!([52.3, 4.76]),
            json!(10668.0),
            json!(271.5),
            json!(null),
            json!(false),
        ]]);

        let query = TrackQuery::new_at(TrackKey::Flight, "KLM1001", "1h", 0, now()).unwrap();
        let states = query.from_server("state", &store).await.unwrap();

        assert_eq!(states.len(), 1);
        let state = &states[0];
        assert_eq!(state.flight.icao, "KLM1001");
        assert_eq!(state.status, StateStatus::Unknown);
        assert_eq!(state.aircraft.icao24.as_deref(), Some("484A5E"));
        assert_eq!(state.geography.baro_altitude, Some(10668.0));
        assert_eq!(state.geography.speed_horizontal, None);
        assert!(store.last_query().unwrap().contains("ORDER BY time DESC"));
    }

    #[test]
    fn test_track_key_from_str() {
        assert_eq!("flight".parse::<TrackKey>(), Ok(TrackKey::Flight));
        assert_eq!("ICAO24".parse::<TrackKey>(), Ok(TrackKey::Icao24));
        assert!("tail".parse::<TrackKey>().is_err());
    }
}
