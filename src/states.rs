//! Aircraft state model
//!
//! A `State` is one observation of one aircraft at one instant. Feeds produce
//! them, the reconciler merges them, the snapshot cache holds the most recent
//! batch and the `state` table keeps every batch ever ingested.
//!
//! Rows travel to and from the store as JSON arrays in [`STATE_COLUMNS`] order.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::store::oversize_value;

/// Timestamp layout used by the store for `DateTime('UTC')` columns
pub const STORE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// State table columns and their store types, in declared order
pub const STATE_COLUMNS: [(&str, &str); 25] = [
    ("time", "DateTime('UTC')"),
    ("data_source", "Enum('OPENSKY_NETWORK', 'AVIATION_EDGE')"),
    ("status", "Enum('UNKNOWN', 'EN_ROUTE', 'LANDED', 'STARTED')"),
    ("aircraft__iata", "Nullable(FixedString(4))"),
    ("aircraft__icao", "Nullable(FixedString(4))"),
    ("aircraft__icao24", "Nullable(FixedString(6))"),
    ("aircraft__registration", "Nullable(FixedString(10))"),
    ("airline__iata", "Nullable(FixedString(3))"),
    ("airline__icao", "Nullable(FixedString(3))"),
    ("airport__arrival_iata", "Nullable(FixedString(3))"),
    ("airport__arrival_icao", "Nullable(FixedString(4))"),
    ("airport__departure_iata", "Nullable(FixedString(3))"),
    ("airport__departure_icao", "Nullable(FixedString(4))"),
    ("flight__iata", "Nullable(FixedString(7))"),
    ("flight__icao", "FixedString(8)"),
    ("flight__number", "Nullable(UInt16)"),
    ("geography__position", "Point"),
    ("geography__geo_altitude", "Nullable(Float32)"),
    ("geography__baro_altitude", "Nullable(Float32)"),
    ("geography__heading", "Nullable(Float32)"),
    ("geography__speed_horizontal", "Nullable(Float32)"),
    ("geography__speed_vertical", "Nullable(Float32)"),
    ("geography__is_on_ground", "Bool"),
    ("transponder__squawk", "Nullable(FixedString(4))"),
    ("transponder__squawk_time", "Nullable(DateTime('UTC'))"),
];

/// Columns forming the table's sort key
pub const STATE_ORDER_KEY: [&str; 2] = ["flight__icao", "time"];

/// Names of the state table columns in declared order
pub fn state_column_names() -> Vec<String> {
    STATE_COLUMNS
        .iter()
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Feed that produced a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSource {
    OpenskyNetwork,
    AviationEdge,
}

impl DataSource {
    /// Name as stored in the `data_source` enum column
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::OpenskyNetwork => "OPENSKY_NETWORK",
            DataSource::AviationEdge => "AVIATION_EDGE",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENSKY_NETWORK" => Ok(DataSource::OpenskyNetwork),
            "AVIATION_EDGE" => Ok(DataSource::AviationEdge),
            other => Err(ParseEnumError {
                kind: "data source",
                value: other.to_string(),
            }),
        }
    }
}

/// Flight phase reported by the detail feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateStatus {
    Unknown,
    Started,
    EnRoute,
    Landed,
}

impl StateStatus {
    /// Name as stored in the `status` enum column
    pub fn as_str(&self) -> &'static str {
        match self {
            StateStatus::Unknown => "UNKNOWN",
            StateStatus::Started => "STARTED",
            StateStatus::EnRoute => "EN_ROUTE",
            StateStatus::Landed => "LANDED",
        }
    }
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StateStatus {
    type Err = ParseEnumError;

    /// Accepts column names ("EN_ROUTE") and feed spellings ("en-route", "enroute")
    /// case-insensitively. An empty string means the feed had nothing to say.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "unknown" => Ok(StateStatus::Unknown),
            "started" => Ok(StateStatus::Started),
            "en-route" | "enroute" | "en_route" => Ok(StateStatus::EnRoute),
            "landed" => Ok(StateStatus::Landed),
            _ => Err(ParseEnumError {
                kind: "state status",
                value: s.to_string(),
            }),
        }
    }
}

/// Unrecognised enum name in a feed payload or store row
#[derive(Debug, Clone, PartialEq)]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateAircraft {
    pub iata: Option<String>,
    pub icao: Option<String>,
    /// 24-bit transponder address as 6 hex characters
    pub icao24: Option<String>,
    pub registration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateAirline {
    pub iata: Option<String>,
    pub icao: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateAirport {
    pub arrival_iata: Option<String>,
    pub arrival_icao: Option<String>,
    pub departure_iata: Option<String>,
    pub departure_icao: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFlight {
    pub iata: Option<String>,
    /// ICAO flight designator; empty when the feed did not report one
    pub icao: String,
    pub number: Option<u16>,
}

/// Latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The (0, 0) placeholder written when a feed reports no position
    ///
    /// A real aircraft sitting at exactly (0, 0) is indistinguishable from the
    /// placeholder and loses its position during reconciliation.
    pub fn is_no_data(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateGeography {
    pub position: Position,
    /// Geometric altitude [m]
    pub geo_altitude: Option<f64>,
    /// Barometric altitude [m]
    pub baro_altitude: Option<f64>,
    /// True track [deg]
    pub heading: Option<f64>,
    /// Ground speed [m/s]
    pub speed_horizontal: Option<f64>,
    /// Climb rate [m/s]
    pub speed_vertical: Option<f64>,
    pub is_on_ground: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateTransponder {
    pub squawk: Option<String>,
    pub squawk_time: Option<DateTime<Utc>>,
}

/// One observation of one aircraft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub time: DateTime<Utc>,
    pub data_source: DataSource,
    pub status: StateStatus,
    pub aircraft: StateAircraft,
    pub airline: StateAirline,
    pub airport: StateAirport,
    pub flight: StateFlight,
    pub geography: StateGeography,
    pub transponder: StateTransponder,
}

/// Reason a state was rejected by [`State::validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidState {
    Latitude(f64),
    Longitude(f64),
    Icao24(String),
    /// A text value wider than its `FixedString` column
    TooLong {
        column: &'static str,
        width: usize,
        len: usize,
    },
}

impl fmt::Display for InvalidState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidState::Latitude(v) => write!(f, "Latitude out of range: {}", v),
            InvalidState::Longitude(v) => write!(f, "Longitude out of range: {}", v),
            InvalidState::Icao24(v) => write!(f, "ICAO24 address must be 6 characters: {:?}", v),
            InvalidState::TooLong { column, width, len } => {
                write!(f, "Column {} holds {} bytes, at most {} fit", column, len, width)
            }
        }
    }
}

impl std::error::Error for InvalidState {}

impl State {
    /// Empty state at `time` for `data_source`, filled in by the caller
    pub fn new(time: DateTime<Utc>, data_source: DataSource) -> Self {
        Self {
            time,
            data_source,
            status: StateStatus::Unknown,
            aircraft: StateAircraft::default(),
            airline: StateAirline::default(),
            airport: StateAirport::default(),
            flight: StateFlight::default(),
            geography: StateGeography::default(),
            transponder: StateTransponder::default(),
        }
    }

    /// Check coordinate ranges, the ICAO24 address length and that every text
    /// value fits its fixed-width column in [`STATE_COLUMNS`]
    pub fn validate(&self) -> Result<(), InvalidState> {
        let position = self.geography.position;
        if !(-90.0..=90.0).contains(&position.latitude) {
            return Err(InvalidState::Latitude(position.latitude));
        }
        if !(-180.0..=180.0).contains(&position.longitude) {
            return Err(InvalidState::Longitude(position.longitude));
        }
        if let Some(icao24) = &self.aircraft.icao24 {
            if icao24.chars().count() != 6 {
                return Err(InvalidState::Icao24(icao24.clone()));
            }
        }
        if let Some((column, width, len)) = oversize_value(&STATE_COLUMNS, &self.to_row()) {
            return Err(InvalidState::TooLong { column, width, len });
        }
        Ok(())
    }

    /// Flatten into a store row in [`STATE_COLUMNS`] order
    pub fn to_row(&self) -> Vec<Value> {
        let position = self.geography.position;
        vec![
            json!(format_store_time(&self.time)),
            json!(self.data_source.as_str()),
            json!(self.status.as_str()),
            json!(self.aircraft.iata),
            json!(self.aircraft.icao),
            json!(self.aircraft.icao24),
            json!(self.aircraft.registration),
            json!(self.airline.iata),
            json!(self.airline.icao),
            json!(self.airport.arrival_iata),
            json!(self.airport.arrival_icao),
            json!(self.airport.departure_iata),
            json!(self.airport.departure_icao),
            json!(self.flight.iata),
            json!(self.flight.icao),
            json!(self.flight.number),
            json!([position.latitude, position.longitude]),
            json!(self.geography.geo_altitude),
            json!(self.geography.baro_altitude),
            json!(self.geography.heading),
            json!(self.geography.speed_horizontal),
            json!(self.geography.speed_vertical),
            json!(self.geography.is_on_ground),
            json!(self.transponder.squawk),
            json!(self.transponder.squawk_time.as_ref().map(format_store_time)),
        ]
    }

    /// Rebuild a state from a full store row in [`STATE_COLUMNS`] order
    pub fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() != STATE_COLUMNS.len() {
            return Err(anyhow!(
                "State row has {} columns, expected {}",
                row.len(),
                STATE_COLUMNS.len()
            ));
        }

        Ok(Self {
            time: row_time(&row[0], "time")?,
            data_source: row_str(&row[1], "data_source")?.parse()?,
            status: row_str(&row[2], "status")?.parse()?,
            aircraft: StateAircraft {
                iata: row_opt_str(&row[3], "aircraft__iata")?,
                icao: row_opt_str(&row[4], "aircraft__icao")?,
                icao24: row_opt_str(&row[5], "aircraft__icao24")?,
                registration: row_opt_str(&row[6], "aircraft__registration")?,
            },
            airline: StateAirline {
                iata: row_opt_str(&row[7], "airline__iata")?,
                icao: row_opt_str(&row[8], "airline__icao")?,
            },
            airport: StateAirport {
                arrival_iata: row_opt_str(&row[9], "airport__arrival_iata")?,
                arrival_icao: row_opt_str(&row[10], "airport__arrival_icao")?,
                departure_iata: row_opt_str(&row[11], "airport__departure_iata")?,
                departure_icao: row_opt_str(&row[12], "airport__departure_icao")?,
            },
            flight: StateFlight {
                iata: row_opt_str(&row[13], "flight__iata")?,
                icao: row_str(&row[14], "flight__icao")?,
                number: row_opt_u16(&row[15], "flight__number")?,
            },
            geography: StateGeography {
                position: row_position(&row[16], "geography__position")?,
                geo_altitude: row_opt_f64(&row[17], "geography__geo_altitude")?,
                baro_altitude: row_opt_f64(&row[18], "geography__baro_altitude")?,
                heading: row_opt_f64(&row[19], "geography__heading")?,
                speed_horizontal: row_opt_f64(&row[20], "geography__speed_horizontal")?,
                speed_vertical: row_opt_f64(&row[21], "geography__speed_vertical")?,
                is_on_ground: row_bool(&row[22], "geography__is_on_ground")?,
            },
            transponder: StateTransponder {
                squawk: row_opt_str(&row[23], "transponder__squawk")?,
                squawk_time: row_opt_time(&row[24], "transponder__squawk_time")?,
            },
        })
    }
}

/// Light projection of a state for map rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    pub time: DateTime<Utc>,
    pub callsign: String,
    pub position: Position,
    pub heading: Option<f64>,
    pub model: Option<String>,
    pub altitude: Option<f64>,
    pub velocity: Option<f64>,
}

impl From<&State> for MapState {
    fn from(state: &State) -> Self {
        Self {
            time: state.time,
            callsign: state.flight.icao.clone(),
            position: state.geography.position,
            heading: state.geography.heading,
            model: state.aircraft.iata.clone(),
            altitude: state.geography.baro_altitude,
            velocity: state.geography.speed_horizontal,
        }
    }
}

pub fn format_store_time(time: &DateTime<Utc>) -> String {
    time.format(STORE_TIME_FORMAT).to_string()
}

// Row value helpers. FixedString columns come back padded with NUL bytes.

fn clean_str(s: &str) -> String {
    s.trim_end_matches('\0').trim_end().to_string()
}

pub(crate) fn row_str(value: &Value, column: &str) -> Result<String> {
    value
        .as_str()
        .map(clean_str)
        .ok_or_else(|| anyhow!("Column {} is not a string: {}", column, value))
}

pub(crate) fn row_opt_str(value: &Value, column: &str) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    let s = row_str(value, column)?;
    Ok(if s.is_empty() { None } else { Some(s) })
}

pub(crate) fn row_opt_f64(value: &Value, column: &str) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        // 64-bit numbers and nan/inf arrive quoted
        Value::String(s) => match s.as_str() {
            "nan" | "inf" | "-inf" => Ok(None),
            _ => s
                .parse::<f64>()
                .map(Some)
                .with_context(|| format!("Column {} is not a number: {:?}", column, s)),
        },
        other => Err(anyhow!("Column {} is not a number: {}", column, other)),
    }
}

pub(crate) fn row_opt_u16(value: &Value, column: &str) -> Result<Option<u16>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| anyhow!("Column {} is not a u16: {}", column, n)),
        Value::String(s) => s
            .parse::<u16>()
            .map(Some)
            .with_context(|| format!("Column {} is not a u16: {:?}", column, s)),
        other => Err(anyhow!("Column {} is not a u16: {}", column, other)),
    }
}

pub(crate) fn row_opt_i64(value: &Value, column: &str) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow!("Column {} is not an integer: {}", column, n)),
        Value::String(s) => s
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("Column {} is not an integer: {:?}", column, s)),
        other => Err(anyhow!("Column {} is not an integer: {}", column, other)),
    }
}

/// Integer column narrowed to the record's field type
pub(crate) fn row_opt_int<T: TryFrom<i64>>(value: &Value, column: &str) -> Result<Option<T>> {
    row_opt_i64(value, column)?
        .map(|n| T::try_from(n).map_err(|_| anyhow!("Column {} is out of range: {}", column, n)))
        .transpose()
}

pub(crate) fn row_opt_date(value: &Value, column: &str) -> Result<Option<NaiveDate>> {
    if value.is_null() {
        return Ok(None);
    }
    let s = row_str(value, column)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map(Some)
        .with_context(|| format!("Column {} has malformed date {:?}", column, s))
}

pub(crate) fn row_bool(value: &Value, column: &str) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_u64() == Some(1)),
        other => Err(anyhow!("Column {} is not a bool: {}", column, other)),
    }
}

pub(crate) fn row_time(value: &Value, column: &str) -> Result<DateTime<Utc>> {
    let s = value
        .as_str()
        .ok_or_else(|| anyhow!("Column {} is not a timestamp: {}", column, value))?;
    let naive = NaiveDateTime::parse_from_str(s, STORE_TIME_FORMAT)
        .with_context(|| format!("Column {} has malformed timestamp {:?}", column, s))?;
    Ok(naive.and_utc())
}

pub(crate) fn row_opt_time(value: &Value, column: &str) -> Result<Option<DateTime<Utc>>> {
    if value.is_null() {
        return Ok(None);
    }
    row_time(value, column).map(Some)
}

pub(crate) fn row_position(value: &Value, column: &str) -> Result<Position> {
    let pair = value
        .as_array()
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| anyhow!("Column {} is not a point: {}", column, value))?;
    let latitude = row_opt_f64(&pair[0], column)?
        .ok_or_else(|| anyhow!("Column {} has no latitude", column))?;
    let longitude = row_opt_f64(&pair[1], column)?
        .ok_or_else(|| anyhow!("Column {} has no longitude", column))?;
    Ok(Position::new(latitude, longitude))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_state() -> State {
        let mut state = State::new(
            Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap(),
            DataSource::AviationEdge,
        );
        state.status = StateStatus::EnRoute;
        state.aircraft = StateAircraft {
            iata: Some("B738".to_string()),
            icao: Some("B738".to_string()),
            icao24: Some("484A5E".to_string()),
            registration: Some("PH-BXA".to_string()),
        };
        state.airline = StateAirline {
            iata: Some("KL".to_string()),
            icao: Some("KLM".to_string()),
        };
        state.flight = StateFlight {
            iata: Some("KL1001".to_string()),
            icao: "KLM1001".to_string(),
            number: Some(1001),
        };
        state.geography = StateGeography {
            position: Position::new(52.31, 4.76),
            geo_altitude: None,
            baro_altitude: Some(10668.0),
            heading: Some(271.5),
            speed_horizontal: Some(230.0),
            speed_vertical: Some(0.0),
            is_on_ground: false,
        };
        state.transponder = StateTransponder {
            squawk: Some("1000".to_string()),
            squawk_time: Some(Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 40).unwrap()),
        };
        state
    }

    #[test]
    fn test_status_from_feed_spellings() {
        assert_eq!("en-route".parse::<StateStatus>(), Ok(StateStatus::EnRoute));
        assert_eq!("enroute".parse::<StateStatus>(), Ok(StateStatus::EnRoute));
        assert_eq!("EN_ROUTE".parse::<StateStatus>(), Ok(StateStatus::EnRoute));
        assert_eq!("Landed".parse::<StateStatus>(), Ok(StateStatus::Landed));
        assert_eq!("".parse::<StateStatus>(), Ok(StateStatus::Unknown));
        assert!("crashed".parse::<StateStatus>().is_err());
    }

    #[test]
    fn test_row_layout_matches_columns() {
        let row = sample_state().to_row();
        assert_eq!(row.len(), STATE_COLUMNS.len());
        assert_eq!(row[0], json!("2025-03-14 09:26:53"));
        assert_eq!(row[1], json!("AVIATION_EDGE"));
        assert_eq!(row[2], json!("EN_ROUTE"));
        assert_eq!(row[14], json!("KLM1001"));
        assert_eq!(row[16], json!([52.31, 4.76]));
        assert_eq!(row[17], Value::Null);
    }

    #[test]
    fn test_from_row_restores_state() {
        let state = sample_state();
        let decoded = State::from_row(&state.to_row()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_from_row_strips_fixed_string_padding() {
        let mut row = sample_state().to_row();
        row[14] = json!("KLM1001\u{0}");
        row[7] = json!("\u{0}\u{0}\u{0}");
        let decoded = State::from_row(&row).unwrap();
        assert_eq!(decoded.flight.icao, "KLM1001");
        assert_eq!(decoded.airline.iata, None);
    }

    #[test]
    fn test_from_row_rejects_short_row() {
        let row = sample_state().to_row();
        assert!(State::from_row(&row[..10]).is_err());
    }

    #[test]
    fn test_validate() {
        let mut state = sample_state();
        assert!(state.validate().is_ok());

        state.geography.position = Position::new(91.0, 0.0);
        assert_eq!(state.validate(), Err(InvalidState::Latitude(91.0)));

        state.geography.position = Position::new(0.0, -180.5);
        assert_eq!(state.validate(), Err(InvalidState::Longitude(-180.5)));

        state.geography.position = Position::new(0.0, 0.0);
        state.aircraft.icao24 = Some("484A5".to_string());
        assert!(matches!(state.validate(), Err(InvalidState::Icao24(_))));
    }

    #[test]
    fn test_validate_rejects_values_wider_than_their_columns() {
        let mut state = sample_state();
        state.flight.icao = "KLM1001XYZ".to_string();
        assert_eq!(
            state.validate(),
            Err(InvalidState::TooLong {
                column: "flight__icao",
                width: 8,
                len: 10
            })
        );

        let mut state = sample_state();
        state.aircraft.registration = Some("PH-BXA-EXTRA".to_string());
        assert_eq!(
            state.validate(),
            Err(InvalidState::TooLong {
                column: "aircraft__registration",
                width: 10,
                len: 12
            })
        );

        // Exactly the column width still fits
        let mut state = sample_state();
        state.flight.icao = "KLM10012".to_string();
        state.transponder.squawk = Some("7700".to_string());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_no_data_position() {
        assert!(Position::new(0.0, 0.0).is_no_data());
        assert!(!Position::new(0.0, 12.0).is_no_data());
    }

    #[test]
    fn test_map_state_projection() {
        let map = MapState::from(&sample_state());
        assert_eq!(map.callsign, "KLM1001");
        assert_eq!(map.model.as_deref(), Some("B738"));
        assert_eq!(map.altitude, Some(10668.0));
        assert_eq!(map.velocity, Some(230.0));
    }
}
