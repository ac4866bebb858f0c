//! Field search over a batch of states or registry records
//!
//! Searchable fields are listed in [`StateField`] and [`AircraftField`] and
//! addressed by dot paths such as `flight.icao` or `identity.owner`. Text
//! values are compared case-insensitively and `_` in a pattern matches any
//! single character.

use std::fmt;
use std::str::FromStr;

use crate::aircraft::Aircraft;
use crate::states::State;

/// A field that `field=pattern` criteria can address on one kind of record
pub trait SearchField: Copy + PartialEq + fmt::Debug + FromStr<Err = String> {
    type Record;

    /// Value of this field on `record`
    fn value<'a>(&self, record: &'a Self::Record) -> FieldValue<'a>;
}

/// A searchable state field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    DataSource,
    Status,
    AircraftIata,
    AircraftIcao,
    AircraftIcao24,
    AircraftRegistration,
    AirlineIata,
    AirlineIcao,
    ArrivalIata,
    ArrivalIcao,
    DepartureIata,
    DepartureIcao,
    FlightIata,
    FlightIcao,
    IsOnGround,
    Squawk,
}

/// Dot path of every field, in the same order as the variants
const FIELD_PATHS: [(&str, StateField); 16] = [
    ("data_source", StateField::DataSource),
    ("status", StateField::Status),
    ("aircraft.iata", StateField::AircraftIata),
    ("aircraft.icao", StateField::AircraftIcao),
    ("aircraft.icao24", StateField::AircraftIcao24),
    ("aircraft.registration", StateField::AircraftRegistration),
    ("airline.iata", StateField::AirlineIata),
    ("airline.icao", StateField::AirlineIcao),
    ("airport.arrival_iata", StateField::ArrivalIata),
    ("airport.arrival_icao", StateField::ArrivalIcao),
    ("airport.departure_iata", StateField::DepartureIata),
    ("airport.departure_icao", StateField::DepartureIcao),
    ("flight.iata", StateField::FlightIata),
    ("flight.icao", StateField::FlightIcao),
    ("geography.is_on_ground", StateField::IsOnGround),
    ("transponder.squawk", StateField::Squawk),
];

/// Value of a field on one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(Option<&'a str>),
    Flag(bool),
}

fn path_of<F: PartialEq>(paths: &[(&'static str, F)], field: &F) -> &'static str {
    paths
        .iter()
        .find(|(_, candidate)| candidate == field)
        .map(|(path, _)| *path)
        .unwrap_or("")
}

fn field_at<F: Copy>(paths: &[(&str, F)], s: &str) -> Result<F, String> {
    let path = s.trim().to_ascii_lowercase();
    paths
        .iter()
        .find(|(candidate, _)| *candidate == path)
        .map(|(_, field)| *field)
        .ok_or_else(|| format!("Unknown search field: {:?}", s))
}

impl StateField {
    pub fn path(&self) -> &'static str {
        path_of(&FIELD_PATHS, self)
    }
}

impl SearchField for StateField {
    type Record = State;

    fn value<'a>(&self, state: &'a State) -> FieldValue<'a> {
        use FieldValue::{Flag, Text};
        match self {
            StateField::DataSource => Text(Some(state.data_source.as_str())),
            StateField::Status => Text(Some(state.status.as_str())),
            StateField::AircraftIata => Text(state.aircraft.iata.as_deref()),
            StateField::AircraftIcao => Text(state.aircraft.icao.as_deref()),
            StateField::AircraftIcao24 => Text(state.aircraft.icao24.as_deref()),
            StateField::AircraftRegistration => Text(state.aircraft.registration.as_deref()),
            StateField::AirlineIata => Text(state.airline.iata.as_deref()),
            StateField::AirlineIcao => Text(state.airline.icao.as_deref()),
            StateField::ArrivalIata => Text(state.airport.arrival_iata.as_deref()),
            StateField::ArrivalIcao => Text(state.airport.arrival_icao.as_deref()),
            StateField::DepartureIata => Text(state.airport.departure_iata.as_deref()),
            StateField::DepartureIcao => Text(state.airport.departure_icao.as_deref()),
            StateField::FlightIata => Text(state.flight.iata.as_deref()),
            StateField::FlightIcao => Text(Some(state.flight.icao.as_str())),
            StateField::IsOnGround => Flag(state.geography.is_on_ground),
            StateField::Squawk => Text(state.transponder.squawk.as_deref()),
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl FromStr for StateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        field_at(&FIELD_PATHS, s)
    }
}

/// A searchable field of a registry aircraft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AircraftField {
    Icao24,
    Registration,
    Owner,
    AirlineIata,
    AirlineIcao,
    TypeIata,
    CodeShort,
    CodeLong,
    EngineType,
    ModelCode,
    Series,
    Classification,
    Status,
}

const AIRCRAFT_FIELD_PATHS: [(&str, AircraftField); 13] = [
    ("identity.icao24", AircraftField::Icao24),
    ("identity.registration", AircraftField::Registration),
    ("identity.owner", AircraftField::Owner),
    ("identity.airline_iata", AircraftField::AirlineIata),
    ("identity.airline_icao", AircraftField::AirlineIcao),
    ("model.type_iata", AircraftField::TypeIata),
    ("model.code_short", AircraftField::CodeShort),
    ("model.code_long", AircraftField::CodeLong),
    ("model.engine_type", AircraftField::EngineType),
    ("model.model_code", AircraftField::ModelCode),
    ("model.series", AircraftField::Series),
    ("model.classification", AircraftField::Classification),
    ("status", AircraftField::Status),
];

impl AircraftField {
    pub fn path(&self) -> &'static str {
        path_of(&AIRCRAFT_FIELD_PATHS, self)
    }
}

impl SearchField for AircraftField {
    type Record = Aircraft;

    fn value<'a>(&self, aircraft: &'a Aircraft) -> FieldValue<'a> {
        let identity = &aircraft.identity;
        let model = &aircraft.model;
        FieldValue::Text(match self {
            AircraftField::Icao24 => identity.icao24.as_deref(),
            AircraftField::Registration => Some(identity.registration.as_str()),
            AircraftField::Owner => identity.owner.as_deref(),
            AircraftField::AirlineIata => identity.airline_iata.as_deref(),
            AircraftField::AirlineIcao => identity.airline_icao.as_deref(),
            AircraftField::TypeIata => model.type_iata.as_deref(),
            AircraftField::CodeShort => model.code_short.as_deref(),
            AircraftField::CodeLong => model.code_long.as_deref(),
            AircraftField::EngineType => Some(model.engine_type.as_str()),
            AircraftField::ModelCode => model.model_code.as_deref(),
            AircraftField::Series => model.series.as_deref(),
            AircraftField::Classification => model.classification.as_deref(),
            AircraftField::Status => Some(aircraft.status.as_str()),
        })
    }
}

impl fmt::Display for AircraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl FromStr for AircraftField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        field_at(&AIRCRAFT_FIELD_PATHS, s)
    }
}

/// One `field=pattern` condition
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriterion<F = StateField> {
    pub field: F,
    pub pattern: String,
}

impl<F: SearchField> SearchCriterion<F> {
    pub fn new(field: F, pattern: impl Into<String>) -> Self {
        Self {
            field,
            pattern: pattern.into(),
        }
    }

    pub fn matches(&self, record: &F::Record) -> bool {
        match self.field.value(record) {
            FieldValue::Text(Some(value)) => wildcard_match(&self.pattern, value),
            FieldValue::Text(None) => false,
            FieldValue::Flag(value) => match self.pattern.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => value,
                "false" | "0" | "no" => !value,
                _ => false,
            },
        }
    }
}

impl<F: SearchField> FromStr for SearchCriterion<F> {
    type Err = String;

    /// Parse `path=pattern`, e.g. `flight.icao=KLM_001`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, pattern) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected field=value, got {:?}", s))?;
        if pattern.is_empty() {
            return Err(format!("Empty search value for {}", path));
        }
        Ok(SearchCriterion::new(path.parse()?, pattern))
    }
}

/// Case-insensitive match where `_` stands for exactly one character
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let mut pattern_chars = pattern.chars();
    let mut value_chars = value.chars();
    loop {
        match (pattern_chars.next(), value_chars.next()) {
            (None, None) => return true,
            (Some('_'), Some(_)) => {}
            (Some(p), Some(v)) if p.eq_ignore_ascii_case(&v) => {}
            _ => return false,
        }
    }
}

/// Records matching every criterion, in input order, at most `limit` (0 = all)
pub fn search_records<F: SearchField>(
    records: Vec<F::Record>,
    criteria: &[SearchCriterion<F>],
    limit: usize,
) -> Vec<F::Record> {
    let matching = records
        .into_iter()
        .filter(|record| criteria.iter().all(|criterion| criterion.matches(record)));
    if limit > 0 {
        matching.take(limit).collect()
    } else {
        matching.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{DataSource, StateStatus};
    use chrono::Utc;

    fn state(callsign: &str, status: StateStatus, on_ground: bool) -> State {
        let mut state = State::new(Utc::now(), DataSource::AviationEdge);
        state.flight.icao = callsign.to_string();
        state.status = status;
        state.geography.is_on_ground = on_ground;
        state.airport.arrival_iata = Some("AMS".to_string());
        state
    }

    fn batch() -> Vec<State> {
        vec![
            state("KLM1001", StateStatus::EnRoute, false),
            state("KLM1002", StateStatus::Landed, true),
            state("DLH400", StateStatus::EnRoute, false),
        ]
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("KLM100_", "KLM1001"));
        assert!(wildcard_match("klm1001", "KLM1001"));
        assert!(!wildcard_match("KLM100", "KLM1001"));
        assert!(!wildcard_match("KLM1001_", "KLM1001"));
        assert!(wildcard_match("___", "AMS"));
    }

    #[test]
    fn test_every_path_round_trips() {
        for (path, field) in FIELD_PATHS {
            assert_eq!(path.parse::<StateField>(), Ok(field));
            assert_eq!(field.path(), path);
        }
        assert!("geography.altitude".parse::<StateField>().is_err());
    }

    #[test]
    fn test_search_by_callsign_pattern() {
        let criteria = vec!["flight.icao=klm100_".parse::<SearchCriterion>().unwrap()];
        let result = search_records(batch(), &criteria, 0);
        let callsigns: Vec<&str> = result.iter().map(|s| s.flight.icao.as_str()).collect();
        assert_eq!(callsigns, vec!["KLM1001", "KLM1002"]);
    }

    #[test]
    fn test_search_combines_criteria() {
        let criteria = vec![
            SearchCriterion::new(StateField::Status, "en_route"),
            SearchCriterion::new(StateField::IsOnGround, "false"),
            SearchCriterion::new(StateField::ArrivalIata, "ams"),
        ];
        let result = search_records(batch(), &criteria, 0);
        assert_eq!(result.len(), 2);

        let limited = search_records(batch(), &criteria, 1);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].flight.icao, "KLM1001");
    }

    #[test]
    fn test_missing_value_never_matches() {
        let criteria = vec![SearchCriterion::new(StateField::Squawk, "____")];
        assert!(search_records(batch(), &criteria, 0).is_empty());
    }

    #[test]
    fn test_aircraft_criteria() {
        let mut a320 = Aircraft::new("PH-BXA");
        a320.identity.owner = Some("KLM Royal Dutch Airlines".to_string());
        a320.model.code_long = Some("B738".to_string());
        let mut e190 = Aircraft::new("PH-EZA");
        e190.model.code_long = Some("E190".to_string());

        let criteria = vec![
            "model.code_long=b7__"
                .parse::<SearchCriterion<AircraftField>>()
                .unwrap(),
            SearchCriterion::new(AircraftField::Status, "unknown"),
        ];
        let result = search_records(vec![a320, e190], &criteria, 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].identity.registration, "PH-BXA");

        for (path, field) in AIRCRAFT_FIELD_PATHS {
            assert_eq!(path.parse::<AircraftField>(), Ok(field));
            assert_eq!(field.path(), path);
        }
        assert!("flight.icao".parse::<AircraftField>().is_err());
    }

    #[test]
    fn test_criterion_parse_errors() {
        assert!("flight.icao".parse::<SearchCriterion>().is_err());
        assert!("flight.icao=".parse::<SearchCriterion>().is_err());
        assert!("nope=1".parse::<SearchCriterion>().is_err());
    }
}
