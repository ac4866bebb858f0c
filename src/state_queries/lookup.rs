use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use super::{QueryError, TableQuery};
use crate::aircraft::{Aircraft, compact_registration};
use crate::airlines::Airline;
use crate::airports::Airport;
use crate::registry_repo::RegistryRecord;
use crate::store::{StoreGateway, fixed_string_width};

static AIRLINE_IATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{2,3}$").expect("valid airline IATA regex"));

static AIRLINE_ICAO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid airline ICAO regex"));

static AIRPORT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{3,4}$").expect("valid airport code regex"));

static REGISTRATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{0,9}$").expect("valid registration regex"));

/// An exact key identifying at most one record of a registry table
pub trait RecordKey<T>: fmt::Display + Send + Sync {
    /// Whether a cached record carries this key
    fn matches(&self, record: &T) -> bool;

    /// SQL condition selecting the same records in the store
    fn predicate(&self, columns: &[(&str, &str)]) -> String;
}

/// `column = 'value'`, padding the literal for FixedString columns
fn column_equals(columns: &[(&str, &str)], column: &str, value: &str) -> String {
    let width = columns
        .iter()
        .find(|(name, _)| *name == column)
        .and_then(|(_, column_type)| fixed_string_width(column_type));
    match width {
        Some(width) => format!("{} = toFixedString('{}', {})", column, value, width),
        None => format!("{} = '{}'", column, value),
    }
}

fn normalize_code(code: Option<&str>) -> Option<String> {
    code.map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
}

/// Airline by IATA code, ICAO code, or either
#[derive(Debug, Clone, PartialEq)]
pub struct AirlineKey {
    iata: Option<String>,
    icao: Option<String>,
}

impl AirlineKey {
    pub fn new(iata: Option<&str>, icao: Option<&str>) -> Result<Self, QueryError> {
        let iata = normalize_code(iata);
        let icao = normalize_code(icao);
        if iata.is_none() && icao.is_none() {
            return Err(QueryError::validation("An airline IATA or ICAO code is required"));
        }
        if let Some(code) = iata.as_deref().filter(|c| !AIRLINE_IATA_RE.is_match(c)) {
            return Err(QueryError::validation(format!(
                "Malformed airline IATA code: {:?}",
                code
            )));
        }
        if let Some(code) = icao.as_deref().filter(|c| !AIRLINE_ICAO_RE.is_match(c)) {
            return Err(QueryError::validation(format!(
                "Malformed airline ICAO code: {:?}",
                code
            )));
        }
        Ok(Self { iata, icao })
    }
}

impl fmt::Display for AirlineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.iata, &self.icao) {
            (Some(iata), Some(icao)) => write!(f, "airline {} / {}", iata, icao),
            (Some(code), None) | (None, Some(code)) => write!(f, "airline {}", code),
            (None, None) => write!(f, "airline"),
        }
    }
}

fn same_code(stored: &Option<String>, wanted: &Option<String>) -> bool {
    match (stored, wanted) {
        (Some(stored), Some(wanted)) => stored.eq_ignore_ascii_case(wanted),
        _ => false,
    }
}

impl RecordKey<Airline> for AirlineKey {
    fn matches(&self, airline: &Airline) -> bool {
        same_code(&airline.iata, &self.iata) || same_code(&airline.icao, &self.icao)
    }

    fn predicate(&self, columns: &[(&str, &str)]) -> String {
        let conditions: Vec<String> = [("iata", &self.iata), ("icao", &self.icao)]
            .into_iter()
            .filter_map(|(column, code)| {
                code.as_deref()
                    .map(|code| column_equals(columns, column, code))
            })
            .collect();
        conditions.join(" OR ")
    }
}

/// Airport by its 3-character IATA or 4-character ICAO code
#[derive(Debug, Clone, PartialEq)]
pub struct AirportKey {
    code: String,
}

impl AirportKey {
    pub fn new(code: &str) -> Result<Self, QueryError> {
        let code = code.trim().to_ascii_uppercase();
        if !AIRPORT_CODE_RE.is_match(&code) {
            return Err(QueryError::validation(format!(
                "Airport code must be 3 (IATA) or 4 (ICAO) characters: {:?}",
                code
            )));
        }
        Ok(Self { code })
    }

    fn is_iata(&self) -> bool {
        self.code.len() == 3
    }
}

impl fmt::Display for AirportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "airport {}", self.code)
    }
}

impl RecordKey<Airport> for AirportKey {
    fn matches(&self, airport: &Airport) -> bool {
        if self.is_iata() {
            airport.iata.eq_ignore_ascii_case(&self.code)
        } else {
            same_code(&airport.icao, &Some(self.code.clone()))
        }
    }

    fn predicate(&self, columns: &[(&str, &str)]) -> String {
        let column = if self.is_iata() { "iata" } else { "icao" };
        column_equals(columns, column, &self.code)
    }
}

/// Aircraft by registration, ignoring case and dashes
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationKey {
    registration: String,
    compact: String,
}

impl RegistrationKey {
    pub fn new(registration: &str) -> Result<Self, QueryError> {
        let registration = registration.trim().to_ascii_uppercase();
        if !REGISTRATION_RE.is_match(&registration) {
            return Err(QueryError::validation(format!(
                "Malformed registration: {:?}",
                registration
            )));
        }
        let compact = compact_registration(&registration);
        Ok(Self {
            registration,
            compact,
        })
    }
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aircraft {}", self.registration)
    }
}

impl RecordKey<Aircraft> for RegistrationKey {
    fn matches(&self, aircraft: &Aircraft) -> bool {
        compact_registration(&aircraft.identity.registration) == self.compact
    }

    fn predicate(&self, _columns: &[(&str, &str)]) -> String {
        format!(
            "replaceAll(replaceAll(upper(toString(identity__registration)), '-', ''), '\\0', '') = '{}'",
            self.compact
        )
    }
}

/// First record of a registry table carrying `key`
pub struct KeyLookupQuery<K> {
    key: K,
}

impl<K> KeyLookupQuery<K> {
    pub fn new(key: K) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

#[async_trait]
impl<T, K> TableQuery<T> for KeyLookupQuery<K>
where
    T: RegistryRecord,
    K: RecordKey<T>,
{
    fn name(&self) -> &'static str {
        "lookup"
    }

    fn allows_cache(&self) -> bool {
        true
    }

    fn from_cache(&self, snapshot: Vec<T>) -> Result<Vec<T>, QueryError> {
        Ok(snapshot
            .into_iter()
            .find(|record| self.key.matches(record))
            .into_iter()
            .collect())
    }

    async fn from_server(
        &self,
        table: &str,
        store: &dyn StoreGateway,
    ) -> Result<Vec<T>, QueryError> {
        let columns: Vec<&str> = T::COLUMNS.iter().map(|(name, _)| *name).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            columns.join(", "),
            table,
            self.key.predicate(T::COLUMNS)
        );
        debug!("Looking up {}: {}", self.key, sql);
        let rows = store.query(&sql).await?;
        rows.iter()
            .map(|row| <Self as TableQuery<T>>::decode_row(self, row))
            .collect()
    }

    fn decode_row(&self, row: &[Value]) -> Result<T, QueryError> {
        T::from_row(row).map_err(QueryError::Upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airlines::AIRLINE_COLUMNS;
    use crate::airports::AIRPORT_COLUMNS;

    fn airline(iata: &str, icao: &str) -> Airline {
        Airline {
            iata: Some(iata.to_string()),
            icao: Some(icao.to_string()),
            name: icao.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_airline_key_matches_either_code() {
        let klm = airline("KL", "KLM");
        assert!(AirlineKey::new(Some("kl"), None).unwrap().matches(&klm));
        assert!(AirlineKey::new(None, Some(" klm ")).unwrap().matches(&klm));
        assert!(
            AirlineKey::new(Some("XX"), Some("KLM"))
                .unwrap()
                .matches(&klm)
        );
        assert!(!AirlineKey::new(Some("LH"), None).unwrap().matches(&klm));
    }

    #[test]
    fn test_airline_key_validation() {
        assert!(matches!(
            AirlineKey::new(None, Some("  ")),
            Err(QueryError::Validation(_))
        ));
        assert!(AirlineKey::new(Some("K'L"), None).is_err());
        assert!(AirlineKey::new(None, Some("KLM1")).is_err());
    }

    #[test]
    fn test_airline_predicate_pads_codes() {
        let key = AirlineKey::new(Some("KL"), Some("KLM")).unwrap();
        assert_eq!(
            key.predicate(&AIRLINE_COLUMNS),
            "iata = toFixedString('KL', 3) OR icao = toFixedString('KLM', 3)"
        );
    }

    #[test]
    fn test_airport_key_picks_column_by_length() {
        let iata = AirportKey::new("ams").unwrap();
        assert_eq!(
            iata.predicate(&AIRPORT_COLUMNS),
            "iata = toFixedString('AMS', 3)"
        );
        let icao = AirportKey::new("EHAM").unwrap();
        assert_eq!(
            icao.predicate(&AIRPORT_COLUMNS),
            "icao = toFixedString('EHAM', 4)"
        );
        assert!(AirportKey::new("EH").is_err());
        assert!(AirportKey::new("EHAMX").is_err());
    }

    #[test]
    fn test_registration_key_ignores_dashes_and_case() {
        let key = RegistrationKey::new("ph-bxa").unwrap();
        assert!(key.matches(&Aircraft::new("PH-BXA")));
        assert!(key.matches(&Aircraft::new("PHBXA")));
        assert!(!key.matches(&Aircraft::new("PH-BXB")));
        assert!(key.predicate(&[]).ends_with("= 'PHBXA'"));
        assert!(RegistrationKey::new("PH'BXA").is_err());
        assert!(RegistrationKey::new("").is_err());
    }

    #[test]
    fn test_cache_path_returns_first_match_only() {
        let query = KeyLookupQuery::new(AirlineKey::new(Some("KL"), None).unwrap());
        let found = TableQuery::<Airline>::from_cache(
            &query,
            vec![airline("LH", "DLH"), airline("KL", "KLM"), airline("KL", "KLC")],
        )
        .unwrap();
        assert_eq!(found, vec![airline("KL", "KLM")]);
    }
}
