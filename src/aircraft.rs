//! Aircraft registry model
//!
//! One entry per registered airframe, loaded from the Aviation Edge airplane
//! database. Registrations are compared ignoring case and dashes, so
//! "PH-BXA", "ph-bxa" and "PHBXA" name the same aircraft.

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::airlines::enum_key;
use crate::registry_repo::RegistryRecord;
use crate::states::{ParseEnumError, row_opt_date, row_opt_int, row_opt_str, row_str};
use crate::store::Row;

pub const AIRCRAFT_TABLE: &str = "aircraft";

pub const AIRCRAFT_COLUMNS: [(&str, &str); 22] = [
    ("identity__icao24", "Nullable(FixedString(6))"),
    ("identity__registration", "FixedString(10)"),
    ("identity__test_registration", "Nullable(String)"),
    ("identity__owner", "Nullable(String)"),
    ("identity__airline_iata", "Nullable(FixedString(3))"),
    ("identity__airline_icao", "Nullable(FixedString(3))"),
    ("model__type_iata", "Nullable(String)"),
    ("model__code_short", "Nullable(FixedString(3))"),
    ("model__code_long", "Nullable(FixedString(4))"),
    ("model__engine_count", "Nullable(UInt8)"),
    (
        "model__engine_type",
        "Enum('JET', 'TURBOFAN', 'TURBOPROP', 'PISTON', 'UNKNOWN')",
    ),
    ("model__model_code", "Nullable(String)"),
    ("model__line_number", "Nullable(String)"),
    ("model__serial_number", "Nullable(String)"),
    ("model__series", "Nullable(String)"),
    ("model__classification", "Nullable(String)"),
    ("lifecycle__date_rollout", "Nullable(Date)"),
    ("lifecycle__date_first_flight", "Nullable(Date)"),
    ("lifecycle__date_delivery", "Nullable(Date)"),
    ("lifecycle__date_registration", "Nullable(Date)"),
    ("lifecycle__age", "Nullable(Int16)"),
    ("status", "Enum('ACTIVE', 'INACTIVE', 'UNKNOWN')"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineType {
    Jet,
    Turbofan,
    Turboprop,
    Piston,
    #[default]
    Unknown,
}

impl EngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Jet => "JET",
            EngineType::Turbofan => "TURBOFAN",
            EngineType::Turboprop => "TURBOPROP",
            EngineType::Piston => "PISTON",
            EngineType::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for EngineType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match enum_key(s).as_str() {
            "JET" => Ok(EngineType::Jet),
            "TURBOFAN" => Ok(EngineType::Turbofan),
            "TURBOPROP" => Ok(EngineType::Turboprop),
            "PISTON" => Ok(EngineType::Piston),
            "" | "UNKNOWN" => Ok(EngineType::Unknown),
            _ => Err(ParseEnumError::new("engine type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AircraftStatus {
    Active,
    Inactive,
    #[default]
    Unknown,
}

impl AircraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AircraftStatus::Active => "ACTIVE",
            AircraftStatus::Inactive => "INACTIVE",
            AircraftStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for AircraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AircraftStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match enum_key(s).as_str() {
            "ACTIVE" => Ok(AircraftStatus::Active),
            "INACTIVE" => Ok(AircraftStatus::Inactive),
            "" | "UNKNOWN" => Ok(AircraftStatus::Unknown),
            _ => Err(ParseEnumError::new("aircraft status", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftIdentity {
    pub icao24: Option<String>,
    pub registration: String,
    pub test_registration: Option<String>,
    pub owner: Option<String>,
    pub airline_iata: Option<String>,
    pub airline_icao: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftModel {
    /// Full IATA type designation, e.g. "B737-800"
    pub type_iata: Option<String>,
    pub code_short: Option<String>,
    pub code_long: Option<String>,
    pub engine_count: Option<u8>,
    pub engine_type: EngineType,
    pub model_code: Option<String>,
    pub line_number: Option<String>,
    pub serial_number: Option<String>,
    pub series: Option<String>,
    pub classification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftLifecycle {
    pub date_rollout: Option<NaiveDate>,
    pub date_first_flight: Option<NaiveDate>,
    pub date_delivery: Option<NaiveDate>,
    pub date_registration: Option<NaiveDate>,
    /// Age in years
    pub age: Option<i16>,
}

/// One registered airframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    pub identity: AircraftIdentity,
    pub model: AircraftModel,
    pub lifecycle: AircraftLifecycle,
    pub status: AircraftStatus,
}

impl Aircraft {
    /// Empty entry for `registration`, filled in by the caller
    pub fn new(registration: impl Into<String>) -> Self {
        Self {
            identity: AircraftIdentity {
                registration: registration.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Registration folded for comparison: upper case, no dashes
pub fn compact_registration(registration: &str) -> String {
    registration
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn format_date(date: &Option<NaiveDate>) -> Value {
    json!(date.map(|d| d.format("%Y-%m-%d").to_string()))
}

impl RegistryRecord for Aircraft {
    const TABLE: &'static str = AIRCRAFT_TABLE;
    const COLUMNS: &'static [(&'static str, &'static str)] = &AIRCRAFT_COLUMNS;
    const ENGINE_CLAUSES: &'static [&'static str] = &[
        "ENGINE MergeTree",
        "ORDER BY (identity__registration)",
        "SETTINGS index_granularity = 1024",
    ];

    fn to_row(&self) -> Row {
        let identity = &self.identity;
        let model = &self.model;
        let lifecycle = &self.lifecycle;
        vec![
            json!(identity.icao24),
            json!(identity.registration),
            json!(identity.test_registration),
            json!(identity.owner),
            json!(identity.airline_iata),
            json!(identity.airline_icao),
            json!(model.type_iata),
            json!(model.code_short),
            json!(model.code_long),
            json!(model.engine_count),
            json!(model.engine_type.as_str()),
            json!(model.model_code),
            json!(model.line_number),
            json!(model.serial_number),
            json!(model.series),
            json!(model.classification),
            format_date(&lifecycle.date_rollout),
            format_date(&lifecycle.date_first_flight),
            format_date(&lifecycle.date_delivery),
            format_date(&lifecycle.date_registration),
            json!(lifecycle.age),
            json!(self.status.as_str()),
        ]
    }

    fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() != AIRCRAFT_COLUMNS.len() {
            return Err(anyhow!(
                "Aircraft row has {} columns, expected {}",
                row.len(),
                AIRCRAFT_COLUMNS.len()
            ));
        }
        Ok(Self {
            identity: AircraftIdentity {
                icao24: row_opt_str(&row[0], "identity__icao24")?,
                registration: row_str(&row[1], "identity__registration")?,
                test_registration: row_opt_str(&row[2], "identity__test_registration")?,
                owner: row_opt_str(&row[3], "identity__owner")?,
                airline_iata: row_opt_str(&row[4], "identity__airline_iata")?,
                airline_icao: row_opt_str(&row[5], "identity__airline_icao")?,
            },
            model: AircraftModel {
                type_iata: row_opt_str(&row[6], "model__type_iata")?,
                code_short: row_opt_str(&row[7], "model__code_short")?,
                code_long: row_opt_str(&row[8], "model__code_long")?,
                engine_count: row_opt_int(&row[9], "model__engine_count")?,
                engine_type: row_str(&row[10], "model__engine_type")?.parse()?,
                model_code: row_opt_str(&row[11], "model__model_code")?,
                line_number: row_opt_str(&row[12], "model__line_number")?,
                serial_number: row_opt_str(&row[13], "model__serial_number")?,
                series: row_opt_str(&row[14], "model__series")?,
                classification: row_opt_str(&row[15], "model__classification")?,
            },
            lifecycle: AircraftLifecycle {
                date_rollout: row_opt_date(&row[16], "lifecycle__date_rollout")?,
                date_first_flight: row_opt_date(&row[17], "lifecycle__date_first_flight")?,
                date_delivery: row_opt_date(&row[18], "lifecycle__date_delivery")?,
                date_registration: row_opt_date(&row[19], "lifecycle__date_registration")?,
                age: row_opt_int(&row[20], "lifecycle__age")?,
            },
            status: row_str(&row[21], "status")?.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ph_bxa() -> Aircraft {
        let mut aircraft = Aircraft::new("PH-BXA");
        aircraft.identity.icao24 = Some("484A5E".to_string());
        aircraft.identity.airline_iata = Some("KL".to_string());
        aircraft.model.code_long = Some("B738".to_string());
        aircraft.model.engine_count = Some(2);
        aircraft.model.engine_type = EngineType::Jet;
        aircraft.lifecycle.date_delivery = NaiveDate::from_ymd_opt(1999, 1, 26);
        aircraft.lifecycle.age = Some(26);
        aircraft.status = AircraftStatus::Active;
        aircraft
    }

    #[test]
    fn test_row_round_trip() {
        let aircraft = ph_bxa();
        let row = aircraft.to_row();
        assert_eq!(row.len(), AIRCRAFT_COLUMNS.len());
        assert_eq!(row[18], json!("1999-01-26"));
        assert_eq!(Aircraft::from_row(&row).unwrap(), aircraft);
    }

    #[test]
    fn test_compact_registration() {
        assert_eq!(compact_registration(" ph-bxa "), "PHBXA");
        assert_eq!(compact_registration("N12345"), "N12345");
    }
}
