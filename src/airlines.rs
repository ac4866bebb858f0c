//! Airline registry model
//!
//! Airlines are loaded once from the Aviation Edge airline database and kept
//! in the `airline` table; lookups match either the IATA or the ICAO code.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::registry_repo::RegistryRecord;
use crate::states::{ParseEnumError, row_opt_f64, row_opt_int, row_opt_str, row_str};
use crate::store::Row;

pub const AIRLINE_TABLE: &str = "airline";

pub const AIRLINE_COLUMNS: [(&str, &str); 11] = [
    ("iata", "Nullable(FixedString(3))"),
    ("icao", "Nullable(FixedString(3))"),
    ("name", "String"),
    ("callsign", "Nullable(String)"),
    ("founding", "Nullable(UInt16)"),
    ("fleet_age", "Nullable(Float32)"),
    ("fleet_size", "Nullable(UInt16)"),
    (
        "status",
        "Enum('ACTIVE', 'START_UP', 'RESTARTING', 'MERGED', 'RENAMED', 'HISTORICAL', 'DISABLED', 'NOT_READY', 'UNKNOWN')",
    ),
    (
        "types",
        "Array(Enum('SCHEDULED', 'CHARTER', 'CARGO', 'VIRTUAL', 'LEISURE', 'GOVERNMENT', 'PRIVATE', 'MANUFACTURER', 'SUPPLIER', 'DIVISION'))",
    ),
    ("country_iso2", "Nullable(FixedString(2))"),
    ("hub_code", "Nullable(FixedString(4))"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirlineStatus {
    Active,
    StartUp,
    Restarting,
    Merged,
    Renamed,
    Historical,
    Disabled,
    NotReady,
    #[default]
    Unknown,
}

impl AirlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirlineStatus::Active => "ACTIVE",
            AirlineStatus::StartUp => "START_UP",
            AirlineStatus::Restarting => "RESTARTING",
            AirlineStatus::Merged => "MERGED",
            AirlineStatus::Renamed => "RENAMED",
            AirlineStatus::Historical => "HISTORICAL",
            AirlineStatus::Disabled => "DISABLED",
            AirlineStatus::NotReady => "NOT_READY",
            AirlineStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for AirlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AirlineStatus {
    type Err = ParseEnumError;

    /// Accepts column names and the database's spellings ("start up", "not-ready")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match enum_key(s).as_str() {
            "ACTIVE" => Ok(AirlineStatus::Active),
            "START_UP" | "STARTUP" => Ok(AirlineStatus::StartUp),
            "RESTARTING" => Ok(AirlineStatus::Restarting),
            "MERGED" => Ok(AirlineStatus::Merged),
            "RENAMED" => Ok(AirlineStatus::Renamed),
            "HISTORICAL" => Ok(AirlineStatus::Historical),
            "DISABLED" => Ok(AirlineStatus::Disabled),
            "NOT_READY" => Ok(AirlineStatus::NotReady),
            "" | "UNKNOWN" => Ok(AirlineStatus::Unknown),
            _ => Err(ParseEnumError::new("airline status", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirlineType {
    Scheduled,
    Charter,
    Cargo,
    Virtual,
    Leisure,
    Government,
    Private,
    Manufacturer,
    Supplier,
    Division,
}

impl AirlineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirlineType::Scheduled => "SCHEDULED",
            AirlineType::Charter => "CHARTER",
            AirlineType::Cargo => "CARGO",
            AirlineType::Virtual => "VIRTUAL",
            AirlineType::Leisure => "LEISURE",
            AirlineType::Government => "GOVERNMENT",
            AirlineType::Private => "PRIVATE",
            AirlineType::Manufacturer => "MANUFACTURER",
            AirlineType::Supplier => "SUPPLIER",
            AirlineType::Division => "DIVISION",
        }
    }
}

impl FromStr for AirlineType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match enum_key(s).as_str() {
            "SCHEDULED" => Ok(AirlineType::Scheduled),
            "CHARTER" => Ok(AirlineType::Charter),
            "CARGO" => Ok(AirlineType::Cargo),
            "VIRTUAL" => Ok(AirlineType::Virtual),
            "LEISURE" => Ok(AirlineType::Leisure),
            "GOVERNMENT" => Ok(AirlineType::Government),
            "PRIVATE" => Ok(AirlineType::Private),
            "MANUFACTURER" => Ok(AirlineType::Manufacturer),
            "SUPPLIER" => Ok(AirlineType::Supplier),
            "DIVISION" => Ok(AirlineType::Division),
            _ => Err(ParseEnumError::new("airline type", s)),
        }
    }
}

/// Upper-case with spaces and dashes folded to underscores
pub(crate) fn enum_key(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airline {
    pub iata: Option<String>,
    pub icao: Option<String>,
    pub name: String,
    pub callsign: Option<String>,
    pub founding: Option<u16>,
    /// Average fleet age [years]
    pub fleet_age: Option<f64>,
    pub fleet_size: Option<u16>,
    pub status: AirlineStatus,
    pub types: Vec<AirlineType>,
    pub country_iso2: Option<String>,
    /// Main hub airport code
    pub hub_code: Option<String>,
}

impl RegistryRecord for Airline {
    const TABLE: &'static str = AIRLINE_TABLE;
    const COLUMNS: &'static [(&'static str, &'static str)] = &AIRLINE_COLUMNS;
    const ENGINE_CLAUSES: &'static [&'static str] = &[
        "ENGINE MergeTree",
        "ORDER BY tuple()",
        "SETTINGS index_granularity = 1024",
    ];

    fn to_row(&self) -> Row {
        let types: Vec<&str> = self.types.iter().map(AirlineType::as_str).collect();
        vec![
            json!(self.iata),
            json!(self.icao),
            json!(self.name),
            json!(self.callsign),
            json!(self.founding),
            json!(self.fleet_age),
            json!(self.fleet_size),
            json!(self.status.as_str()),
            json!(types),
            json!(self.country_iso2),
            json!(self.hub_code),
        ]
    }

    fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() != AIRLINE_COLUMNS.len() {
            return Err(anyhow!(
                "Airline row has {} columns, expected {}",
                row.len(),
                AIRLINE_COLUMNS.len()
            ));
        }
        let types = row[8]
            .as_array()
            .ok_or_else(|| anyhow!("Column types is not an array: {}", row[8]))?
            .iter()
            .map(|t| row_str(t, "types")?.parse().map_err(anyhow::Error::from))
            .collect::<Result<Vec<AirlineType>>>()?;

        Ok(Self {
            iata: row_opt_str(&row[0], "iata")?,
            icao: row_opt_str(&row[1], "icao")?,
            name: row_str(&row[2], "name")?,
            callsign: row_opt_str(&row[3], "callsign")?,
            founding: row_opt_int(&row[4], "founding")?,
            fleet_age: row_opt_f64(&row[5], "fleet_age")?,
            fleet_size: row_opt_int(&row[6], "fleet_size")?,
            status: row_str(&row[7], "status")?.parse()?,
            types,
            country_iso2: row_opt_str(&row[9], "country_iso2")?,
            hub_code: row_opt_str(&row[10], "hub_code")?,
        })
    }
}
