//! Airport registry model

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::registry_repo::RegistryRecord;
use crate::states::{Position, row_opt_int, row_opt_str, row_position, row_str};
use crate::store::Row;

pub const AIRPORT_TABLE: &str = "airport";

pub const AIRPORT_COLUMNS: [(&str, &str); 11] = [
    ("iata", "FixedString(3)"),
    ("icao", "Nullable(FixedString(4))"),
    ("name", "String"),
    ("position", "Point"),
    ("geoname_id", "Nullable(UInt32)"),
    ("phone", "Nullable(String)"),
    ("timezone", "Nullable(String)"),
    ("gmt", "Nullable(String)"),
    ("city_iata", "Nullable(FixedString(3))"),
    ("country_iso2", "Nullable(FixedString(2))"),
    ("country_name", "Nullable(String)"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub iata: String,
    pub icao: Option<String>,
    pub name: String,
    pub position: Position,
    pub geoname_id: Option<u32>,
    pub phone: Option<String>,
    /// IANA zone name, e.g. "Europe/Amsterdam"
    pub timezone: Option<String>,
    /// UTC offset in hours as published, e.g. "1" or "-3.5"
    pub gmt: Option<String>,
    pub city_iata: Option<String>,
    pub country_iso2: Option<String>,
    pub country_name: Option<String>,
}

impl RegistryRecord for Airport {
    const TABLE: &'static str = AIRPORT_TABLE;
    const COLUMNS: &'static [(&'static str, &'static str)] = &AIRPORT_COLUMNS;
    const ENGINE_CLAUSES: &'static [&'static str] = &[
        "ENGINE MergeTree",
        "ORDER BY (iata)",
        "SETTINGS index_granularity = 1024",
    ];

    fn to_row(&self) -> Row {
        vec![
            json!(self.iata),
            json!(self.icao),
            json!(self.name),
            json!([self.position.latitude, self.position.longitude]),
            json!(self.geoname_id),
            json!(self.phone),
            json!(self.timezone),
            json!(self.gmt),
            json!(self.city_iata),
            json!(self.country_iso2),
            json!(self.country_name),
        ]
    }

    fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() != AIRPORT_COLUMNS.len() {
            return Err(anyhow!(
                "Airport row has {} columns, expected {}",
                row.len(),
                AIRPORT_COLUMNS.len()
            ));
        }
        Ok(Self {
            iata: row_str(&row[0], "iata")?,
            icao: row_opt_str(&row[1], "icao")?,
            name: row_str(&row[2], "name")?,
            position: row_position(&row[3], "position")?,
            geoname_id: row_opt_int(&row[4], "geoname_id")?,
            phone: row_opt_str(&row[5], "phone")?,
            timezone: row_opt_str(&row[6], "timezone")?,
            gmt: row_opt_str(&row[7], "gmt")?,
            city_iata: row_opt_str(&row[8], "city_iata")?,
            country_iso2: row_opt_str(&row[9], "country_iso2")?,
            country_name: row_opt_str(&row[10], "country_name")?,
        })
    }
}
