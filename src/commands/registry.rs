use anyhow::Result;
use tracing::info;

use skytrack::config::Settings;
use skytrack::state_search::{AircraftField, SearchCriterion};

use super::{http_client, open_registry, print_json};

pub async fn handle_airline(
    settings: &Settings,
    iata: Option<&str>,
    icao: Option<&str>,
) -> Result<()> {
    let registry = open_registry(settings, http_client()?);
    let airline = registry.get_airline(iata, icao).await?;
    print_json(&airline)
}

pub async fn handle_airport(settings: &Settings, code: &str) -> Result<()> {
    let registry = open_registry(settings, http_client()?);
    let airport = registry.get_airport(code).await?;
    print_json(&airport)
}

pub async fn handle_aircraft(settings: &Settings, registration: &str) -> Result<()> {
    let registry = open_registry(settings, http_client()?);
    let aircraft = registry.get_aircraft(registration).await?;
    print_json(&aircraft)
}

pub async fn handle_aircraft_search(
    settings: &Settings,
    criteria: &[SearchCriterion<AircraftField>],
    limit: i64,
) -> Result<()> {
    let registry = open_registry(settings, http_client()?);
    let aircraft = registry.search_aircraft(criteria, limit).await?;
    info!("Aircraft search matched {} records", aircraft.len());
    print_json(&aircraft)
}
