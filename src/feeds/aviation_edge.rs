use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FeedError, RegistrySource, RequestThrottle, StateFeed, check_status, keep_valid};
use crate::aircraft::{Aircraft, AircraftStatus, EngineType};
use crate::airlines::{Airline, AirlineStatus, AirlineType};
use crate::airports::Airport;
use crate::config::AviationEdgeSettings;
use crate::states::{DataSource, Position, State, StateStatus};

const FEED_NAME: &str = "aviation_edge";

/// Aviation Edge reports speeds in km/h
const KMH_TO_MS: f64 = 1.0 / 3.6;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TrackedAircraft {
    iata_code: Option<String>,
    icao_code: Option<String>,
    icao24: Option<String>,
    reg_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TrackedCodes {
    iata_code: Option<String>,
    icao_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TrackedFlight {
    iata_number: Option<String>,
    icao_number: Option<String>,
    number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackedGeography {
    altitude: Option<f64>,
    direction: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TrackedSpeed {
    horizontal: Option<f64>,
    /// 0/1 or a boolean depending on the endpoint version
    is_ground: Value,
    vspeed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackedSystem {
    squawk: Option<String>,
    updated: Option<i64>,
}

/// One entry of the `/flights` tracking endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackedState {
    aircraft: TrackedAircraft,
    airline: TrackedCodes,
    arrival: TrackedCodes,
    departure: TrackedCodes,
    flight: TrackedFlight,
    geography: TrackedGeography,
    speed: TrackedSpeed,
    status: Option<String>,
    system: TrackedSystem,
}

/// One entry of the `/airlineDatabase` endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AirlineEntry {
    name_airline: Value,
    code_iata_airline: Value,
    code_icao_airline: Value,
    callsign: Value,
    #[serde(rename = "type")]
    kind: Value,
    status_airline: Value,
    size_airline: Value,
    age_fleet: Value,
    founding: Value,
    code_hub: Value,
    code_iso2_country: Value,
}

/// One entry of the `/airportDatabase` endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AirportEntry {
    name_airport: Value,
    code_iata_airport: Value,
    code_icao_airport: Value,
    latitude_airport: Value,
    longitude_airport: Value,
    geoname_id: Value,
    timezone: Value,
    #[serde(rename = "GMT")]
    gmt: Value,
    phone: Value,
    name_country: Value,
    code_iso2_country: Value,
    code_iata_city: Value,
}

/// One entry of the `/airplaneDatabase` endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AirplaneEntry {
    number_registration: Value,
    hex_icao_airplane: Value,
    // Misspelt by the API
    #[serde(alias = "numberTestRgistration")]
    number_test_registration: Value,
    plane_owner: Value,
    code_iata_airline: Value,
    code_icao_airline: Value,
    airplane_iata_type: Value,
    code_iata_plane_short: Value,
    code_iata_plane_long: Value,
    engines_count: Value,
    engines_type: Value,
    model_code: Value,
    line_number: Value,
    construction_number: Value,
    plane_series: Value,
    plane_class: Value,
    rollout_date: Value,
    first_flight: Value,
    delivery_date: Value,
    registration_date: Value,
    plane_age: Value,
    plane_status: Value,
}

/// Every endpoint answers with an array on success and an object on failure
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiResponse<T> {
    Records(Vec<T>),
    Error { error: Value },
}

/// Client for the Aviation Edge flight tracker, used as the detail feed and as
/// the registry source
#[derive(Clone)]
pub struct AviationEdgeFeed {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    database_timeout: Duration,
    throttle: RequestThrottle,
}

impl AviationEdgeFeed {
    pub fn new(client: Client, settings: &AviationEdgeSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            database_timeout: Duration::from_secs(settings.database_timeout_secs),
            throttle: RequestThrottle::new(Duration::from_secs(settings.min_interval_secs)),
        }
    }

    /// GET `endpoint` with the API key and return the body of a successful response
    async fn get_body(&self, endpoint: &str, timeout: Duration) -> Result<String, FeedError> {
        self.throttle.wait(FEED_NAME).await;

        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Requesting Aviation Edge {} from {}", endpoint, url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                FeedError::from_reqwest(e, &format!("Aviation Edge {} request", endpoint))
            })?;
        let response = check_status(response, FEED_NAME).await?;
        let body = response
            .text()
            .await
            .map_err(|e| {
                FeedError::from_reqwest(e, &format!("Aviation Edge {} body", endpoint))
            })?;
        debug!("Received Aviation Edge {} ({} bytes)", endpoint, body.len());
        Ok(body)
    }
}

#[async_trait]
impl StateFeed for AviationEdgeFeed {
    fn name(&self) -> &'static str {
        FEED_NAME
    }

    async fn fetch_states(&self) -> Result<Vec<State>, FeedError> {
        let body = self.get_body("flights", self.timeout).await?;
        let states = keep_valid(FEED_NAME, parse_flights_response(&body, Utc::now())?);
        info!("Received {} states from Aviation Edge", states.len());
        Ok(states)
    }
}

#[async_trait]
impl RegistrySource for AviationEdgeFeed {
    async fn fetch_airlines(&self) -> Result<Vec<Airline>, FeedError> {
        let body = self.get_body("airlineDatabase", self.database_timeout).await?;
        let airlines = parse_airline_database(&body)?;
        info!("Received {} airlines from Aviation Edge", airlines.len());
        Ok(airlines)
    }

    async fn fetch_airports(&self) -> Result<Vec<Airport>, FeedError> {
        let body = self.get_body("airportDatabase", self.database_timeout).await?;
        let airports = parse_airport_database(&body)?;
        info!("Received {} airports from Aviation Edge", airports.len());
        Ok(airports)
    }

    async fn fetch_aircraft(&self) -> Result<Vec<Aircraft>, FeedError> {
        let body = self.get_body("airplaneDatabase", self.database_timeout).await?;
        let aircraft = parse_airplane_database(&body)?;
        info!("Received {} aircraft from Aviation Edge", aircraft.len());
        Ok(aircraft)
    }
}

/// Decode the entries of a response body, mapping the API's error objects
fn decode_entries<T: DeserializeOwned>(body: &str, endpoint: &str) -> Result<Vec<T>, FeedError> {
    let response: ApiResponse<T> = serde_json::from_str(body).map_err(|e| {
        FeedError::Decode(format!("Aviation Edge {} response: {}", endpoint, e))
    })?;

    match response {
        ApiResponse::Records(entries) => Ok(entries),
        ApiResponse::Error { error } => {
            let message = error
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .unwrap_or("unknown error")
                .to_string();
            // An empty result is reported as an error object
            if message.eq_ignore_ascii_case("No Record Found") {
                return Ok(Vec::new());
            }
            if message.to_ascii_lowercase().contains("key") {
                return Err(FeedError::Auth(format!("Aviation Edge: {}", message)));
            }
            Err(FeedError::Request(format!("Aviation Edge: {}", message)))
        }
    }
}

/// Parse a `/flights` response body; every state is stamped with `received_at`
pub fn parse_flights_response(
    body: &str,
    received_at: DateTime<Utc>,
) -> Result<Vec<State>, FeedError> {
    let entries: Vec<TrackedState> = decode_entries(body, "flights")?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| to_state(entry, received_at))
        .collect())
}

/// Parse an `/airlineDatabase` body, skipping entries without any code
pub fn parse_airline_database(body: &str) -> Result<Vec<Airline>, FeedError> {
    let entries: Vec<AirlineEntry> = decode_entries(body, "airlineDatabase")?;
    Ok(entries.into_iter().filter_map(to_airline).collect())
}

/// Parse an `/airportDatabase` body, skipping entries without an IATA code
pub fn parse_airport_database(body: &str) -> Result<Vec<Airport>, FeedError> {
    let entries: Vec<AirportEntry> = decode_entries(body, "airportDatabase")?;
    Ok(entries.into_iter().filter_map(to_airport).collect())
}

/// Parse an `/airplaneDatabase` body, skipping entries without a registration
pub fn parse_airplane_database(body: &str) -> Result<Vec<Aircraft>, FeedError> {
    let entries: Vec<AirplaneEntry> = decode_entries(body, "airplaneDatabase")?;
    Ok(entries.into_iter().filter_map(to_aircraft).collect())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// The database endpoints mix quoted and bare numbers and use "" or "0" for
// unknown values.

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn code(value: &Value) -> Option<String> {
    text(value).map(|s| s.to_ascii_uppercase())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whole positive number that fits `T`; zero means unknown
fn count<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    number(value)
        .filter(|n| *n > 0.0 && n.fract() == 0.0)
        .and_then(|n| T::try_from(n as i64).ok())
}

/// Date from "2008-05-06" or "2008-05-06T00:00:00.000Z"
fn date(value: &Value) -> Option<NaiveDate> {
    let s = text(value)?;
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_or_default<T: std::str::FromStr + Default>(value: &Value) -> T
where
    T::Err: std::fmt::Display,
{
    match text(value).unwrap_or_default().parse::<T>() {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("{}", e);
            T::default()
        }
    }
}

fn to_airline(entry: AirlineEntry) -> Option<Airline> {
    let iata = code(&entry.code_iata_airline);
    let icao = code(&entry.code_icao_airline);
    if iata.is_none() && icao.is_none() {
        return None;
    }

    let types = text(&entry.kind)
        .unwrap_or_default()
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .filter_map(|t| match t.parse::<AirlineType>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                debug!("{}", e);
                None
            }
        })
        .collect();

    Some(Airline {
        iata,
        icao,
        name: text(&entry.name_airline).unwrap_or_default(),
        callsign: text(&entry.callsign),
        founding: count(&entry.founding),
        fleet_age: number(&entry.age_fleet).filter(|age| *age > 0.0),
        fleet_size: count(&entry.size_airline),
        status: parse_or_default::<AirlineStatus>(&entry.status_airline),
        types,
        country_iso2: code(&entry.code_iso2_country),
        hub_code: code(&entry.code_hub),
    })
}

fn to_airport(entry: AirportEntry) -> Option<Airport> {
    let iata = code(&entry.code_iata_airport)?;
    Some(Airport {
        iata,
        icao: code(&entry.code_icao_airport),
        name: text(&entry.name_airport).unwrap_or_default(),
        position: Position::new(
            number(&entry.latitude_airport).unwrap_or(0.0),
            number(&entry.longitude_airport).unwrap_or(0.0),
        ),
        geoname_id: count(&entry.geoname_id),
        phone: text(&entry.phone),
        timezone: text(&entry.timezone),
        gmt: text(&entry.gmt),
        city_iata: code(&entry.code_iata_city),
        country_iso2: code(&entry.code_iso2_country),
        country_name: text(&entry.name_country),
    })
}

fn to_aircraft(entry: AirplaneEntry) -> Option<Aircraft> {
    let mut aircraft = Aircraft::new(code(&entry.number_registration)?);

    let identity = &mut aircraft.identity;
    identity.icao24 = code(&entry.hex_icao_airplane);
    identity.test_registration = text(&entry.number_test_registration);
    identity.owner = text(&entry.plane_owner);
    identity.airline_iata = code(&entry.code_iata_airline);
    identity.airline_icao = code(&entry.code_icao_airline);

    let model = &mut aircraft.model;
    model.type_iata = text(&entry.airplane_iata_type);
    model.code_short = code(&entry.code_iata_plane_short);
    model.code_long = code(&entry.code_iata_plane_long);
    model.engine_count = count(&entry.engines_count);
    model.engine_type = parse_or_default::<EngineType>(&entry.engines_type);
    model.model_code = text(&entry.model_code);
    model.line_number = text(&entry.line_number);
    model.serial_number = text(&entry.construction_number);
    model.series = text(&entry.plane_series);
    model.classification = text(&entry.plane_class);

    let lifecycle = &mut aircraft.lifecycle;
    lifecycle.date_rollout = date(&entry.rollout_date);
    lifecycle.date_first_flight = date(&entry.first_flight);
    lifecycle.date_delivery = date(&entry.delivery_date);
    lifecycle.date_registration = date(&entry.registration_date);
    lifecycle.age = count(&entry.plane_age);

    aircraft.status = parse_or_default::<AircraftStatus>(&entry.plane_status);
    Some(aircraft)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    }
}

fn to_state(entry: TrackedState, received_at: DateTime<Utc>) -> Option<State> {
    let (Some(latitude), Some(longitude)) = (entry.geography.latitude, entry.geography.longitude)
    else {
        debug!(
            "Skipping Aviation Edge entry without position: {:?}",
            entry.flight.icao_number
        );
        return None;
    };

    let status = match entry.status.as_deref().unwrap_or("").parse::<StateStatus>() {
        Ok(status) => status,
        Err(e) => {
            warn!("{}", e);
            StateStatus::Unknown
        }
    };

    let mut state = State::new(received_at, DataSource::AviationEdge);
    state.status = status;

    state.aircraft.iata = non_empty(entry.aircraft.iata_code);
    state.aircraft.icao = non_empty(entry.aircraft.icao_code);
    state.aircraft.icao24 = non_empty(entry.aircraft.icao24).map(|s| s.to_ascii_uppercase());
    state.aircraft.registration = non_empty(entry.aircraft.reg_number);

    state.airline.iata = non_empty(entry.airline.iata_code);
    state.airline.icao = non_empty(entry.airline.icao_code);

    state.airport.arrival_iata = non_empty(entry.arrival.iata_code);
    state.airport.arrival_icao = non_empty(entry.arrival.icao_code);
    state.airport.departure_iata = non_empty(entry.departure.iata_code);
    state.airport.departure_icao = non_empty(entry.departure.icao_code);

    state.flight.iata = non_empty(entry.flight.iata_number);
    state.flight.icao = non_empty(entry.flight.icao_number).unwrap_or_default();
    state.flight.number = entry
        .flight
        .number
        .as_deref()
        .and_then(|n| n.trim().parse::<u16>().ok());

    state.geography.position = Position::new(latitude, longitude);
    state.geography.baro_altitude = entry.geography.altitude;
    state.geography.heading = entry.geography.direction;
    state.geography.speed_horizontal = entry.speed.horizontal.map(|v| v * KMH_TO_MS);
    state.geography.speed_vertical = entry.speed.vspeed.map(|v| v * KMH_TO_MS);
    state.geography.is_on_ground = is_truthy(&entry.speed.is_ground);

    state.transponder.squawk = non_empty(entry.system.squawk);
    state.transponder.squawk_time = entry
        .system
        .updated
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

    Some(state)
}
