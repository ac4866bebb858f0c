use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{FeedError, RequestThrottle, StateFeed, check_status, keep_valid};
use crate::config::OpenSkySettings;
use crate::states::{DataSource, Position, State};

const FEED_NAME: &str = "opensky";

/// Access tokens are refreshed well before their 30 minute lifetime ends
const TOKEN_REFRESH_AFTER: Duration = Duration::from_secs(20 * 60);

/// Minimum number of entries in one state vector (`category` is optional)
const STATE_VECTOR_LEN: usize = 17;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    time: i64,
    /// `null` when no aircraft matched
    states: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    fetched_at: Instant,
}

/// Client for the OpenSky Network REST API, used as the geography feed
#[derive(Clone)]
pub struct OpenSkyFeed {
    client: Client,
    base_url: String,
    token_url: String,
    credentials: Option<(String, String)>,
    timeout: Duration,
    token: Arc<Mutex<Option<AccessToken>>>,
    throttle: RequestThrottle,
}

impl OpenSkyFeed {
    /// Create a client; without credentials requests are made anonymously
    pub fn new(client: Client, settings: &OpenSkySettings) -> Self {
        let credentials = match (&settings.client_id, &settings.client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        };
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token_url: settings.token_url.clone(),
            credentials,
            timeout: Duration::from_secs(settings.timeout_secs),
            token: Arc::new(Mutex::new(None)),
            throttle: RequestThrottle::new(Duration::from_secs(settings.min_interval_secs)),
        }
    }

    /// Current bearer token, requesting a new one when it is missing or stale
    async fn access_token(&self) -> Result<Option<String>, FeedError> {
        let Some((client_id, client_secret)) = &self.credentials else {
            return Ok(None);
        };

        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.fetched_at.elapsed() < TOKEN_REFRESH_AFTER {
                return Ok(Some(current.value.clone()));
            }
        }

        debug!("Requesting OpenSky access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest(e, "OpenSky token request"))?;

        let response = match check_status(response, FEED_NAME).await {
            Err(FeedError::Http { status, body }) if status == 400 => {
                // Keycloak answers bad credentials with 400 invalid_client
                return Err(FeedError::Auth(format!("OpenSky token rejected: {}", body)));
            }
            other => other?,
        };
        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(format!("OpenSky token response: {}", e)))?;

        info!("Obtained new OpenSky access token");
        *token = Some(AccessToken {
            value: parsed.access_token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(Some(parsed.access_token))
    }
}

#[async_trait]
impl StateFeed for OpenSkyFeed {
    fn name(&self) -> &'static str {
        FEED_NAME
    }

    async fn fetch_states(&self) -> Result<Vec<State>, FeedError> {
        let token = self.access_token().await?;
        self.throttle.wait(FEED_NAME).await;

        let url = format!("{}/states/all", self.base_url);
        debug!("Requesting OpenSky states from {}", url);

        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest(e, "OpenSky states request"))?;
        let response = check_status(response, FEED_NAME).await?;
        let body = response
            .text()
            .await
            .map_err(|e| FeedError::from_reqwest(e, "OpenSky states body"))?;

        let states = keep_valid(FEED_NAME, parse_states_response(&body)?);
        info!("Received {} states from OpenSky", states.len());
        Ok(states)
    }
}

/// Parse a `/states/all` response body into states sharing the response time
pub fn parse_states_response(body: &str) -> Result<Vec<State>, FeedError> {
    let response: StatesResponse = serde_json::from_str(body)
        .map_err(|e| FeedError::Decode(format!("OpenSky states response: {}", e)))?;

    let time = DateTime::<Utc>::from_timestamp(response.time, 0).ok_or_else(|| {
        FeedError::Decode(format!("OpenSky response time out of range: {}", response.time))
    })?;

    let vectors = response.states.unwrap_or_default();
    let mut states = Vec::with_capacity(vectors.len());
    for vector in &vectors {
        match state_from_vector(time, vector) {
            Some(state) => states.push(state),
            None => debug!("Skipping malformed OpenSky state vector: {:?}", vector),
        }
    }
    Ok(states)
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map one positional state vector onto a `State`
///
/// A vector without latitude or longitude gets the (0, 0) placeholder
/// position, which the reconciler knows not to copy.
fn state_from_vector(time: DateTime<Utc>, vector: &[Value]) -> Option<State> {
    if vector.len() < STATE_VECTOR_LEN {
        return None;
    }

    let icao24 = vector[0].as_str()?.trim().to_ascii_uppercase();
    let mut state = State::new(time, DataSource::OpenskyNetwork);

    state.aircraft.icao24 = Some(icao24);
    state.flight.icao = text(&vector[1]).unwrap_or_default();

    state.geography.position = match (vector[6].as_f64(), vector[5].as_f64()) {
        (Some(latitude), Some(longitude)) => Position::new(latitude, longitude),
        _ => Position::default(),
    };
    state.geography.baro_altitude = vector[7].as_f64();
    state.geography.is_on_ground = vector[8].as_bool().unwrap_or(false);
    state.geography.speed_horizontal = vector[9].as_f64();
    state.geography.heading = vector[10].as_f64();
    state.geography.speed_vertical = vector[11].as_f64();
    state.geography.geo_altitude = vector[13].as_f64();

    state.transponder.squawk = text(&vector[14]);
    state.transponder.squawk_time = vector[4]
        .as_i64()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

    Some(state)
}
