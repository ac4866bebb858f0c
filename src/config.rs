use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::state_queries::TrackKey;

/// Environment variable naming the TOML settings file
pub const CONFIG_PATH_ENV: &str = "SKYTRACK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "skytrack.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSkySettings {
    pub enabled: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: String,
    pub token_url: String,
    pub timeout_secs: u64,
    pub min_interval_secs: u64,
}

impl Default for OpenSkySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: None,
            client_secret: None,
            base_url: "https://opensky-network.org/api".to_string(),
            token_url: "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token".to_string(),
            timeout_secs: 10,
            min_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AviationEdgeSettings {
    /// Feed is disabled while the key is empty
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub min_interval_secs: u64,
    /// Timeout for the airline, airport and airplane database downloads
    pub database_timeout_secs: u64,
}

impl Default for AviationEdgeSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://aviation-edge.com/v2/public".to_string(),
            timeout_secs: 10,
            min_interval_secs: 10,
            database_timeout_secs: 120,
        }
    }
}

impl AviationEdgeSettings {
    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Cycle period, e.g. "90s" or "2m"
    pub period: String,
    pub table: String,
    /// Identifier used for tracks and last-known lookups
    pub track_key: TrackKey,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            period: "90s".to_string(),
            table: "state".to_string(),
            track_key: TrackKey::Flight,
        }
    }
}

impl IngestSettings {
    pub fn period(&self) -> Result<Duration> {
        parse_period(&self.period)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Prometheus exporter address; no exporter when unset
    pub listen_addr: Option<SocketAddr>,
}

/// Top-level settings file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub clickhouse: ClickHouseSettings,
    pub opensky: OpenSkySettings,
    pub aviation_edge: AviationEdgeSettings,
    pub ingest: IngestSettings,
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let settings: Settings =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(settings)
    }

    /// Settings file path: `$SKYTRACK_CONFIG`, falling back to `./skytrack.toml`
    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load the settings file if there is one, then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let path = Self::config_path();
        let mut settings = if path.exists() {
            info!("Loading settings from {:?}", path);
            Self::load(&path)?
        } else if std::env::var(CONFIG_PATH_ENV).is_ok() {
            return Err(anyhow!("Settings file {:?} does not exist", path));
        } else {
            Settings::default()
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overwrite fields from variables returned by `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("CLICKHOUSE_URL") {
            self.clickhouse.url = url;
        }
        if let Some(user) = lookup("CLICKHOUSE_USER") {
            self.clickhouse.user = user;
        }
        if let Some(password) = lookup("CLICKHOUSE_PASSWORD") {
            self.clickhouse.password = password;
        }
        if let Some(database) = lookup("CLICKHOUSE_DATABASE") {
            self.clickhouse.database = database;
        }
        if let Some(client_id) = lookup("OPENSKY_CLIENT_ID") {
            self.opensky.client_id = Some(client_id);
        }
        if let Some(client_secret) = lookup("OPENSKY_CLIENT_SECRET") {
            self.opensky.client_secret = Some(client_secret);
        }
        if let Some(api_key) = lookup("AVIATION_EDGE_API_KEY") {
            self.aviation_edge.api_key = api_key;
        }
        if let Some(period) = lookup("SKYTRACK_INGEST_PERIOD") {
            self.ingest.period = period;
        }
        if let Some(addr) = lookup("SKYTRACK_METRICS_ADDR") {
            let addr = addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid SKYTRACK_METRICS_ADDR {:?}", addr))?;
            self.metrics.listen_addr = Some(addr);
        }
        if let Some(track_key) = lookup("SKYTRACK_TRACK_KEY") {
            self.ingest.track_key = track_key
                .parse()
                .map_err(|e: String| anyhow!("Invalid SKYTRACK_TRACK_KEY: {}", e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.ingest.period()?;
        if self.opensky.client_id.is_some() != self.opensky.client_secret.is_some() {
            return Err(anyhow!(
                "OpenSky client id and secret must be configured together"
            ));
        }
        Ok(())
    }
}

/// Parse a period such as "90s", "2m" or a bare number of seconds
pub fn parse_period(input: &str) -> Result<Duration> {
    let input = input.trim();
    let period = if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        Duration::from_secs(input.parse()?)
    } else {
        humantime::parse_duration(input)
            .with_context(|| format!("Invalid ingest period {:?}", input))?
    };
    if period.is_zero() {
        return Err(anyhow!("Ingest period must be larger than zero"));
    }
    Ok(period)
}
