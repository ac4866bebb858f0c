use anyhow::Result;
use tracing::info;

use skytrack::config::Settings;
use skytrack::state_search::SearchCriterion;

use super::{http_client, open_repository, print_json};

/// Bounding box arguments as given on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxArgs {
    pub lat_min: Option<f64>,
    pub lat_max: Option<f64>,
    pub lon_min: Option<f64>,
    pub lon_max: Option<f64>,
}

pub async fn handle_latest(settings: &Settings, limit: i64, bbox: BoxArgs, map: bool) -> Result<()> {
    let repo = open_repository(settings, http_client()?);
    if map {
        let states = repo
            .get_latest_batch_map(limit, bbox.lat_min, bbox.lat_max, bbox.lon_min, bbox.lon_max)
            .await?;
        info!("Latest batch: {} states", states.len());
        print_json(&states)
    } else {
        let states = repo
            .get_latest_batch(limit, bbox.lat_min, bbox.lat_max, bbox.lon_min, bbox.lon_max)
            .await?;
        info!("Latest batch: {} states", states.len());
        print_json(&states)
    }
}

pub async fn handle_nearby(
    settings: &Settings,
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    limit: i64,
) -> Result<()> {
    let repo = open_repository(settings, http_client()?);
    let states = repo
        .get_nearby(latitude, longitude, radius_km, limit)
        .await?;
    info!(
        "{} states within {} km of ({}, {})",
        states.len(),
        radius_km,
        latitude,
        longitude
    );
    print_json(&states)
}

pub async fn handle_track(settings: &Settings, key: &str, duration: &str, limit: i64) -> Result<()> {
    let repo = open_repository(settings, http_client()?);
    let states = repo.get_track(key, duration, limit).await?;
    info!("Track of {} over {}: {} states", key, duration, states.len());
    print_json(&states)
}

pub async fn handle_last(settings: &Settings, key: &str) -> Result<()> {
    let repo = open_repository(settings, http_client()?);
    let state = repo.require_last_known(key).await?;
    print_json(&state)
}

pub async fn handle_search(
    settings: &Settings,
    criteria: &[SearchCriterion],
    limit: i64,
) -> Result<()> {
    let repo = open_repository(settings, http_client()?);
    let states = repo.search(criteria, limit).await?;
    info!("Search matched {} states", states.len());
    print_json(&states)
}

pub async fn handle_count(settings: &Settings) -> Result<()> {
    let repo = open_repository(settings, http_client()?);
    let count = repo.count().await?;
    print_json(&serde_json::json!({ "table": repo.table(), "count": count }))
}
