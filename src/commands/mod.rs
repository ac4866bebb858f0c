pub mod query;
pub mod run;

pub mod registry;

pub use query::{
    handle_count, handle_last, handle_latest, handle_nearby, handle_search, handle_track,
};
pub use registry::{handle_aircraft, handle_aircraft_search, handle_airline, handle_airport};
pub use run::handle_run;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

use skytrack::clickhouse::ClickHouseStore;
use skytrack::config::Settings;
use skytrack::registry_repo::RegistryRepository;
use skytrack::states_repo::StateRepository;
use skytrack::store::StoreGateway;

const USER_AGENT: &str = concat!("skytrack/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for the store and the feeds
pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

fn open_store(settings: &Settings, client: Client) -> Arc<dyn StoreGateway> {
    Arc::new(ClickHouseStore::new(client, &settings.clickhouse))
}

pub(crate) fn open_repository(settings: &Settings, client: Client) -> StateRepository {
    let store = open_store(settings, client);
    StateRepository::with_table(
        settings.ingest.table.clone(),
        store,
        settings.ingest.track_key,
    )
}

pub(crate) fn open_registry(settings: &Settings, client: Client) -> RegistryRepository {
    RegistryRepository::new(open_store(settings, client))
}

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
