//! SkyTrack - live aircraft state ingestion and query library
//!
//! States are pulled periodically from OpenSky Network and Aviation Edge,
//! merged, cached as the latest batch and appended to a ClickHouse table.
//! Geographic and historical queries are answered from the cached batch when
//! possible and from the store otherwise. Airline, airport and aircraft
//! registries are kept alongside for lookups by exact key.

pub mod aircraft;
pub mod airlines;
pub mod airports;
pub mod clickhouse;
pub mod config;
pub mod feeds;
pub mod geo;
pub mod ingest;
pub mod metrics;
pub mod reconciler;
pub mod registry_repo;
pub mod snapshot_cache;
pub mod state_queries;
pub mod state_search;
pub mod states;
pub mod states_repo;
pub mod store;
pub mod table_dispatcher;

pub use clickhouse::ClickHouseStore;
pub use config::Settings;
pub use ingest::IngestService;
pub use registry_repo::RegistryRepository;
pub use states::State;
pub use states_repo::StateRepository;
pub use store::StoreGateway;
