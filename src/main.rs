use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skytrack::config::Settings;
use skytrack::state_search::{AircraftField, SearchCriterion};

mod commands;

use commands::query::BoxArgs;
use commands::{
    handle_aircraft, handle_aircraft_search, handle_airline, handle_airport, handle_count,
    handle_last, handle_latest, handle_nearby, handle_run, handle_search, handle_track,
};

#[derive(Parser, Debug)]
#[command(
    name = "skytrack",
    version,
    about = "Ingest live aircraft states and query them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the state and registry tables if needed and ingest the feeds until stopped
    Run,
    /// Print the latest batch, optionally inside a bounding box
    Latest {
        /// Maximum number of states (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: i64,
        #[arg(long, allow_negative_numbers = true)]
        lat_min: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        lat_max: Option<f64>,
        /// West edge; larger than --lon-max for boxes crossing the antimeridian
        #[arg(long, allow_negative_numbers = true)]
        lon_min: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        lon_max: Option<f64>,
        /// Print the light map projection instead of full states
        #[arg(long, default_value_t = false)]
        map: bool,
    },
    /// Print states of the latest batch around a point
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Search radius in kilometres
        #[arg(long)]
        radius: f64,
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },
    /// Print the recent track of one aircraft, newest first
    Track {
        /// Flight designator or ICAO24 address, depending on the configured track key
        key: String,
        /// How far back to look, e.g. "30m", "2h" or seconds
        #[arg(long, default_value = "1h")]
        duration: String,
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },
    /// Print the aircraft's state in the latest batch
    Last { key: String },
    /// Search the latest batch with field=pattern criteria ('_' matches one character)
    Search {
        #[arg(required = true)]
        criteria: Vec<SearchCriterion>,
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },
    /// Print the number of rows in the state table
    Count,
    /// Look up an airline by IATA and/or ICAO code
    Airline {
        #[arg(long, required_unless_present = "icao")]
        iata: Option<String>,
        #[arg(long)]
        icao: Option<String>,
    },
    /// Look up an airport by IATA or ICAO code
    Airport { code: String },
    /// Look up a registered aircraft by registration (dashes optional)
    Aircraft { registration: String },
    /// Search registered aircraft with field=pattern criteria ('_' matches one character)
    AircraftSearch {
        #[arg(required = true)]
        criteria: Vec<SearchCriterion<AircraftField>>,
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Run => handle_run(settings).await,
        Commands::Latest {
            limit,
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            map,
        } => {
            let bbox = BoxArgs {
                lat_min,
                lat_max,
                lon_min,
                lon_max,
            };
            handle_latest(&settings, limit, bbox, map).await
        }
        Commands::Nearby {
            lat,
            lon,
            radius,
            limit,
        } => handle_nearby(&settings, lat, lon, radius, limit).await,
        Commands::Track {
            key,
            duration,
            limit,
        } => handle_track(&settings, &key, &duration, limit).await,
        Commands::Last { key } => handle_last(&settings, &key).await,
        Commands::Search { criteria, limit } => handle_search(&settings, &criteria, limit).await,
        Commands::Count => handle_count(&settings).await,
        Commands::Airline { iata, icao } => {
            handle_airline(&settings, iata.as_deref(), icao.as_deref()).await
        }
        Commands::Airport { code } => handle_airport(&settings, &code).await,
        Commands::Aircraft { registration } => handle_aircraft(&settings, &registration).await,
        Commands::AircraftSearch { criteria, limit } => {
            handle_aircraft_search(&settings, &criteria, limit).await
        }
    }
}
