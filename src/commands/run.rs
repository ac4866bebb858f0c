use anyhow::{Result, bail};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use skytrack::config::Settings;
use skytrack::feeds::{AviationEdgeFeed, OpenSkyFeed, RegistrySource, StateFeed};
use skytrack::ingest::IngestService;

use super::{http_client, open_registry, open_repository};

/// Bootstrap the state and registry tables and ingest until Ctrl+C or SIGTERM
pub async fn handle_run(settings: Settings) -> Result<()> {
    let period = settings.ingest.period()?;

    if let Some(addr) = settings.metrics.listen_addr {
        skytrack::metrics::init_metrics(addr)?;
    }

    let client = http_client()?;

    let geography: Option<Arc<dyn StateFeed>> = if settings.opensky.enabled {
        Some(Arc::new(OpenSkyFeed::new(client.clone(), &settings.opensky)))
    } else {
        None
    };
    let aviation_edge = if settings.aviation_edge.enabled() {
        Some(Arc::new(AviationEdgeFeed::new(
            client.clone(),
            &settings.aviation_edge,
        )))
    } else {
        None
    };
    let detail = aviation_edge
        .clone()
        .map(|feed| feed as Arc<dyn StateFeed>);

    if geography.is_none() && detail.is_none() {
        bail!("No feed enabled: enable OpenSky or set AVIATION_EDGE_API_KEY");
    }
    info!("Starting run command with:");
    info!(
        "  OpenSky feed: {}",
        if geography.is_some() { "ENABLED" } else { "DISABLED" }
    );
    info!(
        "  Aviation Edge feed: {}",
        if detail.is_some() { "ENABLED" } else { "DISABLED" }
    );

    // Registries are reference data; ingestion runs without them
    let registry = open_registry(&settings, client.clone());
    let source = aviation_edge.as_deref().map(|feed| feed as &dyn RegistrySource);
    if let Err(e) = registry.ensure_exists(source).await {
        warn!("Registry tables unavailable: {:#}", e);
    }

    let repo = Arc::new(open_repository(&settings, client));
    repo.ensure_exists().await?;

    let service = IngestService::new(geography, detail, repo)?;

    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());

    service.run(period, cancel).await;
    Ok(())
}

/// Cancel `cancel` on Ctrl+C, or SIGTERM on unix
fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        result = tokio::signal::ctrl_c() => {
                            if let Err(err) = result {
                                error!("Unable to listen for shutdown signal: {}", err);
                                return;
                            }
                            info!("Received Ctrl+C, shutting down");
                        }
                        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    }
                }
                Err(err) => {
                    warn!("Unable to listen for SIGTERM: {}", err);
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        error!("Unable to listen for shutdown signal: {}", err);
                        return;
                    }
                    info!("Received Ctrl+C, shutting down");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", err);
                return;
            }
            info!("Received Ctrl+C, shutting down");
        }
        cancel.cancel();
    });
}
