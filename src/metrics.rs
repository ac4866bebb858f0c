use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus recorder and serve `/metrics` on `addr`
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        .set_buckets_for_metric(
            Matcher::Full("states.query.duration_ms".to_string()),
            &[
                1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ],
        )
        .context("Failed to set buckets for states.query.duration_ms")?
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Serving metrics on http://{}/metrics", addr);
    initialize_ingest_metrics();
    Ok(())
}

/// Initialize ingestion metrics to zero
/// This ensures metrics always appear in Prometheus queries even if no events have occurred
pub fn initialize_ingest_metrics() {
    for result in ["reconciled", "degraded", "single_feed", "failed"] {
        metrics::counter!("ingest.cycle.total", "result" => result).absolute(0);
    }
    metrics::counter!("ingest.states_ingested").absolute(0);

    for feed in ["opensky", "aviation_edge"] {
        for kind in [
            "timeout",
            "connection_refused",
            "rate_limited",
            "http",
            "auth",
            "decode",
            "request",
        ] {
            metrics::counter!("feed.errors_total", "feed" => feed, "kind" => kind).absolute(0);
        }
        metrics::counter!("feed.invalid_states_total", "feed" => feed).absolute(0);
    }

    metrics::counter!("reconcile.matched_total").absolute(0);
    for field in [
        "position",
        "baro_altitude",
        "geo_altitude",
        "heading",
        "speed_horizontal",
        "speed_vertical",
        "is_on_ground",
    ] {
        metrics::counter!("reconcile.field_updates_total", "field" => field).absolute(0);
    }
}
