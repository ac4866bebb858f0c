//! Upstream state feeds
//!
//! Two feeds supply states: OpenSky Network refreshes positions often and is
//! used as the geography feed, Aviation Edge supplies flight details and is
//! used as the detail feed. Both are plain HTTP APIs with a per-client minimum
//! interval between requests. Aviation Edge also publishes the airline,
//! airport and airplane databases that seed the registries.

pub mod aviation_edge;
pub mod opensky;

pub use aviation_edge::AviationEdgeFeed;
pub use opensky::OpenSkyFeed;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::aircraft::Aircraft;
use crate::airlines::Airline;
use crate::airports::Airport;
use crate::states::State;

/// Why a feed could not deliver a batch
#[derive(Debug)]
pub enum FeedError {
    Timeout(String),
    ConnectionRefused(String),
    RateLimited(String),
    Http { status: u16, body: String },
    Auth(String),
    Decode(String),
    Request(String),
}

impl FeedError {
    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Timeout(_) => "timeout",
            FeedError::ConnectionRefused(_) => "connection_refused",
            FeedError::RateLimited(_) => "rate_limited",
            FeedError::Http { .. } => "http",
            FeedError::Auth(_) => "auth",
            FeedError::Decode(_) => "decode",
            FeedError::Request(_) => "request",
        }
    }

    /// Classify a transport error from reqwest
    pub fn from_reqwest(err: reqwest::Error, what: &str) -> Self {
        let message = format!("{}: {}", what, err);
        if err.is_timeout() {
            FeedError::Timeout(message)
        } else if err.is_connect() {
            FeedError::ConnectionRefused(message)
        } else if err.is_decode() {
            FeedError::Decode(message)
        } else if let Some(status) = err.status() {
            FeedError::Http {
                status: status.as_u16(),
                body: message,
            }
        } else {
            FeedError::Request(message)
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Timeout(msg) => write!(f, "Request timed out ({})", msg),
            FeedError::ConnectionRefused(msg) => write!(f, "Connection failed ({})", msg),
            FeedError::RateLimited(msg) => write!(f, "Rate limited ({})", msg),
            FeedError::Http { status, body } => write!(f, "HTTP error {}: {}", status, body),
            FeedError::Auth(msg) => write!(f, "Authentication failed ({})", msg),
            FeedError::Decode(msg) => write!(f, "Could not decode response ({})", msg),
            FeedError::Request(msg) => write!(f, "Request failed ({})", msg),
        }
    }
}

impl std::error::Error for FeedError {}

/// A source of state batches
#[async_trait]
pub trait StateFeed: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Fetch the feed's current batch of states
    async fn fetch_states(&self) -> Result<Vec<State>, FeedError>;
}

/// A source of registry reference data
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_airlines(&self) -> Result<Vec<Airline>, FeedError>;

    async fn fetch_airports(&self) -> Result<Vec<Airport>, FeedError>;

    async fn fetch_aircraft(&self) -> Result<Vec<Aircraft>, FeedError>;
}

/// Turn an error status into a `FeedError`, passing successful responses on
pub(crate) async fn check_status(response: Response, feed: &str) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => {
            FeedError::RateLimited(format!("{} returned 429: {}", feed, body.trim()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FeedError::Auth(format!("{} returned {}: {}", feed, status, body.trim()))
        }
        _ => FeedError::Http {
            status: status.as_u16(),
            body: body.trim().to_string(),
        },
    })
}

/// Drop states that fail validation, counting them per feed
pub(crate) fn keep_valid(feed: &'static str, states: Vec<State>) -> Vec<State> {
    let before = states.len();
    let valid: Vec<State> = states
        .into_iter()
        .filter(|state| match state.validate() {
            Ok(()) => true,
            Err(reason) => {
                debug!(feed = %feed, "Dropping invalid state {:?}: {}", state.flight.icao, reason);
                false
            }
        })
        .collect();

    let dropped = before - valid.len();
    if dropped > 0 {
        metrics::counter!("feed.invalid_states_total", "feed" => feed).increment(dropped as u64);
    }
    valid
}

/// Minimum spacing between requests to one API
#[derive(Clone)]
pub(crate) struct RequestThrottle {
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RequestThrottle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Sleep until the interval since the previous request has passed
    pub(crate) async fn wait(&self, feed: &str) {
        let mut last_request = self.last_request.lock().await;

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let sleep_duration = self.min_interval - elapsed;
                debug!(
                    "{} rate limit: sleeping for {:?} before next request",
                    feed, sleep_duration
                );
                tokio::time::sleep(sleep_duration).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{DataSource, Position};
    use chrono::Utc;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_keep_valid_drops_out_of_range() {
        let mut good = State::new(Utc::now(), DataSource::OpenskyNetwork);
        good.geography.position = Position::new(10.0, 10.0);
        let mut bad = good.clone();
        bad.geography.position = Position::new(95.0, 10.0);

        let kept = keep_valid("test", vec![good.clone(), bad]);
        assert_eq!(kept, vec![good]);
    }

    #[test]
    fn test_keep_valid_drops_values_wider_than_columns() {
        let mut good = State::new(Utc::now(), DataSource::AviationEdge);
        good.geography.position = Position::new(10.0, 10.0);
        good.flight.icao = "KLM1001".to_string();
        good.aircraft.registration = Some("PH-BXA".to_string());

        let mut long_callsign = good.clone();
        long_callsign.flight.icao = "KLM1001XYZ".to_string();
        let mut long_registration = good.clone();
        long_registration.aircraft.registration = Some("PH-BXA-EXTRA".to_string());

        let kept = keep_valid("test", vec![long_callsign, good.clone(), long_registration]);
        assert_eq!(kept, vec![good]);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(FeedError::Timeout(String::new()).kind(), "timeout");
        assert_eq!(
            FeedError::Http {
                status: 502,
                body: String::new()
            }
            .kind(),
            "http"
        );
        assert_eq!(FeedError::RateLimited(String::new()).kind(), "rate_limited");
    }

    /// Answer one HTTP request on a local port with a canned response
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}/", addr)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn status_result(
        status_line: &'static str,
        body: &'static str,
    ) -> Result<Response, FeedError> {
        let response = client().get(serve_once(status_line, body)).send().await.unwrap();
        check_status(response, "test").await
    }

    #[tokio::test]
    async fn test_check_status_passes_success_through() {
        let response = status_result("200 OK", "[]").await.unwrap();
        assert_eq!(response.text().await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_check_status_classifies_errors() {
        match status_result("429 Too Many Requests", "slow down").await {
            Err(FeedError::RateLimited(msg)) => assert!(msg.contains("slow down"), "{}", msg),
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert!(matches!(
            status_result("401 Unauthorized", "").await,
            Err(FeedError::Auth(_))
        ));
        assert!(matches!(
            status_result("403 Forbidden", "").await,
            Err(FeedError::Auth(_))
        ));
        match status_result("502 Bad Gateway", " upstream down \n").await {
            Err(FeedError::Http { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected http error, got {:?}", other),
        }
        assert!(matches!(
            status_result("404 Not Found", "").await,
            Err(FeedError::Http { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_from_reqwest_maps_timeout() {
        // Accepted by the kernel but never answered
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());

        let err = client()
            .get(url)
            .timeout(Duration::from_millis(200))
            .send()
            .await
            .unwrap_err();
        let classified = FeedError::from_reqwest(err, "test request");
        assert!(matches!(classified, FeedError::Timeout(_)), "{:?}", classified);
        assert_eq!(classified.kind(), "timeout");
        drop(listener);
    }

    #[tokio::test]
    async fn test_from_reqwest_maps_connection_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = client()
            .get(format!("http://127.0.0.1:{}/", port))
            .send()
            .await
            .unwrap_err();
        let classified = FeedError::from_reqwest(err, "test request");
        assert!(
            matches!(classified, FeedError::ConnectionRefused(_)),
            "{:?}",
            classified
        );
        assert_eq!(classified.kind(), "connection_refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_requests() {
        let throttle = RequestThrottle::new(Duration::from_secs(10));
        let start = tokio::time::Instant::now();
        throttle.wait("test").await;
        throttle.wait("test").await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
