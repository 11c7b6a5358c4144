use std::env;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::station::Coordinate;

/// Environment variable holding the directions API key.
pub const DIRECTIONS_API_KEY_ENV: &str = "EVTRIP_DIRECTIONS_API_KEY";
/// Environment variable overriding the directions endpoint.
pub const DIRECTIONS_URL_ENV: &str = "EVTRIP_DIRECTIONS_URL";
/// Google Directions JSON endpoint.
pub const DEFAULT_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A single origin/destination query.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    /// Token of the [`QuerySession`] that issued the request.
    pub session_token: Uuid,
}

/// Driving route returned by a directions service.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRoute {
    pub distance_km: f64,
    pub duration_s: f64,
    /// Encoded overview polyline, when the service provides one.
    pub polyline: Option<String>,
}

/// Failure classes reported by a [`DirectionsService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectionsError {
    /// Temporary condition worth retrying (timeouts, rate limits, 5xx).
    #[error("transient directions failure: {message}")]
    Transient { message: String },
    /// The service answered but no drivable route exists.
    #[error("no driving route: {status}")]
    NoRoute { status: String },
    /// The request itself is unacceptable; retrying will not help.
    #[error("directions request rejected: {message}")]
    Fatal { message: String },
}

impl DirectionsError {
    fn fatal(message: impl Into<String>) -> Self {
        DirectionsError::Fatal {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DirectionsError::Transient { .. })
    }

    /// Map a directions API `status` string onto a failure class.
    ///
    /// Returns `None` for `OK`.
    pub fn from_status(status: &str, detail: Option<&str>) -> Option<Self> {
        let message = match detail {
            Some(detail) => format!("{status}: {detail}"),
            None => status.to_string(),
        };
        match status {
            "OK" => None,
            "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Some(DirectionsError::Transient { message }),
            "ZERO_RESULTS" | "NOT_FOUND" | "MAX_ROUTE_LENGTH_EXCEEDED" => {
                Some(DirectionsError::NoRoute {
                    status: status.to_string(),
                })
            }
            _ => Some(DirectionsError::Fatal { message }),
        }
    }

    /// Map an HTTP status onto a failure class.
    pub fn from_http_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            None
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Some(DirectionsError::Transient {
                message: format!("HTTP {status}"),
            })
        } else {
            Some(DirectionsError::Fatal {
                message: format!("HTTP {status}"),
            })
        }
    }
}

/// Source of driving distances and durations between two coordinates.
pub trait DirectionsService: Send + Sync {
    fn route(
        &self,
        request: &DirectionsRequest,
    ) -> std::result::Result<DirectionsRoute, DirectionsError>;
}

/// Limits on how long a [`QuerySession`] token may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_age: TimeDelta,
    pub max_queries: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_age: TimeDelta::minutes(2),
            max_queries: 100,
        }
    }
}

/// Token grouping directions queries for billing and quota purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySession {
    pub token: Uuid,
    pub created_at: DateTime<Utc>,
    pub queries: u32,
}

impl QuerySession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4(),
            created_at: now,
            queries: 0,
        }
    }

    /// A session expires once it is older than the policy allows or has
    /// issued its full quota of queries.
    pub fn is_expired(&self, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
        now - self.created_at >= policy.max_age || self.queries >= policy.max_queries
    }

    /// Replace the token when expired. Returns `true` when a renewal happened.
    pub fn renew_if_expired(&mut self, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
        if !self.is_expired(now, policy) {
            return false;
        }
        let previous = self.token;
        *self = QuerySession::new(now);
        debug!(%previous, token = %self.token, "renewed directions session");
        true
    }

    /// Count a dispatched query and return the token to attach to it.
    pub fn record_query(&mut self) -> Uuid {
        self.queries += 1;
        self.token
    }
}

impl Default for QuerySession {
    fn default() -> Self {
        QuerySession::new(Utc::now())
    }
}

/// Exponential backoff applied to transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per pair, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1 for the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

/// [`DirectionsService`] backed by the Google Directions HTTP API.
pub struct GoogleDirectionsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for GoogleDirectionsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleDirectionsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GoogleDirectionsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from `EVTRIP_DIRECTIONS_API_KEY` and the optional
    /// `EVTRIP_DIRECTIONS_URL` override.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let api_key = env::var(DIRECTIONS_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::DirectionsKeyMissing {
                env: DIRECTIONS_API_KEY_ENV,
            })?;
        let base_url =
            env::var(DIRECTIONS_URL_ENV).unwrap_or_else(|_| DEFAULT_DIRECTIONS_URL.to_string());
        info!(%base_url, "using directions service");
        Self::new(api_key, base_url, timeout)
    }
}

fn user_agent() -> String {
    format!("evtrip-lib/{version}", version = env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    legs: Vec<ApiLeg>,
    #[serde(default)]
    overview_polyline: Option<ApiPolyline>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: ApiValue,
    duration: ApiValue,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    points: String,
}

/// Interpret a Directions API JSON body.
pub fn parse_directions_body(body: &str) -> std::result::Result<DirectionsRoute, DirectionsError> {
    let response: DirectionsResponse = serde_json::from_str(body)
        .map_err(|err| DirectionsError::fatal(format!("malformed directions response: {err}")))?;

    let detail = response.error_message.as_deref();
    if let Some(err) = DirectionsError::from_status(&response.status, detail) {
        return Err(err);
    }

    let Some(route) = response.routes.into_iter().next() else {
        return Err(DirectionsError::NoRoute {
            status: "OK without routes".to_string(),
        });
    };
    if route.legs.is_empty() {
        return Err(DirectionsError::fatal("directions route without legs"));
    }

    // Waypoint-free requests yield one leg, but sum in case the service splits it.
    let meters: f64 = route.legs.iter().map(|leg| leg.distance.value).sum();
    let seconds: f64 = route.legs.iter().map(|leg| leg.duration.value).sum();
    Ok(DirectionsRoute {
        distance_km: meters / 1000.0,
        duration_s: seconds,
        polyline: route.overview_polyline.map(|p| p.points),
    })
}

impl DirectionsService for GoogleDirectionsClient {
    fn route(
        &self,
        request: &DirectionsRequest,
    ) -> std::result::Result<DirectionsRoute, DirectionsError> {
        let token = request.session_token.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("origin", request.origin.to_string()),
                ("destination", request.destination.to_string()),
                ("mode", "driving".to_string()),
                ("sessiontoken", token),
                ("key", self.api_key.clone()),
            ])
            .send()
            .map_err(|err| DirectionsError::Transient {
                message: err.without_url().to_string(),
            })?;

        if let Some(err) = DirectionsError::from_http_status(response.status()) {
            return Err(err);
        }

        let body = response.text().map_err(|err| DirectionsError::Transient {
            message: err.without_url().to_string(),
        })?;
        parse_directions_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_failure_classes() {
        assert_eq!(DirectionsError::from_status("OK", None), None);
        assert!(DirectionsError::from_status("OVER_QUERY_LIMIT", None)
            .unwrap()
            .is_transient());
        assert!(matches!(
            DirectionsError::from_status("ZERO_RESULTS", None),
            Some(DirectionsError::NoRoute { .. })
        ));
        assert!(matches!(
            DirectionsError::from_status("REQUEST_DENIED", Some("bad key")),
            Some(DirectionsError::Fatal { .. })
        ));
    }

    #[test]
    fn http_statuses_map_to_failure_classes() {
        assert_eq!(DirectionsError::from_http_status(StatusCode::OK), None);
        let throttled = DirectionsError::from_http_status(StatusCode::TOO_MANY_REQUESTS);
        assert!(throttled.is_some_and(|err| err.is_transient()));
        assert!(DirectionsError::from_http_status(StatusCode::BAD_GATEWAY)
            .unwrap()
            .is_transient());
        assert!(matches!(
            DirectionsError::from_http_status(StatusCode::FORBIDDEN),
            Some(DirectionsError::Fatal { .. })
        ));
    }

    #[test]
    fn parses_distance_duration_and_polyline() {
        let body = r#"{
            "status": "OK",
            "routes": [{
                "legs": [{"distance": {"value": 523400}, "duration": {"value": 18000}}],
                "overview_polyline": {"points": "abc"}
            }]
        }"#;
        let route = parse_directions_body(body).unwrap();
        assert!((route.distance_km - 523.4).abs() < 1e-9);
        assert_eq!(route.duration_s, 18000.0);
        assert_eq!(route.polyline.as_deref(), Some("abc"));
    }

    #[test]
    fn malformed_body_is_fatal() {
        let err = parse_directions_body("<html>").unwrap_err();
        assert!(matches!(err, DirectionsError::Fatal { .. }));
    }

    #[test]
    fn session_expires_by_age_and_quota() {
        let start = Utc::now();
        let policy = SessionPolicy {
            max_age: TimeDelta::minutes(2),
            max_queries: 2,
        };
        let mut session = QuerySession::new(start);
        assert!(!session.is_expired(start, &policy));
        assert!(session.is_expired(start + TimeDelta::minutes(2), &policy));

        session.record_query();
        session.record_query();
        assert!(session.is_expired(start, &policy));

        let old = session.token;
        assert!(session.renew_if_expired(start, &policy));
        assert_ne!(session.token, old);
        assert_eq!(session.queries, 0);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3),
            multiplier: 2.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
        assert_eq!(RetryPolicy::immediate(3).backoff(2), Duration::ZERO);
    }
}
