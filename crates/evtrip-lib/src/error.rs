use std::path::PathBuf;

use thiserror::Error;

use crate::planner::ReasonCode;
use crate::station::StationId;

/// Convenient result alias for the EV trip library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when the station feed cannot be interpreted at all (for example
    /// missing required columns). Individual malformed rows are skipped instead.
    #[error("invalid station data: {message}")]
    StationData { message: String },

    /// Raised when clustering input contains NaN/infinite or duplicate coordinates.
    #[error("degenerate clustering input: {message}")]
    DegenerateInput { message: String },

    /// Raised when too many station pairs failed to resolve against the
    /// directions service for the build to be trusted.
    #[error("directions service unusable: {failed} station pairs failed (threshold {threshold})")]
    DirectionsUnavailable { failed: usize, threshold: usize },

    /// Raised when the directions service rejects a request outright.
    #[error("directions service rejected request for stations {a} and {b}: {message}")]
    DirectionsRejected {
        a: StationId,
        b: StationId,
        message: String,
    },

    /// Raised when the directions API key could not be found.
    #[error("directions API key missing; set {env}")]
    DirectionsKeyMissing { env: &'static str },

    /// Raised when a station id is not a node of the charge network.
    #[error("unknown station id: {id}")]
    UnknownStation { id: StationId },

    /// Raised when a station name could not be found in the network.
    #[error("unknown station name: {name}{}", format_suggestions(.suggestions))]
    UnknownStationName {
        name: String,
        suggestions: Vec<String>,
    },

    /// Raised when a leg references a station that is not part of the network.
    #[error("leg references unknown station {id}")]
    DanglingLeg { id: StationId },

    /// Raised when no route exists between two stations.
    #[error("no route found between stations {start} and {goal}")]
    NoRoute { start: StationId, goal: StationId },

    /// Raised when the requested battery window is empty.
    #[error("infeasible battery bounds: {message}")]
    InfeasibleBatteryBounds { message: String },

    /// Raised when a leg cannot be driven within the usable battery window.
    #[error(
        "leg from {from} to {to} is {distance_km:.1} km but usable range is {usable_range_km:.1} km"
    )]
    LegExceedsRange {
        from: StationId,
        to: StationId,
        distance_km: f64,
        usable_range_km: f64,
    },

    /// Raised when request parameters are malformed.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Raised when a computed route lacks any stations.
    #[error("route was empty")]
    EmptyRoute,

    /// No suitable project directories could be resolved for this platform.
    #[error("failed to resolve project directories for the network cache")]
    ProjectDirsUnavailable,

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for CSV reader errors.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Wrapper for JSON errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Raised when serializing a charge network fails.
    #[error("failed to serialize charge network: {message}")]
    NetworkSerialize { message: String },

    /// Raised when loading a charge network from a file fails.
    #[error("failed to load charge network from {path}: {message}")]
    NetworkLoad { path: PathBuf, message: String },

    /// Raised when deserializing a charge network from bytes fails.
    #[error("failed to deserialize charge network: {message}")]
    NetworkDeserialize { message: String },

    /// Raised when a background discovery task could not be joined.
    #[error("discovery worker failed: {message}")]
    Worker { message: String },
}

impl Error {
    /// Reason code for request-time failures surfaced to the planner boundary.
    ///
    /// Build-time and infrastructure errors return `None`.
    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            Error::NoRoute { .. } => Some(ReasonCode::NoRoute),
            Error::InfeasibleBatteryBounds { .. } => Some(ReasonCode::InfeasibleBatteryBounds),
            Error::LegExceedsRange { .. } => Some(ReasonCode::LegExceedsRange),
            Error::InvalidInput { .. }
            | Error::UnknownStation { .. }
            | Error::UnknownStationName { .. }
            | Error::EmptyRoute => Some(ReasonCode::InvalidInput),
            _ => None,
        }
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else if suggestions.len() == 1 {
        format!(". Did you mean '{}'?", suggestions[0])
    } else {
        format!(
            ". Did you mean one of: {}?",
            suggestions
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
