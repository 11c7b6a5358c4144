//! EV trip planner library entry points.
//!
//! This crate loads charge-station data, clusters it into representative
//! stations, discovers drivable legs between them, and plans trips over the
//! resulting charge network with a battery simulation. Higher-level consumers
//! (the CLI, a web layer) should only depend on the items exported here
//! instead of reimplementing behavior.

pub mod battery;
pub mod cluster;
pub mod dataset;
pub mod db;
pub mod directions;
pub mod discovery;
pub mod error;
pub mod ingest;
pub mod network;
pub mod output;
pub mod path;
pub mod planner;
pub mod routing;
pub mod station;

pub use battery::{
    simulate, BatteryParams, ChargeCurve, LinearChargeCurve, QuinticChargeCurve, SimulatedLeg,
    Simulation,
};
pub use cluster::{cluster_stations, medoid, Cluster, ClusterConfig, Clustering};
pub use dataset::{default_network_path, resolve_network_paths, NetworkPaths};
pub use db::LegCache;
pub use directions::{
    DirectionsError, DirectionsRequest, DirectionsRoute, DirectionsService, GoogleDirectionsClient,
    QuerySession, RetryPolicy, SessionPolicy,
};
pub use discovery::{
    build_network, candidate_pairs, discover_legs, BuildConfig, CachedPair, DiscoveryConfig,
    DiscoveryReport, PairCache, PairOutcome,
};
pub use error::{Error, Result};
pub use ingest::{load_stations, load_stations_from_reader, IngestConfig, IngestReport, Region};
pub use network::{try_load_network, ChargeNetwork, Edge, Leg, NetworkHandle, NetworkMeta};
pub use output::TripSummary;
pub use path::LegConstraints;
pub use planner::{plan_trip, ReasonCode, TripPlan, TripRequest, TripResponse};
pub use routing::{find_route, resolve_station, Route, RouteAlgorithm, RouteLeg};
pub use station::{great_circle_km, Coordinate, PairKey, Station, StationId};
