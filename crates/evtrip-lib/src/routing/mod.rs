//! Route search between charge stations.
//!
//! This module provides:
//! - [`RouteAlgorithm`] - Supported search algorithms (Dijkstra, A*)
//! - [`Route`] - Ordered stations plus the legs joining them
//! - [`find_route`] - Main entry point for computing a minimum drive-time route
//! - [`resolve_station`] - Look a station up by id or name
//!
//! # Example
//!
//! ```ignore
//! use evtrip_lib::{find_route, ChargeNetwork, LegConstraints, RouteAlgorithm};
//!
//! let network = ChargeNetwork::load("network.evcn".as_ref())?;
//! let route = find_route(&network, 101, 202, RouteAlgorithm::AStar, &LegConstraints::default())?;
//! ```

mod planner;

pub use planner::{select_planner, AStarPlanner, DijkstraPlanner, RoutePlanner};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::ChargeNetwork;
use crate::path::LegConstraints;
use crate::station::StationId;

/// Supported routing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteAlgorithm {
    /// Dijkstra's algorithm (exhaustive reference).
    Dijkstra,
    /// A* search (heuristic guided).
    #[default]
    #[serde(rename = "a-star")]
    AStar,
}

impl fmt::Display for RouteAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RouteAlgorithm::Dijkstra => "dijkstra",
            RouteAlgorithm::AStar => "a-star",
        };
        f.write_str(value)
    }
}

impl FromStr for RouteAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dijkstra" => Ok(RouteAlgorithm::Dijkstra),
            "a-star" | "astar" | "a*" => Ok(RouteAlgorithm::AStar),
            other => Err(Error::InvalidInput {
                message: format!("unknown routing algorithm '{other}'"),
            }),
        }
    }
}

/// One leg of a route in travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteLeg {
    pub from: StationId,
    pub to: StationId,
    pub distance_km: f64,
    pub duration_s: f64,
}

/// Route between two stations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub algorithm: RouteAlgorithm,
    /// Start, intermediate stops and end, in order.
    pub stations: Vec<StationId>,
    pub legs: Vec<RouteLeg>,
}

impl Route {
    pub fn start(&self) -> Option<StationId> {
        self.stations.first().copied()
    }

    pub fn goal(&self) -> Option<StationId> {
        self.stations.last().copied()
    }

    /// Number of legs in the route.
    pub fn hop_count(&self) -> usize {
        self.legs.len()
    }

    pub fn total_drive_s(&self) -> f64 {
        self.legs.iter().map(|leg| leg.duration_s).sum()
    }

    pub fn total_distance_km(&self) -> f64 {
        self.legs.iter().map(|leg| leg.distance_km).sum()
    }

    /// Assemble a route from a station sequence, looking each leg up in the
    /// network.
    pub fn from_path(
        network: &ChargeNetwork,
        algorithm: RouteAlgorithm,
        path: Vec<StationId>,
    ) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::EmptyRoute);
        }
        let legs = path
            .windows(2)
            .map(|pair| {
                let (from, to) = (pair[0], pair[1]);
                network
                    .leg(from, to)
                    .map(|leg| RouteLeg {
                        from,
                        to,
                        distance_km: leg.distance_km,
                        duration_s: leg.duration_s,
                    })
                    .ok_or(Error::NoRoute {
                        start: from,
                        goal: to,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            algorithm,
            stations: path,
            legs,
        })
    }
}

/// Find the minimum drive-time route from `start` to `goal`.
///
/// Returns `Err(UnknownStation)` when either endpoint is not part of the
/// network and `Ok(None)` when the stations are not connected under the given
/// leg constraints.
pub fn find_route(
    network: &ChargeNetwork,
    start: StationId,
    goal: StationId,
    algorithm: RouteAlgorithm,
    constraints: &LegConstraints,
) -> Result<Option<Route>> {
    for id in [start, goal] {
        if !network.contains(id) {
            return Err(Error::UnknownStation { id });
        }
    }

    let planner = select_planner(algorithm);
    match planner.find_path(network, start, goal, constraints) {
        Some(path) => Route::from_path(network, planner.algorithm(), path).map(Some),
        None => Ok(None),
    }
}

/// Resolve a user supplied station reference (numeric id or station name).
pub fn resolve_station(network: &ChargeNetwork, query: &str) -> Result<StationId> {
    let query = query.trim();
    if let Ok(id) = query.parse::<StationId>() {
        return if network.contains(id) {
            Ok(id)
        } else {
            Err(Error::UnknownStation { id })
        };
    }

    let mut named = network.stations_named(query);
    named.sort_by_key(|station| station.id);
    match named.first() {
        Some(station) => Ok(station.id),
        None => Err(Error::UnknownStationName {
            name: query.to_string(),
            suggestions: network.fuzzy_station_matches(query, 3),
        }),
    }
}
