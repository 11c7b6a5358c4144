//! Route planning strategies.
//!
//! [`RoutePlanner`] hides the search algorithm behind a trait so that
//! [`find_route`](super::find_route) can dispatch on [`RouteAlgorithm`]
//! without knowing the details of each search.

use crate::network::ChargeNetwork;
use crate::path::{find_route_a_star, find_route_dijkstra, LegConstraints};
use crate::station::StationId;

use super::RouteAlgorithm;

/// Trait for route planning strategies.
pub trait RoutePlanner: Send + Sync {
    /// The algorithm identifier for this planner.
    fn algorithm(&self) -> RouteAlgorithm;

    /// Execute the search on the network.
    ///
    /// Returns `Some(path)` if a route is found, `None` otherwise.
    fn find_path(
        &self,
        network: &ChargeNetwork,
        start: StationId,
        goal: StationId,
        constraints: &LegConstraints,
    ) -> Option<Vec<StationId>>;
}

/// Dijkstra over drive time; explores exhaustively.
#[derive(Debug, Clone, Default)]
pub struct DijkstraPlanner;

impl RoutePlanner for DijkstraPlanner {
    fn algorithm(&self) -> RouteAlgorithm {
        RouteAlgorithm::Dijkstra
    }

    fn find_path(
        &self,
        network: &ChargeNetwork,
        start: StationId,
        goal: StationId,
        constraints: &LegConstraints,
    ) -> Option<Vec<StationId>> {
        find_route_dijkstra(network, start, goal, constraints)
    }
}

/// A* over drive time guided by great-circle distance at the fastest leg speed.
#[derive(Debug, Clone, Default)]
pub struct AStarPlanner;

impl RoutePlanner for AStarPlanner {
    fn algorithm(&self) -> RouteAlgorithm {
        RouteAlgorithm::AStar
    }

    fn find_path(
        &self,
        network: &ChargeNetwork,
        start: StationId,
        goal: StationId,
        constraints: &LegConstraints,
    ) -> Option<Vec<StationId>> {
        find_route_a_star(network, start, goal, constraints)
    }
}

/// Select the planner implementing `algorithm`.
pub fn select_planner(algorithm: RouteAlgorithm) -> Box<dyn RoutePlanner> {
    match algorithm {
        RouteAlgorithm::Dijkstra => Box::new(DijkstraPlanner),
        RouteAlgorithm::AStar => Box::new(AStarPlanner),
    }
}
