use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::network::{ChargeNetwork, Edge};
use crate::station::StationId;

/// Distance window applied to every leg considered during search.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LegConstraints {
    /// Legs shorter than this many kilometres are skipped.
    pub min_leg_km: Option<f64>,
    /// Legs longer than this many kilometres are skipped.
    pub max_leg_km: Option<f64>,
}

impl LegConstraints {
    pub fn window(min_leg_km: f64, max_leg_km: f64) -> Self {
        Self {
            min_leg_km: Some(min_leg_km),
            max_leg_km: Some(max_leg_km),
        }
    }

    fn allows(&self, edge: &Edge) -> bool {
        if let Some(limit) = self.min_leg_km {
            if edge.distance_km < limit {
                return false;
            }
        }

        if let Some(limit) = self.max_leg_km {
            if edge.distance_km > limit {
                return false;
            }
        }

        true
    }
}

/// Run Dijkstra's algorithm over drive time. Exhaustive reference for A*.
pub fn find_route_dijkstra(
    network: &ChargeNetwork,
    start: StationId,
    goal: StationId,
    constraints: &LegConstraints,
) -> Option<Vec<StationId>> {
    search(network, start, goal, constraints, |_| 0.0)
}

/// Run A* over drive time.
///
/// The heuristic is the great-circle distance to the goal driven at the
/// network's fastest leg speed. Road distance is never shorter than the
/// great-circle distance and no leg is faster than that speed, so the
/// estimate never exceeds the true remaining drive time.
pub fn find_route_a_star(
    network: &ChargeNetwork,
    start: StationId,
    goal: StationId,
    constraints: &LegConstraints,
) -> Option<Vec<StationId>> {
    let goal_coord = network.station(goal)?.coord;
    let speed = network.max_speed_kmh();
    if speed <= 0.0 {
        return find_route_dijkstra(network, start, goal, constraints);
    }

    search(network, start, goal, constraints, |node| {
        network
            .station(node)
            .map(|station| station.coord.distance_to(&goal_coord) / speed * 3600.0)
            .unwrap_or(0.0)
    })
}

fn search<H>(
    network: &ChargeNetwork,
    start: StationId,
    goal: StationId,
    constraints: &LegConstraints,
    heuristic: H,
) -> Option<Vec<StationId>>
where
    H: Fn(StationId) -> f64,
{
    if !network.contains(start) || !network.contains(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut g_score: HashMap<StationId, f64> = HashMap::new();
    let mut parents: HashMap<StationId, Option<StationId>> = HashMap::new();
    let mut closed: HashSet<StationId> = HashSet::new();
    let mut queue = BinaryHeap::new();
    let mut seq: u64 = 0;

    g_score.insert(start, 0.0);
    parents.insert(start, None);
    queue.push(SearchEntry::new(start, 0.0, heuristic(start), seq));

    while let Some(entry) = queue.pop() {
        if !closed.insert(entry.node) {
            continue;
        }

        if entry.node == goal {
            return Some(reconstruct_path(&parents, start, goal));
        }

        let current_score = entry.cost.0;
        for edge in network.neighbours(entry.node) {
            let next = edge.target;
            if closed.contains(&next) || !constraints.allows(edge) {
                continue;
            }

            let tentative = current_score + edge.duration_s;
            if tentative < *g_score.get(&next).unwrap_or(&f64::INFINITY) {
                g_score.insert(next, tentative);
                parents.insert(next, Some(entry.node));
                seq += 1;
                queue.push(SearchEntry::new(next, tentative, heuristic(next), seq));
            }
        }
    }

    None
}

fn reconstruct_path(
    parents: &HashMap<StationId, Option<StationId>>,
    start: StationId,
    goal: StationId,
) -> Vec<StationId> {
    let mut path = Vec::new();
    let mut current = Some(goal);
    while let Some(node) = current {
        path.push(node);
        if node == start {
            break;
        }
        current = parents.get(&node).copied().flatten();
    }
    path.reverse();
    path
}

#[derive(Copy, Clone, Debug, Default)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct SearchEntry {
    node: StationId,
    cost: FloatOrd,
    estimate: FloatOrd,
    seq: u64,
}

impl SearchEntry {
    fn new(node: StationId, cost: f64, heuristic: f64, seq: u64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
            estimate: FloatOrd(cost + heuristic),
            seq,
        }
    }
}

impl Ord for SearchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the lowest estimate, oldest entry first.
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SearchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Leg, NetworkMeta};
    use crate::station::Station;
    use chrono::Utc;

    fn diamond() -> ChargeNetwork {
        // 1 -> 2 -> 4 is shorter in time than 1 -> 3 -> 4.
        let stations = vec![
            Station::at(1, 0.0, 0.0),
            Station::at(2, 0.5, 1.0),
            Station::at(3, -0.5, 1.0),
            Station::at(4, 0.0, 2.0),
        ];
        let legs = vec![
            Leg::new(1, 2, 130.0, 4_800.0),
            Leg::new(2, 4, 130.0, 4_800.0),
            Leg::new(1, 3, 130.0, 5_400.0),
            Leg::new(3, 4, 130.0, 5_400.0),
        ];
        let meta = NetworkMeta {
            max_range_km: 700.0,
            min_fast_chargers: 4,
            cluster_diameter_km: 60.0,
            built_at: Utc::now(),
        };
        ChargeNetwork::new(meta, stations, legs).unwrap()
    }

    #[test]
    fn a_star_and_dijkstra_agree_on_diamond() {
        let network = diamond();
        let constraints = LegConstraints::default();
        let a_star = find_route_a_star(&network, 1, 4, &constraints).unwrap();
        let dijkstra = find_route_dijkstra(&network, 1, 4, &constraints).unwrap();
        assert_eq!(a_star, vec![1, 2, 4]);
        assert_eq!(a_star, dijkstra);
    }

    #[test]
    fn max_leg_filter_blocks_every_path() {
        let network = diamond();
        let constraints = LegConstraints {
            min_leg_km: None,
            max_leg_km: Some(100.0),
        };
        assert!(find_route_a_star(&network, 1, 4, &constraints).is_none());
    }

    #[test]
    fn same_start_and_goal_is_trivial() {
        let network = diamond();
        let path = find_route_dijkstra(&network, 3, 3, &LegConstraints::default());
        assert_eq!(path, Some(vec![3]));
    }

    #[test]
    fn equal_estimates_pop_in_insertion_order() {
        let first = SearchEntry::new(10, 5.0, 0.0, 1);
        let second = SearchEntry::new(2, 5.0, 0.0, 2);
        let mut heap = BinaryHeap::from(vec![second, first]);
        assert_eq!(heap.pop().map(|e| e.node), Some(10));
        assert_eq!(heap.pop().map(|e| e.node), Some(2));
    }
}
