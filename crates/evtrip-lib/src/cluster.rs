//! Divisive hierarchical clustering of charge stations.
//!
//! Dense urban areas hold dozens of fast-charging sites within a few
//! kilometres of each other. Querying driving directions between every pair of
//! them is wasteful, so the station set is split recursively until each group
//! fits inside the configured diameter and each group is then represented by a
//! single medoid station.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::station::{great_circle_km, Station, StationId};

/// Default cluster diameter bound in kilometres.
pub const DEFAULT_CLUSTER_DIAMETER_KM: f64 = 60.0;

/// Clustering settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConfig {
    /// Largest allowed great-circle distance between two members of a cluster.
    pub max_diameter_km: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_diameter_km: DEFAULT_CLUSTER_DIAMETER_KM,
        }
    }
}

/// A terminal cluster of stations.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Indices into [`Clustering::stations`].
    pub members: Vec<usize>,
    /// Medoid of the members.
    pub representative: StationId,
    /// Largest pairwise great-circle distance between members.
    pub diameter_km: f64,
}

/// Result of [`cluster_stations`].
#[derive(Debug, Clone, Default)]
pub struct Clustering {
    stations: Vec<Station>,
    clusters: Vec<Cluster>,
    membership: HashMap<StationId, usize>,
}

impl Clustering {
    /// Terminal clusters in discovery order.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// The stations that were clustered, in input order.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// One representative station per cluster, in cluster order.
    pub fn representatives(&self) -> Vec<Station> {
        self.clusters
            .iter()
            .filter_map(|cluster| {
                cluster
                    .members
                    .iter()
                    .map(|&i| &self.stations[i])
                    .find(|s| s.id == cluster.representative)
                    .cloned()
            })
            .collect()
    }

    /// The cluster that contains `id`, if the station was part of the input.
    pub fn cluster_of(&self, id: StationId) -> Option<&Cluster> {
        self.membership.get(&id).map(|&idx| &self.clusters[idx])
    }
}

/// Candidate cluster stored in the work arena.
struct Candidate {
    members: Vec<usize>,
    depth: usize,
}

/// Partition `stations` into clusters whose diameter does not exceed the bound.
///
/// Stations must have finite, pairwise distinct coordinates; otherwise the
/// call fails with [`Error::DegenerateInput`]. The result is deterministic for
/// a fixed input order.
pub fn cluster_stations(stations: &[Station], config: &ClusterConfig) -> Result<Clustering> {
    if !config.max_diameter_km.is_finite() || config.max_diameter_km < 0.0 {
        return Err(Error::InvalidInput {
            message: format!(
                "cluster diameter must be a non-negative number, got {}",
                config.max_diameter_km
            ),
        });
    }
    check_degenerate(stations)?;

    let mut clustering = Clustering {
        stations: stations.to_vec(),
        ..Clustering::default()
    };
    if stations.is_empty() {
        return Ok(clustering);
    }

    let mut arena: Vec<Candidate> = vec![Candidate {
        members: (0..stations.len()).collect(),
        depth: 0,
    }];
    let mut queue: VecDeque<usize> = VecDeque::from([0]);

    while let Some(candidate_id) = queue.pop_front() {
        let members = std::mem::take(&mut arena[candidate_id].members);
        let depth = arena[candidate_id].depth;

        let (seed1, seed2, diameter) = furthest_pair(stations, &members);
        if diameter <= config.max_diameter_km {
            push_terminal(&mut clustering, stations, members, diameter);
            continue;
        }

        let mut first = Vec::new();
        let mut second = Vec::new();
        for &i in &members {
            let d1 = great_circle_km(&stations[i], &stations[seed1]);
            let d2 = great_circle_km(&stations[i], &stations[seed2]);
            if d1 < d2 {
                first.push(i);
            } else {
                second.push(i);
            }
        }

        if first.is_empty() || second.is_empty() {
            warn!(
                members = members.len(),
                diameter_km = diameter,
                "cluster could not be split; accepting it as terminal"
            );
            push_terminal(&mut clustering, stations, members, diameter);
            continue;
        }

        debug!(
            depth,
            left = first.len(),
            right = second.len(),
            diameter_km = diameter,
            "split cluster"
        );
        for half in [first, second] {
            arena.push(Candidate {
                members: half,
                depth: depth + 1,
            });
            queue.push_back(arena.len() - 1);
        }
    }

    info!(
        stations = stations.len(),
        clusters = clustering.clusters.len(),
        candidates = arena.len(),
        max_diameter_km = config.max_diameter_km,
        "clustered charge stations"
    );
    Ok(clustering)
}

fn push_terminal(
    clustering: &mut Clustering,
    stations: &[Station],
    members: Vec<usize>,
    diameter: f64,
) {
    let refs: Vec<&Station> = members.iter().map(|&i| &stations[i]).collect();
    let Some(representative) = medoid(&refs).map(|s| s.id) else {
        return;
    };
    let index = clustering.clusters.len();
    for &i in &members {
        clustering.membership.insert(stations[i].id, index);
    }
    clustering.clusters.push(Cluster {
        members,
        representative,
        diameter_km: diameter,
    });
}

/// Most distant pair among `members`; the first pair in index order wins ties.
fn furthest_pair(stations: &[Station], members: &[usize]) -> (usize, usize, f64) {
    let mut best = (members[0], members[0], 0.0);
    for (pos, &i) in members.iter().enumerate() {
        for &j in &members[pos + 1..] {
            let d = great_circle_km(&stations[i], &stations[j]);
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    best
}

/// Elect the member minimising its maximum great-circle distance to the
/// other members.
///
/// Ties are broken by the smaller total distance and then by the lower
/// station id. Returns `None` for an empty slice.
pub fn medoid<'a>(members: &[&'a Station]) -> Option<&'a Station> {
    members
        .iter()
        .map(|&candidate| {
            let mut max = 0.0_f64;
            let mut total = 0.0;
            for other in members {
                let d = great_circle_km(candidate, other);
                max = max.max(d);
                total += d;
            }
            (candidate, max, total)
        })
        .min_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| a.0.id.cmp(&b.0.id))
        })
        .map(|(station, _, _)| station)
}

fn check_degenerate(stations: &[Station]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut coords = HashSet::new();
    for station in stations {
        if !station.coord.is_finite() {
            return Err(Error::DegenerateInput {
                message: format!("station {} has non-finite coordinates", station.id),
            });
        }
        if !ids.insert(station.id) {
            return Err(Error::DegenerateInput {
                message: format!("station id {} appears more than once", station.id),
            });
        }
        if !coords.insert(station.coord.identity_key()) {
            return Err(Error::DegenerateInput {
                message: format!(
                    "station {} duplicates coordinate {}",
                    station.id, station.coord
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_is_its_own_representative() {
        let stations = vec![Station::at(9, 45.0, -75.0)];
        let clustering = cluster_stations(&stations, &ClusterConfig::default()).unwrap();
        assert_eq!(clustering.clusters().len(), 1);
        assert_eq!(clustering.clusters()[0].representative, 9);
        assert_eq!(clustering.clusters()[0].diameter_km, 0.0);
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clustering = cluster_stations(&[], &ClusterConfig::default()).unwrap();
        assert!(clustering.clusters().is_empty());
        assert!(clustering.representatives().is_empty());
    }

    #[test]
    fn medoid_prefers_central_member() {
        let west = Station::at(1, 0.0, 0.0);
        let middle = Station::at(2, 0.0, 0.1);
        let east = Station::at(3, 0.0, 0.2);
        let chosen = medoid(&[&west, &middle, &east]).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn duplicate_coordinates_are_degenerate() {
        let stations = vec![Station::at(1, 10.0, 10.0), Station::at(2, 10.0, 10.0)];
        let err = cluster_stations(&stations, &ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DegenerateInput { .. }));
    }

    #[test]
    fn nan_coordinates_are_degenerate() {
        let stations = vec![Station::at(1, f64::NAN, 10.0)];
        let err = cluster_stations(&stations, &ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DegenerateInput { .. }));
    }
}
