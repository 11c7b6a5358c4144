use evtrip_lib::{cluster_stations, great_circle_km, ClusterConfig, Error, Station};

fn config(max_diameter_km: f64) -> ClusterConfig {
    ClusterConfig { max_diameter_km }
}

/// Stations scattered around a few cities, a few dozen km apart inside each city.
fn metro_stations() -> Vec<Station> {
    let centres = [
        (41.88, -87.63),
        (43.04, -87.91),
        (42.33, -83.05),
        (39.77, -86.16),
    ];
    let offsets = [
        (0.0, 0.0),
        (0.12, 0.05),
        (-0.08, 0.15),
        (0.2, -0.2),
        (-0.15, -0.1),
    ];
    let mut stations = Vec::new();
    let mut id = 1;
    for (lat, lng) in centres {
        for (dlat, dlng) in offsets {
            stations.push(Station::at(id, lat + dlat, lng + dlng));
            id += 1;
        }
    }
    stations
}

#[test]
fn two_close_stations_share_a_cluster() {
    // 0.36 degrees of latitude is about 40 km.
    let stations = vec![Station::at(7, 45.0, -75.0), Station::at(3, 45.36, -75.0)];
    assert!((great_circle_km(&stations[0], &stations[1]) - 40.0).abs() < 0.5);

    let clustering = cluster_stations(&stations, &config(60.0)).unwrap();
    assert_eq!(clustering.clusters().len(), 1);
    let cluster = &clustering.clusters()[0];
    assert_eq!(cluster.members.len(), 2);
    // Both are equally central; the lower id wins.
    assert_eq!(cluster.representative, 3);
}

#[test]
fn representative_is_the_most_central_member() {
    let stations = vec![
        Station::at(1, 45.0, -75.0),
        Station::at(2, 45.2, -75.0),
        Station::at(3, 45.4, -75.0),
    ];
    let clustering = cluster_stations(&stations, &config(60.0)).unwrap();
    assert_eq!(clustering.clusters().len(), 1);
    assert_eq!(clustering.clusters()[0].representative, 2);
    assert_eq!(clustering.representatives().len(), 1);
    assert_eq!(clustering.representatives()[0].id, 2);
}

#[test]
fn every_station_lands_in_exactly_one_cluster_within_the_bound() {
    let stations = metro_stations();
    let clustering = cluster_stations(&stations, &config(30.0)).unwrap();

    let mut seen = vec![0usize; stations.len()];
    for cluster in clustering.clusters() {
        let diameter = cluster.diameter_km;
        assert!(diameter <= 30.0, "cluster diameter {diameter}");
        for (pos, &i) in cluster.members.iter().enumerate() {
            seen[i] += 1;
            for &j in &cluster.members[pos + 1..] {
                assert!(great_circle_km(&stations[i], &stations[j]) <= 30.0);
            }
        }
        let ids: Vec<_> = cluster.members.iter().map(|&i| stations[i].id).collect();
        assert!(ids.contains(&cluster.representative));
    }
    assert!(seen.iter().all(|&count| count == 1));

    for station in &stations {
        let cluster = clustering.cluster_of(station.id).expect("station assigned");
        let ids: Vec<_> = cluster.members.iter().map(|&i| stations[i].id).collect();
        assert!(ids.contains(&station.id));
    }
}

#[test]
fn distant_cities_never_merge() {
    let clustering = cluster_stations(&metro_stations(), &config(60.0)).unwrap();
    assert!(clustering.clusters().len() >= 4);
}

#[test]
fn zero_diameter_yields_singletons() {
    let stations = metro_stations();
    let clustering = cluster_stations(&stations, &config(0.0)).unwrap();
    assert_eq!(clustering.clusters().len(), stations.len());
    assert!(clustering.clusters().iter().all(|c| c.members.len() == 1));
}

#[test]
fn clustering_is_deterministic() {
    let stations = metro_stations();
    let first = cluster_stations(&stations, &config(25.0)).unwrap();
    let second = cluster_stations(&stations, &config(25.0)).unwrap();
    assert_eq!(first.clusters(), second.clusters());
}

#[test]
fn empty_input_gives_no_clusters() {
    let clustering = cluster_stations(&[], &config(60.0)).unwrap();
    assert!(clustering.clusters().is_empty());
}

#[test]
fn duplicate_coordinates_are_degenerate() {
    let stations = vec![Station::at(1, 45.0, -75.0), Station::at(2, 45.0, -75.0)];
    let err = cluster_stations(&stations, &config(60.0)).unwrap_err();
    assert!(matches!(err, Error::DegenerateInput { .. }));
}

#[test]
fn signed_zero_coordinates_are_degenerate() {
    let stations = vec![Station::at(1, 0.0, -75.0), Station::at(2, -0.0, -75.0)];
    let err = cluster_stations(&stations, &config(60.0)).unwrap_err();
    assert!(matches!(err, Error::DegenerateInput { .. }));
}

#[test]
fn nan_coordinates_are_degenerate() {
    let stations = vec![Station::at(1, f64::NAN, -75.0), Station::at(2, 45.0, -75.0)];
    let err = cluster_stations(&stations, &config(60.0)).unwrap_err();
    assert!(matches!(err, Error::DegenerateInput { .. }));
}
