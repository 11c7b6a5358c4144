mod common;

use std::fs;
use std::thread;

use evtrip_lib::network::json_export_path;
use evtrip_lib::{try_load_network, ChargeNetwork, Error, Leg, NetworkHandle, Station};
use tempfile::tempdir;

#[test]
fn binary_cache_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("charge_network.evcn");
    let network = common::grid_network();

    network.save(&path).unwrap();
    let loaded = ChargeNetwork::load(&path).unwrap();

    assert_eq!(loaded, network);
    assert_eq!(loaded.neighbours(1), network.neighbours(1));
    assert_eq!(loaded.max_speed_kmh(), network.max_speed_kmh());
}

#[test]
fn json_export_round_trips_exactly() {
    let dir = tempdir().unwrap();
    let path = json_export_path(&dir.path().join("charge_network.evcn"));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
    let network = common::grid_network();

    network.export_json(&path).unwrap();
    let imported = ChargeNetwork::import_json(&path).unwrap();
    assert_eq!(imported, network);
}

#[test]
fn corrupted_cache_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("charge_network.evcn");
    common::equator_network().save(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    match ChargeNetwork::load(&path) {
        Err(Error::NetworkLoad { message, .. }) => assert!(message.contains("checksum")),
        other => panic!("expected checksum failure, got {other:?}"),
    }
    assert!(try_load_network(&path).is_none());
}

#[test]
fn foreign_files_are_rejected_by_magic() {
    let bytes = vec![0u8; 64];
    let err = ChargeNetwork::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, Error::NetworkDeserialize { .. }));
}

#[test]
fn missing_cache_is_simply_absent() {
    let dir = tempdir().unwrap();
    assert!(try_load_network(&dir.path().join("absent.evcn")).is_none());
}

#[test]
fn legs_must_reference_known_stations() {
    let stations = vec![Station::at(1, 0.0, 0.0), Station::at(2, 0.0, 1.0)];
    let legs = vec![Leg::new(1, 5, 100.0, 3600.0)];
    let err = ChargeNetwork::new(common::meta(700.0), stations, legs).unwrap_err();
    assert!(matches!(err, Error::DanglingLeg { id: 5 }));
}

#[test]
fn instantaneous_legs_are_rejected() {
    let stations = vec![Station::at(1, 0.0, 0.0), Station::at(2, 0.0, 1.0)];
    let legs = vec![Leg::new(1, 2, 111.0, 0.0)];
    let err = ChargeNetwork::new(common::meta(700.0), stations.clone(), legs).unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }), "{err:?}");

    // A zero-length hop taking no time is harmless.
    let legs = vec![Leg::new(1, 2, 0.0, 0.0)];
    assert!(ChargeNetwork::new(common::meta(700.0), stations, legs).is_ok());
}

#[test]
fn legs_at_or_beyond_range_are_dropped() {
    let stations = vec![
        Station::at(1, 0.0, 0.0),
        Station::at(2, 0.0, 1.0),
        Station::at(3, 0.0, 2.0),
    ];
    let legs = vec![
        Leg::new(2, 1, 111.0, 4000.0),
        Leg::new(1, 3, 700.0, 25_000.0),
        Leg::new(1, 2, 120.0, 4100.0),
    ];
    let network = ChargeNetwork::new(common::meta(700.0), stations, legs).unwrap();
    assert_eq!(network.legs().len(), 1);
    let leg = network.leg(2, 1).unwrap();
    assert_eq!((leg.a, leg.b), (1, 2));
    assert_eq!(leg.distance_km, 111.0);
    assert!(network.neighbours(3).is_empty());
}

#[test]
fn readers_keep_their_snapshot_across_a_publish() {
    let handle = NetworkHandle::new(common::equator_network());
    let before = handle.snapshot();
    assert_eq!(before.legs().len(), 2);

    let previous = handle.publish(common::grid_network());
    assert_eq!(previous.stations().len(), before.stations().len());
    assert_eq!(before.legs().len(), 2);
    assert_eq!(handle.snapshot().stations().len(), 16);
}

#[test]
fn concurrent_readers_only_see_complete_networks() {
    let handle = std::sync::Arc::new(NetworkHandle::new(common::equator_network()));
    let grid_legs = common::grid_network().legs().len();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = std::sync::Arc::clone(&handle);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = handle.snapshot();
                    let legs = snapshot.legs().len();
                    assert!(legs == 2 || legs == grid_legs, "saw {legs} legs");
                }
            })
        })
        .collect();

    for _ in 0..10 {
        handle.publish(common::grid_network());
        handle.publish(common::equator_network());
    }
    for reader in readers {
        reader.join().unwrap();
    }
}
