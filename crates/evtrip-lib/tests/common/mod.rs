#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use evtrip_lib::{
    great_circle_km, ChargeNetwork, DirectionsError, DirectionsRequest, DirectionsRoute,
    DirectionsService, Leg, NetworkMeta, PairKey, Station, StationId,
};

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures")
}

pub fn meta(max_range_km: f64) -> NetworkMeta {
    NetworkMeta {
        max_range_km,
        min_fast_chargers: 4,
        cluster_diameter_km: 60.0,
        built_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

/// Three stations on the equator, five degrees (about 556 km) apart.
pub fn equator_stations() -> Vec<Station> {
    vec![
        Station::at(1, 0.0, 0.0).with_name("Alpha"),
        Station::at(2, 0.0, 5.0).with_name("Bravo"),
        Station::at(3, 0.0, 10.0).with_name("Charlie"),
    ]
}

/// Leg between two stations whose road distance equals the great-circle
/// distance, driven at 100 km/h.
pub fn straight_leg(a: &Station, b: &Station) -> Leg {
    let distance_km = great_circle_km(a, b);
    Leg::new(a.id, b.id, distance_km, distance_km * 36.0)
}

/// A -> B -> C chain, plus an isolated station 4 that nothing reaches.
pub fn equator_network() -> ChargeNetwork {
    let mut stations = equator_stations();
    let legs = vec![
        straight_leg(&stations[0], &stations[1]),
        straight_leg(&stations[1], &stations[2]),
    ];
    stations.push(Station::at(4, 10.0, 0.0).with_name("Isolated"));
    ChargeNetwork::new(meta(700.0), stations, legs).expect("equator network is valid")
}

/// Small grid of stations with redundant legs so several paths compete.
pub fn grid_network() -> ChargeNetwork {
    let mut stations = Vec::new();
    for row in 0..4 {
        for col in 0..4 {
            let id = (row * 4 + col + 1) as StationId;
            let (lat, lng) = (40.0 + row as f64 * 2.0, -100.0 + col as f64 * 2.5);
            stations.push(Station::at(id, lat, lng));
        }
    }
    let mut legs = Vec::new();
    for (i, a) in stations.iter().enumerate() {
        for b in &stations[i + 1..] {
            let gc = great_circle_km(a, b);
            if gc < 450.0 {
                // Detours vary by pair so costs are not symmetric in the grid.
                let detour = 1.1 + ((a.id * 7 + b.id * 3) % 5) as f64 * 0.05;
                let distance_km = gc * detour;
                legs.push(Leg::new(a.id, b.id, distance_km, distance_km * 40.0));
            }
        }
    }
    ChargeNetwork::new(meta(700.0), stations, legs).expect("grid network is valid")
}

/// Scriptable directions service answering with great-circle distance
/// scaled by a detour factor.
pub struct MockDirections {
    stations: Vec<Station>,
    detour: f64,
    delay: Duration,
    always_transient: bool,
    fatal: HashSet<PairKey>,
    no_route: HashSet<PairKey>,
    scripted: Mutex<HashMap<PairKey, VecDeque<DirectionsError>>>,
    calls: Mutex<Vec<(PairKey, DirectionsRequest)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockDirections {
    pub fn new(stations: &[Station]) -> Self {
        Self {
            stations: stations.to_vec(),
            detour: 1.0,
            delay: Duration::ZERO,
            always_transient: false,
            fatal: HashSet::new(),
            no_route: HashSet::new(),
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_detour(mut self, detour: f64) -> Self {
        self.detour = detour;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn always_transient(mut self) -> Self {
        self.always_transient = true;
        self
    }

    pub fn with_no_route(mut self, a: StationId, b: StationId) -> Self {
        self.no_route.insert(PairKey::new(a, b));
        self
    }

    pub fn with_fatal(mut self, a: StationId, b: StationId) -> Self {
        self.fatal.insert(PairKey::new(a, b));
        self
    }

    /// Fail the next `count` queries for the pair with a transient error.
    pub fn with_transient_failures(self, a: StationId, b: StationId, count: usize) -> Self {
        {
            let mut scripted = self.scripted.lock().unwrap();
            let queue = scripted.entry(PairKey::new(a, b)).or_default();
            for n in 0..count {
                queue.push_back(DirectionsError::Transient {
                    message: format!("scripted failure {n}"),
                });
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<(PairKey, DirectionsRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, a: StationId, b: StationId) -> usize {
        let key = PairKey::new(a, b);
        let calls = self.calls.lock().unwrap();
        calls.iter().filter(|(k, _)| *k == key).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn station_at(&self, request_coord: &evtrip_lib::Coordinate) -> &Station {
        self.stations
            .iter()
            .find(|s| s.coord == *request_coord)
            .expect("request coordinate belongs to a known station")
    }
}

impl DirectionsService for MockDirections {
    fn route(&self, request: &DirectionsRequest) -> Result<DirectionsRoute, DirectionsError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let origin = self.station_at(&request.origin);
        let destination = self.station_at(&request.destination);
        let key = PairKey::new(origin.id, destination.id);
        self.calls.lock().unwrap().push((key, request.clone()));

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());

        let result = if let Some(error) = scripted {
            Err(error)
        } else if self.always_transient {
            Err(DirectionsError::Transient {
                message: "service unavailable".to_string(),
            })
        } else if self.fatal.contains(&key) {
            Err(DirectionsError::Fatal {
                message: "REQUEST_DENIED".to_string(),
            })
        } else if self.no_route.contains(&key) {
            Err(DirectionsError::NoRoute {
                status: "ZERO_RESULTS".to_string(),
            })
        } else {
            let distance_km = great_circle_km(origin, destination) * self.detour;
            Ok(DirectionsRoute {
                distance_km,
                duration_s: distance_km * 36.0,
                polyline: None,
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
