//! The charge network: representative stations joined by drivable legs.
//!
//! # Serialization Format
//!
//! ```text
//! Header (16 bytes):
//!   - Magic: b"EVCN" (4 bytes)
//!   - Version: u8 (1 byte)
//!   - Flags: u8 (1 byte), reserved and currently zero
//!   - Station count: u32 LE (4 bytes)
//!   - Leg count: u32 LE (4 bytes)
//!   - Reserved: 2 bytes
//!
//! Body:
//!   - postcard-serialized payload (metadata, stations, legs)
//!   - zstd compressed
//!
//! Footer (32 bytes):
//!   - SHA-256 checksum of compressed body
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::station::{PairKey, Station, StationId};

/// Magic bytes identifying a charge network file.
const NETWORK_MAGIC: &[u8; 4] = b"EVCN";

/// Current network format version.
const NETWORK_VERSION: u8 = 1;

const HEADER_SIZE: usize = 16;

const CHECKSUM_SIZE: usize = 32;

/// zstd compression level (balanced speed/ratio).
const COMPRESSION_LEVEL: i32 = 3;

/// Undirected drivable connection between two stations, stored with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub a: StationId,
    pub b: StationId,
    pub distance_km: f64,
    pub duration_s: f64,
}

impl Leg {
    /// Create a leg, ordering the endpoints canonically.
    pub fn new(a: StationId, b: StationId, distance_km: f64, duration_s: f64) -> Self {
        let key = PairKey::new(a, b);
        Self {
            a: key.low(),
            b: key.high(),
            distance_km,
            duration_s,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.a, self.b)
    }

    /// Average speed over the leg in km/h, if the leg takes any time.
    pub fn speed_kmh(&self) -> Option<f64> {
        (self.duration_s > 0.0).then(|| self.distance_km / (self.duration_s / 3600.0))
    }
}

/// Adjacency entry for one direction of a leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub target: StationId,
    pub distance_km: f64,
    pub duration_s: f64,
}

/// Build parameters recorded alongside the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMeta {
    pub max_range_km: f64,
    pub min_fast_chargers: u32,
    pub cluster_diameter_km: f64,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct NetworkPayload {
    meta: NetworkMeta,
    stations: Vec<Station>,
    legs: Vec<Leg>,
}

/// Weighted undirected graph of representative stations.
///
/// Immutable after construction; share it behind an [`Arc`] (see
/// [`NetworkHandle`]).
#[derive(Debug, Clone)]
pub struct ChargeNetwork {
    meta: NetworkMeta,
    stations: Vec<Station>,
    legs: Vec<Leg>,
    station_index: HashMap<StationId, usize>,
    leg_index: HashMap<PairKey, usize>,
    adjacency: HashMap<StationId, Vec<Edge>>,
    max_speed_kmh: f64,
}

impl PartialEq for ChargeNetwork {
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta && self.stations == other.stations && self.legs == other.legs
    }
}

impl ChargeNetwork {
    /// Assemble a network, validating legs against the station set.
    ///
    /// Legs that reference unknown stations fail with [`Error::DanglingLeg`].
    /// Negative or non-finite lengths, and legs that cover distance in zero
    /// time, fail with [`Error::InvalidInput`].
    /// Legs at or beyond `meta.max_range_km`, self-loops and repeated pairs are
    /// dropped with a log entry.
    pub fn new(meta: NetworkMeta, stations: Vec<Station>, legs: Vec<Leg>) -> Result<Self> {
        if !meta.max_range_km.is_finite() || meta.max_range_km <= 0.0 {
            return Err(Error::InvalidInput {
                message: format!(
                    "network max range must be positive, got {}",
                    meta.max_range_km
                ),
            });
        }

        let mut station_index = HashMap::with_capacity(stations.len());
        for (i, station) in stations.iter().enumerate() {
            if station_index.insert(station.id, i).is_some() {
                return Err(Error::InvalidInput {
                    message: format!(
                        "station {} appears more than once in the network",
                        station.id
                    ),
                });
            }
        }

        let mut kept: Vec<Leg> = Vec::with_capacity(legs.len());
        let mut leg_index: HashMap<PairKey, usize> = HashMap::with_capacity(legs.len());
        for raw in legs {
            let leg = Leg::new(raw.a, raw.b, raw.distance_km, raw.duration_s);
            for id in [leg.a, leg.b] {
                if !station_index.contains_key(&id) {
                    return Err(Error::DanglingLeg { id });
                }
            }
            if !leg.distance_km.is_finite()
                || leg.distance_km < 0.0
                || !leg.duration_s.is_finite()
                || leg.duration_s < 0.0
            {
                return Err(Error::InvalidInput {
                    message: format!("leg {} has invalid distance or duration", leg.key()),
                });
            }
            // The A* heuristic divides by the fastest leg speed.
            if leg.distance_km > 0.0 && leg.duration_s == 0.0 {
                return Err(Error::InvalidInput {
                    message: format!("leg {} covers distance in zero time", leg.key()),
                });
            }
            if leg.a == leg.b {
                warn!(station = leg.a, "dropping self-loop leg");
                continue;
            }
            if leg.distance_km >= meta.max_range_km {
                warn!(
                    pair = %leg.key(),
                    distance_km = leg.distance_km,
                    max_range_km = meta.max_range_km,
                    "dropping leg beyond maximum range"
                );
                continue;
            }
            if leg_index.contains_key(&leg.key()) {
                debug!(pair = %leg.key(), "dropping duplicate leg");
                continue;
            }
            leg_index.insert(leg.key(), kept.len());
            kept.push(leg);
        }

        kept.sort_by_key(Leg::key);
        let leg_index = kept
            .iter()
            .enumerate()
            .map(|(i, leg)| (leg.key(), i))
            .collect();

        let mut adjacency: HashMap<StationId, Vec<Edge>> =
            stations.iter().map(|s| (s.id, Vec::new())).collect();
        for leg in &kept {
            for (from, to) in [(leg.a, leg.b), (leg.b, leg.a)] {
                if let Some(edges) = adjacency.get_mut(&from) {
                    edges.push(Edge {
                        target: to,
                        distance_km: leg.distance_km,
                        duration_s: leg.duration_s,
                    });
                }
            }
        }
        for edges in adjacency.values_mut() {
            edges.sort_by_key(|edge| edge.target);
        }

        let max_speed_kmh = kept
            .iter()
            .filter_map(Leg::speed_kmh)
            .fold(0.0_f64, f64::max);

        Ok(Self {
            meta,
            stations,
            legs: kept,
            station_index,
            leg_index,
            adjacency,
            max_speed_kmh,
        })
    }

    pub fn meta(&self) -> &NetworkMeta {
        &self.meta
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Legs ordered by canonical pair.
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.station_index.get(&id).map(|&i| &self.stations[i])
    }

    pub fn contains(&self, id: StationId) -> bool {
        self.station_index.contains_key(&id)
    }

    /// Edges leaving `id`, sorted by target id. Unknown ids have no edges.
    pub fn neighbours(&self, id: StationId) -> &[Edge] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The leg joining `a` and `b` in either order.
    pub fn leg(&self, a: StationId, b: StationId) -> Option<&Leg> {
        let index = *self.leg_index.get(&PairKey::new(a, b))?;
        Some(&self.legs[index])
    }

    /// Fastest average speed over any leg, in km/h. Zero for a network
    /// without timed legs.
    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    /// Find stations by exact (case-insensitive) name.
    pub fn stations_named(&self, name: &str) -> Vec<&Station> {
        self.stations
            .iter()
            .filter(|s| matches!(&s.name, Some(n) if n.eq_ignore_ascii_case(name)))
            .collect()
    }

    /// Closest station names to `name`, best first.
    pub fn fuzzy_station_matches(&self, name: &str, limit: usize) -> Vec<String> {
        let needle = name.to_lowercase();
        let mut scored: Vec<(f64, &str)> = self
            .stations
            .iter()
            .filter_map(|s| s.name.as_deref())
            .map(|candidate| {
                let score = strsim::jaro_winkler(&needle, &candidate.to_lowercase());
                (score, candidate)
            })
            .filter(|(score, _)| *score >= 0.8)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored
            .into_iter()
            .take(limit)
            .map(|(_, n)| n.to_string())
            .collect()
    }

    /// Encode the network in the binary cache format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = NetworkPayload {
            meta: self.meta.clone(),
            stations: self.stations.clone(),
            legs: self.legs.clone(),
        };
        let serialized = postcard::to_allocvec(&payload).map_err(|e| Error::NetworkSerialize {
            message: format!("postcard serialization failed: {e}"),
        })?;
        let compressed = zstd::encode_all(serialized.as_slice(), COMPRESSION_LEVEL).map_err(|e| {
            Error::NetworkSerialize {
                message: format!("zstd compression failed: {e}"),
            }
        })?;
        let checksum = Sha256::digest(&compressed);

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(NETWORK_MAGIC);
        header[4] = NETWORK_VERSION;
        header[5] = 0;
        header[6..10].copy_from_slice(&(self.stations.len() as u32).to_le_bytes());
        header[10..14].copy_from_slice(&(self.legs.len() as u32).to_le_bytes());

        let mut bytes = Vec::with_capacity(HEADER_SIZE + compressed.len() + CHECKSUM_SIZE);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&compressed);
        bytes.extend_from_slice(&checksum);
        Ok(bytes)
    }

    /// Decode a network from the binary cache format, verifying the checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let invalid = |message: String| Error::NetworkDeserialize { message };

        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(invalid(format!("file too short ({} bytes)", bytes.len())));
        }
        let (header, rest) = bytes.split_at(HEADER_SIZE);
        if &header[0..4] != NETWORK_MAGIC {
            return Err(invalid("invalid magic bytes".to_string()));
        }
        let version = header[4];
        if version != NETWORK_VERSION {
            return Err(invalid(format!(
                "unsupported version {version} (expected {NETWORK_VERSION})"
            )));
        }
        let station_count = read_u32(&header[6..10]);
        let leg_count = read_u32(&header[10..14]);

        let (compressed, stored_checksum) = rest.split_at(rest.len() - CHECKSUM_SIZE);
        let computed = Sha256::digest(compressed);
        if computed.as_slice() != stored_checksum {
            return Err(invalid("checksum mismatch - file may be corrupted".to_string()));
        }

        let decompressed = zstd::decode_all(compressed)
            .map_err(|e| invalid(format!("zstd decompression failed: {e}")))?;
        let payload: NetworkPayload = postcard::from_bytes(&decompressed)
            .map_err(|e| invalid(format!("postcard deserialization failed: {e}")))?;

        if payload.stations.len() != station_count as usize
            || payload.legs.len() != leg_count as usize
        {
            warn!(
                expected_stations = station_count,
                actual_stations = payload.stations.len(),
                expected_legs = leg_count,
                actual_legs = payload.legs.len(),
                "count mismatch in charge network header"
            );
        }

        Self::new(payload.meta, payload.stations, payload.legs)
    }

    /// Write the binary cache to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        info!(
            path = %path.display(),
            stations = self.stations.len(),
            legs = self.legs.len(),
            file_size = bytes.len(),
            "charge network saved"
        );
        Ok(())
    }

    /// Read a binary cache from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading charge network");
        let bytes = fs::read(path).map_err(|e| Error::NetworkLoad {
            path: path.to_path_buf(),
            message: format!("failed to read file: {e}"),
        })?;
        let network = Self::from_bytes(&bytes).map_err(|e| Error::NetworkLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(
            stations = network.stations.len(),
            legs = network.legs.len(),
            "loaded charge network"
        );
        Ok(network)
    }

    /// Write the network as pretty-printed JSON.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let payload = NetworkPayload {
            meta: self.meta.clone(),
            stations: self.stations.clone(),
            legs: self.legs.clone(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &payload)?;
        writer.flush()?;
        info!(path = %path.display(), "charge network exported as JSON");
        Ok(())
    }

    /// Read a network previously written by [`ChargeNetwork::export_json`].
    pub fn import_json(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let payload: NetworkPayload = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::new(payload.meta, payload.stations, payload.legs)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Path of the JSON export that sits next to a binary cache.
pub fn json_export_path(network_path: &Path) -> PathBuf {
    network_path.with_extension("json")
}

/// Load a network if the file exists and is valid, logging and returning
/// `None` otherwise.
pub fn try_load_network(path: &Path) -> Option<ChargeNetwork> {
    if !path.exists() {
        return None;
    }
    match ChargeNetwork::load(path) {
        Ok(network) => Some(network),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to load charge network, it must be rebuilt"
            );
            None
        }
    }
}

/// Shared, atomically replaceable reference to the current network.
///
/// Readers take an [`Arc`] snapshot and keep using it even if a rebuild is
/// published meanwhile.
#[derive(Debug)]
pub struct NetworkHandle {
    current: RwLock<Arc<ChargeNetwork>>,
}

impl NetworkHandle {
    pub fn new(network: ChargeNetwork) -> Self {
        Self {
            current: RwLock::new(Arc::new(network)),
        }
    }

    pub fn snapshot(&self) -> Arc<ChargeNetwork> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in a new network, returning the previous snapshot.
    pub fn publish(&self, network: ChargeNetwork) -> Arc<ChargeNetwork> {
        let next = Arc::new(network);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            stations = next.stations.len(),
            legs = next.legs.len(),
            "published charge network"
        );
        std::mem::replace(&mut *guard, next)
    }
}
