//! Station ingestion from the AFDC charge-station CSV export.
//!
//! Columns are matched by header name, so reordered or trimmed exports load
//! without configuration. Rows that cannot be interpreted are skipped and
//! counted instead of failing the whole load.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use geo::{Contains, LineString, Point, Polygon};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::station::{Coordinate, Station, StationId};

/// Default minimum number of DC fast chargers for a station to be kept.
pub const DEFAULT_MIN_FAST_CHARGERS: u32 = 4;

/// Vertices of the mainland North America polygon as `(lat, lng)` pairs.
pub const MAINLAND_NORTH_AMERICA: [(f64, f64); 5] = [
    (52.0, -170.0),
    (71.0, -166.0),
    (46.0, -48.0),
    (24.0, -80.0),
    (24.0, -120.0),
];

static MAINLAND_POLYGON: Lazy<Polygon<f64>> =
    Lazy::new(|| polygon_from_lat_lng(&MAINLAND_NORTH_AMERICA));

fn polygon_from_lat_lng(vertices: &[(f64, f64)]) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = vertices.iter().map(|&(lat, lng)| (lng, lat)).collect();
    Polygon::new(LineString::from(ring), Vec::new())
}

/// Geographic filter applied to ingested stations.
#[derive(Debug, Clone, Default)]
pub enum Region {
    /// The built-in mainland North America polygon.
    #[default]
    MainlandNorthAmerica,
    /// A caller supplied polygon given as `(lat, lng)` vertices.
    Polygon(Vec<(f64, f64)>),
    /// Accept every coordinate.
    Unbounded,
}

impl Region {
    /// Returns `true` when the coordinate lies inside the region.
    pub fn contains(&self, coord: &Coordinate) -> bool {
        let point = Point::new(coord.lng, coord.lat);
        match self {
            Region::MainlandNorthAmerica => MAINLAND_POLYGON.contains(&point),
            Region::Polygon(vertices) => polygon_from_lat_lng(vertices).contains(&point),
            Region::Unbounded => true,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub min_fast_chargers: u32,
    pub region: Region,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_fast_chargers: DEFAULT_MIN_FAST_CHARGERS,
            region: Region::default(),
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Stations that passed every filter, in file order.
    pub stations: Vec<Station>,
    /// Rows skipped because a field could not be parsed.
    pub skipped_malformed: usize,
    /// Rows dropped by the fast-charger or region filter.
    pub filtered_out: usize,
    /// Rows dropped because their id or coordinate was already seen.
    pub duplicates: usize,
}

/// Load stations from a CSV file on disk.
pub fn load_stations(path: &Path, config: &IngestConfig) -> Result<IngestReport> {
    let file = fs::File::open(path)?;
    let report = load_stations_from_reader(file, config)?;
    info!(
        path = %path.display(),
        stations = report.stations.len(),
        skipped = report.skipped_malformed,
        filtered = report.filtered_out,
        duplicates = report.duplicates,
        "loaded charge stations"
    );
    Ok(report)
}

/// Load stations from any reader producing AFDC-style CSV.
pub fn load_stations_from_reader<R: Read>(
    reader: R,
    config: &IngestConfig,
) -> Result<IngestReport> {
    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::Fields)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|err| Error::StationData {
            message: format!("failed to read station headers: {err}"),
        })?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut report = IngestReport::default();
    let mut seen_ids: HashSet<StationId> = HashSet::new();
    let mut seen_coords: HashSet<(u64, u64)> = HashSet::new();

    // Line 1 is the header.
    for (index, record) in csv_reader.records().enumerate() {
        let line = index + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(line, error = %err, "skipping unreadable station row");
                report.skipped_malformed += 1;
                continue;
            }
        };

        let station = match columns.parse(&record) {
            Ok(station) => station,
            Err(reason) => {
                warn!(line, %reason, "skipping malformed station row");
                report.skipped_malformed += 1;
                continue;
            }
        };

        let too_slow = station.fast_chargers < config.min_fast_chargers;
        if too_slow || !config.region.contains(&station.coord) {
            report.filtered_out += 1;
            continue;
        }

        let coord_key = station.coord.identity_key();
        if seen_ids.contains(&station.id) || seen_coords.contains(&coord_key) {
            debug!(line, id = station.id, "dropping duplicate station");
            report.duplicates += 1;
            continue;
        }
        seen_ids.insert(station.id);
        seen_coords.insert(coord_key);
        report.stations.push(station);
    }

    Ok(report)
}

/// Column indices resolved from the header row.
struct Columns {
    id: usize,
    lat: usize,
    lng: usize,
    name: Option<usize>,
    address: Option<usize>,
    phone: Option<usize>,
    hours: Option<usize>,
    fast_count: Option<usize>,
    open_date: Option<usize>,
}

fn normalize(s: &str) -> String {
    s.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(normalize).collect();

        let synonyms: &[(&str, &[&str])] = &[
            ("id", &["ID", "station_id", "id"]),
            ("lat", &["Latitude", "lat"]),
            ("lng", &["Longitude", "lng", "lon", "long"]),
            ("name", &["Station Name", "name"]),
            ("address", &["Street Address", "address"]),
            ("phone", &["Station Phone", "phone"]),
            ("hours", &["Access Days Time", "hours"]),
            (
                "fast_count",
                &["EV DC Fast Count", "dc_fast_count", "fast_chargers"],
            ),
            ("open_date", &["Open Date", "open_date"]),
        ];

        let mut index_map: BTreeMap<&str, usize> = BTreeMap::new();
        for (canon, alts) in synonyms {
            let found = alts.iter().find_map(|alt| {
                let alt = normalize(alt);
                normalized.iter().position(|h| *h == alt)
            });
            if let Some(i) = found {
                index_map.insert(*canon, i);
            }
        }

        let missing: Vec<&str> = ["id", "lat", "lng"]
            .into_iter()
            .filter(|c| !index_map.contains_key(c))
            .collect();
        if !missing.is_empty() {
            return Err(Error::StationData {
                message: format!(
                    "station data missing required columns: {}. Available: {}",
                    missing.join(", "),
                    headers.iter().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        Ok(Self {
            id: index_map["id"],
            lat: index_map["lat"],
            lng: index_map["lng"],
            name: index_map.get("name").copied(),
            address: index_map.get("address").copied(),
            phone: index_map.get("phone").copied(),
            hours: index_map.get("hours").copied(),
            fast_count: index_map.get("fast_count").copied(),
            open_date: index_map.get("open_date").copied(),
        })
    }

    fn parse(&self, record: &StringRecord) -> std::result::Result<Station, String> {
        let required = |idx: usize, field: &str| -> std::result::Result<&str, String> {
            match record.get(idx) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(format!("missing {field}")),
            }
        };

        let id: StationId = required(self.id, "id")?
            .parse()
            .map_err(|_| invalid("id", record.get(self.id).unwrap_or_default()))?;
        let lat: f64 = required(self.lat, "latitude")?
            .parse()
            .map_err(|_| "invalid latitude".to_string())?;
        let lng: f64 = required(self.lng, "longitude")?
            .parse()
            .map_err(|_| "invalid longitude".to_string())?;
        let coord = Coordinate::new(lat, lng);
        if !coord.is_in_range() {
            return Err(format!("coordinate {coord} out of range"));
        }

        let fast_chargers = match self.optional(record, self.fast_count) {
            None => 0,
            Some(raw) => parse_count(raw).ok_or_else(|| invalid("DC fast count", raw))?,
        };

        let open_date = match self.optional(record, self.open_date) {
            None => None,
            Some(raw) => Some(parse_date(raw).ok_or_else(|| invalid("open date", raw))?),
        };

        Ok(Station {
            id,
            coord,
            name: self.optional(record, self.name).map(str::to_string),
            address: self.optional(record, self.address).map(str::to_string),
            hours: self.optional(record, self.hours).map(str::to_string),
            phone: self.optional(record, self.phone).map(str::to_string),
            open_date,
            fast_chargers,
        })
    }

    fn optional<'r>(&self, record: &'r StringRecord, idx: Option<usize>) -> Option<&'r str> {
        idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty())
    }
}

fn invalid(field: &str, raw: &str) -> String {
    format!("invalid {field} '{raw}'")
}

// Some exports write counts as floats ("4.0").
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let value: f64 = raw.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}
