use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::network::ChargeNetwork;
use crate::planner::{TripPlan, TripRequest};
use crate::routing::RouteAlgorithm;
use crate::station::{Station, StationId};

/// Placeholder shown for station fields the data source does not provide.
pub const NOT_AVAILABLE: &str = "not available";

/// Station metadata formatted for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StationSummary {
    pub id: StationId,
    pub name: String,
    pub address: String,
    pub hours: String,
    pub phone: String,
    pub open_date: String,
    pub lat: f64,
    pub lng: f64,
}

impl StationSummary {
    pub fn from_station(station: &Station) -> Self {
        let text = |value: &Option<String>| match value {
            Some(value) => value.clone(),
            None => NOT_AVAILABLE.to_string(),
        };
        Self {
            id: station.id,
            name: text(&station.name),
            address: text(&station.address),
            hours: text(&station.hours),
            phone: text(&station.phone),
            open_date: station
                .open_date
                .map(format_open_date)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            lat: station.coord.lat,
            lng: station.coord.lng,
        }
    }

    /// Summary for an id the network does not know; every field is unavailable.
    fn missing(id: StationId) -> Self {
        Self {
            id,
            name: NOT_AVAILABLE.to_string(),
            address: NOT_AVAILABLE.to_string(),
            hours: NOT_AVAILABLE.to_string(),
            phone: NOT_AVAILABLE.to_string(),
            open_date: NOT_AVAILABLE.to_string(),
            lat: f64::NAN,
            lng: f64::NAN,
        }
    }

    fn lookup(network: &ChargeNetwork, id: StationId) -> Self {
        network
            .station(id)
            .map(Self::from_station)
            .unwrap_or_else(|| Self::missing(id))
    }
}

/// One leg of the trip: where it starts, how long it takes and how the
/// battery behaves.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LegSummary {
    pub charge_station: StationSummary,
    pub to: StationId,
    pub driving_distance: String,
    pub driving_time: String,
    pub charge_time: String,
    pub battery_start: String,
    pub battery_end: String,
    pub distance_km: f64,
    pub drive_s: f64,
    pub charge_s: f64,
    pub arrival_soc: f64,
    pub departure_soc: f64,
}

/// Formatted trip totals.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PathSummary {
    pub total_driving_distance: String,
    pub total_driving_time: String,
    pub total_charge_time: String,
    pub total_time: String,
    pub total_distance_km: f64,
    pub total_drive_s: f64,
    pub total_charge_s: f64,
    pub total_s: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DestinationSummary {
    pub charge_station: StationSummary,
    pub dest_start_battery: String,
    pub destination_soc: f64,
}

/// Display-ready view of a [`TripPlan`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripSummary {
    /// Echo of the parameters the trip was planned with.
    pub request: TripRequest,
    pub algorithm: RouteAlgorithm,
    pub path_summary: PathSummary,
    pub legs_summary: Vec<LegSummary>,
    pub destination_summary: DestinationSummary,
}

impl TripSummary {
    pub fn from_plan(network: &ChargeNetwork, plan: &TripPlan) -> Self {
        let legs_summary = plan
            .simulation
            .legs
            .iter()
            .map(|leg| LegSummary {
                charge_station: StationSummary::lookup(network, leg.from),
                to: leg.to,
                driving_distance: format_distance_km(leg.distance_km),
                driving_time: format_duration(leg.drive_s),
                charge_time: format_duration(leg.charge_s),
                battery_start: format_soc(leg.arrival_soc),
                battery_end: format_soc(leg.departure_soc),
                distance_km: leg.distance_km,
                drive_s: leg.drive_s,
                charge_s: leg.charge_s,
                arrival_soc: leg.arrival_soc,
                departure_soc: leg.departure_soc,
            })
            .collect();

        let goal = plan.route.goal().unwrap_or_default();
        Self {
            request: plan.request.clone(),
            algorithm: plan.route.algorithm,
            path_summary: PathSummary {
                total_driving_distance: format_distance_km(plan.total_distance_km),
                total_driving_time: format_duration(plan.total_drive_s),
                total_charge_time: format_duration(plan.total_charge_s),
                total_time: format_duration(plan.total_s),
                total_distance_km: plan.total_distance_km,
                total_drive_s: plan.total_drive_s,
                total_charge_s: plan.total_charge_s,
                total_s: plan.total_s,
            },
            legs_summary,
            destination_summary: DestinationSummary {
                charge_station: StationSummary::lookup(network, goal),
                dest_start_battery: format_soc(plan.destination_soc),
                destination_soc: plan.destination_soc,
            },
        }
    }

    /// Plain-text rendering used by the CLI.
    pub fn render_text(&self) -> String {
        let mut buffer = String::new();
        let start = self
            .legs_summary
            .first()
            .map(|leg| leg.charge_station.name.as_str())
            .unwrap_or(NOT_AVAILABLE);
        let _ = writeln!(
            buffer,
            "Trip: {} -> {} ({} legs, algorithm: {})",
            start,
            self.destination_summary.charge_station.name,
            self.legs_summary.len(),
            self.algorithm
        );
        let _ = writeln!(
            buffer,
            "Distance: {} | Driving: {} | Charging: {} | Total: {}",
            self.path_summary.total_driving_distance,
            self.path_summary.total_driving_time,
            self.path_summary.total_charge_time,
            self.path_summary.total_time
        );

        for (index, leg) in self.legs_summary.iter().enumerate() {
            let station = &leg.charge_station;
            let _ = writeln!(buffer, "{:>3}: {} ({})", index, station.name, station.id);
            let _ = writeln!(buffer, "     address: {}", station.address);
            let _ = writeln!(
                buffer,
                "     hours: {} | phone: {} | open since: {}",
                station.hours, station.phone, station.open_date
            );
            let _ = writeln!(
                buffer,
                "     battery {} -> {} (charge {}), drive {} in {}",
                leg.battery_start,
                leg.battery_end,
                leg.charge_time,
                leg.driving_distance,
                leg.driving_time
            );
        }

        let destination = &self.destination_summary;
        let _ = writeln!(
            buffer,
            "{:>3}: {} ({}) arriving with {}",
            self.legs_summary.len(),
            destination.charge_station.name,
            destination.charge_station.id,
            destination.dest_start_battery
        );
        buffer
    }
}

/// Format seconds as `"x hrs y mins z secs"`, or `"y mins z secs"` below one hour.
///
/// The value is rounded to whole seconds first.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = total % 3600 / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours} hrs {minutes} mins {secs} secs")
    } else {
        format!("{minutes} mins {secs} secs")
    }
}

/// Format kilometres with thousands separators and one decimal, e.g. `"1,234.5 kms"`.
pub fn format_distance_km(km: f64) -> String {
    let tenths = (km * 10.0).round() as i64;
    let sign = if tenths < 0 { "-" } else { "" };
    let tenths = tenths.unsigned_abs();
    let whole = (tenths / 10).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}{grouped}.{} kms", tenths % 10)
}

/// Format a state-of-charge fraction as a percentage with one decimal.
pub fn format_soc(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Format an open date as `"March 9 2021"`.
pub fn format_open_date(date: NaiveDate) -> String {
    date.format("%B %-d %Y").to_string()
}
