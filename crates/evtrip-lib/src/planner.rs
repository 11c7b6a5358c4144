//! Trip planning entry point and the request/response boundary.
//!
//! [`plan_trip`] routes between two stations and simulates the battery along
//! the result. [`TripResponse`] is the serialisable outcome handed to callers
//! such as a web layer, with failures reduced to a [`ReasonCode`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::battery::{simulate, BatteryParams, ChargeCurve, Simulation};
use crate::error::{Error, Result};
use crate::network::ChargeNetwork;
use crate::output::TripSummary;
use crate::path::LegConstraints;
use crate::routing::{find_route, Route, RouteAlgorithm};
use crate::station::StationId;

pub const DEFAULT_MIN_LEG_KM: f64 = 250.0;
pub const DEFAULT_FULL_RANGE_KM: f64 = 550.0;
pub const DEFAULT_MIN_SOC: f64 = 0.15;
pub const DEFAULT_MAX_SOC: f64 = 1.0;
pub const DEFAULT_START_SOC: f64 = 0.40;

/// A trip planning request. State-of-charge values are fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub start: StationId,
    pub end: StationId,
    /// Legs shorter than this are not considered.
    pub min_leg_km: f64,
    pub full_range_km: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    pub start_soc: f64,
    #[serde(default)]
    pub algorithm: RouteAlgorithm,
}

impl TripRequest {
    /// Request with the default vehicle and comfort settings.
    pub fn new(start: StationId, end: StationId) -> Self {
        Self {
            start,
            end,
            min_leg_km: DEFAULT_MIN_LEG_KM,
            full_range_km: DEFAULT_FULL_RANGE_KM,
            min_soc: DEFAULT_MIN_SOC,
            max_soc: DEFAULT_MAX_SOC,
            start_soc: DEFAULT_START_SOC,
            algorithm: RouteAlgorithm::default(),
        }
    }

    pub fn battery(&self) -> BatteryParams {
        BatteryParams {
            full_range_km: self.full_range_km,
            min_soc: self.min_soc,
            max_soc: self.max_soc,
            start_soc: self.start_soc,
        }
    }
}

/// A planned trip: the route, its battery simulation and totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripPlan {
    /// The request this plan answers.
    pub request: TripRequest,
    pub route: Route,
    pub simulation: Simulation,
    pub total_distance_km: f64,
    pub total_drive_s: f64,
    pub total_charge_s: f64,
    pub total_s: f64,
    /// State of charge on arrival at the destination.
    pub destination_soc: f64,
}

/// Failure reasons reported to callers of the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NoRoute,
    InfeasibleBatteryBounds,
    LegExceedsRange,
    InvalidInput,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::NoRoute => "no_route",
            ReasonCode::InfeasibleBatteryBounds => "infeasible_battery_bounds",
            ReasonCode::LegExceedsRange => "leg_exceeds_range",
            ReasonCode::InvalidInput => "invalid_input",
        }
    }
}

/// Plan a trip from `request.start` to `request.end`.
///
/// A minimum leg length above the usable range leaves no leg to drive and is
/// rejected as [`Error::InvalidInput`].
///
/// Routes with legs limited to `[min_leg_km, usable range]` first. When that
/// fails the route is searched again with only the minimum filter: if a path
/// exists it necessarily contains an over-long leg and the battery simulation
/// rejects it with [`Error::LegExceedsRange`]; otherwise the result is
/// [`Error::NoRoute`].
pub fn plan_trip(
    network: &ChargeNetwork,
    request: &TripRequest,
    curve: &dyn ChargeCurve,
) -> Result<TripPlan> {
    let battery = request.battery();
    battery.validate()?;
    if !request.min_leg_km.is_finite() || request.min_leg_km < 0.0 {
        return Err(Error::InvalidInput {
            message: format!(
                "minimum leg length must be a non-negative number, got {}",
                request.min_leg_km
            ),
        });
    }
    let usable_range_km = battery.usable_range_km();
    if request.min_leg_km > usable_range_km {
        return Err(Error::InvalidInput {
            message: format!(
                "minimum leg length {:.1} km exceeds the usable range of {:.1} km",
                request.min_leg_km, usable_range_km
            ),
        });
    }
    for id in [request.start, request.end] {
        if !network.contains(id) {
            return Err(Error::UnknownStation { id });
        }
    }
    if request.start == request.end {
        return Err(Error::InvalidInput {
            message: format!("start and end are the same station ({})", request.start),
        });
    }

    let min_leg_km = (request.min_leg_km > 0.0).then_some(request.min_leg_km);
    let window = LegConstraints {
        min_leg_km,
        max_leg_km: Some(usable_range_km),
    };

    let (start, end) = (request.start, request.end);
    let route = match find_route(network, start, end, request.algorithm, &window)? {
        Some(route) => route,
        None => {
            debug!(
                start,
                end,
                usable_range_km,
                "no route inside usable range, retrying without the range limit"
            );
            let relaxed = LegConstraints {
                min_leg_km,
                max_leg_km: None,
            };
            find_route(network, start, end, request.algorithm, &relaxed)?
                .ok_or(Error::NoRoute { start, goal: end })?
        }
    };

    let simulation = simulate(&route.legs, &battery, curve)?;
    let total_distance_km = route.total_distance_km();
    let total_drive_s = route.total_drive_s();
    let total_charge_s = simulation.total_charge_s();
    let destination_soc = simulation.destination_soc;

    info!(
        start = request.start,
        end = request.end,
        stops = route.stations.len().saturating_sub(2),
        distance_km = total_distance_km,
        drive_s = total_drive_s,
        charge_s = total_charge_s,
        "planned trip"
    );

    Ok(TripPlan {
        request: request.clone(),
        route,
        simulation,
        total_distance_km,
        total_drive_s,
        total_charge_s,
        total_s: total_drive_s + total_charge_s,
        destination_soc,
    })
}

/// Serialisable planner outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TripResponse {
    Ok { summary: Box<TripSummary> },
    Error { reason: ReasonCode, message: String },
}

impl TripResponse {
    /// Convert a planning result into a response.
    ///
    /// Errors without a request-level reason code are reported as
    /// `invalid_input` with the error text as message.
    pub fn from_result(network: &ChargeNetwork, result: Result<TripPlan>) -> Self {
        match result {
            Ok(plan) => TripResponse::Ok {
                summary: Box::new(TripSummary::from_plan(network, &plan)),
            },
            Err(err) => TripResponse::Error {
                reason: err.reason_code().unwrap_or(ReasonCode::InvalidInput),
                message: err.to_string(),
            },
        }
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            TripResponse::Ok { .. } => None,
            TripResponse::Error { reason, .. } => Some(*reason),
        }
    }
}
