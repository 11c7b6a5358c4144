//! Battery state-of-charge simulation along a route.
//!
//! This module converts a route into a leg-by-leg charge/discharge schedule.
//! The vehicle charges at each origin only as much as the next leg needs to
//! arrive with the minimum state of charge, which keeps stops short because
//! charging slows down as the battery fills.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::routing::RouteLeg;
use crate::station::StationId;

/// Vehicle battery parameters for one trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryParams {
    /// Distance driven on a full battery, in kilometres.
    pub full_range_km: f64,
    /// Lowest state of charge the driver accepts on arrival (0-1).
    pub min_soc: f64,
    /// Highest state of charge the driver is willing to charge to (0-1).
    pub max_soc: f64,
    /// State of charge when leaving the start station (0-1).
    pub start_soc: f64,
}

impl BatteryParams {
    /// Validate the parameters.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] for non-finite values, fractions outside
    /// `[0, 1]` or a non-positive range; [`Error::InfeasibleBatteryBounds`]
    /// when `min_soc >= max_soc`.
    pub fn validate(&self) -> Result<()> {
        if !self.full_range_km.is_finite() || self.full_range_km <= 0.0 {
            return Err(Error::InvalidInput {
                message: format!(
                    "full range must be finite and positive, got {}",
                    self.full_range_km
                ),
            });
        }

        for (name, value) in [
            ("min_soc", self.min_soc),
            ("max_soc", self.max_soc),
            ("start_soc", self.start_soc),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidInput {
                    message: format!("{name} must be between 0 and 1, got {value}"),
                });
            }
        }

        if self.min_soc >= self.max_soc {
            return Err(Error::InfeasibleBatteryBounds {
                message: format!(
                    "minimum state of charge {} must be below maximum {}",
                    self.min_soc, self.max_soc
                ),
            });
        }

        Ok(())
    }

    /// Longest leg that fits between the minimum and maximum state of charge.
    pub fn usable_range_km(&self) -> f64 {
        (self.max_soc - self.min_soc) * self.full_range_km
    }

    /// State of charge consumed by driving `distance_km`.
    pub fn soc_used(&self, distance_km: f64) -> f64 {
        distance_km / self.full_range_km
    }
}

/// Cumulative charging time as a function of state of charge.
pub trait ChargeCurve: Send + Sync {
    /// Seconds needed to charge from empty to `soc`.
    ///
    /// Must be monotonically increasing on `[0, 1]`.
    fn seconds_from_empty(&self, soc: f64) -> f64;

    /// Seconds needed to charge from `from` to `to`; zero when `to <= from`.
    fn charge_seconds(&self, from: f64, to: f64) -> f64 {
        if to <= from {
            0.0
        } else {
            (self.seconds_from_empty(to) - self.seconds_from_empty(from)).max(0.0)
        }
    }
}

/// Fifth-degree fit of a typical DC fast-charging session.
///
/// A full charge takes roughly 63 minutes and the marginal cost per percent
/// rises steeply above 80%.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuinticChargeCurve;

const QUINTIC_COEFFICIENTS: [f64; 5] = [3618.27, -17215.3, 55352.6, -71588.6, 33607.2];

impl ChargeCurve for QuinticChargeCurve {
    fn seconds_from_empty(&self, soc: f64) -> f64 {
        let x = soc.clamp(0.0, 1.0);
        // Horner form of c1*x + c2*x^2 + ... + c5*x^5.
        QUINTIC_COEFFICIENTS
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * x + c)
            * x
    }
}

/// Constant-rate curve, mostly useful for tests and rough estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearChargeCurve {
    /// Seconds to charge from empty to full.
    pub full_charge_s: f64,
}

impl ChargeCurve for LinearChargeCurve {
    fn seconds_from_empty(&self, soc: f64) -> f64 {
        soc.clamp(0.0, 1.0) * self.full_charge_s
    }
}

/// Charge and discharge details for one leg of a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatedLeg {
    pub from: StationId,
    pub to: StationId,
    pub distance_km: f64,
    pub drive_s: f64,
    /// State of charge on arrival at `from` (the start SoC for the first leg).
    pub arrival_soc: f64,
    /// State of charge when leaving `from`, after any charging.
    pub departure_soc: f64,
    /// State of charge on arrival at `to`.
    pub destination_soc: f64,
    /// Seconds spent charging at `from`.
    pub charge_s: f64,
}

/// Result of [`simulate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulation {
    pub legs: Vec<SimulatedLeg>,
    /// State of charge on arrival at the final station.
    pub destination_soc: f64,
}

impl Simulation {
    pub fn total_charge_s(&self) -> f64 {
        self.legs.iter().map(|leg| leg.charge_s).sum()
    }
}

/// Reject routes containing a leg longer than the usable battery window.
pub fn check_feasibility(legs: &[RouteLeg], params: &BatteryParams) -> Result<()> {
    let usable = params.usable_range_km();
    match legs.iter().find(|leg| leg.distance_km > usable) {
        Some(leg) => Err(Error::LegExceedsRange {
            from: leg.from,
            to: leg.to,
            distance_km: leg.distance_km,
            usable_range_km: usable,
        }),
        None => Ok(()),
    }
}

/// Charge needed at an origin and the time it takes.
///
/// Returns `(departure_soc, charge_s)`. The vehicle charges to exactly
/// `min_soc + leg_soc` when it arrives below that level and does not charge
/// otherwise.
pub fn charge_at_origin(
    arrival_soc: f64,
    leg_soc: f64,
    params: &BatteryParams,
    curve: &dyn ChargeCurve,
) -> (f64, f64) {
    let target = (params.min_soc + leg_soc).min(params.max_soc);
    if arrival_soc < target {
        (target, curve.charge_seconds(arrival_soc, target))
    } else {
        (arrival_soc, 0.0)
    }
}

/// Simulate the state of charge along `legs`.
///
/// Validates `params`, then rejects the whole route with
/// [`Error::LegExceedsRange`] if any leg cannot be driven inside the usable
/// window, before simulating anything.
pub fn simulate(
    legs: &[RouteLeg],
    params: &BatteryParams,
    curve: &dyn ChargeCurve,
) -> Result<Simulation> {
    params.validate()?;
    check_feasibility(legs, params)?;

    let mut simulated = Vec::with_capacity(legs.len());
    let mut soc = params.start_soc;

    for leg in legs {
        let leg_soc = params.soc_used(leg.distance_km);
        let (departure_soc, charge_s) = charge_at_origin(soc, leg_soc, params, curve);
        let destination_soc = departure_soc - leg_soc;

        simulated.push(SimulatedLeg {
            from: leg.from,
            to: leg.to,
            distance_km: leg.distance_km,
            drive_s: leg.duration_s,
            arrival_soc: soc,
            departure_soc,
            destination_soc,
            charge_s,
        });
        soc = destination_soc;
    }

    Ok(Simulation {
        legs: simulated,
        destination_soc: soc,
    })
}
