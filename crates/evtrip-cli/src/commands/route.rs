//! Route command handler for planning a trip between two charge stations.

use std::path::Path;

use anyhow::{Context, Result};

use evtrip_lib::{
    plan_trip, resolve_network_paths, resolve_station, ChargeNetwork, Error as PlanError,
    QuinticChargeCurve, RouteAlgorithm, StationId, TripPlan, TripRequest, TripResponse,
};

use evtrip_cli::output::{render_json, render_trip_text, OutputFormat};

/// Arguments for the route command.
#[derive(Debug, Clone)]
pub struct RouteCommandArgs {
    /// Starting station id or name.
    pub from: String,
    /// Destination station id or name.
    pub to: String,
    pub algorithm: RouteAlgorithm,
    pub min_leg_km: f64,
    pub full_range_km: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    pub start_soc: f64,
}

impl RouteCommandArgs {
    /// Convert CLI args to a library request once both stations are resolved.
    pub fn to_request(&self, start: StationId, end: StationId) -> TripRequest {
        TripRequest {
            start,
            end,
            min_leg_km: self.min_leg_km,
            full_range_km: self.full_range_km,
            min_soc: self.min_soc,
            max_soc: self.max_soc,
            start_soc: self.start_soc,
            algorithm: self.algorithm,
        }
    }
}

/// Handle the route subcommand.
///
/// With JSON output every planning failure, including an unknown station,
/// is written as an error [`TripResponse`] before the command fails.
pub fn handle_route_command(
    network: Option<&Path>,
    format: OutputFormat,
    args: &RouteCommandArgs,
) -> Result<()> {
    let paths =
        resolve_network_paths(network).context("failed to resolve the charge network location")?;
    let network = ChargeNetwork::load(&paths.network).with_context(|| {
        format!(
            "failed to load the charge network from {}; run `evtrip build-network` first",
            paths.network.display()
        )
    })?;

    let result = plan_route(&network, args);
    match format {
        OutputFormat::Json => {
            let failed = result.is_err();
            render_json(&TripResponse::from_result(&network, result))?;
            if failed {
                anyhow::bail!("trip planning failed");
            }
        }
        OutputFormat::Text => {
            let plan = result.map_err(|err| handle_route_failure(args, err))?;
            let response = TripResponse::from_result(&network, Ok(plan));
            if let TripResponse::Ok { summary } = response {
                render_trip_text(&summary);
            }
        }
    }
    Ok(())
}

/// Resolve both stations by id or name, then plan the trip.
fn plan_route(network: &ChargeNetwork, args: &RouteCommandArgs) -> evtrip_lib::Result<TripPlan> {
    let start = resolve_station(network, &args.from)?;
    let end = resolve_station(network, &args.to)?;
    plan_trip(network, &args.to_request(start, end), &QuinticChargeCurve)
}

fn handle_route_failure(args: &RouteCommandArgs, err: PlanError) -> anyhow::Error {
    match err {
        PlanError::UnknownStationName { name, suggestions } => {
            anyhow::anyhow!(format_unknown_station_message(&name, &suggestions))
        }
        PlanError::NoRoute { start, goal } => anyhow::anyhow!(
            "No route found between stations {start} and {goal}. \
             Try a lower --min-leg or a different pair of stations."
        ),
        PlanError::LegExceedsRange {
            from,
            to,
            distance_km,
            usable_range_km,
        } => anyhow::anyhow!(
            "The leg from {from} to {to} is {distance_km:.1} km but only {usable_range_km:.1} km \
             fit between {:.0}% and {:.0}% charge. Try a larger --range or a wider charge window.",
            args.min_soc * 100.0,
            args.max_soc * 100.0
        ),
        other => anyhow::Error::new(other),
    }
}

fn format_unknown_station_message(name: &str, suggestions: &[String]) -> String {
    let mut message = format!("Unknown station '{}'.", name);
    if let Some(first) = suggestions.first() {
        let formatted = if suggestions.len() == 1 {
            format!("Did you mean '{first}'?")
        } else {
            let joined = suggestions
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Did you mean one of: {}?", joined)
        };
        message.push(' ');
        message.push_str(&formatted);
    }
    message
}
