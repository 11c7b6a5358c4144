//! Inspect command handler: summarise a built charge network.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use evtrip_lib::output::{format_distance_km, format_duration, StationSummary};
use evtrip_lib::{resolve_network_paths, resolve_station, ChargeNetwork, StationId};

use evtrip_cli::output::{render_json, NetworkOverview, OutputFormat};

#[derive(Debug, Serialize)]
struct NeighbourView {
    id: StationId,
    name: String,
    distance_km: f64,
    duration_s: f64,
}

#[derive(Debug, Serialize)]
struct StationView {
    station: StationSummary,
    neighbours: Vec<NeighbourView>,
}

/// Handle the inspect subcommand.
///
/// With `station` set, prints that station and its legs; otherwise prints the
/// network overview.
pub fn handle_inspect_command(
    network: Option<&Path>,
    format: OutputFormat,
    station: Option<&str>,
) -> Result<()> {
    let paths =
        resolve_network_paths(network).context("failed to resolve the charge network location")?;
    let network_path = &paths.network;
    let network = ChargeNetwork::load(network_path)
        .with_context(|| format!("failed to load network {}", network_path.display()))?;

    let Some(query) = station else {
        let overview = NetworkOverview::from_network(&network);
        match format {
            OutputFormat::Json => render_json(&overview)?,
            OutputFormat::Text => overview.render_text(),
        }
        return Ok(());
    };

    let id = resolve_station(&network, query)?;
    let Some(station) = network.station(id) else {
        anyhow::bail!("station {id} disappeared from the network");
    };
    let view = StationView {
        station: StationSummary::from_station(station),
        neighbours: network
            .neighbours(id)
            .iter()
            .map(|edge| NeighbourView {
                id: edge.target,
                name: network
                    .station(edge.target)
                    .map(|s| s.display_name())
                    .unwrap_or_else(|| edge.target.to_string()),
                distance_km: edge.distance_km,
                duration_s: edge.duration_s,
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => render_json(&view)?,
        OutputFormat::Text => {
            let s = &view.station;
            println!("{} ({})", s.name, s.id);
            println!("  address: {}", s.address);
            println!("  hours: {} | phone: {}", s.hours, s.phone);
            println!("  open since: {}", s.open_date);
            println!("  location: {:.5}, {:.5}", s.lat, s.lng);
            println!("  legs: {}", view.neighbours.len());
            for n in &view.neighbours {
                println!(
                    "   -> {} ({}): {} in {}",
                    n.name,
                    n.id,
                    format_distance_km(n.distance_km),
                    format_duration(n.duration_s)
                );
            }
        }
    }
    Ok(())
}
