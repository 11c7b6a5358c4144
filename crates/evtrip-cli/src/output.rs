//! Output formatting for CLI commands.

use std::fmt;
use std::io::{self, Write};

use clap::ValueEnum;
use serde::Serialize;

use evtrip_lib::output::{format_distance_km, format_duration};
use evtrip_lib::{ChargeNetwork, DiscoveryReport, TripSummary};

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// Write any serializable value as pretty JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if JSON serialization or writing fails.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(io::Error::other)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

pub fn render_trip_text(summary: &TripSummary) {
    print!("{}", summary.render_text());
}

/// Serializable overview of a charge network.
#[derive(Debug, Serialize)]
pub struct NetworkOverview {
    pub stations: usize,
    pub legs: usize,
    pub max_range_km: f64,
    pub min_fast_chargers: u32,
    pub cluster_diameter_km: f64,
    pub built_at: String,
    pub longest_leg_km: Option<f64>,
    pub isolated_stations: usize,
}

impl NetworkOverview {
    pub fn from_network(network: &ChargeNetwork) -> Self {
        let meta = network.meta();
        Self {
            stations: network.stations().len(),
            legs: network.legs().len(),
            max_range_km: meta.max_range_km,
            min_fast_chargers: meta.min_fast_chargers,
            cluster_diameter_km: meta.cluster_diameter_km,
            built_at: meta.built_at.to_rfc3339(),
            longest_leg_km: network
                .legs()
                .iter()
                .map(|leg| leg.distance_km)
                .max_by(f64::total_cmp),
            isolated_stations: network
                .stations()
                .iter()
                .filter(|s| network.neighbours(s.id).is_empty())
                .count(),
        }
    }

    pub fn render_text(&self) {
        println!("Charge network built {}", self.built_at);
        println!("  stations: {}", self.stations);
        println!("  legs: {}", self.legs);
        println!("  isolated stations: {}", self.isolated_stations);
        println!(
            "  max range: {} | cluster diameter: {} | min fast chargers: {}",
            format_distance_km(self.max_range_km),
            format_distance_km(self.cluster_diameter_km),
            self.min_fast_chargers
        );
        if let Some(longest) = self.longest_leg_km {
            println!("  longest leg: {}", format_distance_km(longest));
        }
    }
}

/// Serializable result of a network build.
#[derive(Debug, Serialize)]
pub struct BuildOutcome {
    pub network_path: String,
    pub json_export: Option<String>,
    pub overview: NetworkOverview,
    pub candidates: usize,
    pub pruned: usize,
    pub cache_hits: usize,
    pub queries: usize,
    pub no_route: usize,
    pub failed_pairs: usize,
}

impl BuildOutcome {
    pub fn new(
        network_path: String,
        json_export: Option<String>,
        network: &ChargeNetwork,
        report: &DiscoveryReport,
    ) -> Self {
        Self {
            network_path,
            json_export,
            overview: NetworkOverview::from_network(network),
            candidates: report.candidates,
            pruned: report.pruned,
            cache_hits: report.cache_hits,
            queries: report.queries,
            no_route: report.no_route,
            failed_pairs: report.failed.len(),
        }
    }

    pub fn render_text(&self) {
        println!("Charge network written to {}", self.network_path);
        if let Some(json) = &self.json_export {
            println!("JSON export written to {json}");
        }
        println!(
            "Pairs: {} candidates, {} pruned by range, {} from cache",
            self.candidates, self.pruned, self.cache_hits
        );
        println!(
            "Queries: {} sent, {} unroutable, {} failed",
            self.queries, self.no_route, self.failed_pairs
        );
        self.overview.render_text();
    }
}

/// Print the footer with elapsed time.
pub fn print_footer(elapsed: std::time::Duration) {
    let elapsed_ms = elapsed.as_millis();
    if elapsed_ms < 1000 {
        println!("\nCompleted in {elapsed_ms}ms");
    } else if elapsed.as_secs() < 60 {
        println!("\nCompleted in {:.2}s", elapsed.as_secs_f64());
    } else {
        println!("\nCompleted in {}", format_duration(elapsed.as_secs_f64()));
    }
}
