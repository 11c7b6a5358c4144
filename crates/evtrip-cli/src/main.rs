mod commands;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use evtrip_lib::cluster::DEFAULT_CLUSTER_DIAMETER_KM;
use evtrip_lib::discovery::{DEFAULT_MAX_FAILED_PAIRS, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_RANGE_KM};
use evtrip_lib::ingest::DEFAULT_MIN_FAST_CHARGERS;
use evtrip_lib::planner::{
    DEFAULT_FULL_RANGE_KM, DEFAULT_MAX_SOC, DEFAULT_MIN_LEG_KM, DEFAULT_MIN_SOC, DEFAULT_START_SOC,
};
use evtrip_lib::RouteAlgorithm;

use evtrip_cli::output::{print_footer, OutputFormat};

use crate::commands::build::{handle_build_command, BuildCommandArgs};
use crate::commands::inspect::handle_inspect_command;
use crate::commands::route::{handle_route_command, RouteCommandArgs};

#[derive(Parser, Debug)]
#[command(author, version, about = "EV charge network builder and trip planner")]
struct Cli {
    /// Override the charge network file (defaults to EVTRIP_NETWORK_PATH or the platform data dir).
    #[arg(long, global = true)]
    network: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the charge network from a station CSV export.
    BuildNetwork(BuildArgs),
    /// Plan a trip between two stations of the built network.
    Route(RouteArgs),
    /// Show a summary of the built network or of one station.
    Inspect {
        /// Station id or name to show in detail.
        #[arg(long)]
        station: Option<String>,
    },
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Charge station CSV export (AFDC format).
    #[arg(long)]
    stations: PathBuf,
    /// Minimum number of DC fast chargers for a station to be kept.
    #[arg(long, default_value_t = DEFAULT_MIN_FAST_CHARGERS)]
    min_fast_chargers: u32,
    /// Largest distance between two stations of one cluster, in km.
    #[arg(long, default_value_t = DEFAULT_CLUSTER_DIAMETER_KM)]
    cluster_diameter: f64,
    /// Longest leg kept in the network, in km.
    #[arg(long, default_value_t = DEFAULT_MAX_RANGE_KM)]
    max_range: f64,
    /// Concurrent directions queries.
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,
    /// Unresolved pairs tolerated before the build is abandoned.
    #[arg(long, default_value_t = DEFAULT_MAX_FAILED_PAIRS)]
    max_failed_pairs: usize,
    /// Keep stations outside mainland North America.
    #[arg(long)]
    unbounded: bool,
    /// Per-request timeout for the directions service, in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// Also write a JSON export next to the network file.
    #[arg(long)]
    export_json: bool,
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Starting station id or name.
    #[arg(long = "from")]
    from: String,
    /// Destination station id or name.
    #[arg(long = "to")]
    to: String,
    /// Search algorithm (a-star or dijkstra).
    #[arg(long, default_value_t = RouteAlgorithm::AStar)]
    algorithm: RouteAlgorithm,
    /// Legs shorter than this many km are not used.
    #[arg(long, default_value_t = DEFAULT_MIN_LEG_KM)]
    min_leg: f64,
    /// Distance driven on a full battery, in km.
    #[arg(long, default_value_t = DEFAULT_FULL_RANGE_KM)]
    range: f64,
    /// Lowest acceptable state of charge (0-1).
    #[arg(long, default_value_t = DEFAULT_MIN_SOC)]
    min_soc: f64,
    /// Highest state of charge to charge to (0-1).
    #[arg(long, default_value_t = DEFAULT_MAX_SOC)]
    max_soc: f64,
    /// State of charge at departure (0-1).
    #[arg(long, default_value_t = DEFAULT_START_SOC)]
    start_soc: f64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let started = Instant::now();
    let network = cli.network.as_deref();

    match cli.command {
        Command::BuildNetwork(args) => {
            let args = BuildCommandArgs {
                stations: args.stations,
                min_fast_chargers: args.min_fast_chargers,
                cluster_diameter_km: args.cluster_diameter,
                max_range_km: args.max_range,
                max_in_flight: args.max_in_flight,
                max_failed_pairs: args.max_failed_pairs,
                unbounded: args.unbounded,
                request_timeout: Duration::from_secs(args.timeout_secs),
                export_json: args.export_json,
            };
            handle_build_command(network, cli.format, &args)?;
        }
        Command::Route(args) => {
            let args = RouteCommandArgs {
                from: args.from,
                to: args.to,
                algorithm: args.algorithm,
                min_leg_km: args.min_leg,
                full_range_km: args.range,
                min_soc: args.min_soc,
                max_soc: args.max_soc,
                start_soc: args.start_soc,
            };
            handle_route_command(network, cli.format, &args)?;
        }
        Command::Inspect { station } => {
            handle_inspect_command(network, cli.format, station.as_deref())?;
        }
    }

    if cli.format == OutputFormat::Text {
        print_footer(started.elapsed());
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
