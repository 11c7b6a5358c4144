//! Build command handler: CSV export to charge network on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use evtrip_lib::network::json_export_path;
use evtrip_lib::{
    build_network, load_stations, resolve_network_paths, BuildConfig, ClusterConfig,
    DirectionsService, DiscoveryConfig, Error as LibError, GoogleDirectionsClient, IngestConfig,
    LegCache, PairCache, QuerySession, Region,
};

use evtrip_cli::output::{render_json, BuildOutcome, OutputFormat};

/// Arguments for the build-network command.
#[derive(Debug, Clone)]
pub struct BuildCommandArgs {
    /// Charge station CSV export.
    pub stations: PathBuf,
    pub min_fast_chargers: u32,
    pub cluster_diameter_km: f64,
    pub max_range_km: f64,
    pub max_in_flight: usize,
    pub max_failed_pairs: usize,
    /// Keep stations outside mainland North America.
    pub unbounded: bool,
    pub request_timeout: Duration,
    /// Also write a JSON export next to the binary network.
    pub export_json: bool,
}

impl BuildCommandArgs {
    fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            min_fast_chargers: self.min_fast_chargers,
            region: if self.unbounded {
                Region::Unbounded
            } else {
                Region::MainlandNorthAmerica
            },
        }
    }

    fn build_config(&self) -> BuildConfig {
        BuildConfig {
            cluster: ClusterConfig {
                max_diameter_km: self.cluster_diameter_km,
            },
            discovery: DiscoveryConfig {
                max_range_km: self.max_range_km,
                max_in_flight: self.max_in_flight,
                max_failed_pairs: self.max_failed_pairs,
                ..DiscoveryConfig::default()
            },
            min_fast_chargers: self.min_fast_chargers,
        }
    }
}

/// Handle the build-network subcommand.
///
/// Previously resolved station pairs are read from the leg cache next to the
/// network file so only new pairs reach the directions service.
pub fn handle_build_command(
    network: Option<&Path>,
    format: OutputFormat,
    args: &BuildCommandArgs,
) -> Result<()> {
    let paths =
        resolve_network_paths(network).context("failed to resolve the charge network location")?;

    let ingest = load_stations(&args.stations, &args.ingest_config())
        .with_context(|| format!("failed to load stations from {}", args.stations.display()))?;
    if ingest.stations.is_empty() {
        anyhow::bail!(
            "no stations in {} passed the filters ({} malformed, {} filtered out)",
            args.stations.display(),
            ingest.skipped_malformed,
            ingest.filtered_out
        );
    }

    let client = GoogleDirectionsClient::from_env(args.request_timeout).map_err(|err| match err {
        LibError::DirectionsKeyMissing { env } => {
            anyhow::anyhow!("a directions API key is required to build a network; set {env}")
        }
        other => anyhow::Error::new(other).context("failed to create the directions client"),
    })?;
    let service: Arc<dyn DirectionsService> = Arc::new(client);

    let mut leg_cache = LegCache::open(&paths.leg_cache)
        .with_context(|| format!("failed to open leg cache {}", paths.leg_cache.display()))?;
    let cache = PairCache::new();
    let restored = leg_cache
        .load_into(&cache)
        .context("failed to read the leg cache")?;
    info!(restored, path = %paths.leg_cache.display(), "restored cached station pairs");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let mut session = QuerySession::default();
    let config = args.build_config();
    let build = build_network(service, &ingest.stations, &config, &cache, &mut session);
    let result = runtime.block_on(build);

    // Persist whatever was resolved, even when the build itself failed.
    let stored = leg_cache
        .store(&cache)
        .context("failed to update the leg cache")?;
    info!(stored, "persisted new station pairs");

    let (network, report) = result.context("failed to build the charge network")?;
    network
        .save(&paths.network)
        .with_context(|| format!("failed to write {}", paths.network.display()))?;

    let json_export = if args.export_json {
        let json_path = json_export_path(&paths.network);
        network
            .export_json(&json_path)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        Some(json_path.display().to_string())
    } else {
        None
    };

    let network_path = paths.network.display().to_string();
    let outcome = BuildOutcome::new(network_path, json_export, &network, &report);
    match format {
        OutputFormat::Json => render_json(&outcome)?,
        OutputFormat::Text => outcome.render_text(),
    }
    Ok(())
}
