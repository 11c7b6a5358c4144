use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::{Error, Result};

/// Default filename for the binary charge network cache.
const NETWORK_FILENAME: &str = "charge_network.evcn";

/// Default filename for the persisted directions pair cache.
const LEG_CACHE_FILENAME: &str = "leg_cache.db";

/// Environment variable overriding the charge network location.
pub const NETWORK_PATH_ENV: &str = "EVTRIP_NETWORK_PATH";

/// Files that make up a built network on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPaths {
    /// Binary network cache.
    pub network: PathBuf,
    /// SQLite pair cache kept next to the network.
    pub leg_cache: PathBuf,
}

impl NetworkPaths {
    /// Derive the sibling files for a network path.
    pub fn for_network(network: PathBuf) -> Self {
        let leg_cache = network.with_file_name(LEG_CACHE_FILENAME);
        Self { network, leg_cache }
    }
}

/// Platform data directory used when no explicit location is given.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "evtrip", "evtrip").ok_or(Error::ProjectDirsUnavailable)?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Resolve the default charge network location using platform-specific project directories.
pub fn default_network_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(NETWORK_FILENAME))
}

/// Resolve the network location: explicit path, then `EVTRIP_NETWORK_PATH`,
/// then the platform default.
pub fn resolve_network_paths(explicit: Option<&Path>) -> Result<NetworkPaths> {
    let network = match explicit {
        Some(path) => path.to_path_buf(),
        None => match env::var_os(NETWORK_PATH_ENV) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => default_network_path()?,
        },
    };
    debug!(path = %network.display(), "resolved charge network path");
    Ok(NetworkPaths::for_network(network))
}
