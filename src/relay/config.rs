//! Startup configuration.
//!
//! Everything comes from command line flags, each of which can also be set
//! through the environment. Access policies live in an optional TOML file:
//!
//! ```toml
//! [[policy]]
//! name = "friends"
//! password = "hunter2"
//! max_sessions = 2
//! ```

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::access::AccessPolicy;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read access config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid access config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Command line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pocket-relay",
    about = "Stream handheld console sessions to remote clients over WebSocket",
    version
)]
pub struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "RELAY_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Directory holding the program images
    #[arg(long, env = "ROM_DIR", default_value = "roms")]
    pub rom_dir: PathBuf,

    /// TOML file with access policies; everyone is admitted when absent
    #[arg(long, env = "ACCESS_CONFIG", value_name = "PATH")]
    pub access_config: Option<PathBuf>,

    /// Minimum log level (off, error, warn, info, debug, trace)
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: log::LevelFilter,
}

impl Args {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Loads the access policies, or none when no policy file is configured.
    pub fn access_policies(&self) -> Result<Vec<AccessPolicy>, ConfigError> {
        match &self.access_config {
            Some(path) => Ok(AccessConfig::load(path)?.policies),
            None => Ok(Vec::new()),
        }
    }
}

/// Contents of the access policy file.
#[derive(Debug, Default, Deserialize)]
pub struct AccessConfig {
    #[serde(default, rename = "policy")]
    pub policies: Vec<AccessPolicy>,
}

impl AccessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
