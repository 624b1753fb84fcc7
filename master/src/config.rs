//! Master configuration: defaults, optional JSON file, then command line flags

use clap::Parser;
use serde::Deserialize;
use shared::config::load_or_default;
use shared::DEFAULT_VERSION_KEY;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MasterConfig {
    /// Listener for game clients
    pub client_address: String,
    /// Listener for game nodes
    pub cluster_address: String,
    pub name: String,
    /// Clients presenting a different key in `Hello` are disconnected
    pub version_key: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            client_address: "0.0.0.0:8080".to_string(),
            cluster_address: "0.0.0.0:8081".to_string(),
            name: "MasterServer1".to_string(),
            version_key: DEFAULT_VERSION_KEY.to_string(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Room cluster master server", long_about = None)]
pub struct MasterArgs {
    /// JSON config file layered over the defaults
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Address game clients connect to
    #[arg(long)]
    pub client_address: Option<String>,

    /// Address game nodes connect to
    #[arg(long)]
    pub cluster_address: Option<String>,

    #[arg(short = 'n', long)]
    pub name: Option<String>,

    #[arg(short = 'k', long)]
    pub version_key: Option<String>,
}

impl MasterArgs {
    /// Resolves the effective configuration
    pub fn load_config(&self) -> MasterConfig {
        let config = load_or_default(self.config.as_deref());
        self.apply(config)
    }

    /// Explicit flags win over whatever the file or the defaults said
    pub fn apply(&self, mut config: MasterConfig) -> MasterConfig {
        if let Some(address) = &self.client_address {
            config.client_address = address.clone();
        }
        if let Some(address) = &self.cluster_address {
            config.cluster_address = address.clone();
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(key) = &self.version_key {
            config.version_key = key.clone();
        }
        config
    }
}
