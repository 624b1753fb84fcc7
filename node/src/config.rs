//! Node configuration: defaults, optional JSON file, then command line flags

use clap::Parser;
use serde::Deserialize;
use shared::config::load_or_default;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// Listener for players. Port 0 picks a free port.
    pub address: String,
    /// Cluster listener of the master
    pub master_address: String,
    pub region: String,
    pub name: String,
    pub retry_interval_secs: u64,
    /// Host announced to the master instead of the discovered interface address
    pub public_host: Option<String>,
    /// Reject handoff tokens issued further than this from the node's clock
    pub token_max_age_secs: Option<u64>,
    pub max_players: u32,
}

impl NodeConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }

    pub fn token_max_age(&self) -> Option<Duration> {
        self.token_max_age_secs.map(Duration::from_secs)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:0".to_string(),
            master_address: "127.0.0.1:8081".to_string(),
            region: "EU".to_string(),
            name: "GameServer1".to_string(),
            retry_interval_secs: 10,
            public_host: None,
            token_max_age_secs: None,
            max_players: 16,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Room cluster game node", long_about = None)]
pub struct NodeArgs {
    /// JSON config file layered over the defaults
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Address players connect to
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Cluster address of the master server
    #[arg(short = 'm', long)]
    pub master_address: Option<String>,

    #[arg(short = 'r', long)]
    pub region: Option<String>,

    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Seconds between registration attempts
    #[arg(long)]
    pub retry_interval_secs: Option<u64>,

    #[arg(long)]
    pub public_host: Option<String>,

    #[arg(long)]
    pub token_max_age_secs: Option<u64>,

    #[arg(long)]
    pub max_players: Option<u32>,
}

impl NodeArgs {
    pub fn load_config(&self) -> NodeConfig {
        let config = load_or_default(self.config.as_deref());
        self.apply(config)
    }

    pub fn apply(&self, mut config: NodeConfig) -> NodeConfig {
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(address) = &self.master_address {
            config.master_address = address.clone();
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(secs) = self.retry_interval_secs {
            config.retry_interval_secs = secs;
        }
        if let Some(host) = &self.public_host {
            config.public_host = Some(host.clone());
        }
        if let Some(secs) = self.token_max_age_secs {
            config.token_max_age_secs = Some(secs);
        }
        if let Some(max) = self.max_players {
            config.max_players = max;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::config::load_json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.address, "0.0.0.0:0");
        assert_eq!(config.master_address, "127.0.0.1:8081");
        assert_eq!(config.region, "EU");
        assert_eq!(config.name, "GameServer1");
        assert_eq!(config.retry_interval(), Duration::from_secs(10));
        assert!(config.public_host.is_none());
        assert!(config.token_max_age().is_none());
        assert_eq!(config.max_players, 16);
    }

    #[test]
    fn test_zero_retry_interval_is_clamped() {
        let config = NodeConfig {
            retry_interval_secs: 0,
            ..NodeConfig::default()
        };
        assert_eq!(config.retry_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_flags_override_file() {
        let path = std::env::temp_dir().join(format!("node-config-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{ "region": "US", "token_max_age_secs": 30, "max_players": 4 }"#)
            .unwrap();

        let from_file: NodeConfig = load_json(&path).unwrap();
        assert_eq!(from_file.region, "US");
        assert_eq!(from_file.token_max_age(), Some(Duration::from_secs(30)));

        let args = NodeArgs::try_parse_from([
            "node",
            "--config",
            path.to_str().unwrap(),
            "-r",
            "ASIA",
            "--public-host",
            "game.example.net",
        ])
        .unwrap();
        let config = args.load_config();
        assert_eq!(config.region, "ASIA");
        assert_eq!(config.max_players, 4);
        assert_eq!(config.public_host.as_deref(), Some("game.example.net"));

        let _ = std::fs::remove_file(path);
    }
}
