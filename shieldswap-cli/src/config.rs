//! Operator configuration.
//!
//! Built-in defaults, then `shieldswap.toml` (or the file passed with
//! `--config`), then `SHIELDSWAP_*` environment variables. Nested keys use a
//! double underscore: `SHIELDSWAP_POI__CONTENT_HASH`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use shieldswap_common::{default_networks, NetworkConfig, NetworkRegistry, PoiArtifactConfig};

const DEFAULT_CONFIG_NAME: &str = "shieldswap";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CliConfig {
    /// Root of everything the orchestrator persists.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Added to, or replacing, the built-in networks by name.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub poi: PoiArtifactConfig,
    #[serde(default = "default_relay_lookup_timeout_secs")]
    pub relay_lookup_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("shieldswap-data")
}

fn default_relay_lookup_timeout_secs() -> u64 {
    10
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => ::config::File::from(path.to_path_buf()).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix("SHIELDSWAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn registry(&self) -> NetworkRegistry {
        let mut registry = default_networks();
        for network in &self.networks {
            registry.insert(network.clone());
        }
        registry
    }

    pub fn artifact_db(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    pub fn relay_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_lookup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldswap_common::NetworkName;
    use std::io::Write;

    #[test]
    fn file_overrides_defaults_and_extends_networks() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
data_dir = "/var/lib/shieldswap"
log_format = "json"

[[networks]]
name = "devnet"
chain_id = 31337
environment = "test"
gas_type = "type0"
rpc_url = "http://127.0.0.1:8545"
wrapped_native_token = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
test_relay_url = "http://127.0.0.1:3010"

[networks.artifacts]
storage_prefix = "devnet"
"#
        )
        .unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/shieldswap"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.relay_lookup_timeout(), Duration::from_secs(10));

        let registry = config.registry();
        let devnet = registry.get(&NetworkName::new("devnet")).unwrap();
        assert!(devnet.is_test());
        assert_eq!(devnet.provider_batch_max_count, 1);
        assert_eq!(devnet.unshield_fee_bps, 25);
        assert!(registry.get(&NetworkName::new("ethereum")).is_ok());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = CliConfig::load(Some(Path::new("/nonexistent/shieldswap.toml")));
        assert!(result.is_err());
    }
}
