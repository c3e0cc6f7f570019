use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use config::shared::ConnectorConfig;

/// Environment variable naming the configuration file.
const CONFIG_PATH_ENV: &str = "CONNECTOR_CONFIG_PATH";

/// Fallback configuration path when the environment does not name one.
const DEFAULT_CONFIG_PATH: &str = "connector.json";

/// Loads the connector configuration from disk.
pub fn load_connector_config() -> anyhow::Result<ConnectorConfig> {
    let path = env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let file = File::open(&path)
        .with_context(|| format!("failed to open config file {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}
