use serde::{Deserialize, Serialize};

/// Default path of the MarcOut endpoint, relative to the ILS API base URL.
const DEFAULT_MARCOUT_PATH: &str = "/CarlXAPI/MarcoutAPI.wsdl";

/// Connection settings for the ILS MarcOut web service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IlsApiConfig {
    /// Base URL of the ILS API host, without a trailing slash.
    pub base_url: String,
    /// Path of the MarcOut endpoint, appended to [`IlsApiConfig::base_url`].
    #[serde(default = "default_marcout_path")]
    pub marcout_path: String,
    /// Request timeout in milliseconds for a single MarcOut call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_marcout_path() -> String {
    DEFAULT_MARCOUT_PATH.to_string()
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl IlsApiConfig {
    /// Returns the full URL of the MarcOut endpoint.
    pub fn marcout_url(&self) -> String {
        format!("{}{}", self.base_url, self.marcout_path)
    }
}
