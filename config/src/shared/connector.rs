use serde::{Deserialize, Serialize};

use crate::shared::{IlsApiConfig, IndexingProfileConfig, PgConnectionConfig};

/// Configuration options for the grouping and indexing collaborators.
///
/// The extractor only drives the collaborator interfaces; which concrete
/// implementation backs them is a deployment decision, mirrored here the way
/// destinations are selected by config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorsConfig {
    /// In-memory grouping and indexing, useful for dry runs and testing.
    Memory,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Top-level configuration for the connector binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConnectorConfig {
    /// The discovery-side database carrying watermarks and the holds summary.
    pub discovery_db: PgConnectionConfig,
    /// The ILS reporting database that the holds aggregation reads from, when
    /// the deployment exposes one.
    pub ils_db: Option<PgConnectionConfig>,
    /// The ILS MarcOut web service.
    pub ils_api: IlsApiConfig,
    /// The indexing profile to extract.
    pub profile: IndexingProfileConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
}
