use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Indexing profile for one ILS record source.
///
/// The profile pins down where records live on disk, how record identifiers
/// are prefixed, which MARC field carries item holdings, and which subfield
/// codes and date patterns the downstream indexer expects. Subfields that the
/// profile leaves unset are never written during a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexingProfileConfig {
    /// Name of the profile, used as the record source in collaborator calls.
    pub name: String,
    /// Prefix applied when normalizing bare record numbers into file ids.
    #[serde(default = "default_record_prefix")]
    pub record_prefix: String,
    /// Directory holding one persisted MARC file per bib.
    pub record_store_path: PathBuf,
    /// Directory where the ILS drops full MARC export files.
    pub bulk_export_path: PathBuf,
    /// Tag of the data field that carries item holdings.
    #[serde(default = "default_item_tag")]
    pub item_tag: String,
    /// Subfield carrying the item identifier within a holdings field.
    #[serde(default = "default_item_record_number_subfield")]
    pub item_record_number_subfield: char,
    pub call_number_subfield: Option<char>,
    pub location_subfield: Option<char>,
    pub shelving_location_subfield: Option<char>,
    pub status_subfield: Option<char>,
    pub media_type_subfield: Option<char>,
    pub total_checkouts_subfield: Option<char>,
    pub ytd_checkouts_subfield: Option<char>,
    pub due_date_subfield: Option<char>,
    /// chrono pattern for due dates written into holdings fields.
    #[serde(default = "default_date_format")]
    pub due_date_format: String,
    pub date_created_subfield: Option<char>,
    #[serde(default = "default_date_format")]
    pub date_created_format: String,
    pub last_checkin_subfield: Option<char>,
    #[serde(default = "default_date_format")]
    pub last_checkin_format: String,
}

fn default_record_prefix() -> String {
    "CARL".to_string()
}

fn default_item_tag() -> String {
    "949".to_string()
}

fn default_item_record_number_subfield() -> char {
    'b'
}

fn default_date_format() -> String {
    "%m-%d-%y".to_string()
}
