use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::error::ExtractResult;
use crate::marc::{Record, read_record, write_record};

/// Outcome of persisting a record relative to what was already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarcStatus {
    /// No record was stored for this id before.
    New,
    /// The stored bytes differ from the new encoding.
    Changed,
    /// The stored bytes are identical; nothing was written.
    Unchanged,
}

/// Normalizes a bare record number into a store file id.
///
/// Bare numbers are zero-padded to ten digits and prefixed; ids that already
/// carry the prefix pass through untouched.
pub fn normalize_record_id(id: &str, prefix: &str) -> String {
    if id.starts_with(prefix) {
        id.to_string()
    } else {
        format!("{prefix}{id:0>10}")
    }
}

/// One MARC file per bib, stored under the profile's record directory.
///
/// The stored copy is the merge's source of prior holdings and the indexer's
/// source of record content, so writes happen before any collaborator call.
#[derive(Debug, Clone)]
pub struct RecordStore {
    base_dir: PathBuf,
}

impl RecordStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The on-disk path for a normalized file id.
    pub fn file_path(&self, file_id: &str) -> PathBuf {
        self.base_dir.join(format!("{file_id}.mrc"))
    }

    /// Loads the stored record for a file id.
    ///
    /// A missing file is an absent prior, not an error. A stored file that no
    /// longer decodes is treated the same way, after logging, so one corrupt
    /// file cannot wedge its bib forever.
    pub fn load(&self, file_id: &str) -> ExtractResult<Option<Record>> {
        let path = self.file_path(file_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match read_record(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                error!(file_id, path = %path.display(), error = %err, "discarding undecodable stored record");
                Ok(None)
            }
        }
    }

    /// Persists a record unconditionally.
    pub fn save(&self, file_id: &str, record: &Record) -> ExtractResult<()> {
        let bytes = write_record(record)?;
        self.write_bytes(&self.file_path(file_id), &bytes)
    }

    /// Persists a record only when its encoding differs from what is stored,
    /// reporting which case applied.
    pub fn save_if_changed(&self, file_id: &str, record: &Record) -> ExtractResult<MarcStatus> {
        let bytes = write_record(record)?;
        let path = self.file_path(file_id);
        let status = match fs::read(&path) {
            Ok(existing) if existing == bytes => return Ok(MarcStatus::Unchanged),
            Ok(_) => MarcStatus::Changed,
            Err(err) if err.kind() == IoErrorKind::NotFound => MarcStatus::New,
            Err(err) => return Err(err.into()),
        };
        self.write_bytes(&path, &bytes)?;
        Ok(status)
    }

    /// Removes the stored record for a file id, if present.
    pub fn delete(&self, file_id: &str) -> ExtractResult<()> {
        match fs::remove_file(self.file_path(file_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> ExtractResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }
}
