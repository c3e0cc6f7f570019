//! Extraction mode selection.
//!
//! The ILS periodically drops full MARC export files into a shared directory.
//! When a fresh export exists it supersedes incremental API extraction for
//! that cycle; otherwise the cycle runs against the change API.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::ExtractResult;
use crate::state::SyncWatermark;

/// File extensions recognized as bulk MARC exports.
const EXPORT_EXTENSIONS: &[&str] = &["mrc", "marc"];

/// How old the newest export must be before it is trusted. The ILS writes
/// exports in place, so a very recent modification time can mean the file is
/// still being written.
const MIN_EXPORT_AGE: Duration = Duration::from_secs(300);

/// What a cycle should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Process full export files; `latest_export` becomes the bulk watermark.
    BulkFile {
        files: Vec<PathBuf>,
        latest_export: DateTime<Utc>,
    },
    /// Run incremental change detection against the API.
    IncrementalApi,
}

/// Lists bulk export files and their modification times.
///
/// A missing export directory is a normal deployment without bulk drops, not
/// an error.
pub fn scan_export_files(dir: &Path) -> ExtractResult<Vec<(PathBuf, DateTime<Utc>)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_export = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                EXPORT_EXTENSIONS
                    .iter()
                    .any(|known| extension.eq_ignore_ascii_case(known))
            });
        if !is_export {
            continue;
        }
        match entry.metadata().and_then(|metadata| metadata.modified()) {
            Ok(modified) => files.push((path, DateTime::<Utc>::from(modified))),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping export file without a modification time");
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Chooses the extraction mode from a directory scan.
///
/// Bulk mode requires an export newer than the last one consumed and old
/// enough that the ILS has finished writing it.
pub fn select_mode(
    scan: &[(PathBuf, DateTime<Utc>)],
    watermark: &SyncWatermark,
    now: DateTime<Utc>,
) -> ExtractionMode {
    let Some(latest_export) = scan.iter().map(|(_, modified)| *modified).max() else {
        return ExtractionMode::IncrementalApi;
    };

    let already_consumed = watermark
        .last_bulk_export
        .is_some_and(|consumed| latest_export <= consumed);
    if already_consumed {
        return ExtractionMode::IncrementalApi;
    }

    let age = (now - latest_export).to_std().unwrap_or_default();
    if age < MIN_EXPORT_AGE {
        return ExtractionMode::IncrementalApi;
    }

    ExtractionMode::BulkFile {
        files: scan.iter().map(|(path, _)| path.clone()).collect(),
        latest_export,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(seconds_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(seconds_ago)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_export_files_means_incremental() {
        let mode = select_mode(&[], &SyncWatermark::default(), now());
        assert_eq!(mode, ExtractionMode::IncrementalApi);
    }

    #[test]
    fn a_fresh_export_is_not_trusted_yet() {
        let now = now();
        let scan = vec![(PathBuf::from("/export/full.mrc"), at(200, now))];
        let mode = select_mode(&scan, &SyncWatermark::default(), now);
        assert_eq!(mode, ExtractionMode::IncrementalApi);
    }

    #[test]
    fn a_settled_export_enters_bulk_mode() {
        let now = now();
        let scan = vec![(PathBuf::from("/export/full.mrc"), at(400, now))];
        let mode = select_mode(&scan, &SyncWatermark::default(), now);
        assert_eq!(
            mode,
            ExtractionMode::BulkFile {
                files: vec![PathBuf::from("/export/full.mrc")],
                latest_export: at(400, now),
            }
        );
    }

    #[test]
    fn an_already_consumed_export_means_incremental() {
        let now = now();
        let exported = at(4000, now);
        let scan = vec![(PathBuf::from("/export/full.mrc"), exported)];
        let watermark = SyncWatermark {
            last_bulk_export: Some(exported),
            ..SyncWatermark::default()
        };
        assert_eq!(select_mode(&scan, &watermark, now), ExtractionMode::IncrementalApi);
    }

    #[test]
    fn a_newer_export_supersedes_the_consumed_one() {
        let now = now();
        let scan = vec![
            (PathBuf::from("/export/a.mrc"), at(4000, now)),
            (PathBuf::from("/export/b.marc"), at(600, now)),
        ];
        let watermark = SyncWatermark {
            last_bulk_export: Some(at(4000, now)),
            ..SyncWatermark::default()
        };
        match select_mode(&scan, &watermark, now) {
            ExtractionMode::BulkFile { files, latest_export } => {
                assert_eq!(files.len(), 2);
                assert_eq!(latest_export, at(600, now));
            }
            other => panic!("expected bulk mode, got {other:?}"),
        }
    }

    #[test]
    fn scan_ignores_non_export_files_and_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("full.mrc"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let scan = scan_export_files(dir.path()).unwrap();
        assert_eq!(scan.len(), 1);
        assert!(scan[0].0.ends_with("full.mrc"));

        let missing = dir.path().join("absent");
        assert!(scan_export_files(&missing).unwrap().is_empty());
    }
}
