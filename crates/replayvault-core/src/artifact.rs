//! Artifact file naming
//!
//! Artifacts are named `<creationTimestamp>[@<suffix>].<ext>`. The timestamp in
//! the name is the authority for an artifact's age: copies and moves keep the
//! name but not the mtime.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Lexically and chronologically sortable timestamp format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Default artifact extension
pub const DEFAULT_EXTENSION: &str = "mcpr";

/// Separator between the timestamp and an optional suffix
pub const SUFFIX_SEPARATOR: char = '@';

/// Build an artifact file name for the given creation time
pub fn artifact_file_name(created: NaiveDateTime, suffix: Option<&str>, extension: &str) -> String {
    let timestamp = created.format(TIMESTAMP_FORMAT);
    match suffix {
        Some(suffix) if !suffix.is_empty() => {
            format!("{}{}{}.{}", timestamp, SUFFIX_SEPARATOR, suffix, extension)
        }
        _ => format!("{}.{}", timestamp, extension),
    }
}

/// Parse the creation timestamp embedded in an artifact file name
///
/// Returns `None` for names that do not follow the naming convention; callers
/// must never guess an age for those.
pub fn parse_artifact_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let timestamp = stem.split(SUFFIX_SEPARATOR).next()?;
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()
}

/// An artifact on disk with its name-derived creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub created: NaiveDateTime,
}

impl ArtifactRecord {
    /// Build a record from a path, if its file name carries a timestamp
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let created = parse_artifact_timestamp(file_name)?;
        Some(Self {
            path: path.to_path_buf(),
            created,
        })
    }

    /// Age in whole calendar days relative to `today`
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        today.signed_duration_since(self.created.date()).num_days()
    }
}
