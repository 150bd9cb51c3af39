//! Decides whether a dataset has to be (re)downloaded.
//!
//! The checks run in order and stop at the first one that applies: no history,
//! local file gone, then a timestamp comparison. A timestamp that cannot be parsed
//! counts as stale so the item is downloaded again instead of failing.

use camino::Utf8Path;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

use crate::domain::{HistoryRecord, RemoteDatasetInfo, is_path_component};
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    NoHistory,
    LocalFileMissing,
    RemoteNewer,
    UnparseableTimestamp { reason: String },
    UpToDate,
}

impl Freshness {
    pub fn needs_download(&self) -> bool {
        !matches!(self, Freshness::UpToDate)
    }

    pub fn describe(&self) -> String {
        match self {
            Freshness::NoHistory => "no previous download recorded".to_string(),
            Freshness::LocalFileMissing => "local copy is missing".to_string(),
            Freshness::RemoteNewer => "updated version of dataset is available".to_string(),
            Freshness::UnparseableTimestamp { reason } => {
                format!("could not compare timestamps ({reason}); downloading again")
            }
            Freshness::UpToDate => "local copy is up to date".to_string(),
        }
    }
}

pub fn assess(
    history: Option<&HistoryRecord>,
    remote: &RemoteDatasetInfo,
    local_dir: &Utf8Path,
) -> Freshness {
    let Some(history) = history else {
        return Freshness::NoHistory;
    };

    if !local_file_exists(history, remote, local_dir) {
        return Freshness::LocalFileMissing;
    }

    let downloaded_at = match parse_timestamp(&history.downloaded_at) {
        Ok(value) => value,
        Err(err) => {
            return Freshness::UnparseableTimestamp {
                reason: err.to_string(),
            };
        }
    };
    let last_updated = match parse_timestamp(&remote.last_updated) {
        Ok(value) => value,
        Err(err) => {
            return Freshness::UnparseableTimestamp {
                reason: err.to_string(),
            };
        }
    };

    if downloaded_at < last_updated {
        Freshness::RemoteNewer
    } else {
        Freshness::UpToDate
    }
}

pub fn needs_download(
    history: Option<&HistoryRecord>,
    remote: &RemoteDatasetInfo,
    local_dir: &Utf8Path,
) -> bool {
    assess(history, remote, local_dir).needs_download()
}

/// Name of the local file this history record vouches for, if one exists on disk.
/// A recorded name that would leave `local_dir` counts as no file.
pub fn existing_local_file(
    history: &HistoryRecord,
    remote: &RemoteDatasetInfo,
    local_dir: &Utf8Path,
) -> Option<String> {
    let name = match &history.local_file_name {
        Some(name) if is_path_component(name) => name.clone(),
        Some(name) => {
            tracing::warn!("ignoring recorded file name {name:?} outside {local_dir}");
            return None;
        }
        None => remote.canonical_file_name()?,
    };
    local_dir
        .join(&name)
        .as_std_path()
        .is_file()
        .then_some(name)
}

fn local_file_exists(history: &HistoryRecord, remote: &RemoteDatasetInfo, local_dir: &Utf8Path) -> bool {
    existing_local_file(history, remote, local_dir).is_some()
}

/// Accepts RFC 3339, an ISO-8601 date-time without offset or a plain date. Values
/// without an offset are local time, which is what the feed publishes.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SyncError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });
    naive
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| SyncError::FreshnessCheck(format!("{value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_forms() {
        let expected = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse_timestamp("2024-01-01T01:00:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z").unwrap(), expected);
    }

    #[test]
    fn offsetless_values_are_local_time() {
        let local = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_timestamp("2024-01-01").unwrap(), local);
        assert_eq!(parse_timestamp("2024-01-01T00:00:00").unwrap(), local);
        assert_eq!(parse_timestamp("2024-01-01 00:00:00.000").unwrap(), local);
    }

    #[test]
    fn recent_local_update_is_older_than_now() {
        let published = (Local::now() - chrono::Duration::minutes(5))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        assert!(parse_timestamp(&published).unwrap() < Utc::now());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
