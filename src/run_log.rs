use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};

use crate::domain::DatasetRef;
use crate::error::SyncError;
use crate::store::write_bytes_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Updated,
    NotUpdated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogEntry {
    pub dataset_id: String,
    pub title: String,
    pub category: Option<String>,
    pub human_readable_size: Option<String>,
    pub message: Option<String>,
}

impl RunLogEntry {
    pub fn for_dataset(dataset: &DatasetRef) -> Self {
        Self {
            dataset_id: dataset.dataset_id.to_string(),
            title: dataset.title.clone(),
            category: dataset.category.clone(),
            human_readable_size: None,
            message: None,
        }
    }
}

/// Outcome of one run: every processed dataset lands in exactly one bucket.
#[derive(Debug, Clone)]
pub struct RunLog {
    pub started_at: DateTime<Local>,
    pub total_datasets_to_download: usize,
    pub total_bytes_downloaded: u64,
    pub total_size_of_downloaded_files: String,
    pub updated: Vec<RunLogEntry>,
    pub not_updated: Vec<RunLogEntry>,
    pub failed: Vec<RunLogEntry>,
}

impl RunLog {
    pub fn start(total_datasets_to_download: usize) -> Self {
        Self {
            started_at: Local::now(),
            total_datasets_to_download,
            total_bytes_downloaded: 0,
            total_size_of_downloaded_files: human_readable_bytes(0),
            updated: Vec::new(),
            not_updated: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn push(&mut self, bucket: Bucket, entry: RunLogEntry) {
        match bucket {
            Bucket::Updated => self.updated.push(entry),
            Bucket::NotUpdated => self.not_updated.push(entry),
            Bucket::Failed => self.failed.push(entry),
        }
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.total_bytes_downloaded = self.total_bytes_downloaded.saturating_add(bytes);
    }

    pub fn finalize(&mut self) {
        self.total_size_of_downloaded_files = human_readable_bytes(self.total_bytes_downloaded);
    }

    pub fn processed(&self) -> usize {
        self.updated.len() + self.not_updated.len() + self.failed.len()
    }

    pub fn file_name(&self) -> String {
        format!("{}.txt", self.file_stem())
    }

    fn file_stem(&self) -> String {
        self.started_at.format("%Y%m%dT%H%M%S").to_string()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run started: {}", self.started_at.to_rfc3339());
        let _ = writeln!(
            out,
            "Total datasets to download: {}",
            self.total_datasets_to_download
        );
        let _ = writeln!(
            out,
            "Total size of downloaded files: {}",
            self.total_size_of_downloaded_files
        );
        let _ = writeln!(
            out,
            "Updated: {}  Not updated: {}  Failed: {}",
            self.updated.len(),
            self.not_updated.len(),
            self.failed.len()
        );
        render_section(&mut out, "Updated", &self.updated);
        render_section(&mut out, "Not updated", &self.not_updated);
        render_section(&mut out, "Failed", &self.failed);
        out
    }

    /// Writes the report into `log_dir` and returns the file path. Runs started within
    /// the same second get a numeric suffix.
    pub fn persist(&self, log_dir: &Utf8Path) -> Result<Utf8PathBuf, SyncError> {
        let stem = self.file_stem();
        let mut path = log_dir.join(self.file_name());
        let mut suffix = 1;
        while path.as_std_path().exists() {
            path = log_dir.join(format!("{stem}-{suffix}.txt"));
            suffix += 1;
        }
        write_bytes_atomic(&path, self.render().as_bytes())?;
        Ok(path)
    }
}

fn render_section(out: &mut String, heading: &str, entries: &[RunLogEntry]) {
    let _ = writeln!(out);
    let _ = writeln!(out, "== {heading} ({}) ==", entries.len());
    for entry in entries {
        let _ = write!(out, "{} - {}", entry.dataset_id, entry.title);
        if let Some(category) = &entry.category {
            let _ = write!(out, " [{category}]");
        }
        if let Some(size) = &entry.human_readable_size {
            let _ = write!(out, " ({size})");
        }
        let _ = writeln!(out);
        if let Some(message) = &entry.message {
            let _ = writeln!(out, "    {message}");
        }
    }
}

/// Base-1024 size with at most two decimals, trailing zeros dropped.
pub fn human_readable_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut order = 0;
    while value >= 1024.0 && order < UNITS.len() - 1 {
        order += 1;
        value /= 1024.0;
    }
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[order])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(human_readable_bytes(0), "0 B");
        assert_eq!(human_readable_bytes(1023), "1023 B");
        assert_eq!(human_readable_bytes(1536), "1.5 KB");
        assert_eq!(human_readable_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(human_readable_bytes(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn render_lists_buckets() {
        let mut log = RunLog::start(2);
        log.push(
            Bucket::Updated,
            RunLogEntry {
                dataset_id: "DS1".to_string(),
                title: "Roads".to_string(),
                category: Some("EPSG:25833".to_string()),
                human_readable_size: Some("2 KB".to_string()),
                message: None,
            },
        );
        log.push(
            Bucket::Failed,
            RunLogEntry {
                dataset_id: "DS2".to_string(),
                title: "Lakes".to_string(),
                category: None,
                human_readable_size: None,
                message: Some("feed request failed: timeout".to_string()),
            },
        );
        log.add_bytes(2048);
        log.finalize();

        let text = log.render();
        assert!(text.contains("Total datasets to download: 2"));
        assert!(text.contains("Total size of downloaded files: 2 KB"));
        assert!(text.contains("DS1 - Roads [EPSG:25833] (2 KB)"));
        assert!(text.contains("== Failed (1) =="));
        assert!(text.contains("    feed request failed: timeout"));
        assert_eq!(log.processed(), 2);
    }

    #[test]
    fn runs_in_the_same_second_keep_separate_logs() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let log = RunLog::start(0);

        let first = log.persist(&dir).unwrap();
        let second = log.persist(&dir).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.file_name(), Some(log.file_name().as_str()));
        assert!(second.as_str().ends_with("-1.txt"));
        assert!(first.as_std_path().is_file() && second.as_std_path().is_file());
    }
}
