use std::fs;

use camino::Utf8PathBuf;

use geofeed_sync::domain::{HistoryRecord, RemoteDatasetInfo};
use geofeed_sync::freshness::{Freshness, assess, existing_local_file, needs_download};

fn remote(last_updated: &str) -> RemoteDatasetInfo {
    RemoteDatasetInfo {
        title: "Elveg".to_string(),
        download_url: "https://files.example/elveg/Elveg_0301.zip".to_string(),
        last_updated: last_updated.to_string(),
        category: Some("EPSG:25833".to_string()),
        restricted: false,
    }
}

fn record(downloaded_at: &str, local_file_name: Option<&str>) -> HistoryRecord {
    HistoryRecord {
        download_url: "https://files.example/elveg/Elveg_0301.zip".to_string(),
        downloaded_at: downloaded_at.to_string(),
        local_file_name: local_file_name.map(str::to_string),
    }
}

fn dir_with(files: &[&str]) -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    for name in files {
        fs::write(dir.join(name), b"zip").unwrap();
    }
    (temp, dir)
}

#[test]
fn no_history_always_downloads() {
    let (_temp, dir) = dir_with(&["Elveg_0301.zip"]);
    for stamp in ["1999-01-01", "2024-01-01", "not a date"] {
        assert_eq!(assess(None, &remote(stamp), &dir), Freshness::NoHistory);
        assert!(needs_download(None, &remote(stamp), &dir));
    }
}

#[test]
fn missing_local_file_downloads_even_when_current() {
    let (_temp, dir) = dir_with(&[]);
    let history = record("2030-01-01T00:00:00Z", Some("Elveg_0301.zip"));
    assert_eq!(
        assess(Some(&history), &remote("2024-01-01"), &dir),
        Freshness::LocalFileMissing
    );
}

#[test]
fn up_to_date_when_remote_not_newer_and_file_present() {
    let (_temp, dir) = dir_with(&["renamed.zip"]);
    let history = record("2024-01-02T00:00:00Z", Some("renamed.zip"));
    assert!(!needs_download(Some(&history), &remote("2024-01-01"), &dir));
    assert!(!needs_download(Some(&history), &remote("2023-12-31T23:59:59Z"), &dir));
}

#[test]
fn remote_newer_downloads() {
    let (_temp, dir) = dir_with(&["Elveg_0301.zip"]);
    let history = record("2024-01-01T00:00:00Z", Some("Elveg_0301.zip"));
    assert_eq!(
        assess(Some(&history), &remote("2024-01-01T00:00:01Z"), &dir),
        Freshness::RemoteNewer
    );
}

#[test]
fn unrecorded_file_name_falls_back_to_url_name() {
    let (_temp, dir) = dir_with(&["Elveg_0301.zip"]);
    let history = record("2024-06-01T00:00:00Z", None);
    assert_eq!(
        assess(Some(&history), &remote("2024-01-01"), &dir),
        Freshness::UpToDate
    );

    let (_temp, empty) = dir_with(&[]);
    assert_eq!(
        assess(Some(&history), &remote("2024-01-01"), &empty),
        Freshness::LocalFileMissing
    );
}

#[test]
fn unparseable_timestamp_counts_as_stale() {
    let (_temp, dir) = dir_with(&["Elveg_0301.zip"]);
    let history = record("2024-06-01T00:00:00Z", Some("Elveg_0301.zip"));
    let freshness = assess(Some(&history), &remote("31.12.2023"), &dir);
    assert!(matches!(freshness, Freshness::UnparseableTimestamp { .. }));
    assert!(freshness.needs_download());
}

#[test]
fn recorded_name_outside_dataset_dir_is_ignored() {
    let (_temp, root) = dir_with(&["escaped.zip"]);
    let dir = root.join("DS1");
    fs::create_dir_all(&dir).unwrap();
    let history = record("2030-01-01T00:00:00Z", Some("../escaped.zip"));
    assert_eq!(
        assess(Some(&history), &remote("2024-01-01"), &dir),
        Freshness::LocalFileMissing
    );
    assert_eq!(existing_local_file(&history, &remote("2024-01-01"), &dir), None);
}
