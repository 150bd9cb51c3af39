use std::fs;

use camino::Utf8PathBuf;

use geofeed_sync::domain::{DatasetRef, HistoryRecord};
use geofeed_sync::store::{History, HistoryStore, SelectionStore};

fn temp_file(name: &str) -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap();
    (temp, path)
}

fn sample_selection() -> Vec<DatasetRef> {
    let mut first = DatasetRef::new(
        "041f1e6e".parse().unwrap(),
        "Elveg",
        "https://feed.example/elveg.xml",
    )
    .with_category("EPSG:25833");
    first.organization = Some("Kartverket".to_string());
    first.restricted = true;
    let second = DatasetRef::new(
        "5d7c".parse().unwrap(),
        "N50 Kartdata",
        "https://feed.example/n50.xml",
    );
    vec![first, second]
}

#[test]
fn missing_selection_loads_empty() {
    let (_temp, path) = temp_file("download.json");
    assert!(SelectionStore::new(path).load().is_empty());
}

#[test]
fn unparseable_selection_loads_empty() {
    let (_temp, path) = temp_file("download.json");
    fs::write(&path, b"{ not json").unwrap();
    assert!(SelectionStore::new(path).load().is_empty());
}

#[test]
fn try_load_tells_missing_from_broken() {
    let (_temp, path) = temp_file("download.json");
    let store = SelectionStore::new(path.clone());
    assert_eq!(store.try_load(), Some(Vec::new()));

    fs::write(&path, b"{ not json").unwrap();
    assert_eq!(store.try_load(), None);
}

#[test]
fn selection_round_trip_is_byte_identical() {
    let (_temp, path) = temp_file("download.json");
    let store = SelectionStore::new(path.clone());
    store.save(&sample_selection()).unwrap();
    let first = fs::read(&path).unwrap();

    let loaded = store.load();
    assert_eq!(loaded, sample_selection());
    store.save(&loaded).unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn selection_save_replaces_previous_list() {
    let (_temp, path) = temp_file("download.json");
    let store = SelectionStore::new(path);
    store.save(&sample_selection()).unwrap();
    store.save(&sample_selection()[1..]).unwrap();
    assert_eq!(store.load().len(), 1);
}

#[test]
fn selection_accepts_legacy_field_names() {
    let (_temp, path) = temp_file("download.json");
    fs::write(
        &path,
        r#"[{"DatasetId": "x1", "Title": "Roads", "DatasetUrl": "https://feed.example/r.xml",
             "Url": "https://files.example/r.zip", "Proportion": "EPSG:4258", "FilePath": "r.zip",
             "Restrictions": "restricted"}]"#,
    )
    .unwrap();
    let loaded = SelectionStore::new(path).load();
    assert_eq!(loaded[0].source_url, "https://feed.example/r.xml");
    assert_eq!(loaded[0].download_url.as_deref(), Some("https://files.example/r.zip"));
    assert_eq!(loaded[0].category.as_deref(), Some("EPSG:4258"));
    assert_eq!(loaded[0].local_file_path.as_deref(), Some("r.zip"));
    assert!(loaded[0].restricted);
}

#[test]
fn history_save_merges_with_file_contents() {
    let (_temp, path) = temp_file("downloadHistory.json");
    let store = HistoryStore::new(path);
    let first: History = [
        HistoryRecord {
            download_url: "u1".to_string(),
            downloaded_at: "2024-01-01T00:00:00Z".to_string(),
            local_file_name: Some("one.zip".to_string()),
        },
        HistoryRecord {
            download_url: "u2".to_string(),
            downloaded_at: "2024-01-01T00:00:00Z".to_string(),
            local_file_name: Some("two.zip".to_string()),
        },
    ]
    .into_iter()
    .collect();
    store.save(&first).unwrap();

    let update: History = [HistoryRecord {
        download_url: "u2".to_string(),
        downloaded_at: "2024-03-01T00:00:00Z".to_string(),
        local_file_name: Some("two-v2.zip".to_string()),
    }]
    .into_iter()
    .collect();
    store.save(&update).unwrap();

    let loaded = store.load();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get("u1").unwrap().local_file_name.as_deref(), Some("one.zip"));
    assert_eq!(
        loaded.get("u2").unwrap().local_file_name.as_deref(),
        Some("two-v2.zip")
    );
}

#[test]
fn unparseable_history_loads_empty() {
    let (_temp, path) = temp_file("downloadHistory.json");
    fs::write(&path, b"[{]").unwrap();
    assert!(HistoryStore::new(path).load().is_empty());
}
