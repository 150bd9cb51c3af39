use std::fs;

use camino::Utf8PathBuf;

use geofeed_sync::config::{AppDirs, Settings, SettingsLoader};
use geofeed_sync::error::SyncError;

#[test]
fn load_reads_existing_settings() {
    let temp = tempfile::tempdir().unwrap();
    let dirs = AppDirs::with_root(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let mut settings = Settings::new(Utf8PathBuf::from("/srv/geodata"));
    settings.username = Some("kari".to_string());
    SettingsLoader::save(&dirs, &settings).unwrap();

    let loaded = SettingsLoader::load_or_init(&dirs).unwrap();
    assert_eq!(loaded, settings);
    assert!(dirs.settings_path().ends_with("settings.json"));
}

#[test]
fn broken_settings_are_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let dirs = AppDirs::with_root(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    fs::write(dirs.settings_path(), b"downloadDirectory=/tmp").unwrap();

    let err = SettingsLoader::load_or_init(&dirs).unwrap_err();
    assert!(matches!(err, SyncError::ConfigParse(_)));
}
