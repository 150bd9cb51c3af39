use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{AppDirs, Settings};
use crate::domain::{DatasetId, DatasetRef, HistoryRecord};
use crate::error::SyncError;

const SELECTION_FILE: &str = "download.json";
const HISTORY_FILE: &str = "downloadHistory.json";
const LOG_DIR: &str = "log";

/// On-disk layout: application state under the app directory, datasets under the
/// configured download directory.
#[derive(Debug, Clone)]
pub struct Store {
    app_root: Utf8PathBuf,
    download_root: Utf8PathBuf,
}

impl Store {
    pub fn new(dirs: &AppDirs, settings: &Settings) -> Self {
        Self::new_with_paths(
            dirs.root().to_path_buf(),
            settings.download_directory.clone(),
        )
    }

    pub fn new_with_paths(app_root: Utf8PathBuf, download_root: Utf8PathBuf) -> Self {
        Self {
            app_root,
            download_root,
        }
    }

    pub fn download_root(&self) -> &Utf8Path {
        &self.download_root
    }

    pub fn selection(&self) -> SelectionStore {
        SelectionStore::new(self.app_root.join(SELECTION_FILE))
    }

    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.app_root.join(HISTORY_FILE))
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.app_root.join(LOG_DIR)
    }

    pub fn dataset_dir(&self, id: &DatasetId) -> Result<Utf8PathBuf, SyncError> {
        Ok(self.download_root.join(id.as_path_component()?))
    }

    /// Creates the dataset's download directory if needed and returns it.
    pub fn ensure_dataset_dir(&self, id: &DatasetId) -> Result<Utf8PathBuf, SyncError> {
        let dir = self.dataset_dir(id)?;
        if !dir.as_std_path().exists() {
            tracing::info!("creating directory {dir}");
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| SyncError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(dir)
    }
}

/// The user's list of datasets to keep synchronized. Saves replace the file wholesale.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: Utf8PathBuf,
}

impl SelectionStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> Vec<DatasetRef> {
        self.try_load().unwrap_or_default()
    }

    /// Like [`load`](Self::load), but `None` when the file exists and cannot be read
    /// back. Such a file must not be overwritten by a run that saw none of its entries.
    pub fn try_load(&self) -> Option<Vec<DatasetRef>> {
        match read_json(&self.path) {
            Ok(selection) => Some(selection.unwrap_or_default()),
            Err(err) => {
                tracing::warn!("{err}; the selection file will be left untouched");
                None
            }
        }
    }

    pub fn save(&self, datasets: &[DatasetRef]) -> Result<(), SyncError> {
        write_json_atomic(&self.path, &datasets)
    }
}

/// Download history keyed by download URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    records: BTreeMap<String, HistoryRecord>,
}

impl History {
    pub fn get(&self, download_url: &str) -> Option<&HistoryRecord> {
        self.records.get(download_url)
    }

    pub fn record(&mut self, record: HistoryRecord) {
        self.records.insert(record.download_url.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.values()
    }

    /// Overlays `other` onto `self`; records for the same URL are replaced.
    pub fn merge(&mut self, other: History) {
        self.records.extend(other.records);
    }
}

impl FromIterator<HistoryRecord> for History {
    fn from_iter<I: IntoIterator<Item = HistoryRecord>>(iter: I) -> Self {
        let mut history = History::default();
        for record in iter {
            history.record(record);
        }
        history
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: Utf8PathBuf,
}

impl HistoryStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> History {
        read_json_or_default::<Vec<HistoryRecord>>(&self.path)
            .into_iter()
            .collect()
    }

    /// Merges `updates` into what is currently on disk and writes the result.
    pub fn save(&self, updates: &History) -> Result<(), SyncError> {
        let mut merged = self.load();
        merged.merge(updates.clone());
        let records: Vec<&HistoryRecord> = merged.records().collect();
        write_json_atomic(&self.path, &records)
    }
}

/// Missing and unparseable files both read as the empty default.
fn read_json_or_default<T: DeserializeOwned + Default>(path: &Utf8Path) -> T {
    match read_json(path) {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            tracing::warn!("{err}; starting empty");
            T::default()
        }
    }
}

/// `Ok(None)` for a missing file, `Err` for one that exists but does not parse.
fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, String> {
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(_) if !path.as_std_path().exists() => return Ok(None),
        Err(err) => return Err(format!("unable to read {path}: {err}")),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| format!("unable to parse {path}: {err}"))
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), SyncError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| SyncError::Persistence(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SyncError::Persistence(format!("create {parent}: {err}")))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| SyncError::Persistence(format!("write {tmp_path}: {err}")))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| SyncError::Persistence(format!("rename {tmp_path}: {err}")))?;
    Ok(())
}
