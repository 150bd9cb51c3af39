use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::{BaseDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::store::write_bytes_atomic;

const APP_DIR_NAME: &str = "geofeed-sync";
const DEFAULT_DOWNLOAD_DIR_NAME: &str = "geofeed-downloads";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub download_directory: Utf8PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Settings {
    pub fn new(download_directory: Utf8PathBuf) -> Self {
        Self {
            download_directory,
            username: None,
            password: None,
        }
    }

    /// Credentials sent along with restricted downloads, if a username is configured.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| (name, self.password.as_deref()))
    }
}

/// Location of the application's own state: selection, history, settings and run logs.
#[derive(Debug, Clone)]
pub struct AppDirs {
    root: Utf8PathBuf,
}

impl AppDirs {
    pub fn new() -> Result<Self, SyncError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_local_dir().join(APP_DIR_NAME)).ok()
            })
            .ok_or_else(|| {
                SyncError::MissingDirectory("local application data directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn settings_path(&self) -> Utf8PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn ensure_root(&self) -> Result<(), SyncError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))
    }
}

pub struct SettingsLoader;

impl SettingsLoader {
    /// Reads `settings.json`, writing a default one first if none exists.
    pub fn load_or_init(dirs: &AppDirs) -> Result<Settings, SyncError> {
        let path = dirs.settings_path();
        if !path.as_std_path().exists() {
            let settings = Settings::new(default_download_directory()?);
            Self::save(dirs, &settings)?;
            tracing::info!("created default settings at {path}");
            return Ok(settings);
        }

        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| SyncError::ConfigRead(path.clone().into_std_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Settings, SyncError> {
        serde_json::from_str(content).map_err(|err| SyncError::ConfigParse(err.to_string()))
    }

    pub fn save(dirs: &AppDirs, settings: &Settings) -> Result<(), SyncError> {
        let content = serde_json::to_vec_pretty(settings)
            .map_err(|err| SyncError::Persistence(err.to_string()))?;
        write_bytes_atomic(&dirs.settings_path(), &content)
    }
}

pub fn default_download_directory() -> Result<Utf8PathBuf, SyncError> {
    let user_dirs = UserDirs::new()
        .ok_or_else(|| SyncError::MissingDirectory("user home directory".to_string()))?;
    let base = user_dirs
        .document_dir()
        .unwrap_or_else(|| user_dirs.home_dir())
        .join(DEFAULT_DOWNLOAD_DIR_NAME);
    Utf8PathBuf::from_path_buf(base)
        .map_err(|_| SyncError::MissingDirectory("non-utf8 documents directory".to_string()))
}
