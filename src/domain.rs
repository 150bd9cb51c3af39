use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

const RESTRICTED: &str = "restricted";
const NORWAY_DIGITAL_RESTRICTED: &str = "norway digital restricted";

/// Identifier of a dataset in the selection. Also names its download directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id if it can be used as a single directory name.
    pub fn as_path_component(&self) -> Result<&str, SyncError> {
        if is_path_component(&self.0) {
            Ok(&self.0)
        } else {
            Err(SyncError::InvalidDatasetId(self.0.clone()))
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !is_path_component(normalized) {
            return Err(SyncError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// True when `value` names a single entry inside a directory.
pub fn is_path_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
        && !value.contains(':')
}

/// A dataset the user keeps synchronized. Persisted as one element of the selection file.
///
/// Selection files written by the earlier desktop client use PascalCase names and carry
/// the restriction as a label; both are accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    #[serde(alias = "DatasetId")]
    pub dataset_id: DatasetId,
    #[serde(default, alias = "Title")]
    pub title: String,
    /// Feed document describing this dataset.
    #[serde(default, alias = "DatasetUrl")]
    pub source_url: String,
    #[serde(default, alias = "Url", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, alias = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "LastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, alias = "Proportion", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "Organization", skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, alias = "Restrictions", deserialize_with = "restriction_flag")]
    pub restricted: bool,
    #[serde(default, alias = "FilePath", skip_serializing_if = "Option::is_none")]
    pub local_file_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RestrictionValue {
    Flag(bool),
    Label(String),
}

fn restriction_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<RestrictionValue>::deserialize(deserializer)? {
        Some(RestrictionValue::Flag(flag)) => flag,
        Some(RestrictionValue::Label(label)) => is_restricted_label(&label),
        None => false,
    })
}

impl DatasetRef {
    pub fn new(dataset_id: DatasetId, title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            dataset_id,
            title: title.into(),
            source_url: source_url.into(),
            download_url: None,
            description: None,
            last_updated: None,
            category: None,
            organization: None,
            restricted: false,
            local_file_path: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Freshness metadata read from the feed for one dataset during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDatasetInfo {
    pub title: String,
    pub download_url: String,
    pub last_updated: String,
    pub category: Option<String>,
    pub restricted: bool,
}

impl RemoteDatasetInfo {
    /// File name a download of this dataset lands under when the server does not name it.
    pub fn canonical_file_name(&self) -> Option<String> {
        canonical_file_name(&self.download_url)
    }
}

/// Last successful download of one download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub download_url: String,
    #[serde(alias = "Downloaded")]
    pub downloaded_at: String,
    #[serde(default, alias = "FilePath", skip_serializing_if = "Option::is_none")]
    pub local_file_name: Option<String>,
}

pub fn is_restricted_label(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    normalized == RESTRICTED || normalized == NORWAY_DIGITAL_RESTRICTED
}

/// Last non-empty path segment of a URL, stripped of anything unsafe for a file name.
pub fn canonical_file_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|part| !part.is_empty()).last()?;
    let name = sanitize_file_name(segment);
    (!name.is_empty()).then_some(name)
}

pub fn sanitize_file_name(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            other => other,
        })
        .collect();
    cleaned.trim_matches('.').to_string()
}
