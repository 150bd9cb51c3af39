use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("failed to read settings file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse settings: {0}")]
    ConfigParse(String),

    #[error("unable to resolve directory: {0}")]
    MissingDirectory(String),

    #[error("feed request failed: {0}")]
    FeedHttp(String),

    #[error("feed returned status {status}: {message}")]
    FeedStatus { status: u16, message: String },

    #[error("malformed feed document: {0}")]
    FeedParse(String),

    #[error("dataset not found in feed: {0}")]
    DatasetNotInFeed(String),

    #[error("unparseable timestamp: {0}")]
    FreshnessCheck(String),

    #[error("transfer failed: {0}")]
    TransferHttp(String),

    #[error("transfer returned status {status}: {message}")]
    TransferStatus { status: u16, message: String },

    #[error("failed to write download: {0}")]
    TransferIo(String),

    #[error("failed to persist run results: {0}")]
    #[diagnostic(help("the selection and history files were not updated; re-run once the state directory is writable"))]
    Persistence(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
