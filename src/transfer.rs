use std::fs;
use std::io::{Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_DISPOSITION;
use tempfile::NamedTempFile;

use crate::config::Settings;
use crate::domain::{canonical_file_name, sanitize_file_name};
use crate::error::SyncError;
use crate::http::{build_client, send_with_retries, status_failure};

const CHUNK_SIZE: usize = 64 * 1024;
const UNKNOWN_LENGTH_REPORT_STEP: u64 = 1024 * 1024;
const FALLBACK_FILE_NAME: &str = "download";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source_url: String,
    pub destination_dir: Utf8PathBuf,
    pub restricted: bool,
}

/// One progress notification. `bytes_so_far` never decreases within a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub total_bytes: Option<u64>,
    pub bytes_so_far: u64,
    pub percent: u8,
}

impl TransferProgress {
    pub fn new(total_bytes: Option<u64>, bytes_so_far: u64) -> Self {
        let percent = match total_bytes {
            Some(0) => 100,
            Some(total) => ((bytes_so_far.min(total) * 100) / total) as u8,
            None => 0,
        };
        Self {
            total_bytes,
            bytes_so_far,
            percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Name of the written file, relative to the request's destination directory.
    pub file_name: String,
    pub bytes: u64,
}

pub trait Transfer: Send + Sync {
    fn start(
        &self,
        request: &DownloadRequest,
        settings: &Settings,
        progress: &mut dyn FnMut(TransferProgress),
    ) -> Result<TransferOutcome, SyncError>;
}

#[derive(Clone)]
pub struct HttpTransfer {
    client: Client,
    disposition: Regex,
}

impl HttpTransfer {
    pub fn new() -> Result<Self, SyncError> {
        // No overall timeout: dataset archives can take a long time to stream.
        let client = build_client(None).map_err(SyncError::TransferHttp)?;
        let disposition = Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'[^']*')?"?([^";]+)"?"#)
            .map_err(|err| SyncError::TransferHttp(err.to_string()))?;
        Ok(Self {
            client,
            disposition,
        })
    }

    fn file_name_for(&self, response: &Response, request: &DownloadRequest) -> String {
        response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| self.disposition.captures(value))
            .and_then(|cap| cap.get(1))
            .map(|name| sanitize_file_name(name.as_str()))
            .filter(|name| !name.is_empty())
            .or_else(|| canonical_file_name(response.url().as_str()))
            .or_else(|| canonical_file_name(&request.source_url))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
    }
}

impl Transfer for HttpTransfer {
    fn start(
        &self,
        request: &DownloadRequest,
        settings: &Settings,
        progress: &mut dyn FnMut(TransferProgress),
    ) -> Result<TransferOutcome, SyncError> {
        let credentials = request.restricted.then(|| settings.credentials()).flatten();
        if request.restricted && credentials.is_none() {
            tracing::warn!(url = %request.source_url, "restricted dataset requested without a configured username");
        }

        let response = send_with_retries(|| {
            let builder = self.client.get(&request.source_url);
            match credentials {
                Some((user, password)) => builder.basic_auth(user, password),
                None => builder,
            }
        })
        .map_err(|err| SyncError::TransferHttp(err.to_string()))?;
        if !response.status().is_success() {
            let (status, message) = status_failure(response, "download request failed");
            return Err(SyncError::TransferStatus { status, message });
        }

        let file_name = self.file_name_for(&response, request);
        let total = response.content_length();
        tracing::info!(url = %request.source_url, file = %file_name, total, "starting transfer");

        let mut temp = tempfile::Builder::new()
            .prefix(".geofeed-sync")
            .tempfile_in(request.destination_dir.as_std_path())
            .map_err(|err| SyncError::TransferIo(err.to_string()))?;
        let bytes = stream_body(response, temp.as_file_mut(), total, progress)?;
        temp.as_file_mut()
            .flush()
            .map_err(|err| SyncError::TransferIo(err.to_string()))?;

        let destination = request.destination_dir.join(&file_name);
        persist_replacing(temp, &destination)?;
        tracing::info!(file = %destination, bytes, "transfer finished");

        Ok(TransferOutcome { file_name, bytes })
    }
}

/// Moves a finished download onto `destination`. The previous copy is only removed when
/// the platform refuses to rename over it.
fn persist_replacing(temp: NamedTempFile, destination: &Utf8Path) -> Result<(), SyncError> {
    let failed = match temp.persist(destination.as_std_path()) {
        Ok(_) => return Ok(()),
        Err(failed) => failed,
    };
    if !destination.as_std_path().is_file() {
        return Err(SyncError::TransferIo(failed.error.to_string()));
    }
    tracing::debug!("rename onto {destination} refused ({}); replacing", failed.error);
    fs::remove_file(destination.as_std_path())
        .map_err(|err| SyncError::TransferIo(err.to_string()))?;
    failed
        .file
        .persist(destination.as_std_path())
        .map(|_| ())
        .map_err(|err| SyncError::TransferIo(err.error.to_string()))
}

fn stream_body(
    mut body: impl Read,
    out: &mut impl Write,
    total: Option<u64>,
    progress: &mut dyn FnMut(TransferProgress),
) -> Result<u64, SyncError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    let mut last_percent = None;
    let mut last_reported = 0u64;
    progress(TransferProgress::new(total, 0));
    loop {
        let read = body
            .read(&mut buffer)
            .map_err(|err| SyncError::TransferHttp(err.to_string()))?;
        if read == 0 {
            break;
        }
        out.write_all(&buffer[..read])
            .map_err(|err| SyncError::TransferIo(err.to_string()))?;
        written += read as u64;

        let update = TransferProgress::new(total, written);
        let due = match total {
            Some(_) => last_percent != Some(update.percent),
            None => written - last_reported >= UNKNOWN_LENGTH_REPORT_STEP,
        };
        if due {
            last_percent = Some(update.percent);
            last_reported = written;
            progress(update);
        }
    }
    if last_reported != written {
        progress(TransferProgress::new(total.or(Some(written)), written));
    }
    Ok(written)
}
