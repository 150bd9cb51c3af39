use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Settings;
use crate::domain::{DatasetRef, HistoryRecord, RemoteDatasetInfo};
use crate::error::SyncError;
use crate::feed::FeedClient;
use crate::freshness::{self, Freshness};
use crate::run_log::{Bucket, RunLog, RunLogEntry, human_readable_bytes};
use crate::store::{History, Store};
use crate::transfer::{DownloadRequest, Transfer, TransferProgress};

const NOT_NECESSARY: &str = "Not necessary to download dataset.";

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ItemStarted {
        position: usize,
        total: usize,
        dataset_id: String,
        title: String,
    },
    Status(String),
    Transfer(TransferProgress),
    ItemFinished {
        bucket: Bucket,
        message: Option<String>,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Result of a dataset that was processed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Updated {
        record: HistoryRecord,
        bytes: u64,
        freshness: Freshness,
    },
    NotUpdated {
        record: HistoryRecord,
    },
}

/// Everything a run produced, before anything is written to disk.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub log: RunLog,
    /// Selection to write back: every input dataset, in input order.
    pub selection: Vec<DatasetRef>,
    /// History records created or confirmed during the run.
    pub history: History,
}

#[derive(Debug, Clone)]
pub struct SyncResult {
    pub log: RunLog,
    pub log_path: Utf8PathBuf,
}

pub struct Synchronizer<F: FeedClient, T: Transfer> {
    store: Store,
    settings: Settings,
    feed: F,
    transfer: T,
}

impl<F: FeedClient, T: Transfer> Synchronizer<F, T> {
    pub fn new(store: Store, settings: Settings, feed: F, transfer: T) -> Self {
        Self {
            store,
            settings,
            feed,
            transfer,
        }
    }

    /// Loads the stores, processes the whole selection and persists the run log, the
    /// selection and the merged history, in that order. A selection file that could not
    /// be read is not written back.
    pub fn sync(&self, sink: &dyn ProgressSink) -> Result<SyncResult, SyncError> {
        let loaded = self.store.selection().try_load();
        let selection_readable = loaded.is_some();
        let selection = loaded.unwrap_or_default();
        let history = self.store.history().load();
        tracing::info!(
            datasets = selection.len(),
            history = history.len(),
            "starting synchronization"
        );

        let report = self.run(selection, &history, sink);

        let log_path = report.log.persist(&self.store.log_dir())?;
        tracing::info!("run log written to {log_path}");
        if selection_readable {
            self.store.selection().save(&report.selection)?;
        }
        self.store.history().save(&report.history)?;

        Ok(SyncResult {
            log: report.log,
            log_path,
        })
    }

    /// Processes every dataset in order. Per-dataset failures are recorded and never stop
    /// the batch.
    pub fn run(
        &self,
        selection: Vec<DatasetRef>,
        history: &History,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let total = selection.len();
        let mut log = RunLog::start(total);
        let mut updated_selection = Vec::with_capacity(total);
        let mut history_updates = History::default();

        for (index, dataset) in selection.into_iter().enumerate() {
            sink.event(ProgressEvent::ItemStarted {
                position: index + 1,
                total,
                dataset_id: dataset.dataset_id.to_string(),
                title: dataset.title.clone(),
            });

            let mut entry = RunLogEntry::for_dataset(&dataset);
            let mut candidate = dataset.clone();
            let bucket = match self.process(&mut candidate, history, sink) {
                Ok(ItemOutcome::Updated {
                    record,
                    bytes,
                    freshness,
                }) => {
                    entry.human_readable_size = Some(human_readable_bytes(bytes));
                    if matches!(freshness, Freshness::UnparseableTimestamp { .. }) {
                        entry.message = Some(freshness.describe());
                    }
                    log.add_bytes(bytes);
                    history_updates.record(record);
                    updated_selection.push(candidate);
                    Bucket::Updated
                }
                Ok(ItemOutcome::NotUpdated { record }) => {
                    entry.message = Some(NOT_NECESSARY.to_string());
                    history_updates.record(record);
                    updated_selection.push(candidate);
                    Bucket::NotUpdated
                }
                Err(err) => {
                    tracing::warn!(dataset = %dataset.dataset_id, "dataset failed: {err}");
                    entry.message = Some(format!("Error while downloading dataset: {err}"));
                    updated_selection.push(dataset);
                    Bucket::Failed
                }
            };

            sink.event(ProgressEvent::ItemFinished {
                bucket,
                message: entry.message.clone(),
            });
            log.push(bucket, entry);
        }

        log.finalize();
        RunReport {
            log,
            selection: updated_selection,
            history: history_updates,
        }
    }

    fn process(
        &self,
        dataset: &mut DatasetRef,
        history: &History,
        sink: &dyn ProgressSink,
    ) -> Result<ItemOutcome, SyncError> {
        let dir = self.store.ensure_dataset_dir(&dataset.dataset_id)?;
        let remote = self.feed.fetch(dataset)?;
        let record = history.get(&remote.download_url);

        let freshness = freshness::assess(record, &remote, &dir);
        if let Freshness::UnparseableTimestamp { reason } = &freshness {
            tracing::warn!(dataset = %dataset.dataset_id, "treating dataset as stale: {reason}");
        }
        tracing::debug!(dataset = %dataset.dataset_id, ?freshness, "freshness assessed");
        sink.event(ProgressEvent::Status(freshness.describe()));

        let outcome = match (freshness.needs_download(), record) {
            (false, Some(record)) => self.confirm_current(dataset, record, &remote, &dir)?,
            _ => self.download(dataset, &remote, &dir, freshness, sink)?,
        };
        dataset.download_url = Some(remote.download_url);
        dataset.last_updated = Some(remote.last_updated);
        Ok(outcome)
    }

    fn download(
        &self,
        dataset: &mut DatasetRef,
        remote: &RemoteDatasetInfo,
        dir: &Utf8Path,
        freshness: Freshness,
        sink: &dyn ProgressSink,
    ) -> Result<ItemOutcome, SyncError> {
        let request = DownloadRequest {
            source_url: remote.download_url.clone(),
            destination_dir: dir.to_path_buf(),
            restricted: dataset.restricted || remote.restricted,
        };
        sink.event(ProgressEvent::Status("Starting download process.".to_string()));
        let outcome = self
            .transfer
            .start(&request, &self.settings, &mut |update| {
                sink.event(ProgressEvent::Transfer(update))
            })?;

        dataset.local_file_path = Some(dir.join(&outcome.file_name).to_string());
        Ok(ItemOutcome::Updated {
            record: HistoryRecord {
                download_url: remote.download_url.clone(),
                downloaded_at: chrono::Utc::now().to_rfc3339(),
                local_file_name: Some(outcome.file_name),
            },
            bytes: outcome.bytes,
            freshness,
        })
    }

    fn confirm_current(
        &self,
        dataset: &mut DatasetRef,
        record: &HistoryRecord,
        remote: &RemoteDatasetInfo,
        dir: &Utf8Path,
    ) -> Result<ItemOutcome, SyncError> {
        let file_name = freshness::existing_local_file(record, remote, dir).ok_or_else(|| {
            SyncError::Filesystem(format!("local file for {} disappeared", remote.download_url))
        })?;
        dataset.local_file_path = Some(dir.join(&file_name).to_string());
        Ok(ItemOutcome::NotUpdated {
            record: HistoryRecord {
                local_file_name: Some(file_name),
                ..record.clone()
            },
        })
    }
}
