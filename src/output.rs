use std::io::{self, Write};

use crate::run_log::{Bucket, RunLog, human_readable_bytes};
use crate::sync::{ProgressEvent, ProgressSink, SyncResult};

const SEPARATOR: &str = "-------------";

/// Prints per-dataset status and an in-place transfer progress line to stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stdout = io::stdout();
        let _ = match event {
            ProgressEvent::ItemStarted {
                position,
                total,
                dataset_id,
                title,
            } => writeln!(stdout, "[{position}/{total}] {dataset_id} - {title}"),
            ProgressEvent::Status(message) => writeln!(stdout, "{message}"),
            ProgressEvent::Transfer(update) => {
                let done = human_readable_bytes(update.bytes_so_far);
                let line = match update.total_bytes {
                    Some(total) => format!(
                        "{}% ({done}/{})",
                        update.percent,
                        human_readable_bytes(total)
                    ),
                    None => done,
                };
                // pad to blank out a longer previous line
                write!(stdout, "\r{line:<40}").and_then(|_| stdout.flush())
            }
            ProgressEvent::ItemFinished { bucket, message } => {
                let mut block = String::new();
                if bucket == Bucket::Updated {
                    // terminate the progress line
                    block.push('\n');
                }
                if let Some(message) = message {
                    block.push_str(&message);
                    block.push('\n');
                }
                writeln!(stdout, "{block}{SEPARATOR}")
            }
        };
    }
}

/// Routes progress through `tracing` only; used when nothing should be printed.
pub struct LogOutput;

impl ProgressSink for LogOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ItemStarted {
                dataset_id, title, ..
            } => tracing::info!(dataset = %dataset_id, "processing {title}"),
            ProgressEvent::Status(message) => tracing::debug!("{message}"),
            ProgressEvent::Transfer(update) => tracing::trace!(
                bytes = update.bytes_so_far,
                total = update.total_bytes,
                percent = update.percent,
                "transfer progress"
            ),
            ProgressEvent::ItemFinished { bucket, message } => {
                tracing::info!(?bucket, message = message.as_deref().unwrap_or(""), "dataset finished")
            }
        }
    }
}

pub fn print_banner(app_dir: Option<&str>) {
    println!("geofeed-sync {}", env!("CARGO_PKG_VERSION"));
    println!("--------------------");
    if let Some(dir) = app_dir {
        println!("App directory     : {dir}");
    }
}

pub fn print_summary(result: &SyncResult) {
    let log: &RunLog = &result.log;
    println!("Run log           : {}", result.log_path);
    println!("Datasets processed: {}/{}", log.processed(), log.total_datasets_to_download);
    println!("Updated           : {}", log.updated.len());
    println!("Not updated       : {}", log.not_updated.len());
    println!("Failed            : {}", log.failed.len());
    println!("Downloaded        : {}", log.total_size_of_downloaded_files);
    for entry in &log.failed {
        if let Some(message) = &entry.message {
            println!("  {} - {}: {message}", entry.dataset_id, entry.title);
        }
    }
}
