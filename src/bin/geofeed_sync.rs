use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use geofeed_sync::config::{AppDirs, SettingsLoader};
use geofeed_sync::error::SyncError;
use geofeed_sync::feed::AtomFeedClient;
use geofeed_sync::output::{ConsoleOutput, print_banner, print_summary};
use geofeed_sync::store::Store;
use geofeed_sync::sync::Synchronizer;
use geofeed_sync::transfer::HttpTransfer;

#[derive(Parser)]
#[command(name = "geofeed-sync")]
#[command(about = "Download new versions of the selected geospatial datasets")]
#[command(version)]
struct Cli {
    /// Directory holding the selection, history, settings and run logs
    #[arg(long)]
    path: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::Persistence(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_args(std::env::args()));

    let dirs = match &cli.path {
        Some(path) => AppDirs::with_root(path.clone()),
        None => AppDirs::new()?,
    };
    print_banner(cli.path.as_ref().map(|_| dirs.root().as_str()));
    dirs.ensure_root()?;

    let settings = SettingsLoader::load_or_init(&dirs)?;
    let store = Store::new(&dirs, &settings);
    let feed = AtomFeedClient::new()?;
    let transfer = HttpTransfer::new()?;
    let synchronizer = Synchronizer::new(store, settings, feed, transfer);

    let result = synchronizer.sync(&ConsoleOutput)?;
    print_summary(&result);
    Ok(())
}

/// Accepts the single-dash `-path <dir>` form alongside `--path <dir>`.
fn normalize_args(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|arg| if arg == "-path" { "--path".to_string() } else { arg })
        .collect()
}
