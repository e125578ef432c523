//! Mirror — keep a replica folder identical to a source folder.
//!
//! # Usage
//!
//! ```text
//! mirror <SOURCE> <REPLICA> <INTERVAL_SECS> <LOG_PATH>
//!        [--once] [--dry-run] [--json] [--keep-empty-dirs]
//!        [--on-conflict replace|report] [--max-log-bytes N] [--log-backups N]
//!        [--log-json]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mirror_daemon::{MirrorConfig, DEFAULT_LOG_BACKUPS, DEFAULT_MAX_LOG_BYTES};
use mirror_sync::{ConflictPolicy, SyncReport};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Periodically mirror a source folder into a replica folder",
    long_about = None,
)]
struct Cli {
    /// Folder to mirror from. It is never modified.
    source: PathBuf,

    /// Folder to mirror into. Created if missing.
    replica: PathBuf,

    /// Seconds between synchronization passes.
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: u64,

    /// Log file, rotated by size.
    log_path: PathBuf,

    /// Run a single pass and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Log what would change without touching the replica.
    #[arg(long)]
    dry_run: bool,

    /// Print the pass report as JSON on stdout (requires --once).
    #[arg(long, requires = "once")]
    json: bool,

    /// Leave replica directories that no longer exist in the source.
    #[arg(long)]
    keep_empty_dirs: bool,

    /// What to do when an entry is a file on one side and a directory on the other.
    #[arg(long, value_enum, default_value_t = ConflictArg::Replace)]
    on_conflict: ConflictArg,

    /// Rotate the log file once it reaches this many bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_LOG_BYTES, value_parser = clap::value_parser!(u64).range(1..))]
    max_log_bytes: u64,

    /// Rotated log files to keep.
    #[arg(long, default_value_t = DEFAULT_LOG_BACKUPS)]
    log_backups: usize,

    /// Write the log file as JSON lines instead of plain text.
    #[arg(long)]
    log_json: bool,
}

/// Thin wrapper so clap can parse `ConflictPolicy` from CLI args.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConflictArg {
    /// Delete the replica entry and recreate it from the source.
    Replace,
    /// Leave the replica entry alone and log an error.
    Report,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Replace => ConflictPolicy::Replace,
            ConflictArg::Report => ConflictPolicy::Report,
        }
    }
}

impl Cli {
    fn config(&self) -> MirrorConfig {
        let mut config = MirrorConfig::new(
            &self.source,
            &self.replica,
            Duration::from_secs(self.interval_secs),
            &self.log_path,
        );
        config.options.dry_run = self.dry_run;
        config.options.prune_empty_dirs = !self.keep_empty_dirs;
        config.options.on_conflict = self.on_conflict.into();
        config.log.max_bytes = self.max_log_bytes;
        config.log.max_files = self.log_backups;
        config.log.json = self.log_json;
        // Keep stdout clean for the JSON report.
        config.log.console = !self.json;
        config
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.config();

    if !cli.once {
        mirror_daemon::start_blocking(&config).context("mirror stopped with an error")?;
        return Ok(ExitCode::SUCCESS);
    }

    let report = mirror_daemon::run_once(&config).context("could not start sync pass")?;
    print_report(&report, cli.json)?;
    Ok(if report.aborted.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(report).context("failed to serialize sync report")?;
        println!("{rendered}");
        return Ok(());
    }

    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    match &report.aborted {
        Some(reason) => eprintln!("{prefix}✗ sync aborted: {reason}"),
        None if report.mutations() == 0 && report.is_clean() => {
            println!("{prefix}✓ replica already up to date")
        }
        None => println!("{prefix}✓ {report}"),
    }
    for failure in &report.failures {
        eprintln!("  !  {}: {}", failure.path.display(), failure.error);
    }
    Ok(())
}
