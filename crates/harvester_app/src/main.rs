mod commands;
mod config;

use std::future::Future;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use engine_logging::{engine_info, engine_warn, LogDestination};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, DEFAULT_CONFIG_FILENAME};

/// Incrementally harvests a public social feed into a local SQLite database.
#[derive(Debug, Parser)]
#[command(name = "feed_harvester", version)]
struct Cli {
    /// RON configuration file; missing means built-in defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk the feed once and store everything new.
    Harvest {
        /// Stop once records this many days old are seen; 0 walks without a cutoff.
        #[arg(long)]
        days_back: Option<u32>,
    },
    /// Stored record totals and recent daily activity.
    Status,
    /// Store an externally written narrative for one reporting date.
    ImportSummary {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "external")]
        generated_by: String,
    },
    /// Reporting dates that have records but no summary yet.
    PendingSummaries,
    /// Check that the feed URL answers over plain HTTP.
    Probe,
    /// Print the effective configuration as RON.
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    engine_logging::initialize(
        LogDestination::Both,
        config.level_filter()?,
        &config.log_file,
    );
    engine_info!("feed_harvester starting: {:?}", cli.command);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancel.clone()));

        match cli.command {
            Command::Harvest { days_back } => {
                commands::harvest(&config, days_back.unwrap_or(config.days_back), &cancel).await
            }
            Command::Status => commands::status(&config).await,
            Command::ImportSummary {
                date,
                file,
                generated_by,
            } => commands::import_summary(&config, date, &file, &generated_by).await,
            Command::PendingSummaries => commands::pending_summaries(&config).await,
            Command::Probe => commands::probe(&config).await,
            Command::ShowConfig => {
                print!("{}", config.to_pretty_ron()?);
                Ok(())
            }
        }
    })
}

/// Cancels the token on Ctrl-C, or SIGTERM on unix.
///
/// A listener that cannot be installed is logged and never fires.
async fn cancel_on_signal(cancel: CancellationToken) {
    wait_for_shutdown_signal().await;
    engine_info!("shutdown requested; finishing the current step");
    cancel.cancel();
}

/// Resolves when `signal` fires; hangs forever if its listener failed.
async fn listen(signal: impl Future<Output = std::io::Result<()>>, name: &str) {
    if let Err(err) = signal.await {
        engine_warn!("cannot listen for {name}: {err}");
        std::future::pending::<()>().await;
    }
}

async fn ctrl_c() {
    listen(tokio::signal::ctrl_c(), "Ctrl-C").await;
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                received = terminate.recv() => {
                    if received.is_none() {
                        engine_warn!("SIGTERM listener closed");
                        ctrl_c().await;
                    }
                }
            }
        }
        Err(err) => {
            engine_warn!("cannot listen for SIGTERM: {err}");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}
