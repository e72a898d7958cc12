//! scriptwatch CLI
//!
//! Local execution entry point: one-off scans, the watch loop, and store
//! maintenance.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use scriptwatch::{
    error::{AppError, Result},
    models::Config,
    models::config::validate_domain,
    pipeline::{self, ScanEngine, ScanRunner, Scheduler},
    services::{Analyzer, ManifestExtractor, Notifier, build_notifier},
    storage::LocalStorage,
};

/// scriptwatch - new and modified script asset alerts
#[derive(Parser, Debug)]
#[command(
    name = "scriptwatch",
    version,
    about = "Detects new and modified client-side scripts on watched domains"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "scriptwatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan configured domains once
    Scan {
        /// Scan only this domain
        #[arg(long)]
        domain: Option<String>,
    },

    /// Scan on the configured interval until interrupted
    Watch,

    /// Show tracking statistics for a domain
    Stats {
        #[arg(long)]
        domain: String,
    },

    /// Mark a file's current version as alerted without notifying
    Ack {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        url: String,
    },

    /// Remove unreferenced snapshots past the retention period
    Prune,

    /// Validate configuration and storage
    Validate,
}

/// Initialize logging from the verbosity flag or the configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_engine(config: &Config, storage: Arc<LocalStorage>) -> Result<ScanEngine> {
    let notifier: Arc<dyn Notifier> = Arc::from(build_notifier(&config.notifier)?);
    let engine = ScanEngine::new(storage.clone(), storage, notifier)
        .with_notify_timeout(config.notifier.timeout());

    if config.analysis.enabled {
        Ok(engine.with_analyzer(Analyzer::new(&config.analysis)?))
    } else {
        Ok(engine)
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = if cli.config.exists() {
        Some(Config::load(&cli.config)?)
    } else {
        None
    };
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = match loaded {
        Some(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        None => {
            log::warn!(
                "Config file {} not found, using defaults",
                cli.config.display()
            );
            Config::default()
        }
    };
    config.validate()?;

    let storage = Arc::new(LocalStorage::new(&config.storage.root));
    let engine = Arc::new(build_engine(&config, Arc::clone(&storage))?);
    let extractor = Arc::new(ManifestExtractor::new(&config.extractor.manifest_dir));
    let runner = ScanRunner::new(Arc::clone(&engine), extractor, &config.scan);

    match cli.command {
        Command::Scan { domain } => {
            let domains = match domain {
                Some(domain) => {
                    validate_domain(&domain)?;
                    vec![domain]
                }
                None => config.domains.clone(),
            };
            if domains.is_empty() {
                return Err(AppError::config("No domains to scan"));
            }

            engine.ping().await?;
            let report = runner.run_batch(&domains).await;
            for summary in &report.summaries {
                println!("{}", serde_json::to_string(summary)?);
            }
            if !report.is_clean() {
                log::warn!("{} of {} domains failed", report.failures.len(), domains.len());
            }
        }

        Command::Watch => {
            let mut scheduler = Scheduler::new(&config.domains, config.scan.interval(), Utc::now())?;
            log::info!(
                "Watching {} domains every {}s",
                config.domains.len(),
                config.scan.interval_secs
            );
            runner
                .run_until(&mut scheduler, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Failed to listen for ctrl-c: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
        }

        Command::Stats { domain } => {
            let stats = pipeline::domain_stats(&*storage, &domain, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Ack { domain, url } => {
            let record = engine.acknowledge(&domain, &url).await?;
            log::info!(
                "Acknowledged {} at {}",
                record.url,
                record.current_fingerprint.short()
            );
        }

        Command::Prune => {
            let retention = Duration::days(i64::from(config.storage.snapshot_retention_days));
            let report =
                pipeline::prune_snapshots(&*storage, &*storage, retention, Utc::now())
                    .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Validate => {
            engine.ping().await?;
            log::info!(
                "Configuration OK: {} domains, storage at {}",
                config.domains.len(),
                storage.root().display()
            );
        }
    }

    Ok(())
}
