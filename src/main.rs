use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repoharvest::config::LoggingConfig;
use repoharvest::{Config, GitHubEnumerator, RepositorySource, Roster, Scheduler, TickReport};

#[derive(Parser)]
#[command(name = "repoharvest")]
#[command(about = "Scheduled GitHub repository enumeration for backups")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler in the foreground (default)
    Run,

    /// Enumerate every enabled account once and print the report
    Once {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and show the accounts that will be enumerated
    Check,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if let Some(Commands::Init { force }) = cli.command {
        return cmd_init(&config_path, force);
    }

    let existed = config_path.exists();
    let config = Config::load_or_create(&config_path)?;

    init_logging(&config.logging, cli.verbose)?;
    info!("Starting repoharvest v{}", env!("CARGO_PKG_VERSION"));

    if !existed {
        warn!(
            "No configuration found, wrote defaults to {:?}; add tokens before running",
            config_path
        );
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&config).await,
        Commands::Once { json } => cmd_once(&config, json).await,
        Commands::Check => cmd_check(&config),
        Commands::Init { .. } => unreachable!("handled before loading configuration"),
    }
}

/// Initialize logging from configuration, `RUST_LOG` and verbosity
fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let layer = fmt::layer().with_ansi(logging.color);
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "pretty" => registry.with(layer.pretty()).init(),
        "full" => registry.with(layer).init(),
        "compact" => registry.with(layer.compact()).init(),
        other => bail!("Unknown logging.format '{}' (expected compact, pretty or full)", other),
    }

    Ok(())
}

fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let schedule = config.schedule()?;
    let roster = Roster::from_config(config);
    let enumerator = GitHubEnumerator::new(&config.api)?;

    info!(
        "Using {} API at {} ({} enabled accounts, {} disabled, {} excluded)",
        enumerator.provider_name(),
        config.api.base_url,
        roster.enabled_count(),
        roster.disabled.len(),
        roster.rejected.len()
    );

    Ok(Scheduler::new(schedule, roster, Arc::new(enumerator)))
}

/// Run the scheduler until Ctrl+C
async fn cmd_run(config: &Config) -> Result<()> {
    let (report_sender, report_receiver) = mpsc::channel(4);
    let scheduler = build_scheduler(config)?.with_report_sink(report_sender);

    let consumer = tokio::spawn(consume_reports(report_receiver));

    let shutdown = scheduler.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Shutdown signal received, finishing current tick...");
        shutdown.stop();
    });

    info!("Update interval: {}", config.update_interval);
    scheduler.run().await?;

    let status = scheduler.status();
    info!(
        "Scheduler stopped after {:.1}m: {} ticks completed, {} skipped",
        status.uptime.as_secs_f64() / 60.0,
        status.ticks_completed,
        status.ticks_skipped
    );

    // Dropping the scheduler closes the report channel
    drop(scheduler);
    consumer.await?;

    Ok(())
}

/// Stand-in for the backup step: log what each tick would back up
async fn consume_reports(mut receiver: mpsc::Receiver<TickReport>) {
    while let Some(report) = receiver.recv().await {
        for result in &report.results {
            match result.error() {
                None => info!(
                    "{}: {} repositories ready for backup",
                    result.account,
                    result.repositories().len()
                ),
                Some(error) => warn!("{}: skipping backup this tick ({})", result.account, error),
            }
        }
    }
}

/// Enumerate all accounts once
async fn cmd_once(config: &Config, json: bool) -> Result<()> {
    let scheduler = build_scheduler(config)?;
    let Some(report) = scheduler.run_once().await else {
        bail!("Another tick is already running");
    };

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }

    Ok(())
}

/// Validate configuration and print the roster
fn cmd_check(config: &Config) -> Result<()> {
    let schedule = config.schedule()?;
    let roster = Roster::from_config(config);

    println!("Configuration OK");
    println!("   API: {} (timeout {}s)", config.api.base_url, config.api.timeout);
    println!("   Update interval: {}", config.update_interval);
    for next in schedule.upcoming(Utc).take(3) {
        println!("      next: {}", next);
    }

    println!("\nAccounts:");
    for account in &roster.accounts {
        let (key, value) = account.query.query_pair();
        println!(
            "   ✅ {} ({}={}{})",
            account.id,
            key,
            value,
            if account.validate_name { ", validate_name" } else { "" }
        );
    }
    for id in &roster.disabled {
        println!("   ⏭️  {}: backup disabled", id);
    }
    for rejected in &roster.rejected {
        println!("   ❌ {}: {}", rejected.id, rejected.error);
    }

    if roster.enabled_count() == 0 {
        println!("\n⚠️  No account is enabled for enumeration");
    }

    Ok(())
}

/// Write the default configuration
fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {:?} (use --force to overwrite)",
            config_path
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Config::default().save(config_path)?;

    println!("✅ Default configuration written to {:?}", config_path);
    println!("   Next: add tokens for your organizations and users, then run 'repoharvest check'");
    Ok(())
}
