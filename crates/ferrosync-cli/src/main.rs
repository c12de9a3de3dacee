//! ferrosync command line interface
//!
//! Keeps a replica directory identical to a source directory, re-syncing on
//! a fixed interval until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use ferrosync_config::{Config, ConfigLoader, LoggingConfig, RunSettings};
use ferrosync_mirror::{
    CopyOptions, LocalFs, MirrorEngine, MirrorOptions, TickDriver, TracingSink,
    VerificationOptions,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

mod display;

#[derive(Parser)]
#[command(name = "ferrosync")]
#[command(about = "One-way periodic directory mirroring")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "ferrosync contributors")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Only log warnings and errors, and skip console summaries
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the source directory into the replica, repeatedly
    Run {
        /// Directory to mirror
        #[arg(long, value_name = "DIR")]
        source_path: Option<PathBuf>,

        /// Directory kept identical to the source
        #[arg(long, value_name = "DIR")]
        replica_path: Option<PathBuf>,

        /// Seconds between the end of one sync and the start of the next
        #[arg(long, value_name = "SECONDS")]
        sync_interval: Option<u64>,

        /// File receiving a copy of every log line
        #[arg(long, value_name = "FILE")]
        log_file: Option<PathBuf>,

        /// Run a single sync and exit
        #[arg(long)]
        once: bool,

        /// Report what would change without touching the replica
        #[arg(long)]
        dry_run: bool,

        /// Do not preserve modification times on copied files
        #[arg(long)]
        no_preserve_times: bool,
    },
    /// Configuration management
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,

        /// Generate configuration file
        #[arg(long, value_name = "FILE")]
        generate: Option<PathBuf>,
    },
}

/// Command line values that override the loaded configuration
#[derive(Debug, Default)]
struct RunOverrides {
    source_path: Option<PathBuf>,
    replica_path: Option<PathBuf>,
    sync_interval: Option<u64>,
    log_file: Option<PathBuf>,
    dry_run: bool,
    no_preserve_times: bool,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.source_path {
            config.sync.source_path = Some(path);
        }
        if let Some(path) = self.replica_path {
            config.sync.replica_path = Some(path);
        }
        if let Some(secs) = self.sync_interval {
            config.sync.interval_secs = secs;
        }
        if let Some(path) = self.log_file {
            config.logging.log_file = Some(path);
        }
        if self.dry_run {
            config.sync.dry_run = true;
        }
        if self.no_preserve_times {
            config.sync.preserve_timestamps = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source_path,
            replica_path,
            sync_interval,
            log_file,
            once,
            dry_run,
            no_preserve_times,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            RunOverrides {
                source_path,
                replica_path,
                sync_interval,
                log_file,
                dry_run,
                no_preserve_times,
            }
            .apply(&mut config);

            let level = log_level(cli.debug, cli.quiet, cli.verbose, &config.logging);
            let _guard = init_logging(&level, &config.logging)?;

            let settings = config
                .resolve_run()
                .context("Invalid mirror configuration")?;
            run_command(settings, once, cli.quiet).await
        }
        Commands::Config { default, generate } => {
            config_command(cli.config.as_deref(), default, generate)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };
    Ok(config)
}

/// Pick the log level: flags win over the configured level
fn log_level(debug: bool, quiet: bool, verbose: bool, logging: &LoggingConfig) -> String {
    if debug {
        "trace".to_string()
    } else if verbose {
        "debug".to_string()
    } else if quiet {
        "warn".to_string()
    } else {
        logging.level.clone()
    }
}

/// Log to stdout and, when configured, to a file
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the whole run.
fn init_logging(level: &str, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let stdout_layer = if logging.json_format {
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(logging.colored_output)
            .boxed()
    };
    layers.push(stdout_layer);

    let guard = match &logging.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = if logging.json_format {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(false)
                    .with_ansi(false)
                    .boxed()
            };
            layers.push(file_layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

fn mirror_options(settings: &RunSettings) -> MirrorOptions {
    MirrorOptions::new()
        .with_dry_run(settings.dry_run)
        .with_copy(CopyOptions {
            preserve_timestamps: settings.preserve_timestamps,
            preserve_permissions: settings.preserve_permissions,
        })
        .with_verification(VerificationOptions {
            algorithm: settings.algorithm,
            size_fast_path: settings.size_fast_path,
            buffer_size: settings.buffer_size,
        })
}

async fn run_command(settings: RunSettings, once: bool, quiet: bool) -> Result<()> {
    let engine = MirrorEngine::new(
        LocalFs::new(),
        settings.mapping.clone(),
        Arc::new(TracingSink::new()),
    )
    .with_options(mirror_options(&settings));
    debug!("Engine: {engine:?}");

    info!(
        "Mirroring {} to {} every {:?}{}",
        settings.mapping.source_root().display(),
        settings.mapping.replica_root().display(),
        settings.interval.get(),
        if settings.dry_run { " (dry run)" } else { "" }
    );

    let mut driver = TickDriver::new(Arc::new(engine), settings.interval);
    if once {
        driver = driver.with_max_ticks(1);
    }

    let shutdown = shutdown_signal()?;

    let summary = driver
        .run(shutdown, |report| {
            if !quiet {
                display::print_tick_summary(report);
            }
        })
        .await
        .context("Mirroring stopped")?;

    if !quiet {
        display::print_driver_summary(&summary);
    }
    Ok(())
}

/// Install the Ctrl-C handler and return a future resolving when it fires
///
/// The handler is registered before this returns, so an interrupt during the
/// first tick is held until the driver checks for shutdown.
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    #[cfg(unix)]
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("Failed to install Ctrl-C handler")?;
    #[cfg(windows)]
    let mut interrupt = signal::windows::ctrl_c().context("Failed to install Ctrl-C handler")?;

    Ok(async move {
        if interrupt.recv().await.is_some() {
            info!("Interrupt received, stopping after the current tick");
        } else {
            std::future::pending::<()>().await;
        }
    })
}

fn config_command(path: Option<&Path>, default: bool, generate: Option<PathBuf>) -> Result<()> {
    if let Some(file) = generate {
        ConfigLoader::generate_default_config(&file)
            .with_context(|| format!("Failed to write {}", file.display()))?;
        println!(
            "{} Generated configuration file: {}",
            style("✓").green(),
            style(file.display()).cyan()
        );
        return Ok(());
    }

    let config = if default {
        Config::default()
    } else {
        load_config(path)?
    };
    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;

    let title = if default {
        "Default Configuration"
    } else {
        "Effective Configuration"
    };
    println!("{}", style(title).bold().underlined());
    print!("{yaml}");
    Ok(())
}
