use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use camwatch::config::CameraConfig;
use camwatch::{CamwatchConfig, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "camwatch")]
#[command(about = "Watches camera event feeds and forwards motion alerts")]
#[command(version)]
#[command(long_about = "Listens to the event streams of one or more network cameras, \
turns motion-start events into alert messages, and delivers them through a chat bot gateway. \
Pending alerts are kept in a durable queue and retried until delivered, across restarts.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - load config and queue but don't start components
    #[arg(long, help = "Load configuration and the pending queue, then exit without connecting")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let config = CamwatchConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    let log_guard = init_logging(&args, &config.logging.file)?;

    info!("Starting camwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut supervisor = Supervisor::new(config).await.map_err(|e| {
        error!("Failed to create supervisor: {}", e);
        e
    })?;

    supervisor.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!(
            "✓ Dry run completed successfully - {} message(s) pending",
            supervisor.queue().len().await
        );
        return Ok(());
    }

    supervisor.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = supervisor.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Camwatch exited with code: {}", exit_code);

    // process::exit skips destructors; flush the file log first
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args, log_file: &str) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camwatch={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Plain-text copy of the log next to the console output
    let (file_layer, guard) = if log_file.is_empty() {
        (None, None)
    } else {
        let path = Path::new(log_file);
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("Invalid log file path: {}", log_file))?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    let mut config = CamwatchConfig::default();
    config.cameras.push(CameraConfig {
        name: "Front door".to_string(),
        url: "http://192.168.1.10/cgi-bin/eventManager.cgi?action=attach&codes=%5BVideoMotion%5D&heartbeat=5"
            .to_string(),
        username: "admin".to_string(),
        password: String::new(),
    });

    println!("# Camwatch Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any value can be overridden from the environment, e.g. CAMWATCH_GATEWAY__BOT_TOKEN");
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
