use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use feedwatch::app::App;
use feedwatch::config::Settings;
use feedwatch::modules::{feed_module, poller_module, FEED_MODULE, POLLER_MODULE};

#[derive(Parser)]
#[command(
    name = "feedwatch",
    version,
    about = "Long-lived feed polling service with module container and job scheduler",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the settings file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling service
    Run {
        /// Settings file path
        #[arg(short, long, default_value = "feedwatch.toml")]
        config: PathBuf,
    },

    /// Validate a settings file and exit
    CheckConfig {
        /// Settings file path
        #[arg(short, long, default_value = "feedwatch.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { config } => run(config.clone(), &cli).await,
        Commands::CheckConfig { config } => check_config(config.clone()),
    }
}

async fn run(config_path: PathBuf, cli: &Cli) -> Result<()> {
    let settings = Settings::from_file(&config_path)
        .with_context(|| format!("failed to load settings from {}", config_path.display()))?;

    let mut app = build_app()?;

    // Config is fully applied to every module descriptor before any
    // activation, and all enabled modules finish activating before the
    // run loop starts.
    app.apply_config(&settings.modules)?;

    setup_tracing(&settings, cli, app.log_directives())?;
    tracing::info!(config = %config_path.display(), "feedwatch starting");

    app.start_enabled()?;

    tokio::select! {
        result = app.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping");
        }
    }
    Ok(())
}

fn check_config(config_path: PathBuf) -> Result<()> {
    let settings = Settings::from_file(&config_path)
        .with_context(|| format!("failed to load settings from {}", config_path.display()))?;

    // Re-run the module registration and config fan-out without activating
    // anything, so duplicate names and malformed tables surface here.
    let mut app = build_app()?;
    app.apply_config(&settings.modules)?;

    println!("{}: OK", config_path.display());
    Ok(())
}

fn build_app() -> Result<App> {
    let mut app = App::new();
    app.register(FEED_MODULE, feed_module())?;
    app.register(POLLER_MODULE, poller_module())?;
    Ok(app)
}

fn setup_tracing(settings: &Settings, cli: &Cli, directives: Vec<(String, String)>) -> Result<()> {
    let default_level = if cli.verbose {
        "debug"
    } else {
        &settings.logging.level
    };
    let (filter, rejected) = build_env_filter(default_level, directives);

    let format = cli
        .log_format
        .as_deref()
        .unwrap_or(&settings.logging.format);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        "json" => builder.json().init(),
        _ => builder.init(),
    }

    // Emitted only now that the subscriber is installed
    for (module, level) in rejected {
        tracing::warn!(module = %module, value = %level, "ignoring bad _log_level");
    }

    Ok(())
}

/// Build the env filter from the default level plus the per-module
/// `_log_level` values, returning the pairs that did not parse as
/// directives
fn build_env_filter(
    default_level: &str,
    directives: Vec<(String, String)>,
) -> (EnvFilter, Vec<(String, String)>) {
    let mut filter = EnvFilter::try_from_env("FEEDWATCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let mut rejected = Vec::new();
    for (module, level) in directives {
        match format!("{module}={level}").parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(_) => rejected.push((module, level)),
        }
    }
    (filter, rejected)
}
