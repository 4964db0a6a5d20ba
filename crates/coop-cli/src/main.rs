mod demo;
mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use coop_scheduler::{ConfigLoadError, CoopConfig, FrameDriver, Scheduler};
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the demo race on a frame driver
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Milliseconds between ticks
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Multiplier applied to elapsed wall-clock time
        #[arg(long)]
        time_scale: Option<f64>,

        /// Wall-clock delay before `round_start` is sent from another task
        #[arg(long, default_value_t = 250)]
        start_after_ms: u64,
    },
    /// Write an example config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn create_example_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let example_config = r#"# Coop Scheduler Configuration

[scheduler]
# "strict": a sleeper wakes once the clock is past its wake time
# "inclusive": a sleeper wakes as soon as the clock reaches it
wake_boundary = "strict"
# "clamp" treats a negative step as zero, "reject" refuses it
negative_step = "clamp"

[driver]
tick_interval_ms = 50
time_scale = 1.0
# max_ticks = 200
"#;

    // Make sure what we write is something we can read back
    CoopConfig::from_toml_str(example_config)?;

    fs::write(path, example_config)?;
    info!("Created example config at {}", path.display());
    eprintln!("Config file created at: {}", path.display());

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CoopConfig> {
    let loaded = match path {
        Some(path) => CoopConfig::load_from(path),
        None => CoopConfig::load(),
    };

    match loaded {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound(path)) => {
            info!("No config at {}, using defaults", path.display());
            Ok(CoopConfig::default())
        }
        Err(err) => Err(err).context("loading config"),
    }
}

async fn run_demo(config: CoopConfig, start_after: Duration) -> anyhow::Result<()> {
    let scheduler = Scheduler::with_config(config.scheduler);
    let driver = FrameDriver::new(scheduler.clone(), config.driver);
    let race = demo::spawn_race(&scheduler, driver.handle());

    let starter = driver.handle();
    let starter_task = tokio::spawn(async move {
        tokio::time::sleep(start_after).await;
        info!("Sending {}", demo::ROUND_START);
        if let Err(e) = starter.signal(demo::ROUND_START) {
            warn!("Could not start the round: {}", e);
        }
    });

    let summary = driver.run().await;
    starter_task.abort();

    println!(
        "Ran {} tick(s), {} signal(s), virtual time {}",
        summary.ticks, summary.signals, summary.now
    );
    println!(
        "{} started, {} completed, {} failed, {} cancelled, {} still live",
        summary.stats.started,
        summary.stats.completed,
        summary.stats.failed,
        summary.stats.cancelled,
        summary.stats.live
    );
    race.report();

    let cancelled = scheduler.cancel_all();
    if cancelled > 0 {
        info!("Cancelled {} unfinished task(s)", cancelled);
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init_logging(
        "coop",
        logging::level_for_verbosity(cli.debug),
        cli.log_file,
    )?;

    match cli.command {
        Command::InitConfig { force } => {
            let path = match cli.config {
                Some(path) => path,
                None => CoopConfig::config_path()?,
            };
            create_example_config(&path, force)
        }
        Command::Run {
            ticks,
            tick_ms,
            time_scale,
            start_after_ms,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(ticks) = ticks {
                config.driver.max_ticks = Some(ticks);
            }
            if let Some(tick_ms) = tick_ms {
                config.driver.tick_interval_ms = tick_ms;
            }
            if let Some(time_scale) = time_scale {
                config.driver.time_scale = time_scale;
            }

            info!("Starting coop demo...");
            run_demo(config, Duration::from_millis(start_after_ms)).await
        }
    }
}
