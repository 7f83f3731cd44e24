mod sim;

use anyhow::{Context, Result};
use colored::Colorize;
use fuzzmon::prelude::*;
use fuzzmon::{MONITOR_NAME, VERSION as LIB_VERSION};
use serde::Deserialize;
use sim::{CampaignSettings, CampaignStatistics};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WATCH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything `fuzzwatch.toml` can set. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct WatchConfig {
    #[serde(default)]
    engine: FuzzerConfig,
    #[serde(default)]
    monitor: MonitorConfig,
    #[serde(default)]
    campaign: CampaignSettings,
}

/// Loads `path` (or an optional `fuzzwatch.toml` in the working directory),
/// then applies `FUZZWATCH__SECTION__KEY` environment overrides.
fn load_config(path: Option<&str>) -> Result<WatchConfig> {
    let file = match path {
        Some(path) => config::File::with_name(path).required(true),
        None => config::File::with_name("fuzzwatch").required(false),
    };
    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("FUZZWATCH")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .context("failed to read configuration")?;
    settings
        .try_deserialize()
        .context("invalid configuration")
}

fn print_banner(engine: &FuzzEngine) {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let rule = "-".repeat(72);
    println!("{}", MONITOR_NAME.cyan().bold());
    println!(
        "          Watch   v{:<8} Library   v{:<8}",
        WATCH_VERSION, LIB_VERSION
    );
    println!("{}", rule.dimmed());
    println!(
        "Instance {} started {}",
        engine.id().short().cyan(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "{}",
        format!(
            "Send SIGUSR1 (kill -USR1 {}) to print the next generated program.",
            std::process::id()
        )
        .dimmed()
    );
    println!("{}", rule.dimmed());
}

/// Arms the program dump each time the process receives SIGUSR1.
#[cfg(unix)]
fn spawn_dump_trigger(ui: Arc<TerminalUi>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut requests = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        while requests.recv().await.is_some() {
            if ui.print_next_generated_program().await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_dump_trigger(_ui: Arc<TerminalUi>) -> Result<()> {
    warn!("Program dumps on request need SIGUSR1 and are unavailable on this platform.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(env::args().nth(1).as_deref())?;
    config.monitor.color.apply();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let statistics = Arc::new(CampaignStatistics::new(
        config.engine.collect_runtime_types,
        config.campaign.workers,
    ));
    let engine = FuzzEngine::builder(config.engine.clone())
        .strategy_name(config.campaign.strategy.clone())
        .statistics(statistics.clone())
        .spawn();

    print_banner(&engine);

    // Handlers must be in place before the engine does anything.
    let ui = Arc::new(TerminalUi::attach(&engine, config.monitor.clone()).await?);
    spawn_dump_trigger(Arc::clone(&ui))?;

    engine.initialize().await?;
    let campaign = tokio::spawn(sim::run_campaign(
        engine.clone(),
        statistics,
        config.campaign.clone(),
    ));

    engine.run().await?;

    match campaign.await {
        Ok(Err(e)) => warn!("Campaign ended with an error: {e:#}"),
        Err(e) => warn!("Campaign task failed: {e}"),
        Ok(Ok(())) => {}
    }
    info!("{} exiting.", MONITOR_NAME);
    Ok(())
}
