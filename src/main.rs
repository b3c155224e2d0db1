//! immich-lcd: show Immich photos on TL LCD panels
//!
//! Runs one display cycle and exits, or with `--interval` keeps cycling
//! until Ctrl+C. Per-panel failures are logged and do not stop the other
//! panels.
//!
//! ## Exit status
//! - `0` every panel was updated (or skipped for quiet hours)
//! - `1` at least one panel failed
//! - `2` configuration or startup error
//!
//! ## Usage
//! ```sh
//! immich-lcd --base-url https://immich.local/api --api-key $KEY \
//!     --serial abc123 --person-id $ALICE \
//!     --serial def456 --asset-id $FAVOURITE
//! ```

use clap::Parser;
use immich_lcd::cache::ThumbnailCache;
use immich_lcd::config::{Cli, EnvFile, Settings};
use immich_lcd::immich::ImmichClient;
use immich_lcd::panel::{self, VendorCli};
use immich_lcd::pipeline::{CycleReport, CyclePlan, PanelOutcome, Pipeline};
use immich_lcd::schedule::BrightnessSchedule;
use immich_lcd::{Error, is_running, plan_targets, setup_signal_handler};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Plain output for cron and systemd/journald; RUST_LOG overrides the level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Error> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let file = match Settings::config_path(&cli, &env) {
        Some(path) => {
            tracing::info!("Config file: {}", path.display());
            EnvFile::load(&path)?
        }
        None => EnvFile::default(),
    };
    let settings = Settings::resolve(&cli, &env, &file)?;

    let schedule = settings
        .schedule
        .as_ref()
        .map(BrightnessSchedule::load)
        .transpose()?;

    tracing::info!("immich-lcd v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Immich: {}", settings.base_url);
    tracing::info!("Size: {}x{}", settings.size, settings.size);

    let driver = VendorCli::from_command_line(&settings.lcd_cli)?;
    let serials = panel::resolve_serials(&settings.serials, &driver).await?;
    let targets = plan_targets(&serials, &settings.asset_ids, &settings.person_ids);
    tracing::info!("Panels: {}", serials.join(", "));

    let client = ImmichClient::new(&settings.base_url, &settings.api_key)
        .with_auth_scheme(settings.auth_scheme)
        .with_take(settings.take);
    let mut pipeline = Pipeline::new(client, driver, settings.size);
    if let Some(dir) = &settings.cache_dir {
        tracing::info!("Thumbnail cache: {}", dir.display());
        pipeline = pipeline.with_cache(ThumbnailCache::new(dir));
    }

    let Some(interval) = settings.interval else {
        let plan = CyclePlan::new(settings.brightness, schedule.as_ref());
        let report = pipeline.run_cycle(&targets, plan).await;
        print_report(&report, settings.size);
        return Ok(exit_code(&report));
    };

    tracing::info!("Watch mode: every {}s, Ctrl+C to stop", interval.as_secs());
    let running = setup_signal_handler();
    while is_running(&running) {
        let plan = CyclePlan::new(settings.brightness, schedule.as_ref());
        let report = pipeline.run_cycle(&targets, plan).await;
        print_report(&report, settings.size);
        if !report.is_success() {
            tracing::warn!("{} of {} panels failed this cycle", report.failures(), report.panels.len());
        }
        wait_or_stop(&running, interval).await;
    }

    tracing::info!("Stopped.");
    Ok(ExitCode::SUCCESS)
}

/// One stdout line per pushed photo, for scripts.
fn print_report(report: &CycleReport, size: u32) {
    for panel in &report.panels {
        if let PanelOutcome::Pushed { asset_id } = &panel.outcome {
            println!(
                "Pushed asset {} to LCD {} at {}x{}.",
                asset_id, panel.serial, size, size
            );
        }
    }
}

fn exit_code(report: &CycleReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Sleep for `interval`, waking up early when Ctrl+C was pressed.
async fn wait_or_stop(running: &AtomicBool, interval: Duration) {
    const TICK: Duration = Duration::from_millis(250);
    let deadline = Instant::now() + interval;
    while is_running(running) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(TICK.min(deadline - now)).await;
    }
}
