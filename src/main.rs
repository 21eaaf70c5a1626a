// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! camwatch - Multi-Camera Change Detection and Adaptive Watch Scheduling
//!
//! Runs change detection on every motion-enabled camera and, when a
//! reasoning endpoint is configured, an adaptive watch loop that wakes early
//! on motion and raises alerts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use camwatch::detection::HttpClassifier;
use camwatch::reasoning::{ConsoleAlertSink, HttpReasoningEngine, WebhookAlertSink};
use camwatch::{AlertSink, Config, Engine, EngineOptions, VERSION};

/// Bounded wait for each component during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// camwatch - Multi-Camera Change Detection and Adaptive Watch Scheduling
#[derive(Parser, Debug)]
#[command(name = "camwatch")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Camera change detection with an adaptive watch scheduler")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the default watch interval (minutes)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Disable motion detection even if the config enables it
    #[arg(long)]
    no_motion: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    // Initialize logging; flags override the configured level
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.tracing_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("camwatch v{}", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    let options = EngineOptions {
        motion: !args.no_motion,
        interval_minutes: args.interval,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, options))
}

async fn run(config: Config, options: EngineOptions) -> Result<()> {
    let loader = HttpClassifier::loader(&config.classifier, &config.motion.model);
    let reasoning = HttpReasoningEngine::from_config(&config.reasoning)?;
    let alerts: Arc<dyn AlertSink> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url.clone())?),
        None => Arc::new(ConsoleAlertSink),
    };

    let mut engine = Engine::new(config, options, loader)?;
    for camera in engine.registry().list() {
        info!(
            "Camera {} ({} / {}){}",
            camera.display_name,
            camera.home,
            camera.location,
            if camera.enabled { "" } else { " [disabled]" }
        );
    }

    let detection_only = match reasoning {
        Some(reasoning) => {
            engine.attach_watcher(Arc::new(reasoning), Some(alerts), None);
            None
        }
        None => {
            warn!("No reasoning endpoint configured; running detection only");
            engine.detectors().map(|detectors| {
                tokio::spawn(async move {
                    let mut tick = tokio::time::interval(Duration::from_secs(1));
                    loop {
                        tick.tick().await;
                        for event in detectors.get_pending_events() {
                            info!(
                                "Motion on {}: {} ({:.1}%, {} region(s), {} people)",
                                event.camera,
                                event.trigger,
                                event.motion_percentage,
                                event.contour_count,
                                event.person_count
                            );
                        }
                    }
                })
            })
        }
    };

    engine.start();
    info!("camwatch running, press Ctrl+C to shut down");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, cleaning up...");

    if let Some(task) = detection_only {
        task.abort();
    }
    engine.stop(SHUTDOWN_TIMEOUT).await;

    info!("camwatch shutdown complete");
    Ok(())
}
