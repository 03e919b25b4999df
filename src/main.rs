//! Motion Sentry - Main Entry Point
//!
//! `motion-sentry [run]` watches the PIR sensor until interrupted.
//! `motion-sentry once` runs a single capture cycle without the sensor.

use std::env;

use motion_sentry::engine::{GpioMotionSensor, OnnxDetector, StillCamera};
use motion_sentry::logging::init_logging;
use motion_sentry::notify::telegram::TelegramNotifier;
use motion_sentry::notify::AlertDispatcher;
use motion_sentry::service::{self, Services};
use motion_sentry::{Config, WatchList};

use tokio::sync::watch;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Watch,
    Once,
}

async fn run_service(config: Config, mode: Mode) -> Result<(), BoxError> {
    info!("Starting Motion Sentry...");

    // Loaded once and shared read-only by every cycle
    let classifier = OnnxDetector::load(&config.model_path)?;

    let camera = StillCamera::new(
        &config.capture_command,
        &config.capture_dir,
        config.capture_timeout,
    )?;
    info!(
        "Capturing with {} into {}",
        config.capture_command,
        camera.output_dir().display()
    );

    let notifier = TelegramNotifier::new(&config.telegram_token, &config.chat_id)?;
    let dispatcher = AlertDispatcher::new(notifier, WatchList::new(config.watch_list.clone()));
    info!("Alerting chat {} on: {}", config.chat_id, config.watch_list.join(", "));

    match mode {
        Mode::Once => {
            let mut services = Services::new((), camera, classifier, dispatcher);
            let outcome = services.run_cycle(&config).await?;
            info!("Single cycle finished: {:?}", outcome);
        }
        Mode::Watch => {
            let sensor = GpioMotionSensor::open(config.gpio_pin)?;
            let mut services = Services::new(sensor, camera, classifier, dispatcher);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                wait_for_signal().await;
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            });

            // The sensor pin is released when `services` drops, error or not
            let stats = service::run(&config, &mut services, shutdown_rx).await?;
            info!("{:?}", stats);
        }
    }

    Ok(())
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

fn run_main(mode: Mode) -> Result<(), BoxError> {
    let config = Config::from_env()?;

    // Initialize logging
    let _guard = init_logging(&config);

    config.validate()?;

    // Single-threaded: cycles never overlap
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = rt.block_on(run_service(config, mode));
    if let Err(ref e) = result {
        error!("Motion Sentry stopped: {}", e);
    }
    result
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mode = match args.get(1).map(|s| s.as_str()) {
        None | Some("run") => Mode::Watch,
        Some("once") => Mode::Once,
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: motion-sentry [run|once]");
            std::process::exit(2);
        }
    };

    if let Err(e) = run_main(mode) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
