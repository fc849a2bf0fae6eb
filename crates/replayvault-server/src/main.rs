//! ReplayVault recording host
//!
//! Reads host events as newline-delimited JSON from stdin and drives the
//! recording engine:
//! - Starts, pauses and stops per-participant recordings
//! - Exports instant replays on hotkey events
//! - Sweeps expired artifacts in the background
//!
//! Usage:
//! ```bash
//! # With config file
//! replayvault-server --config replayvault.yaml
//!
//! # Env vars override the config file
//! REPLAYVAULT_RETENTION_ENABLED=true replayvault-server --config replayvault.yaml
//! ```
//!
//! Feed events with:
//! ```bash
//! echo '{"type":"participant_joined","participant":{"name":"Steve","id":"8667ba71"}}' \
//!   | replayvault-server
//! ```

mod config;

use anyhow::Context;
use clap::Parser;
use config::ServerConfig;
use replayvault_core::HostEvent;
use replayvault_session::{RecordingEngine, SpoolCaptureFactory};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// ReplayVault - per-participant session recorder
#[derive(Parser)]
#[command(name = "replayvault-server")]
#[command(about = "Records participant sessions and manages their artifacts", long_about = None)]
#[command(version = concat!(env!("VERSION"), " (", env!("SHA"), ")"))]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "REPLAYVAULT_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the config file)
    #[arg(short, long, value_name = "LEVEL", env = "REPLAYVAULT_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref config_path) => {
            let expanded = shellexpand::tilde(config_path).into_owned();
            ServerConfig::from_file(&expanded)?
        }
        None => ServerConfig::default(),
    };

    // Env vars override the file, CLI overrides both
    config.merge_env();
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.expand_paths();

    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::new(format!("{}", log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        version = env!("VERSION"),
        commit = env!("SHA"),
        config = cli.config.as_deref().unwrap_or("<defaults>"),
        "Starting ReplayVault"
    );

    let factory = Arc::new(SpoolCaptureFactory::new(
        config.recorder.instant_replay.window(),
    ));
    let mut engine = RecordingEngine::start(config.recorder, factory)
        .await
        .context("Failed to start recording engine")?;

    let mut lines = spawn_stdin_reader();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.recv() => {
                match line {
                    Some(line) => dispatch(&mut engine, &line),
                    None => {
                        info!("Event stream closed");
                        break;
                    }
                }
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

/// Read stdin on a plain thread so a pending read never holds up shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read event stream");
                    break;
                }
            }
        }
    });
    rx
}

/// Parse and apply one event line; bad lines are logged and skipped
fn dispatch(engine: &mut RecordingEngine, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let event: HostEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed event");
            return;
        }
    };

    let kind = event.kind();
    if let Err(e) = engine.handle_event(event) {
        warn!(event = kind, error = %e, "Event failed");
    } else {
        debug!(event = kind, "Event handled");
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
