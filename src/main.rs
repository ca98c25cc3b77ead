//! # Stimlink
//!
//! Stream EEG, stimulation and impedance data from a StarStim/Enobio-class
//! device over its serial link.
//!
//! The binary opens the device, starts acquisition, decodes the incoming
//! frame stream, records every accepted frame to JSONL files and keeps the
//! link alive until Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, sleep, timeout, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use stimlink::config::Config;
use stimlink::protocol::DecodedFrame;
use stimlink::serial::{candidate_paths, DeviceSerial, TokioSerialPort};
use stimlink::session::DeviceSession;
use stimlink::telemetry::FrameRecorder;

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "stimlink.log";

#[derive(Debug, Parser)]
#[command(name = "stimlink", version, about = "Stream data from an EEG/stimulation device")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path, overrides `[serial] port`
    #[arg(short, long)]
    port: Option<String>,

    /// Do not record frames to disk
    #[arg(long)]
    no_record: bool,
}

/// Why a streaming session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    LinkLost,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if cli.no_record {
        config.recording.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    let _log_guard = init_logging(config.logging.dir.as_deref());

    info!("Stimlink v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut recorder = if config.recording.enabled {
        Some(
            FrameRecorder::new(
                &config.recording.dir,
                config.recording.max_records_per_file,
                config.recording.max_files_to_keep,
            )
            .context("Failed to create recording directory")?,
        )
    } else {
        info!("Frame recording disabled");
        None
    };

    let reconnect_delay = Duration::from_millis(config.serial.reconnect_interval_ms);

    loop {
        let serial = match DeviceSerial::open_with_paths(
            &candidate_paths(&config.serial.port),
            config.serial.baud_rate,
        ) {
            Ok(serial) => serial,
            Err(e) => {
                warn!("{}, retrying in {} ms", e, config.serial.reconnect_interval_ms);
                tokio::select! {
                    _ = sleep(reconnect_delay) => continue,
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        };
        info!("Device serial port opened at: {}", serial.device_path());

        let mut session = DeviceSession::new(serial.into_port(), config.decoder_config());
        match stream(&mut session, &config, recorder.as_mut()).await {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::LinkLost) => {
                warn!("Link lost, reconnecting in {} ms", config.serial.reconnect_interval_ms);
                sleep(reconnect_delay).await;
            }
            Err(e) => {
                error!("Session failed: {}", e);
                sleep(reconnect_delay).await;
            }
        }
    }

    if let Some(recorder) = recorder.as_mut() {
        recorder.flush().context("Failed to flush recording")?;
        info!("Recorded {} frames", recorder.total_records());
    }

    Ok(())
}

/// Set up stdout logging, plus a daily rolling file when `dir` is set
///
/// The returned guard must live until exit so buffered lines reach the file.
fn init_logging(dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            None
        }
    }
}

/// Run one connection until shutdown or link loss
async fn stream(
    session: &mut DeviceSession<TokioSerialPort>,
    config: &Config,
    mut recorder: Option<&mut FrameRecorder>,
) -> stimlink::error::Result<SessionEnd> {
    let start = config.streaming.start_command;
    let write_timeout = Duration::from_millis(config.serial.timeout_ms);
    let keep_alive = Duration::from_millis(config.streaming.keep_alive_interval_ms);
    let log_every = config.streaming.status_log_interval_frames;

    session.send(&start.start()).await?;
    info!("Sent {} command", start.start().name());

    let mut keep_alive_tick = interval(keep_alive);
    keep_alive_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut frame_count: u64 = 0;
    let mut last_log_count: u64 = 0;

    info!("Streaming, press Ctrl+C to exit");

    loop {
        tokio::select! {
            received = session.receive(|frame: &DecodedFrame| {
                frame_count += 1;
                if let Some(recorder) = recorder.as_deref_mut() {
                    if let Err(e) = recorder.record(frame) {
                        warn!("Failed to record frame: {}", e);
                    }
                }
            }) => {
                if let Err(e) = received {
                    warn!("Receive failed: {}", e);
                    return Ok(SessionEnd::LinkLost);
                }

                if frame_count - last_log_count >= log_every {
                    let stats = session.decoder().stats();
                    info!(
                        "Decoded {} frames ({} bytes, {} framing errors), device status 0x{:02X}",
                        stats.frames_decoded,
                        stats.bytes_received,
                        stats.framing_errors,
                        session.decoder().last_device_status()
                    );
                    last_log_count = frame_count;
                }
            }

            _ = keep_alive_tick.tick() => {
                match timeout(write_timeout, session.maintain(keep_alive)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        warn!("Keep-alive failed: {}", e);
                        return Ok(SessionEnd::LinkLost);
                    }
                    Err(_) => warn!("Keep-alive write timed out after {} ms", config.serial.timeout_ms),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                match timeout(write_timeout, session.send(&start.stop())).await {
                    Ok(Ok(())) => info!("Sent {} command", start.stop().name()),
                    Ok(Err(e)) => warn!("Failed to stop acquisition: {}", e),
                    Err(_) => warn!("Stop command timed out after {} ms", config.serial.timeout_ms),
                }
                info!("Total frames received: {}", frame_count);
                return Ok(SessionEnd::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["stimlink"]);
        assert!(cli.config.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.no_record);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["stimlink", "-c", "dev.toml", "--port", "/dev/ttyUSB1", "--no-record"]);
        assert_eq!(cli.config, Some(PathBuf::from("dev.toml")));
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB1"));
        assert!(cli.no_record);
    }

    #[test]
    fn test_log_file_prefix() {
        assert!(LOG_FILE_PREFIX.starts_with("stimlink"));
    }
}
