// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor Ingest CLI
//!
//! Stream serial sensor telemetry into InfluxDB.
//!
//! # Usage
//!
//! ```bash
//! # Run with a configuration file
//! sensor-ingest --config sensor-ingest.yaml
//!
//! # Override the serial device and also log to a file
//! sensor-ingest --config sensor-ingest.yaml --port /dev/ttyUSB0 --log-file sensor_log.log
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use sensor_ingest::{Config, Pipeline, StopHandle};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sensor-ingest")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream serial sensor telemetry into InfluxDB")]
#[command(long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Serial device path (overrides serial.port)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides serial.baud_rate)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Verbose mode (debug logs)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Failed to initialise logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let config = load_config(cli)?;

    tracing::info!(
        port = %config.serial.port,
        baud = config.serial.baud_rate,
        influx = %config.influxdb.url,
        bucket = %config.influxdb.bucket,
        buffer_capacity = config.buffer.capacity,
        "Starting sensor ingest"
    );

    let mut pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;
    ctrlc_handler(pipeline.stop_handle());

    let status = pipeline.run();
    Ok(status.code())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    Ok(config)
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default = if verbose {
        "sensor_ingest=debug"
    } else {
        "sensor_ingest=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(())
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}
