// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Main ingestion loop.
//!
//! Connects the line source, parser, writer and sink into one
//! single-threaded control flow:
//!
//! ```text
//! Init --> Running --> Draining --> Stopped
//! ```
//!
//! Each [`Pipeline::step`] runs the periodic sink check, a due buffer flush,
//! and at most one device line. The only deliberate pause is the poll sleep
//! when no line is waiting, which is also where a stop request is noticed.

use crate::buffer::RingBuffer;
use crate::config::Config;
use crate::influx::InfluxClient;
use crate::parser::{RecordParser, Rejection};
use crate::serial::{DeviceError, LineSource, SerialPortOpener};
use crate::sink::{SinkConnection, SinkError, TcpProbe};
use crate::writer::{RetryPolicy, WriteOutcome, Writer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity at which sleeps check for a stop request.
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Fatal pipeline errors. Everything else is recovered inside the loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("serial device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    #[error("serial device lost: {0}")]
    DeviceLost(#[source] DeviceError),
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Draining,
    Stopped,
}

/// How the pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Operator-requested shutdown.
    Clean,
    /// The device could not be opened at start-up.
    DeviceUnavailable,
    /// The device failed and could not be re-opened.
    DeviceLost,
}

impl ExitStatus {
    /// Process exit code.
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::DeviceUnavailable => 1,
            ExitStatus::DeviceLost => 2,
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No complete line was available.
    Idle,
    /// A banner line, passed through untouched.
    Banner(String),
    /// A reading was accepted and written or buffered.
    Accepted(WriteOutcome),
    /// A data line was rejected.
    Rejected(Rejection),
    /// The device reported an I/O error.
    DeviceError,
    /// The device was re-opened after repeated failures.
    Reconnected,
}

/// Pipeline statistics.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Complete lines read from the device.
    pub lines_read: u64,
    /// Lines classified as banner text.
    pub banner_lines: u64,
    /// Readings that passed parsing and validation.
    pub accepted: u64,
    /// Data lines rejected by the parser or validator.
    pub rejected: u64,
    /// Readings delivered directly.
    pub delivered: u64,
    /// Readings placed in the buffer.
    pub buffered: u64,
    /// Buffered readings delivered by flushes.
    pub flushed: u64,
    /// Device I/O errors.
    pub device_errors: u64,
    /// Forced device reconnects.
    pub device_reconnects: u64,
}

/// Loop timing and escalation thresholds.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub flush_interval: Duration,
    pub flush_batch: usize,
    pub parse_error_threshold: u32,
    pub io_error_threshold: u32,
    pub io_error_backoff: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms),
            flush_interval: Duration::from_secs(config.buffer.flush_interval_secs),
            flush_batch: config.buffer.flush_batch,
            parse_error_threshold: config.pipeline.parse_error_threshold,
            io_error_threshold: config.pipeline.io_error_threshold,
            io_error_backoff: Duration::from_millis(config.pipeline.io_error_backoff_ms),
        }
    }
}

/// Handle for requesting shutdown from another thread (e.g. a signal handler).
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a clean shutdown.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// The ingestion orchestrator.
pub struct Pipeline {
    source: LineSource,
    parser: RecordParser,
    writer: Writer,
    settings: LoopSettings,
    state: PipelineState,
    stop: Arc<AtomicBool>,
    stats: PipelineStats,
    parse_errors: u32,
    io_errors: u32,
    last_flush: Instant,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        source: LineSource,
        parser: RecordParser,
        writer: Writer,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            parser,
            writer,
            settings,
            state: PipelineState::Init,
            stop: Arc::new(AtomicBool::new(false)),
            stats: PipelineStats::default(),
            parse_errors: 0,
            io_errors: 0,
            last_flush: Instant::now(),
        }
    }

    /// Build a pipeline talking to a real serial port and InfluxDB.
    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        let source = LineSource::new(
            Box::new(SerialPortOpener::from_config(&config.serial)),
            &config.serial,
        );

        let client = InfluxClient::new(&config.influxdb)?;
        let probe = TcpProbe::from_url(
            &config.influxdb.url,
            Duration::from_millis(config.pipeline.reachability_timeout_ms),
        )?;
        let sink = SinkConnection::new(
            Box::new(client),
            Box::new(probe),
            Duration::from_secs(config.pipeline.reachability_interval_secs),
            config.pipeline.degraded_after,
        );
        let writer = Writer::new(
            sink,
            RingBuffer::new(config.buffer.capacity),
            RetryPolicy {
                attempts: config.pipeline.write_attempts,
                delay: Duration::from_millis(config.pipeline.write_retry_delay_ms),
            },
        );

        Ok(Self::new(
            source,
            RecordParser::new(config.validation),
            writer,
            LoopSettings::from_config(config),
        ))
    }

    /// Get a handle to stop the pipeline from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Init: open the device (fatal on failure) and try the sink (offline
    /// mode on failure).
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.state = PipelineState::Init;
        tracing::info!("Starting sensor ingestion");

        if let Err(e) = self.source.connect() {
            self.state = PipelineState::Stopped;
            return Err(PipelineError::DeviceUnavailable(e));
        }

        if !self.writer.sink_mut().connect() {
            tracing::warn!("Sink connection failed, starting in offline mode");
        }

        self.last_flush = Instant::now();
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Run one loop iteration.
    pub fn step(&mut self) -> Result<StepOutcome, PipelineError> {
        self.writer.sink_mut().maintain();

        if self.last_flush.elapsed() >= self.settings.flush_interval {
            if self.writer.sink().is_connected() && !self.writer.buffer().is_empty() {
                self.stats.flushed += self.writer.flush(self.settings.flush_batch) as u64;
            }
            self.last_flush = Instant::now();
        }

        let line = match self.source.read_line() {
            Ok(Some(line)) => {
                self.io_errors = 0;
                line
            }
            Ok(None) => {
                self.io_errors = 0;
                self.pause(self.settings.poll_interval);
                return Ok(StepOutcome::Idle);
            }
            Err(e) => return self.on_device_error(e),
        };
        self.stats.lines_read += 1;

        if self.source.is_init_message(&line.text) {
            self.stats.banner_lines += 1;
            tracing::info!(line = %line.text, "Device init message");
            return Ok(StepOutcome::Banner(line.text));
        }

        match self.parser.parse(&line.text, line.received_at) {
            Ok(reading) => {
                self.parse_errors = 0;
                self.stats.accepted += 1;
                let t = reading.thermocouple();
                tracing::debug!(
                    th = t.hot_junction,
                    tc = t.cold_junction,
                    adc = t.adc,
                    "Reading accepted"
                );

                let outcome = self.writer.write(reading);
                match outcome {
                    WriteOutcome::Delivered => self.stats.delivered += 1,
                    WriteOutcome::Buffered => self.stats.buffered += 1,
                }
                Ok(StepOutcome::Accepted(outcome))
            }
            Err(rejection) => {
                self.stats.rejected += 1;
                self.parse_errors += 1;
                tracing::warn!(
                    line = %line.text,
                    reason = %rejection,
                    consecutive = self.parse_errors,
                    "Invalid data line"
                );

                if self.parse_errors >= self.settings.parse_error_threshold {
                    tracing::error!(
                        consecutive = self.parse_errors,
                        "Too many invalid lines, reconnecting device"
                    );
                    self.parse_errors = 0;
                    self.reconnect_device()?;
                }
                Ok(StepOutcome::Rejected(rejection))
            }
        }
    }

    fn on_device_error(&mut self, error: DeviceError) -> Result<StepOutcome, PipelineError> {
        self.stats.device_errors += 1;
        self.io_errors += 1;
        tracing::error!(error = %error, consecutive = self.io_errors, "Serial read error");

        if self.io_errors >= self.settings.io_error_threshold {
            self.io_errors = 0;
            self.reconnect_device()?;
            return Ok(StepOutcome::Reconnected);
        }

        self.pause(self.settings.io_error_backoff);
        Ok(StepOutcome::DeviceError)
    }

    fn reconnect_device(&mut self) -> Result<(), PipelineError> {
        self.stats.device_reconnects += 1;
        self.source.reconnect().map_err(PipelineError::DeviceLost)
    }

    /// Sleep for `duration`, returning early on a stop request.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
        }
    }

    /// Draining: one final flush if the sink is up, then close both endpoints.
    pub fn drain(&mut self) {
        self.state = PipelineState::Draining;

        if self.writer.sink().is_connected() && !self.writer.buffer().is_empty() {
            tracing::info!("Flushing buffer before shutdown");
            self.stats.flushed += self.writer.flush(self.settings.flush_batch) as u64;
        }
        let remaining = self.writer.buffer().len();
        if remaining > 0 {
            tracing::warn!(remaining, "Unsent readings discarded at shutdown");
        }

        self.source.close();
        self.writer.sink_mut().close();
        self.state = PipelineState::Stopped;
    }

    /// Run until stopped or the device is lost (blocking).
    pub fn run(&mut self) -> ExitStatus {
        if let Err(e) = self.start() {
            tracing::error!(error = %e, "Cannot start without the serial device");
            return ExitStatus::DeviceUnavailable;
        }
        self.run_started()
    }

    /// Loop on an already started pipeline, then drain.
    pub fn run_started(&mut self) -> ExitStatus {
        let status = loop {
            if self.stop_requested() {
                tracing::info!("Shutdown requested");
                break ExitStatus::Clean;
            }
            if let Err(e) = self.step() {
                tracing::error!(error = %e, "Unrecoverable device failure");
                break ExitStatus::DeviceLost;
            }
        };

        self.drain();
        tracing::info!(
            lines_read = self.stats.lines_read,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            delivered = self.stats.delivered,
            buffered = self.stats.buffered,
            flushed = self.stats.flushed,
            evicted = self.writer.buffer().evicted(),
            "Pipeline stopped"
        );
        status
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    pub fn source(&self) -> &LineSource {
        &self.source
    }
}
