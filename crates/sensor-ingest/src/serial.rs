// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial line acquisition.
//!
//! [`LineSource`] owns the device connection. Reads never block: the port is
//! asked how many bytes are waiting, those bytes are appended to a pending
//! buffer, and a line is returned only once its terminator has arrived.
//!
//! The port itself sits behind the [`SerialLink`] / [`LinkOpener`] traits so
//! the pipeline can be driven by scripted links in tests.

use crate::banner::{BannerClassifier, LineClass};
use crate::config::SerialConfig;
use crate::state::ConnectionState;
use chrono::{DateTime, Utc};
use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;

/// Longest line accepted before the pending bytes are discarded.
pub const MAX_LINE_BYTES: usize = 4096;

/// Device errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open {port} after {attempts} attempts: {source}")]
    Connect {
        port: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("device is not open")]
    NotOpen,
}

/// A raw text line and the time it was taken off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// An open byte stream from the device.
pub trait SerialLink {
    /// Bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens (and re-opens) the device.
pub trait LinkOpener {
    fn open(&mut self) -> io::Result<Box<dyn SerialLink>>;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;
}

/// Opens a real serial port through the `serialport` crate.
pub struct SerialPortOpener {
    path: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(
            config.port.clone(),
            config.baud_rate,
            Duration::from_millis(config.timeout_ms),
        )
    }
}

impl LinkOpener for SerialPortOpener {
    fn open(&mut self) -> io::Result<Box<dyn SerialLink>> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.timeout)
            .open()?;
        // Drop whatever was queued before we attached.
        port.clear(serialport::ClearBuffer::Input)?;
        Ok(Box::new(PortLink(port)))
    }

    fn name(&self) -> &str {
        &self.path
    }
}

struct PortLink(Box<dyn serialport::SerialPort>);

impl SerialLink for PortLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.0.bytes_to_read()? as usize)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// Owner of the device connection.
pub struct LineSource {
    opener: Box<dyn LinkOpener>,
    link: Option<Box<dyn SerialLink>>,
    pending: Vec<u8>,
    classifier: BannerClassifier,
    state: ConnectionState,
    connect_attempts: u32,
    retry_delay: Duration,
    reconnect_delay: Duration,
    settle: Duration,
}

impl LineSource {
    /// Create a disconnected source. Call [`LineSource::connect`] before reading.
    pub fn new(opener: Box<dyn LinkOpener>, config: &SerialConfig) -> Self {
        Self {
            opener,
            link: None,
            pending: Vec::with_capacity(256),
            classifier: BannerClassifier::new(config.banner_patterns.clone(), config.banner_window),
            state: ConnectionState::Disconnected,
            connect_attempts: config.connect_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            settle: Duration::from_millis(config.settle_ms),
        }
    }

    /// Open the device, retrying a bounded number of times.
    pub fn connect(&mut self) -> Result<(), DeviceError> {
        let attempts = self.connect_attempts;
        let mut last_error = io::Error::other("no connection attempt made");

        for attempt in 1..=attempts {
            match self.opener.open() {
                Ok(link) => {
                    self.link = Some(link);
                    self.pending.clear();
                    self.classifier.reset();
                    self.state = ConnectionState::Connected;
                    tracing::info!(port = self.opener.name(), "Serial port connected");
                    if !self.settle.is_zero() {
                        std::thread::sleep(self.settle);
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        port = self.opener.name(),
                        attempt,
                        attempts,
                        error = %e,
                        "Serial connect attempt failed"
                    );
                    last_error = e;
                    if attempt < attempts && !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        tracing::error!(port = self.opener.name(), "Serial port unavailable");
        Err(DeviceError::Connect {
            port: self.opener.name().to_string(),
            attempts,
            source: last_error,
        })
    }

    /// Close and re-open the device. Resets banner detection.
    pub fn reconnect(&mut self) -> Result<(), DeviceError> {
        tracing::info!(port = self.opener.name(), "Reconnecting serial port");
        self.close();
        if !self.reconnect_delay.is_zero() {
            std::thread::sleep(self.reconnect_delay);
        }
        self.connect()
    }

    /// Poll for one complete line.
    ///
    /// Returns `Ok(None)` when no full line is available yet; that is not an
    /// error. Blank lines are skipped.
    pub fn read_line(&mut self) -> Result<Option<RawLine>, DeviceError> {
        let link = self.link.as_mut().ok_or(DeviceError::NotOpen)?;

        loop {
            if let Some(text) = take_line(&mut self.pending) {
                if text.is_empty() {
                    continue;
                }
                self.state = ConnectionState::Connected;
                return Ok(Some(RawLine {
                    text,
                    received_at: Utc::now(),
                }));
            }

            let available = match link.bytes_available() {
                Ok(n) => n,
                Err(e) => {
                    self.state = ConnectionState::Degraded;
                    return Err(e.into());
                }
            };
            if available == 0 {
                return Ok(None);
            }

            let mut chunk = vec![0u8; available.min(MAX_LINE_BYTES)];
            let n = match link.read_available(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => {
                    self.state = ConnectionState::Degraded;
                    return Err(e.into());
                }
            };
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend_from_slice(&chunk[..n]);

            if self.pending.len() > MAX_LINE_BYTES && !self.pending.contains(&b'\n') {
                tracing::warn!(
                    bytes = self.pending.len(),
                    "Discarding unterminated line"
                );
                self.pending.clear();
            }
        }
    }

    /// True if `line` is device banner text rather than data.
    pub fn is_init_message(&mut self, line: &str) -> bool {
        self.classifier.classify(line) == LineClass::Banner
    }

    /// Drop the connection.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            tracing::info!(port = self.opener.name(), "Serial port closed");
        }
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn classifier(&self) -> &BannerClassifier {
        &self.classifier
    }
}

/// Split the first terminated line off `pending`, trimmed and lossily decoded.
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    let raw: Vec<u8> = pending.drain(..=end).collect();
    Some(String::from_utf8_lossy(&raw).trim().to_string())
}
