// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 Line Protocol encoding and HTTP client.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::config::{InfluxDbConfig, MeasurementNames};
use crate::reading::{FieldValue, MeasurementKind, Reading};
use crate::sink::{SinkError, TimeSeriesClient};
use reqwest::blocking::Client;
use reqwest::Url;
use std::time::Duration;

/// InfluxDB v2 Line Protocol writer.
///
/// Accumulates points in an internal buffer and produces Line Protocol strings
/// when flushed.
pub struct LineProtocolWriter {
    names: MeasurementNames,
    /// Static tags, kept sorted by key for canonical form.
    tags: Vec<(String, String)>,
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    /// Create a writer with the given measurement names and static tags.
    pub fn new(names: MeasurementNames, tags: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut tags: Vec<_> = tags.into_iter().collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            names,
            tags,
            buffer: Vec::new(),
        }
    }

    /// Write every measurement of `reading` as its own point.
    pub fn write_reading(&mut self, reading: &Reading) {
        let timestamp_ns = reading.timestamp.timestamp_nanos_opt().unwrap_or_default();
        for (kind, fields) in reading.measurements() {
            let measurement = match kind {
                MeasurementKind::Thermocouple => self.names.thermocouple.clone(),
                MeasurementKind::Gas => self.names.gas.clone(),
            };
            self.write_point(&measurement, &fields, timestamp_ns);
        }
    }

    /// Write a single point in Line Protocol format.
    ///
    /// Points without fields are skipped (InfluxDB requires at least one).
    /// Integer fields carry the `i` suffix.
    pub fn write_point(
        &mut self,
        measurement: &str,
        fields: &[(&str, FieldValue)],
        timestamp_ns: i64,
    ) {
        if fields.is_empty() {
            return;
        }

        let mut line = escape_measurement(measurement);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        // Space separator before fields
        line.push(' ');

        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            match value {
                FieldValue::Float(v) => line.push_str(&v.to_string()),
                FieldValue::Integer(v) => {
                    line.push_str(&v.to_string());
                    line.push('i');
                }
            }
        }

        // Space separator before timestamp
        line.push(' ');
        line.push_str(&timestamp_ns.to_string());

        self.buffer.push(line);
    }

    /// Flush the buffer, returning all accumulated lines.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Escape a measurement name for Line Protocol.
/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys.
/// Commas, equals signs, and spaces must be escaped.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Blocking InfluxDB v2 HTTP client.
pub struct InfluxClient {
    http: Client,
    write_url: Url,
    ping_url: Url,
    token: String,
    encoder: LineProtocolWriter,
}

impl InfluxClient {
    /// Build a client from configuration. No request is made.
    pub fn new(config: &InfluxDbConfig) -> Result<Self, SinkError> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| SinkError::Unexpected(format!("invalid URL {}: {}", config.url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |path: &str| {
            base.join(path)
                .map_err(|e| SinkError::Unexpected(format!("invalid URL {}: {}", config.url, e)))
        };
        let mut write_url = join("api/v2/write")?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &config.org)
            .append_pair("bucket", &config.bucket)
            .append_pair("precision", "ns");
        let ping_url = join("ping")?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SinkError::Unexpected(e.to_string()))?;

        Ok(Self {
            http,
            write_url,
            ping_url,
            token: config.token.clone(),
            encoder: LineProtocolWriter::new(
                config.measurements.clone(),
                config.tags.clone(),
            ),
        })
    }

    /// Line Protocol body for `readings`.
    pub fn encode(&mut self, readings: &[Reading]) -> String {
        for reading in readings {
            self.encoder.write_reading(reading);
        }
        self.encoder.flush().join("\n")
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

impl TimeSeriesClient for InfluxClient {
    fn ping(&mut self) -> Result<(), SinkError> {
        let response = self.http.get(self.ping_url.clone()).send().map_err(classify)?;
        check_status(response)
    }

    fn write_batch(&mut self, readings: &[Reading]) -> Result<(), SinkError> {
        if readings.is_empty() {
            return Ok(());
        }
        let body = self.encode(readings);
        let response = self
            .http
            .post(self.write_url.clone())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .map_err(classify)?;
        check_status(response)
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response.text().unwrap_or_default();
    Err(SinkError::Protocol {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

/// Transport failures are network-class; everything else is unexpected.
fn classify(e: reqwest::Error) -> SinkError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        SinkError::Network(e.to_string())
    } else if let Some(status) = e.status() {
        SinkError::Protocol {
            status: status.as_u16(),
            message: e.to_string(),
        }
    } else {
        SinkError::Unexpected(e.to_string())
    }
}
