// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted device, client and probe doubles shared by the integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use sensor_ingest::buffer::RingBuffer;
use sensor_ingest::config::SerialConfig;
use sensor_ingest::parser::RecordParser;
use sensor_ingest::pipeline::{LoopSettings, Pipeline};
use sensor_ingest::reading::{Reading, Sample, Thermocouple};
use sensor_ingest::serial::{LineSource, LinkOpener, SerialLink};
use sensor_ingest::sink::{ReachabilityProbe, SinkConnection, SinkError, TimeSeriesClient};
use sensor_ingest::validate::ValidationLimits;
use sensor_ingest::writer::{RetryPolicy, Writer};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted poll result from the device.
pub enum DeviceEvent {
    Bytes(Vec<u8>),
    Error(io::ErrorKind),
}

/// Device whose byte stream is fed by the test.
#[derive(Clone, Default)]
pub struct FakeDevice {
    events: Arc<Mutex<VecDeque<DeviceEvent>>>,
    opens: Arc<AtomicUsize>,
    /// Number of upcoming open attempts that fail.
    failing_opens: Arc<AtomicUsize>,
    /// Successful opens allowed in total; zero means unlimited.
    open_limit: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_line(&self, line: &str) {
        self.push(DeviceEvent::Bytes(format!("{}\r\n", line).into_bytes()));
    }

    pub fn send_error(&self, kind: io::ErrorKind) {
        self.push(DeviceEvent::Error(kind));
    }

    pub fn push(&self, event: DeviceEvent) {
        self.events.lock().expect("device lock").push_back(event);
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    pub fn limit_opens(&self, limit: usize) {
        self.open_limit.store(limit, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn pending_events(&self) -> usize {
        self.events.lock().expect("device lock").len()
    }
}

struct FakeLink {
    events: Arc<Mutex<VecDeque<DeviceEvent>>>,
}

impl SerialLink for FakeLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let mut events = self.events.lock().expect("device lock");
        match events.front() {
            None => Ok(0),
            Some(DeviceEvent::Bytes(bytes)) => Ok(bytes.len()),
            Some(DeviceEvent::Error(kind)) => {
                let kind = *kind;
                events.pop_front();
                Err(io::Error::from(kind))
            }
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut events = self.events.lock().expect("device lock");
        match events.pop_front() {
            Some(DeviceEvent::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    events.push_front(DeviceEvent::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(DeviceEvent::Error(kind)) => Err(io::Error::from(kind)),
            None => Ok(0),
        }
    }
}

impl LinkOpener for FakeDevice {
    fn open(&mut self) -> io::Result<Box<dyn SerialLink>> {
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        let limit = self.open_limit.load(Ordering::SeqCst);
        if limit > 0 && self.opens() >= limit {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLink {
            events: self.events.clone(),
        }))
    }

    fn name(&self) -> &str {
        "fake-device"
    }
}

#[derive(Default)]
struct StoreState {
    delivered: Vec<Reading>,
    write_calls: usize,
    ping_calls: usize,
    /// Results for upcoming writes; empty means success.
    write_script: VecDeque<Result<(), SinkError>>,
    /// When set, every write fails with this error once the script is empty.
    write_default: Option<SinkError>,
    ping_error: Option<SinkError>,
}

/// In-memory time-series store.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_writes(&self, results: Vec<Result<(), SinkError>>) {
        self.state.lock().expect("store lock").write_script.extend(results);
    }

    pub fn fail_all_writes(&self, error: Option<SinkError>) {
        self.state.lock().expect("store lock").write_default = error;
    }

    pub fn fail_pings(&self, error: Option<SinkError>) {
        self.state.lock().expect("store lock").ping_error = error;
    }

    pub fn delivered(&self) -> Vec<Reading> {
        self.state.lock().expect("store lock").delivered.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().expect("store lock").write_calls
    }

    pub fn ping_calls(&self) -> usize {
        self.state.lock().expect("store lock").ping_calls
    }
}

impl TimeSeriesClient for FakeStore {
    fn ping(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock().expect("store lock");
        state.ping_calls += 1;
        match &state.ping_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn write_batch(&mut self, readings: &[Reading]) -> Result<(), SinkError> {
        let mut state = self.state.lock().expect("store lock");
        state.write_calls += 1;
        let result = match state.write_script.pop_front() {
            Some(result) => result,
            None => match &state.write_default {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            },
        };
        if result.is_ok() {
            state.delivered.extend_from_slice(readings);
        }
        result
    }
}

/// Reachability switch controlled by the test. Counts every check.
#[derive(Clone)]
pub struct FakeProbe {
    reachable: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(reachable)),
            checks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for FakeProbe {
    fn is_reachable(&mut self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

pub fn fast_serial_config() -> SerialConfig {
    SerialConfig {
        retry_delay_ms: 0,
        reconnect_delay_ms: 0,
        settle_ms: 0,
        ..Default::default()
    }
}

pub fn fast_settings() -> LoopSettings {
    LoopSettings {
        poll_interval: Duration::ZERO,
        flush_interval: Duration::from_secs(3600),
        flush_batch: 50,
        parse_error_threshold: 10,
        io_error_threshold: 3,
        io_error_backoff: Duration::ZERO,
    }
}

pub fn no_delay_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        delay: Duration::ZERO,
    }
}

/// Sink that re-checks reachability on every maintain call.
pub fn sink(store: &FakeStore, probe: &FakeProbe) -> SinkConnection {
    sink_with_interval(store, probe, Duration::ZERO)
}

pub fn sink_with_interval(
    store: &FakeStore,
    probe: &FakeProbe,
    check_interval: Duration,
) -> SinkConnection {
    SinkConnection::new(
        Box::new(store.clone()),
        Box::new(probe.clone()),
        check_interval,
        3,
    )
}

pub fn writer(store: &FakeStore, probe: &FakeProbe, capacity: usize) -> Writer {
    Writer::new(sink(store, probe), RingBuffer::new(capacity), no_delay_retry(3))
}

pub fn pipeline(
    device: &FakeDevice,
    store: &FakeStore,
    probe: &FakeProbe,
    capacity: usize,
    settings: LoopSettings,
) -> Pipeline {
    let source = LineSource::new(Box::new(device.clone()), &fast_serial_config());
    Pipeline::new(
        source,
        RecordParser::new(ValidationLimits::default()),
        writer(store, probe, capacity),
        settings,
    )
}

/// Thermocouple reading whose hot-junction value identifies it.
pub fn reading(id: u32) -> Reading {
    let ts = Utc
        .timestamp_opt(1_700_000_000 + i64::from(id), 0)
        .single()
        .expect("timestamp");
    Reading::new(
        ts,
        Sample::Thermocouple(Thermocouple {
            hot_junction: f64::from(id),
            cold_junction: 25.0,
            adc: 1000.0,
        }),
    )
}

pub fn ids(readings: impl IntoIterator<Item = Reading>) -> Vec<u32> {
    readings
        .into_iter()
        .map(|r| r.thermocouple().hot_junction as u32)
        .collect()
}
