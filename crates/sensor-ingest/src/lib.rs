// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor Ingest
//!
//! Reads line-oriented telemetry from a serial device and persists it to
//! InfluxDB v2, riding out outages of either endpoint.
//!
//! This crate provides:
//! - Non-blocking serial line acquisition with device-reset (banner) detection
//! - Parsing and physical-range validation of thermocouple and gas-sensor lines
//! - A bounded ring buffer that holds readings while the sink is down
//! - Delivery with bounded retry and periodic buffer flushing
//! - InfluxDB v2 Line Protocol generation and a blocking HTTP client
//!
//! # Overview
//!
//! ```text
//! LineSource --> BannerClassifier --> RecordParser --> Writer --+--> SinkConnection
//!                                                               |
//!                                                               +--> RingBuffer --(flush)--> SinkConnection
//! ```
//!
//! Everything runs on one thread driven by [`Pipeline`].

pub mod banner;
pub mod buffer;
pub mod config;
pub mod influx;
pub mod parser;
pub mod pipeline;
pub mod reading;
pub mod serial;
pub mod sink;
pub mod state;
pub mod validate;
pub mod writer;

pub use buffer::RingBuffer;
pub use config::Config;
pub use pipeline::{ExitStatus, Pipeline, StopHandle};
pub use reading::Reading;
pub use state::ConnectionState;
pub use writer::{WriteOutcome, Writer};
