// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery of readings to the sink, with buffering on failure.
//!
//! A reading handed to [`Writer::write`] is either delivered or placed in the
//! ring buffer; it is never dropped here. The only loss path is eviction of
//! the oldest buffered reading when the buffer is full.

use crate::buffer::RingBuffer;
use crate::reading::Reading;
use crate::sink::{SinkConnection, SinkError};
use std::slice;
use std::time::Duration;

/// Result of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The sink accepted the reading.
    Delivered,
    /// The reading was kept in the ring buffer for a later flush.
    Buffered,
}

/// Immediate retry policy for protocol-level write failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per reading, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Pairs the sink connection with the offline buffer.
pub struct Writer {
    sink: SinkConnection,
    buffer: RingBuffer<Reading>,
    retry: RetryPolicy,
}

impl Writer {
    pub fn new(sink: SinkConnection, buffer: RingBuffer<Reading>, retry: RetryPolicy) -> Self {
        Self {
            sink,
            buffer,
            retry,
        }
    }

    /// Deliver `reading`, or buffer it.
    ///
    /// No network call is made while the sink is disconnected. Protocol
    /// rejections are retried up to the policy bound; a network error stops
    /// retrying at once.
    pub fn write(&mut self, reading: Reading) -> WriteOutcome {
        if !self.sink.is_connected() {
            self.buffer_reading(reading);
            tracing::debug!(buffered = self.buffer.len(), "Offline, reading buffered");
            return WriteOutcome::Buffered;
        }

        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.sink.write_batch(slice::from_ref(&reading)) {
                Ok(()) => return WriteOutcome::Delivered,
                Err(e @ SinkError::Protocol { .. }) => {
                    tracing::warn!(attempt, attempts, error = %e, "Write rejected");
                    if attempt < attempts && !self.retry.delay.is_zero() {
                        std::thread::sleep(self.retry.delay);
                    }
                }
                Err(SinkError::Network(_)) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Unexpected write failure");
                    break;
                }
            }
        }

        self.sink.record_failed_write();
        self.buffer_reading(reading);
        tracing::warn!(buffered = self.buffer.len(), "Write failed, reading buffered");
        WriteOutcome::Buffered
    }

    /// Deliver up to `max_batch` buffered readings, oldest first.
    ///
    /// A reading leaves the buffer only after the sink accepted it. The first
    /// failure ends the cycle and marks the sink disconnected. Returns the
    /// number delivered.
    pub fn flush(&mut self, max_batch: usize) -> usize {
        if self.buffer.is_empty() || !self.sink.is_connected() {
            return 0;
        }

        tracing::info!(buffered = self.buffer.len(), "Flushing buffer");
        let mut delivered = 0;
        while delivered < max_batch {
            let Some(oldest) = self.buffer.peek_oldest() else {
                break;
            };
            match self.sink.write_batch(slice::from_ref(oldest)) {
                Ok(()) => {
                    self.buffer.pop_oldest();
                    delivered += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Buffer flush failed");
                    self.sink.record_failed_write();
                    self.sink.mark_disconnected();
                    break;
                }
            }
        }

        if delivered > 0 {
            tracing::info!(
                delivered,
                remaining = self.buffer.len(),
                "Buffer flush complete"
            );
        }
        delivered
    }

    fn buffer_reading(&mut self, reading: Reading) {
        if let Some(dropped) = self.buffer.push(reading) {
            tracing::warn!(
                dropped_timestamp = %dropped.timestamp,
                evicted_total = self.buffer.evicted(),
                capacity = self.buffer.capacity(),
                "Buffer full, oldest reading evicted"
            );
        }
    }

    pub fn sink(&self) -> &SinkConnection {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut SinkConnection {
        &mut self.sink
    }

    pub fn buffer(&self) -> &RingBuffer<Reading> {
        &self.buffer
    }
}
