// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection to the remote time-series store.
//!
//! [`SinkConnection`] owns the client and the sink's connection state. It
//! only reports `Connected` after a reachability pre-check and a successful
//! ping, and drops to `Disconnected` on any network-class error. A periodic
//! [`SinkConnection::maintain`] call re-runs the pre-check and reconnects
//! when the network comes back.

use crate::reading::Reading;
use crate::state::ConnectionState;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Time-series store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SinkError {
    /// Transport failed; the connection is considered down.
    #[error("network error: {0}")]
    Network(String),

    /// Connection is up but the store refused the request.
    #[error("write rejected (HTTP {status}): {message}")]
    Protocol { status: u16, message: String },

    #[error("unexpected sink error: {0}")]
    Unexpected(String),
}

impl SinkError {
    pub fn is_network(&self) -> bool {
        matches!(self, SinkError::Network(_))
    }
}

/// Write/ping contract of the time-series store.
pub trait TimeSeriesClient {
    /// Liveness probe.
    fn ping(&mut self) -> Result<(), SinkError>;

    /// Persist `readings` as one request.
    fn write_batch(&mut self, readings: &[Reading]) -> Result<(), SinkError>;

    /// Release client resources.
    fn close(&mut self) {}
}

/// Cheap check that the store's host can be reached at all.
pub trait ReachabilityProbe {
    fn is_reachable(&mut self) -> bool;
}

/// DNS resolution followed by a TCP connect, bounded by one timeout.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the host and port of `url` (port defaults by scheme).
    pub fn from_url(url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| SinkError::Unexpected(format!("invalid URL {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SinkError::Unexpected(format!("URL has no host: {}", url)))?;
        // IPv6 literals come back bracketed, which the resolver rejects.
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| SinkError::Unexpected(format!("URL has no port: {}", url)))?;
        Ok(Self::new(host, port, timeout))
    }

    /// Resolve on a helper thread so a stuck resolver cannot exceed `timeout`.
    fn resolve(&self) -> Option<SocketAddr> {
        let target = (self.host.clone(), self.port);
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let addr = target.to_socket_addrs().ok().and_then(|mut a| a.next());
            let _ = tx.send(addr);
        });
        rx.recv_timeout(self.timeout).ok().flatten()
    }
}

impl ReachabilityProbe for TcpProbe {
    fn is_reachable(&mut self) -> bool {
        let started = Instant::now();
        let Some(addr) = self.resolve() else {
            tracing::debug!(host = %self.host, "Name resolution failed");
            return false;
        };

        let remaining = self.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return false;
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(%addr, error = %e, "TCP reachability check failed");
                false
            }
        }
    }
}

/// Owner of the sink connection state.
pub struct SinkConnection {
    client: Box<dyn TimeSeriesClient>,
    probe: Box<dyn ReachabilityProbe>,
    connected: bool,
    consecutive_failures: u32,
    degraded_after: u32,
    check_interval: Duration,
    last_check: Option<Instant>,
}

impl SinkConnection {
    /// Create a disconnected sink.
    pub fn new(
        client: Box<dyn TimeSeriesClient>,
        probe: Box<dyn ReachabilityProbe>,
        check_interval: Duration,
        degraded_after: u32,
    ) -> Self {
        Self {
            client,
            probe,
            connected: false,
            consecutive_failures: 0,
            degraded_after: degraded_after.max(1),
            check_interval,
            last_check: None,
        }
    }

    /// Pre-check reachability, then ping. Returns true when connected.
    pub fn connect(&mut self) -> bool {
        self.last_check = Some(Instant::now());

        if !self.probe.is_reachable() {
            tracing::warn!("Sink unreachable, staying offline");
            self.mark_disconnected();
            return false;
        }
        self.handshake()
    }

    /// Ping after a successful pre-check.
    fn handshake(&mut self) -> bool {
        match self.client.ping() {
            Ok(()) => {
                self.connected = true;
                self.consecutive_failures = 0;
                tracing::info!("Sink connected");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sink ping failed");
                self.mark_disconnected();
                false
            }
        }
    }

    /// Run the periodic reachability check if it is due.
    ///
    /// Reconnects when the sink is reachable but currently disconnected.
    /// The pre-check runs at most once per call. Returns the connection
    /// status after the check.
    pub fn maintain(&mut self) -> bool {
        if let Some(last) = self.last_check {
            if last.elapsed() < self.check_interval {
                return self.connected;
            }
        }
        self.last_check = Some(Instant::now());

        if !self.probe.is_reachable() {
            if self.connected {
                tracing::warn!("Sink no longer reachable, switching to offline buffering");
            }
            self.mark_disconnected();
            return false;
        }

        if !self.connected {
            tracing::info!("Sink reachable again, reconnecting");
            return self.handshake();
        }
        true
    }

    /// Liveness probe through the client. Network errors disconnect.
    pub fn ping(&mut self) -> Result<(), SinkError> {
        let result = self.client.ping();
        if let Err(e) = &result {
            if e.is_network() {
                self.mark_disconnected();
            }
        }
        result
    }

    /// Deliver `readings` in one request.
    ///
    /// Fails with a network error, without touching the client, when
    /// disconnected. Network errors disconnect. Failed writes are counted
    /// by the caller through [`SinkConnection::record_failed_write`].
    pub fn write_batch(&mut self, readings: &[Reading]) -> Result<(), SinkError> {
        if !self.connected {
            return Err(SinkError::Network("sink is disconnected".to_string()));
        }

        match self.client.write_batch(readings) {
            Ok(()) => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(e) => {
                if e.is_network() {
                    tracing::error!(error = %e, "Sink network error, disconnecting");
                    self.mark_disconnected();
                }
                Err(e)
            }
        }
    }

    /// Count one write that ended without delivery, retries included.
    pub fn record_failed_write(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures == self.degraded_after {
            tracing::warn!(
                consecutive = self.consecutive_failures,
                "Sink degraded: consecutive writes failed"
            );
        }
    }

    /// Force the disconnected state.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Current state; `Degraded` once `degraded_after` consecutive writes failed.
    pub fn state(&self) -> ConnectionState {
        if !self.connected {
            ConnectionState::Disconnected
        } else if self.consecutive_failures >= self.degraded_after {
            ConnectionState::Degraded
        } else {
            ConnectionState::Connected
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn close(&mut self) {
        self.client.close();
        if self.connected {
            tracing::info!("Sink connection closed");
        }
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_probe_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let mut probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(probe.is_reachable());
    }

    #[test]
    fn test_probe_fails_on_closed_port() {
        let port = TcpListener::bind("127.0.0.1:0")
            .expect("bind")
            .local_addr()
            .expect("addr")
            .port();

        let mut probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(!probe.is_reachable());
    }

    #[test]
    fn test_probe_from_url_defaults_port() {
        let probe = TcpProbe::from_url("https://influx.example.com", Duration::from_secs(1))
            .expect("probe");
        assert_eq!(probe.host, "influx.example.com");
        assert_eq!(probe.port, 443);

        let probe = TcpProbe::from_url("http://10.0.0.5:8086/", Duration::from_secs(1))
            .expect("probe");
        assert_eq!(probe.port, 8086);
    }

    #[test]
    fn test_probe_from_ipv6_url_strips_brackets() {
        let probe = TcpProbe::from_url("http://[::1]:8086", Duration::from_secs(1))
            .expect("probe");
        assert_eq!(probe.host, "::1");
        assert_eq!(probe.port, 8086);
    }

    #[test]
    fn test_probe_reaches_ipv6_listener() {
        // Hosts without IPv6 loopback have nothing to check.
        let Ok(listener) = TcpListener::bind("[::1]:0") else {
            return;
        };
        let port = listener.local_addr().expect("addr").port();

        let mut probe = TcpProbe::from_url(
            &format!("http://[::1]:{}", port),
            Duration::from_secs(2),
        )
        .expect("probe");
        assert!(probe.is_reachable());
    }

    #[test]
    fn test_network_errors_are_distinguished() {
        assert!(SinkError::Network("down".into()).is_network());
        assert!(!SinkError::Protocol {
            status: 400,
            message: "bad".into()
        }
        .is_network());
        assert!(!SinkError::Unexpected("x".into()).is_network());
    }
}
