// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint connection state.

use std::fmt;

/// Health of one external endpoint (serial device or time-series sink).
///
/// Each endpoint's state is owned and mutated by the component that owns the
/// connection; everything else only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable connection.
    #[default]
    Disconnected,
    /// Connected and the last operations succeeded.
    Connected,
    /// Connected, but recent operations have been failing.
    Degraded,
}

impl ConnectionState {
    /// True for `Connected` and `Degraded`.
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}
