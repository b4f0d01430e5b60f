// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device line parsing.
//!
//! Data lines are comma-separated decimal numbers:
//!
//! ```text
//! Th,Tc,ADC                      (3 fields, thermocouple only)
//! Th,Tc,ADC,NO2,C2H5OH,VOC,CO    (7 fields, thermocouple + gas sensor)
//! ```
//!
//! The gas channels are integer counts. Any other shape is rejected. A record is either fully accepted or
//! rejected; there is no partial acceptance.

use crate::reading::{GasConcentrations, Reading, Sample, Thermocouple};
use crate::validate::ValidationLimits;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Field separator on the serial line.
pub const DELIMITER: char = ',';

/// Field count of a thermocouple-only line.
pub const THERMOCOUPLE_FIELD_COUNT: usize = 3;

/// Field count of a thermocouple + gas-sensor line.
pub const COMBINED_FIELD_COUNT: usize = 7;

/// Why a line was not turned into a [`Reading`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("expected 3 or 7 fields, got {0}")]
    FieldCount(usize),

    #[error("field {index} is not a number: {token:?}")]
    Malformed { index: usize, token: String },

    #[error("field {index} is not finite: {token:?}")]
    NotFinite { index: usize, token: String },

    #[error("field {index} is not an integer: {token:?}")]
    NotInteger { index: usize, token: String },

    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Split a line into finite numbers, checking the field count first.
pub fn tokenize(line: &str) -> Result<Vec<f64>, Rejection> {
    let tokens = split(line);
    if tokens.len() != THERMOCOUPLE_FIELD_COUNT && tokens.len() != COMBINED_FIELD_COUNT {
        return Err(Rejection::FieldCount(tokens.len()));
    }

    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| {
            let value: f64 = token.parse().map_err(|_| Rejection::Malformed {
                index,
                token: token.to_string(),
            })?;
            if !value.is_finite() {
                return Err(Rejection::NotFinite {
                    index,
                    token: token.to_string(),
                });
            }
            Ok(value)
        })
        .collect()
}

fn split(line: &str) -> Vec<&str> {
    line.split(DELIMITER).map(str::trim).collect()
}

fn integer_field(tokens: &[&str], index: usize) -> Result<i64, Rejection> {
    tokens[index].parse().map_err(|_| Rejection::NotInteger {
        index,
        token: tokens[index].to_string(),
    })
}

/// True if `line` has a valid shape and every token is a finite number.
/// Range limits are not applied.
pub fn is_numeric_record(line: &str) -> bool {
    tokenize(line).is_ok()
}

/// Turns raw lines into validated readings.
#[derive(Debug, Clone, Default)]
pub struct RecordParser {
    limits: ValidationLimits,
}

impl RecordParser {
    /// Create a parser enforcing `limits`.
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Parse and validate one line received at `received_at`.
    pub fn parse(&self, line: &str, received_at: DateTime<Utc>) -> Result<Reading, Rejection> {
        let values = tokenize(line)?;
        let thermocouple = Thermocouple {
            hot_junction: values[0],
            cold_junction: values[1],
            adc: values[2],
        };

        let sample = if values.len() == COMBINED_FIELD_COUNT {
            let tokens = split(line);
            Sample::Combined {
                thermocouple,
                gas: GasConcentrations {
                    no2: integer_field(&tokens, 3)?,
                    ethanol: integer_field(&tokens, 4)?,
                    voc: integer_field(&tokens, 5)?,
                    co: integer_field(&tokens, 6)?,
                },
            }
        } else {
            Sample::Thermocouple(thermocouple)
        };

        self.limits.validate(&sample)?;
        Ok(Reading::new(received_at, sample))
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }
}
