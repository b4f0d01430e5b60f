// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical-range validation of parsed samples.

use crate::parser::Rejection;
use crate::reading::{GasConcentrations, Sample, Thermocouple};
use serde::{Deserialize, Serialize};

/// Inclusive range a field value must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True if `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    fn check(&self, field: &'static str, value: f64) -> Result<(), Rejection> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(Rejection::OutOfRange {
                field,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Per-field-class bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationLimits {
    /// Applies to the hot- and cold-junction temperatures.
    #[serde(default = "default_temperature")]
    pub temperature: Bounds,
    /// Applies to the thermocouple ADC value.
    #[serde(default = "default_adc")]
    pub adc: Bounds,
    /// Applies to every gas-sensor channel.
    #[serde(default = "default_gas")]
    pub gas: Bounds,
}

fn default_temperature() -> Bounds {
    Bounds::new(-270.0, 800.0)
}

fn default_adc() -> Bounds {
    Bounds::new(-5000.0, 33000.0)
}

fn default_gas() -> Bounds {
    Bounds::new(0.0, 65535.0)
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            adc: default_adc(),
            gas: default_gas(),
        }
    }
}

impl ValidationLimits {
    /// Check every field of `sample`. The first out-of-range field rejects
    /// the whole sample.
    pub fn validate(&self, sample: &Sample) -> Result<(), Rejection> {
        match sample {
            Sample::Thermocouple(t) => self.check_thermocouple(t),
            Sample::Combined { thermocouple, gas } => {
                self.check_thermocouple(thermocouple)?;
                self.check_gas(gas)
            }
        }
    }

    fn check_thermocouple(&self, t: &Thermocouple) -> Result<(), Rejection> {
        let [(th_name, th), (tc_name, tc), (adc_name, adc)] = t.fields();
        self.temperature.check(th_name, th)?;
        self.temperature.check(tc_name, tc)?;
        self.adc.check(adc_name, adc)
    }

    fn check_gas(&self, gas: &GasConcentrations) -> Result<(), Rejection> {
        gas.fields()
            .into_iter()
            .try_for_each(|(name, value)| self.gas.check(name, value as f64))
    }
}
