// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Validated sensor readings.
//!
//! A [`Reading`] is one sample from the device, tagged by which field set the
//! firmware emitted. Readings are immutable once built by the parser.

use chrono::{DateTime, Utc};

/// Field names written for the thermocouple triple.
pub const THERMOCOUPLE_FIELDS: [&str; 3] = ["Th(degC)", "Tc(degC)", "T_ADC"];

/// Field names written for the gas-sensor quadruple.
pub const GAS_FIELDS: [&str; 4] = ["NO2", "C2H5OH", "VOC", "CO"];

/// Thermocouple amplifier output (hot junction, cold junction, raw ADC).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thermocouple {
    /// Hot-junction temperature in degrees Celsius.
    pub hot_junction: f64,
    /// Cold-junction temperature in degrees Celsius.
    pub cold_junction: f64,
    /// Raw ADC reading (microvolts).
    pub adc: f64,
}

impl Thermocouple {
    /// Field name/value pairs in wire order.
    pub fn fields(&self) -> [(&'static str, f64); 3] {
        [
            (THERMOCOUPLE_FIELDS[0], self.hot_junction),
            (THERMOCOUPLE_FIELDS[1], self.cold_junction),
            (THERMOCOUPLE_FIELDS[2], self.adc),
        ]
    }
}

/// Multichannel gas sensor output, in raw integer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasConcentrations {
    pub no2: i64,
    pub ethanol: i64,
    pub voc: i64,
    pub co: i64,
}

impl GasConcentrations {
    /// Field name/value pairs in wire order.
    pub fn fields(&self) -> [(&'static str, i64); 4] {
        [
            (GAS_FIELDS[0], self.no2),
            (GAS_FIELDS[1], self.ethanol),
            (GAS_FIELDS[2], self.voc),
            (GAS_FIELDS[3], self.co),
        ]
    }
}

/// A field value as stored in the time-series database.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

/// The field set carried by a reading, determined by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Three-field line: thermocouple only.
    Thermocouple(Thermocouple),
    /// Seven-field line: thermocouple followed by the gas quadruple.
    Combined {
        thermocouple: Thermocouple,
        gas: GasConcentrations,
    },
}

/// Which measurement a group of fields belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    Thermocouple,
    Gas,
}

/// One validated sensor sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// UTC time the line arrived from the device.
    pub timestamp: DateTime<Utc>,
    /// Measured values.
    pub sample: Sample,
}

impl Reading {
    /// Create a reading.
    pub fn new(timestamp: DateTime<Utc>, sample: Sample) -> Self {
        Self { timestamp, sample }
    }

    /// The thermocouple part, present in every sample shape.
    pub fn thermocouple(&self) -> &Thermocouple {
        match &self.sample {
            Sample::Thermocouple(t) => t,
            Sample::Combined { thermocouple, .. } => thermocouple,
        }
    }

    /// The gas part, if the firmware emitted one.
    pub fn gas(&self) -> Option<&GasConcentrations> {
        match &self.sample {
            Sample::Thermocouple(_) => None,
            Sample::Combined { gas, .. } => Some(gas),
        }
    }

    /// Group the fields of this reading by measurement.
    ///
    /// Thermocouple fields are floats; gas channels are integers.
    pub fn measurements(&self) -> Vec<(MeasurementKind, Vec<(&'static str, FieldValue)>)> {
        let thermocouple = self
            .thermocouple()
            .fields()
            .into_iter()
            .map(|(name, value)| (name, FieldValue::Float(value)))
            .collect();
        let mut out = vec![(MeasurementKind::Thermocouple, thermocouple)];
        if let Some(gas) = self.gas() {
            let gas = gas
                .fields()
                .into_iter()
                .map(|(name, value)| (name, FieldValue::Integer(value)))
                .collect();
            out.push((MeasurementKind::Gas, gas));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermo() -> Thermocouple {
        Thermocouple {
            hot_junction: 25.1,
            cold_junction: 25.05,
            adc: 1000.0,
        }
    }

    #[test]
    fn test_thermocouple_only_has_one_measurement() {
        let reading = Reading::new(Utc::now(), Sample::Thermocouple(thermo()));
        let groups = reading.measurements();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, MeasurementKind::Thermocouple);
        assert_eq!(
            groups[0].1,
            vec![
                ("Th(degC)", FieldValue::Float(25.1)),
                ("Tc(degC)", FieldValue::Float(25.05)),
                ("T_ADC", FieldValue::Float(1000.0)),
            ]
        );
        assert!(reading.gas().is_none());
    }

    #[test]
    fn test_combined_sample_splits_into_two_measurements() {
        let gas = GasConcentrations {
            no2: 12,
            ethanol: 30,
            voc: 44,
            co: 7,
        };
        let reading = Reading::new(
            Utc::now(),
            Sample::Combined {
                thermocouple: thermo(),
                gas,
            },
        );

        let groups = reading.measurements();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].0, MeasurementKind::Gas);
        assert_eq!(groups[1].1[1], ("C2H5OH", FieldValue::Integer(30)));
        assert_eq!(reading.thermocouple().adc, 1000.0);
    }
}
