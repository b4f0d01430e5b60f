// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device start-up banner detection.
//!
//! After every (re)connect the firmware prints free-text banner lines before
//! it starts streaming data. The classifier has two phases:
//!
//! - **Init phase**: for the first `window` banner lines, a line that does not
//!   tokenize as a full numeric record is a banner. The first line that does
//!   latches the classifier into the data phase.
//! - **Data phase**: only the known banner substrings classify a line as a
//!   banner; everything else is data, and malformed data is the parser's
//!   problem.
//!
//! Known banner substrings are matched in both phases so that a device reset
//! in the middle of a session is still recognised.

use crate::parser::is_numeric_record;

/// Default banner substrings printed by the MCP9601 firmware.
pub const DEFAULT_BANNER_PATTERNS: [&str; 7] = [
    "Adafruit",
    "Found MCP",
    "ADC resolution",
    "Thermocouple",
    "Filter coefficient",
    "Alert",
    "---",
];

/// Default number of banner lines tolerated before the heuristic gives up.
pub const DEFAULT_BANNER_WINDOW: usize = 10;

/// Classification of a device line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Non-data text; displayed but never parsed.
    Banner,
    /// Candidate measurement; goes to the parser.
    Data,
}

/// Init/data phase state machine.
#[derive(Debug, Clone)]
pub struct BannerClassifier {
    patterns: Vec<String>,
    window: usize,
    banner_lines: usize,
    latched: bool,
}

impl BannerClassifier {
    /// Create a classifier in the init phase.
    pub fn new(patterns: Vec<String>, window: usize) -> Self {
        Self {
            patterns,
            window,
            banner_lines: 0,
            latched: false,
        }
    }

    /// Classify one non-empty line, advancing the state machine.
    pub fn classify(&mut self, line: &str) -> LineClass {
        if self.patterns.iter().any(|p| line.contains(p.as_str())) {
            self.banner_lines += 1;
            return LineClass::Banner;
        }

        if self.in_init_window() {
            if is_numeric_record(line) {
                self.latched = true;
                tracing::debug!(banner_lines = self.banner_lines, "Device entered data phase");
                return LineClass::Data;
            }
            self.banner_lines += 1;
            return LineClass::Banner;
        }

        LineClass::Data
    }

    /// Return to the init phase (after a device reconnect).
    pub fn reset(&mut self) {
        self.banner_lines = 0;
        self.latched = false;
    }

    /// True once a clean numeric record has been seen since the last reset.
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Banner lines seen since the last reset.
    pub fn banner_lines(&self) -> usize {
        self.banner_lines
    }

    fn in_init_window(&self) -> bool {
        !self.latched && self.banner_lines < self.window
    }
}

impl Default for BannerClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_BANNER_PATTERNS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_BANNER_WINDOW,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banners_then_data_latches() {
        let mut c = BannerClassifier::default();

        assert_eq!(c.classify("Adafruit MCP9601 test"), LineClass::Banner);
        assert_eq!(c.classify("Found MCP9601 thermocouple!"), LineClass::Banner);
        assert_eq!(c.classify("ADC resolution set to 18 bits"), LineClass::Banner);
        assert!(!c.is_latched());

        assert_eq!(c.classify("25.10,25.05,1000.0"), LineClass::Data);
        assert!(c.is_latched());
    }

    #[test]
    fn test_unknown_text_in_init_window_is_banner() {
        let mut c = BannerClassifier::default();
        assert_eq!(c.classify("hello world"), LineClass::Banner);
        assert_eq!(c.classify("1.0,2.0"), LineClass::Banner);
        assert_eq!(c.classify("1.0,x,3.0"), LineClass::Banner);
        assert_eq!(c.banner_lines(), 3);
    }

    #[test]
    fn test_malformed_line_after_latch_is_data() {
        let mut c = BannerClassifier::default();
        assert_eq!(c.classify("25.10,25.05,1000.0"), LineClass::Data);

        // Goes to the parser, which rejects it.
        assert_eq!(c.classify("25.1,garbage"), LineClass::Data);
    }

    #[test]
    fn test_known_pattern_after_latch_is_still_banner() {
        let mut c = BannerClassifier::default();
        c.classify("25.10,25.05,1000.0");
        assert_eq!(c.classify("Adafruit MCP9601"), LineClass::Banner);
        assert!(c.is_latched());
    }

    #[test]
    fn test_window_exhaustion_stops_heuristic() {
        let mut c = BannerClassifier::new(vec![], 2);
        assert_eq!(c.classify("boot"), LineClass::Banner);
        assert_eq!(c.classify("boot"), LineClass::Banner);
        assert_eq!(c.classify("boot"), LineClass::Data);
        assert!(!c.is_latched());
    }

    #[test]
    fn test_reset_reopens_init_window() {
        let mut c = BannerClassifier::default();
        c.classify("25.10,25.05,1000.0");
        c.reset();

        assert!(!c.is_latched());
        assert_eq!(c.classify("garbage"), LineClass::Banner);
    }
}
