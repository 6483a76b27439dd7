// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with invalid configuration.

use thiserror::Error;

use crate::controller::ControllerMode;

/// A configuration error is fatal to the operation that hit it, but never to
/// the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("The number of accumulated samples must be non-zero")]
    ZeroSamples,

    #[error("An FFT size of {nfft} produces only {bins} frequency bins, but at least {required} are needed")]
    NfftTooSmall {
        nfft: usize,
        bins: usize,
        required: usize,
    },

    #[error("The sampling frequency must be positive and finite, got {0}")]
    BadSamplingFrequency(f64),

    #[error("The number of antennas must be between 2 and {max}, got {got}")]
    BadAntennaCount { got: usize, max: usize },

    #[error("Expected {expected} antenna positions (one per antenna), got {got}")]
    AntennaPositionCount { expected: usize, got: usize },

    #[error("The hardware permutation must have {expected} entries, got {got}")]
    PermutationLength { expected: usize, got: usize },

    #[error("The visibility chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("At least one phase sample is needed to compute phase stability")]
    NoPhaseSamples,

    #[error("The {what} sample-count exponent {exp} is too large (max {max})")]
    SampleExponent {
        what: &'static str,
        exp: u8,
        max: u8,
    },

    #[error("Mode '{0}' is not one of the available modes")]
    ModeUnavailable(ControllerMode),

    #[error("The {what} threshold must be between 0 and 1, got {value}")]
    BadThreshold { what: &'static str, value: f64 },

    #[error("Configuration file '{file}' has an unsupported extension; supported: {supported}")]
    UnsupportedFileType { file: String, supported: String },

    #[error("Couldn't decode the configuration in '{file}': {err}")]
    Parse { file: String, err: String },

    #[error("Couldn't read configuration file '{file}': {err}")]
    Read { file: String, err: String },
}
