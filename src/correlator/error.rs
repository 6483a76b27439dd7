// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors from decoding a single correlator frame. Apart from configuration
/// problems, these only ever cost the frame that caused them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Correlator frame has {got} words, but {expected} were expected for {num_antenna} antennas")]
    FrameLength {
        expected: usize,
        got: usize,
        num_antenna: usize,
    },

    #[error("Decoding baseline {baseline} ({i}, {j}) produced a non-finite visibility")]
    NonFiniteVisibility { baseline: usize, i: usize, j: usize },

    #[error("Decoding the mean of antenna {antenna} produced a non-finite value")]
    NonFiniteMean { antenna: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
