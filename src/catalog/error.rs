// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::DataCategory;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Channel {idx} doesn't exist; there are {num} channels")]
    ChannelIndex { idx: usize, num: usize },

    #[error("Expected {expected} gains and phases, got {gain} gains and {phase} phases")]
    GainLength {
        expected: usize,
        gain: usize,
        phase: usize,
    },

    #[error("No {category} file handle has id {id}")]
    NoSuchHandle { category: DataCategory, id: u64 },

    #[error("The catalog lock was poisoned by a panicking thread")]
    Poisoned,

    #[error("Couldn't decode catalog '{path}': {err}")]
    Json {
        path: String,
        err: serde_json::Error,
    },

    #[error("Catalog '{path}' IO error: {err}")]
    IO { path: String, err: std::io::Error },
}
