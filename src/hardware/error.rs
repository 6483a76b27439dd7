// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Hardware errors are recoverable; the failed operation is retried on the
/// controller's next cycle.
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Register transfer with 0x{reg:02x} failed: {err}")]
    Transfer { reg: u8, err: std::io::Error },

    #[error("Couldn't open correlator device '{path}': {err}")]
    DeviceOpen { path: String, err: std::io::Error },

    #[error("Raw acquisition buffer has {len} bytes, which isn't a whole number of {word_bytes}-byte words")]
    RawBufferLength { len: usize, word_bytes: usize },

    #[error("Visibility buffer has {got} bytes, expected {expected}")]
    VisBufferLength { expected: usize, got: usize },

    #[error("Permutation entry {entry} is out of range for a {len}-word frame")]
    BadPermutation { entry: usize, len: usize },

    #[error("The hardware lock was poisoned by a panicking thread")]
    Poisoned,
}
