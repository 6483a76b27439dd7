// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::time::Duration;

use thiserror::Error;

use crate::{config::ConfigError, hardware::HardwareError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("The {worker} worker didn't stop within {timeout:?}; it has been abandoned")]
    ShutdownTimeout { worker: String, timeout: Duration },

    #[error("The {worker} worker panicked")]
    Panicked { worker: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}
