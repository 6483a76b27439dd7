// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{
    catalog::CatalogError, config::ConfigError, hardware::HardwareError, io::PersistenceError,
    pipeline::PipelineError,
};

/// Why a single controller cycle failed. These never escape
/// [`Controller::run`](super::Controller::run).
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("No phase measurements were made, so no sample delay could be derived")]
    NoPhases,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
