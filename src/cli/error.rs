// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all tart-acquire-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use crate::{
    cache::CacheError,
    catalog::CatalogError,
    config::ConfigError,
    controller::ControllerError,
    correlator::DecodeError,
    hardware::HardwareError,
    io::{GlobError, PersistenceError},
    pipeline::PipelineError,
};

/// The *only* publicly visible error from tart-acquire. Library errors are
/// sorted into a handful of kinds so that the binary can say something useful
/// about where to look.
#[derive(Error, Debug)]
pub enum TartError {
    /// A problem with the configuration file or a command-line argument.
    #[error("{0}\n\nCheck the configuration file (or the defaults if none was given).")]
    Config(String),

    /// A problem talking to the correlator.
    #[error("{0}\n\nIf the device is unavailable, try --simulate.")]
    Hardware(String),

    /// A problem turning correlator output into visibilities.
    #[error("{0}")]
    Acquisition(String),

    /// A problem with the catalog or the files it refers to.
    #[error("{0}\n\nCheck the catalog path and the data base paths in the configuration.")]
    Storage(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

impl From<ConfigError> for TartError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<HardwareError> for TartError {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e.to_string())
    }
}

impl From<DecodeError> for TartError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Config(e) => Self::from(e),
            DecodeError::FrameLength { .. }
            | DecodeError::NonFiniteVisibility { .. }
            | DecodeError::NonFiniteMean { .. } => Self::Acquisition(e.to_string()),
        }
    }
}

impl From<CatalogError> for TartError {
    fn from(e: CatalogError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<GlobError> for TartError {
    fn from(e: GlobError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<PersistenceError> for TartError {
    fn from(e: PersistenceError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<CacheError> for TartError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Catalog(e) => Self::from(e),
            CacheError::Glob(e) => Self::from(e),
        }
    }
}

impl From<PipelineError> for TartError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Config(e) => Self::from(e),
            PipelineError::Hardware(e) => Self::from(e),
            PipelineError::ShutdownTimeout { .. } | PipelineError::Panicked { .. } => {
                Self::Acquisition(e.to_string())
            }
        }
    }
}

impl From<ControllerError> for TartError {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::NoPhases => Self::Acquisition(e.to_string()),
            ControllerError::Config(e) => Self::from(e),
            ControllerError::Hardware(e) => Self::from(e),
            ControllerError::Pipeline(e) => Self::from(e),
            ControllerError::Persistence(e) => Self::from(e),
            ControllerError::Catalog(e) => Self::from(e),
        }
    }
}

impl From<std::io::Error> for TartError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
