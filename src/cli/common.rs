// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Arguments and set-up shared between subcommands.

use std::{path::PathBuf, sync::Arc};

use clap::Args;
use log::info;

use super::TartError;
use crate::{
    catalog::{Catalog, JsonCatalog},
    config::RuntimeConfig,
    hardware::HardwareBackend,
};

/// Which correlator to talk to.
#[derive(Debug, Args)]
pub(super) struct HardwareArgs {
    /// Use the simulated correlator, even if a device is given.
    #[clap(long)]
    pub(super) simulate: bool,

    /// The correlator's SPI device, e.g. /dev/spidev0.0. If it can't be
    /// opened, the simulated correlator is used instead.
    #[clap(long, parse(from_os_str), conflicts_with = "simulate")]
    pub(super) device: Option<PathBuf>,
}

impl HardwareArgs {
    pub(super) fn backend(&self) -> HardwareBackend {
        match (&self.device, self.simulate) {
            (Some(path), false) => HardwareBackend::Device(path.clone()),
            _ => HardwareBackend::Simulated,
        }
    }
}

/// Read the configuration file, or use the defaults if there isn't one.
pub(super) fn load_config(file: Option<&PathBuf>) -> Result<RuntimeConfig, TartError> {
    let config = match file {
        Some(file) => {
            info!("Reading configuration from {}", file.display());
            RuntimeConfig::from_file(file)?
        }
        None => {
            info!("No configuration file given; using defaults");
            let config = RuntimeConfig::default();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

pub(super) fn open_catalog(config: &RuntimeConfig) -> Result<Arc<dyn Catalog>, TartError> {
    let num_antenna = config.telescope.num_antenna;
    let catalog: Arc<dyn Catalog> = match &config.catalog_path {
        Some(path) => {
            info!("Using catalog {}", path.display());
            Arc::new(JsonCatalog::open(path, num_antenna)?)
        }
        None => {
            info!("No catalog path configured; the catalog won't outlive this run");
            Arc::new(JsonCatalog::in_memory(num_antenna))
        }
    };
    Ok(catalog)
}
