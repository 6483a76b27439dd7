// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One retention cycle, outside of the control service.

use std::path::PathBuf;

use clap::Parser;
use log::info;
use strum::IntoEnumIterator;

use super::{
    common::{load_config, open_catalog},
    TartError,
};
use crate::{
    cache::{cleanup_cycle, find_orphans},
    catalog::DataCategory,
};

/// Evict everything but the newest files of each data category, as the
/// control service's retention loops do.
#[derive(Parser, Debug)]
pub struct CleanCacheArgs {
    /// The configuration file (toml or json).
    #[clap(name = "CONFIG_FILE", parse(from_os_str))]
    config: Option<PathBuf>,
}

impl CleanCacheArgs {
    pub fn run(self) -> Result<(), TartError> {
        let config = load_config(self.config.as_ref())?;
        let catalog = open_catalog(&config)?;

        for category in DataCategory::iter() {
            let report = cleanup_cycle(catalog.as_ref(), category, config.cache.max_entries)?;
            info!(
                "{category}: kept {}, evicted {} ({} already missing)",
                report.kept,
                report.evicted.len(),
                report.missing
            );
            if config.cache.report_orphans {
                let base = match category {
                    DataCategory::Raw => &config.raw.base_path,
                    DataCategory::Vis => &config.vis.base_path,
                };
                let orphans = find_orphans(catalog.as_ref(), category, base)?;
                info!("{category}: {} uncatalogued files", orphans.len());
            }
        }
        Ok(())
    }
}
