// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Run the control service.

use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use log::info;

use super::{
    common::{load_config, open_catalog, HardwareArgs},
    TartError,
};
use crate::{controller::ControllerMode, hardware::create_hardware, service::ControlService};

/// How often the service's state is summarised in the log.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Start the controller and the cache retention loops, and keep them running.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The configuration file (toml or json).
    #[clap(name = "CONFIG_FILE", parse(from_os_str))]
    config: Option<PathBuf>,

    /// The mode to start in (off, diag, raw, vis, cal). Overrides the
    /// configuration file.
    #[clap(short, long)]
    mode: Option<ControllerMode>,

    #[clap(flatten)]
    hardware: HardwareArgs,

    /// Stop after this many seconds. Without it, the service runs until the
    /// process is killed.
    #[clap(long)]
    duration: Option<f64>,
}

impl RunArgs {
    pub fn run(self) -> Result<(), TartError> {
        let mut config = load_config(self.config.as_ref())?;
        if let Some(mode) = self.mode {
            config.mode = mode;
            config.validate()?;
        }
        let duration = match self.duration {
            Some(d) if d.is_finite() && d >= 0.0 => Some(Duration::from_secs_f64(d)),
            Some(d) => {
                return Err(TartError::Config(format!(
                    "The run duration must be a non-negative number of seconds, got {d}"
                )))
            }
            None => None,
        };

        let catalog = open_catalog(&config)?;
        let hardware = create_hardware(&self.hardware.backend(), &config);
        info!("Starting in mode '{}'", config.mode);
        let service = ControlService::start(config, hardware, catalog);

        let start = Instant::now();
        let mut last_report = start;
        loop {
            let now = Instant::now();
            if let Some(d) = duration {
                if now.duration_since(start) >= d {
                    break;
                }
            }
            if now.duration_since(last_report) >= STATUS_INTERVAL {
                let view = service.operator().view();
                info!(
                    "Mode '{}', acquisition {:?}, {} failed cycles",
                    view.mode, view.acquisition, view.failed_cycles
                );
                last_report = now;
            }
            thread::sleep(Duration::from_millis(100));
        }

        service.stop()?;
        Ok(())
    }
}

