// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Run one diagnostic cycle and report on every channel.

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use super::{
    common::{load_config, open_catalog, HardwareArgs},
    TartError,
};
use crate::{
    controller::{new_status, ChannelDiagnostic, Controller, DiagnosticReport},
    hardware::{create_hardware, share_hardware},
};

/// Measure each antenna's clock phase, derive and store a new sample delay,
/// and print the radio balance and spectral peak of every channel.
#[derive(Parser, Debug)]
pub struct DiagnoseArgs {
    /// The configuration file (toml or json).
    #[clap(name = "CONFIG_FILE", parse(from_os_str))]
    config: Option<PathBuf>,

    #[clap(flatten)]
    hardware: HardwareArgs,
}

impl DiagnoseArgs {
    pub fn run(self) -> Result<(), TartError> {
        let config = load_config(self.config.as_ref())?;
        let catalog = open_catalog(&config)?;
        let hardware = share_hardware(create_hardware(&self.hardware.backend(), &config));
        let (status, _) = new_status(&config);
        let mut controller = Controller::new(config, hardware, catalog, status);

        let report = controller.run_diagnostic();
        controller.shutdown();
        print_report(&report?);
        Ok(())
    }
}

/// The frequency of a spectrum's highest bin.
fn peak_mhz(channel: &ChannelDiagnostic) -> Option<f64> {
    let spectrum = &channel.spectrum;
    spectrum
        .power_db
        .iter()
        .zip(spectrum.freq_mhz.iter())
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, &f)| f)
}

fn print_report(report: &DiagnosticReport) {
    info!("Diagnostic at {}", report.timestamp);
    info!("Sample delay: {}", report.sample_delay);
    info!("antenna  phase  stability  radio mean  peak (MHz)");
    for (antenna, channel) in report.channels.iter().enumerate() {
        let peak = match peak_mhz(channel) {
            Some(f) => format!("{f:10.4}"),
            None => format!("{:>10}", "-"),
        };
        info!(
            "{antenna:>7}  {:>5}  {:>9.3}  {:>10.3}  {peak}",
            channel.phase.measured, channel.phase.stability, channel.radio.mean
        );
    }

    let unstable = report
        .channels
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.phase.ok)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    if !unstable.is_empty() {
        warn!("Antennas with an unstable clock phase: {unstable:?}");
    }
    let unbalanced = report
        .channels
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.radio.ok)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    if !unbalanced.is_empty() {
        warn!("Antennas with unbalanced radio bits: {unbalanced:?}");
    }
}
