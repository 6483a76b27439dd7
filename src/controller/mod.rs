// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The acquisition state machine.
//!
//! A [`Controller`] is in exactly one [`ControllerMode`] at a time. Each call
//! to [`Controller::run`] does one cycle of work for that mode; the caller
//! decides how often to call it and when to apply mode requests with
//! [`Controller::set_state`].

mod diag;
mod error;
mod raw;
mod status;
#[cfg(test)]
mod tests;
mod vis;

pub use diag::{ChannelDiagnostic, DiagnosticReport};
pub use error::ControllerError;
pub use status::{
    new_status, AcquisitionState, BaselineVis, ChannelStatus, HardwareHandle, HardwareView,
    LatestVis, OperatorHandle, OperatorSettings, Spectrum,
};

use std::{sync::Arc, thread};

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    catalog::Catalog,
    config::RuntimeConfig,
    constants::{NUM_PHASE_STEPS, OFF_IDLE_SLEEP, READY_POLL_INTERVAL},
    correlator::VisibilitySet,
    hardware::{CorrelatorHardware, HardwareError, SharedHardware},
    pipeline::VisPipeline,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum ControllerMode {
    #[strum(serialize = "off")]
    #[serde(rename = "off")]
    Off,

    #[strum(serialize = "diag")]
    #[serde(rename = "diag")]
    Diagnostic,

    #[strum(serialize = "raw")]
    #[serde(rename = "raw")]
    RawCapture,

    #[strum(serialize = "vis")]
    #[serde(rename = "vis")]
    VisibilityStream,

    #[strum(serialize = "cal")]
    #[serde(rename = "cal")]
    Calibrate,
}

/// Stored and reported, but not acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopMode {
    Loop,
    Single,
    LoopN,
}

/// The state reported by the external calibration process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CalibrationState {
    Idle,
    Preparing,
    Running,
    Done,
    Error,
}

/// The sample delay the hardware is given for a (possibly fractional)
/// measured delay.
pub fn delay_step(delay: f64) -> u8 {
    (delay.round() as i64).rem_euclid(NUM_PHASE_STEPS as i64) as u8
}

/// Poll until an acquisition's data is ready. There is no timeout;
/// acquisitions take a fixed physical time, and a correlator that never
/// becomes ready leaves [`AcquisitionState::WaitingForData`] in the status.
fn wait_for_data(
    status: &HardwareHandle,
    hw: &mut dyn CorrelatorHardware,
) -> Result<(), HardwareError> {
    status.update(|v| v.acquisition = AcquisitionState::WaitingForData);
    let mut polls: u64 = 0;
    while !hw.data_ready()? {
        polls += 1;
        thread::sleep(READY_POLL_INTERVAL);
    }
    trace!("Data ready after {polls} polls");
    Ok(())
}

pub struct Controller {
    config: RuntimeConfig,
    hardware: SharedHardware,
    catalog: Arc<dyn Catalog>,
    status: HardwareHandle,
    mode: ControllerMode,

    pipeline: Option<VisPipeline>,
    /// The accumulation exponent the running pipeline was started with.
    pipeline_n_samples_exp: u8,
    vis_batch: Vec<VisibilitySet>,
}

impl Controller {
    /// A controller starts in [`ControllerMode::Off`], whatever the
    /// configuration asks for; see [`Controller::apply_operator_request`].
    pub fn new(
        config: RuntimeConfig,
        hardware: SharedHardware,
        catalog: Arc<dyn Catalog>,
        status: HardwareHandle,
    ) -> Controller {
        status.update(|v| v.mode = ControllerMode::Off);
        Controller {
            config,
            hardware,
            catalog,
            status,
            mode: ControllerMode::Off,
            pipeline: None,
            pipeline_n_samples_exp: 0,
            vis_batch: vec![],
        }
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn status(&self) -> &HardwareHandle {
        &self.status
    }

    pub fn pipeline_running(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Visibility sets assembled but not yet persisted.
    pub fn pending_vis(&self) -> usize {
        self.vis_batch.len()
    }

    /// Switch modes. Leaving [`ControllerMode::VisibilityStream`] stops the
    /// pipeline before anything else happens.
    pub fn set_state(&mut self, new: ControllerMode) {
        if new == self.mode {
            return;
        }
        if self.mode == ControllerMode::VisibilityStream {
            self.stop_pipeline();
        }
        info!("Changing mode: {} -> {new}", self.mode);
        self.mode = new;
        self.status.update(|v| {
            v.mode = new;
            v.acquisition = AcquisitionState::Idle;
        });
    }

    /// Switch to whatever mode the operator has asked for, if it's
    /// available.
    pub fn apply_operator_request(&mut self) {
        let requested = self.status.settings().mode;
        if requested == self.mode {
            return;
        }
        if self.config.modes_available.contains(&requested) {
            self.set_state(requested);
        } else {
            warn!("Ignoring request for unavailable mode '{requested}'");
        }
    }

    /// Do one cycle of the current mode. Failures are logged and recorded in
    /// the status; they never escape.
    pub fn run(&mut self) {
        let mode = self.mode;
        trace!("Running a {mode} cycle");
        let result = match mode {
            ControllerMode::Off => {
                thread::sleep(OFF_IDLE_SLEEP);
                Ok(())
            }
            ControllerMode::Diagnostic => self.run_diagnostic().map(|_| ()),
            ControllerMode::RawCapture => self.run_raw().map(|_| ()),
            ControllerMode::VisibilityStream => self.run_vis(),
            ControllerMode::Calibrate => {
                self.run_calibrate();
                Ok(())
            }
        };
        self.refresh_channels();

        let now = Utc::now();
        match result {
            Ok(()) => self.status.update(|v| v.last_cycle = Some(now)),
            Err(e) => {
                error!("Error in {mode} mode: {e}");
                self.status.update(|v| {
                    v.last_cycle = Some(now);
                    v.last_error = Some(format!("{mode}: {e}"));
                    v.failed_cycles += 1;
                    v.acquisition = AcquisitionState::Idle;
                });
            }
        }
    }

    /// Stop anything the controller has running.
    pub fn shutdown(&mut self) {
        self.stop_pipeline();
    }

    /// Stop the pipeline. Sets short of a full chunk belong to this
    /// streaming session only, so they're discarded.
    fn stop_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping the visibility pipeline");
            if let Err(e) = pipeline.shutdown(self.config.pipeline.join_timeout()) {
                error!("{e}");
            }
            self.status
                .update(|v| v.acquisition = AcquisitionState::Idle);
        }
        if !self.vis_batch.is_empty() {
            info!(
                "Discarding {} unsaved visibility sets",
                self.vis_batch.len()
            );
            self.vis_batch.clear();
        }
    }

    /// The calibration process runs elsewhere; all that happens here is
    /// waiting.
    fn run_calibrate(&self) {
        debug!(
            "Calibration state: {}",
            self.status.settings().calibration
        );
        thread::sleep(OFF_IDLE_SLEEP);
    }

    /// Mirror the catalog's channel flags into the status.
    fn refresh_channels(&self) {
        let enabled = (0..self.config.telescope.num_antenna)
            .map(|i| self.catalog.get_channel_enabled(i))
            .collect::<Result<Vec<_>, _>>();
        match enabled {
            Ok(enabled) => self.status.update(|v| {
                for (channel, enabled) in v.channels.iter_mut().zip(enabled) {
                    channel.enabled = enabled;
                }
            }),
            Err(e) => warn!("Couldn't read channel flags: {e}"),
        }
    }
}
