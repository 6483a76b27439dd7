// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Status shared between the controller and whoever operates it.
//!
//! The state is split in two: [`OperatorSettings`], written only through an
//! [`OperatorHandle`], and [`HardwareView`], written only through the single
//! [`HardwareHandle`] that the controller owns. Each side can read both.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CalibrationState, ControllerMode, LoopMode};
use crate::{
    analysis::{PhaseStats, RadioBalance},
    config::RuntimeConfig,
    hardware::HardwareStatus,
};

/// Everything an operator may change while the controller runs. Changes take
/// effect on the controller's next cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSettings {
    pub mode: ControllerMode,
    pub loop_mode: LoopMode,
    pub loop_n: usize,
    pub raw_save: bool,
    pub vis_save: bool,
    pub raw_n_samples_exp: u8,
    pub vis_n_samples_exp: u8,
    pub diag_n_samples_exp: u8,
    pub antenna_positions: Vec<[f64; 3]>,
    /// Reported by the calibration process.
    pub calibration: CalibrationState,
}

impl OperatorSettings {
    pub fn from_config(config: &RuntimeConfig) -> OperatorSettings {
        OperatorSettings {
            mode: config.mode,
            loop_mode: config.loop_mode,
            loop_n: config.loop_n,
            raw_save: config.raw.save,
            vis_save: config.vis.save,
            raw_n_samples_exp: config.raw.n_samples_exp,
            vis_n_samples_exp: config.vis.n_samples_exp,
            diag_n_samples_exp: config.diagnostic.n_samples_exp,
            antenna_positions: config.telescope.antenna_positions.clone(),
            calibration: CalibrationState::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// `10 log10` of the power, to 3 decimal places.
    pub power_db: Vec<f64>,
    pub freq_mhz: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub id: usize,
    pub enabled: bool,
    pub phase: Option<PhaseStats>,
    pub radio: Option<RadioBalance>,
    pub spectrum: Option<Spectrum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineVis {
    pub i: usize,
    pub j: usize,
    pub re: f64,
    pub im: f64,
}

/// The most recently assembled visibilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestVis {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<BaselineVis>,
    pub means: Vec<f64>,
}

/// What the controller is doing within its current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Idle,
    Diagnosing,
    /// Polling for an acquisition to finish. Staying here is how a
    /// correlator that never becomes ready shows up.
    WaitingForData,
    Streaming,
}

/// Everything the controller learns from the hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareView {
    /// The mode the controller is actually in.
    pub mode: ControllerMode,
    pub acquisition: AcquisitionState,
    pub hostname: String,
    pub channels: Vec<ChannelStatus>,
    pub diagnostic_timestamp: Option<DateTime<Utc>>,
    pub sample_delay: Option<f64>,
    pub latest_vis: Option<LatestVis>,
    pub hardware: Option<HardwareStatus>,
    pub last_cycle: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub failed_cycles: u64,
}

impl HardwareView {
    fn new(num_antenna: usize) -> HardwareView {
        HardwareView {
            mode: ControllerMode::Off,
            acquisition: AcquisitionState::Idle,
            hostname: hostname(),
            channels: (0..num_antenna)
                .map(|id| ChannelStatus {
                    id,
                    enabled: true,
                    phase: None,
                    radio: None,
                    spectrum: None,
                })
                .collect(),
            diagnostic_timestamp: None,
            sample_delay: None,
            latest_vis: None,
            hardware: None,
            last_cycle: None,
            last_error: None,
            failed_cycles: 0,
        }
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

struct TelescopeState {
    operator: RwLock<OperatorSettings>,
    hardware: RwLock<HardwareView>,
}

/// Make the shared status for a configuration, returning the controller's
/// handle and the operator's handle.
pub fn new_status(config: &RuntimeConfig) -> (HardwareHandle, OperatorHandle) {
    let state = Arc::new(TelescopeState {
        operator: RwLock::new(OperatorSettings::from_config(config)),
        hardware: RwLock::new(HardwareView::new(config.telescope.num_antenna)),
    });
    (
        HardwareHandle {
            state: Arc::clone(&state),
        },
        OperatorHandle { state },
    )
}

// A panic while holding one of these locks can only leave a half-updated
// status behind, which the next update overwrites.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>, f: impl FnOnce(&mut T)) {
    let mut guard = lock.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard);
}

/// The controller's side. There is exactly one of these.
pub struct HardwareHandle {
    state: Arc<TelescopeState>,
}

impl HardwareHandle {
    pub fn settings(&self) -> OperatorSettings {
        read(&self.state.operator).clone()
    }

    pub fn view(&self) -> HardwareView {
        read(&self.state.hardware).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut HardwareView)) {
        write(&self.state.hardware, f)
    }

    pub fn operator_handle(&self) -> OperatorHandle {
        OperatorHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// The operator's side. Requests are accepted without acknowledgement and
/// picked up on the controller's next cycle.
#[derive(Clone)]
pub struct OperatorHandle {
    state: Arc<TelescopeState>,
}

impl OperatorHandle {
    pub fn settings(&self) -> OperatorSettings {
        read(&self.state.operator).clone()
    }

    pub fn view(&self) -> HardwareView {
        read(&self.state.hardware).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut OperatorSettings)) {
        write(&self.state.operator, f)
    }

    pub fn request_mode(&self, mode: ControllerMode) {
        self.update(|s| s.mode = mode)
    }
}
