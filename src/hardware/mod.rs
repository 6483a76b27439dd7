// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Access to the correlator hardware.
//!
//! Everything goes through [`CorrelatorHardware`]. The physical correlator
//! ([`TartCorrelator`]) talks registers over an opaque byte transport; the
//! simulated one ([`SimulatedCorrelator`]) synthesises frames from a moving
//! sky model. Which one is used is decided when the controller is built.

mod error;
mod sim;
mod spi;

pub use error::HardwareError;
pub use sim::{clock_sky, encode_frame, model_visibilities, SimulatedCorrelator, SkySource};
pub use spi::{
    registers, vis_words_from_bytes, DeviceTransport, RegisterTransport, TartCorrelator,
};

use std::sync::{Arc, Mutex, MutexGuard};

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    config::RuntimeConfig,
    constants::{HARDWARE_NUM_CHANNELS, RAW_WORD_BYTES, READY_POLL_INTERVAL},
    correlator::RawFrame,
};

/// The correlator's debug settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMode {
    /// Replace radio data with a test pattern.
    pub on: bool,
    pub shift: bool,
    pub count: bool,
}

/// A snapshot of the correlator's status registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareStatus {
    pub timestamp: DateTime<Utc>,
    /// The measured clock phase, in 30° steps.
    pub phase: u8,
    /// Spread of the phase detector over its last window.
    pub delta: u8,
    pub centre: bool,
    pub sample_delay: u8,
    pub debug: DebugMode,
    pub capture: bool,
    /// The antenna being captured, `None` for all of them.
    pub source: Option<usize>,
    pub vis_ready: bool,
    pub data_ready: bool,
    pub vis_n_samples_exp: u8,
}

/// The capability set of a correlator.
pub trait CorrelatorHardware: Send {
    fn num_antenna(&self) -> usize;

    fn read_register(&mut self, reg: u8) -> Result<u8, HardwareError>;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), HardwareError>;

    /// Put the correlator back into its power-on state.
    fn reset(&mut self) -> Result<(), HardwareError>;

    fn set_debug(&mut self, mode: DebugMode) -> Result<(), HardwareError>;

    /// Enable or disable capture, either from one antenna or (`None`) from
    /// all of them.
    fn set_capture(&mut self, on: bool, source: Option<usize>) -> Result<(), HardwareError>;

    /// Enable clock-centring of the sampling point.
    fn set_centre(&mut self, on: bool) -> Result<(), HardwareError>;

    /// The sample delay, in 30° clock steps.
    fn set_sample_delay(&mut self, delay: u8) -> Result<(), HardwareError>;

    /// Start accumulating visibilities over `2^n_samples_exp` samples per
    /// frame.
    fn start_vis(&mut self, n_samples_exp: u8) -> Result<(), HardwareError>;

    /// Start a bulk raw-data acquisition.
    fn start_acquisition(&mut self) -> Result<(), HardwareError>;

    fn vis_ready(&mut self) -> Result<bool, HardwareError>;

    fn data_ready(&mut self) -> Result<bool, HardwareError>;

    fn read_status(&mut self) -> Result<HardwareStatus, HardwareError>;

    /// Read the frame the correlator has finished accumulating. Only call
    /// this once [`CorrelatorHardware::vis_ready`] says so.
    fn read_vis_frame(&mut self) -> Result<RawFrame, HardwareError>;

    /// Read `num_words` raw acquisition words (3 bytes each).
    fn read_data(&mut self, num_words: usize) -> Result<Vec<u8>, HardwareError>;

    /// Block until a frame is ready and return it. Acquisition lengths are
    /// physical, so there is no timeout.
    fn wait_for_frame(&mut self) -> Result<RawFrame, HardwareError> {
        while !self.vis_ready()? {
            std::thread::sleep(READY_POLL_INTERVAL);
        }
        self.read_vis_frame()
    }
}

/// The hardware, shared between the controller and the capture worker. Only
/// one of them uses it at a time.
pub type SharedHardware = Arc<Mutex<Box<dyn CorrelatorHardware>>>;

pub fn share_hardware(hardware: Box<dyn CorrelatorHardware>) -> SharedHardware {
    Arc::new(Mutex::new(hardware))
}

pub fn lock_hardware(
    hardware: &SharedHardware,
) -> Result<MutexGuard<'_, Box<dyn CorrelatorHardware>>, HardwareError> {
    hardware.lock().map_err(|_| HardwareError::Poisoned)
}

/// Unpack raw acquisition words into one row of bits per antenna
/// (`[antenna][sample]`). Each word is a big-endian 24-bit value whose bit
/// `a` belongs to antenna `a`.
pub fn unpack_raw(bytes: &[u8], num_antenna: usize) -> Result<Array2<u8>, HardwareError> {
    if bytes.len() % RAW_WORD_BYTES != 0 {
        return Err(HardwareError::RawBufferLength {
            len: bytes.len(),
            word_bytes: RAW_WORD_BYTES,
        });
    }
    let num_antenna = num_antenna.min(HARDWARE_NUM_CHANNELS);
    let num_samples = bytes.len() / RAW_WORD_BYTES;
    let mut bits = Array2::zeros((num_antenna, num_samples));
    for (i_sample, chunk) in bytes.chunks_exact(RAW_WORD_BYTES).enumerate() {
        let word = BigEndian::read_u24(chunk);
        for i_ant in 0..num_antenna {
            bits[(i_ant, i_sample)] = ((word >> i_ant) & 1) as u8;
        }
    }
    Ok(bits)
}

/// Which correlator to drive.
#[derive(Debug, Clone)]
pub enum HardwareBackend {
    Simulated,
    Device(std::path::PathBuf),
}

/// Build the requested correlator. A device that can't be opened falls back
/// to the simulator, so that the rest of the system keeps running.
pub fn create_hardware(
    backend: &HardwareBackend,
    config: &RuntimeConfig,
) -> Box<dyn CorrelatorHardware> {
    match backend {
        HardwareBackend::Device(path) => match DeviceTransport::open(path) {
            Ok(transport) => {
                info!("Using correlator device {}", path.display());
                Box::new(TartCorrelator::new(
                    transport,
                    config.telescope.num_antenna,
                    config.hardware.permutation.clone(),
                ))
            }
            Err(e) => {
                warn!("{e}");
                warn!("Using the simulated correlator instead");
                Box::new(SimulatedCorrelator::from_config(config))
            }
        },
        HardwareBackend::Simulated => {
            debug!("Using the simulated correlator");
            Box::new(SimulatedCorrelator::from_config(config))
        }
    }
}
