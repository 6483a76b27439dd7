// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::Utc;
use log::debug;

use super::{delay_step, wait_for_data, AcquisitionState, Controller, ControllerError};
use crate::{
    catalog::FileHandle,
    config::n_samples_from_exp,
    hardware::{lock_hardware, unpack_raw, DebugMode},
    io::{write_raw_capture, RawCaptureFile},
};

impl Controller {
    /// Capture `2^raw_n_samples_exp` samples from every antenna and, if
    /// saving is on, persist them.
    pub fn run_raw(&self) -> Result<Option<FileHandle>, ControllerError> {
        let settings = self.status.settings();
        let num_antenna = self.config.telescope.num_antenna;
        let num_words = n_samples_from_exp("raw", settings.raw_n_samples_exp)? as usize;
        let sample_delay = self.catalog.get_sample_delay()?;

        let (bytes, hardware_status) = {
            let mut hw = lock_hardware(&self.hardware)?;
            hw.reset()?;
            hw.set_debug(DebugMode::default())?;
            hw.set_capture(true, None)?;
            hw.set_centre(true)?;
            hw.set_sample_delay(delay_step(sample_delay))?;
            hw.start_acquisition()?;
            wait_for_data(&self.status, &mut **hw)?;
            (hw.read_data(num_words)?, hw.read_status()?)
        };
        let bits = unpack_raw(&bytes, num_antenna)?;
        debug!("Acquired {} samples", bits.ncols());
        self.status.update(|v| {
            v.hardware = Some(hardware_status);
            v.acquisition = AcquisitionState::Idle;
        });

        if !settings.raw_save {
            debug!("Not saving raw data");
            return Ok(None);
        }
        let capture = RawCaptureFile {
            timestamp: Utc::now(),
            num_antenna,
            sampling_frequency: self.config.telescope.sampling_frequency,
            n_samples: bits.ncols() as u64,
            antenna_positions: settings.antenna_positions,
            gains: self.catalog.get_gain()?,
            sample_delay,
            data: bits.outer_iter().map(|row| row.to_vec()).collect(),
        };
        let handle = write_raw_capture(&*self.catalog, &self.config.raw.base_path, capture)?;
        Ok(Some(handle))
    }
}
