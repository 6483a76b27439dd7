// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Diagnostic mode: per-antenna clock-phase stability, the global sample
//! delay, radio balance and spectra.

use std::thread;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use ndarray::{ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{delay_step, wait_for_data, AcquisitionState, Controller, ControllerError, Spectrum};
use crate::{
    analysis::{
        get_psd, phase_stats, power_to_db, radio_balance, sample_delay_from_phases, PhaseStats,
        RadioBalance,
    },
    config::{n_samples_from_exp, ConfigError},
    constants::READY_POLL_INTERVAL,
    hardware::{lock_hardware, unpack_raw},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDiagnostic {
    pub phase: PhaseStats,
    pub radio: RadioBalance,
    pub spectrum: Spectrum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub timestamp: DateTime<Utc>,
    pub sample_delay: f64,
    pub channels: Vec<ChannelDiagnostic>,
}

/// The spectrum of one channel's bits, taken as +/-1 with the channel mean
/// removed. A stuck or unbalanced channel shows its residual spectrum rather
/// than a DC spike.
pub(super) fn channel_spectrum(
    bits: ArrayView1<u8>,
    sampling_frequency: f64,
    nfft: usize,
) -> Result<Spectrum, ConfigError> {
    let signal = bits.mapv(|b| 2.0 * f64::from(b) - 1.0);
    let mean = signal.mean().unwrap_or(0.0);
    let signal = signal.mapv(|s| s - mean).to_vec();
    let psd = get_psd(&signal, sampling_frequency, nfft)?;
    Ok(Spectrum {
        power_db: psd.power.iter().map(|&p| power_to_db(p)).collect(),
        freq_mhz: psd.freq.iter().map(|f| f / 1e6).collect(),
    })
}

impl Controller {
    /// Measure every antenna, store the derived sample delay and publish the
    /// results.
    pub fn run_diagnostic(&self) -> Result<DiagnosticReport, ControllerError> {
        let settings = self.status.settings();
        let diag = &self.config.diagnostic;
        let num_antenna = self.config.telescope.num_antenna;
        n_samples_from_exp("diagnostic", settings.diag_n_samples_exp)?;
        let num_words = n_samples_from_exp("spectre", diag.spectre.n_samples_exp)? as usize;
        self.status
            .update(|v| v.acquisition = AcquisitionState::Diagnosing);

        let mut hw = lock_hardware(&self.hardware)?;

        // Clock phase of each antenna on its own.
        let mut phases = Vec::with_capacity(num_antenna);
        for antenna in 0..num_antenna {
            hw.reset()?;
            hw.set_capture(true, Some(antenna))?;
            hw.set_centre(true)?;
            hw.start_vis(settings.diag_n_samples_exp)?;
            let mut steps = Vec::with_capacity(diag.phase_samples);
            for _ in 0..diag.phase_samples {
                thread::sleep(READY_POLL_INTERVAL);
                steps.push(hw.read_status()?.phase);
            }
            let stats = phase_stats(&steps, diag.stable_threshold)?;
            debug!(
                "Antenna {antenna}: phase {} (stability {:.3})",
                stats.measured, stats.stability
            );
            if !stats.ok {
                warn!(
                    "Antenna {antenna} has an unstable clock phase (stability {:.3})",
                    stats.stability
                );
            }
            phases.push(stats);
        }

        let measured = phases.iter().map(|p| p.measured).collect::<Vec<_>>();
        let sample_delay = sample_delay_from_phases(&measured).ok_or(ControllerError::NoPhases)?;
        let timestamp = Utc::now();
        self.catalog.insert_sample_delay(timestamp, sample_delay)?;
        info!("New sample delay: {sample_delay}");

        // One short acquisition with everything.
        hw.reset()?;
        hw.set_capture(true, None)?;
        hw.set_centre(true)?;
        hw.set_sample_delay(delay_step(sample_delay))?;
        hw.start_acquisition()?;
        wait_for_data(&self.status, &mut **hw)?;
        let bytes = hw.read_data(num_words)?;
        let hardware_status = hw.read_status()?;
        drop(hw);
        let bits = unpack_raw(&bytes, num_antenna)?;

        // Channels are independent, and the PSDs dominate the cost.
        let sampling_frequency = self.config.telescope.sampling_frequency;
        let channels = phases
            .into_par_iter()
            .zip(bits.axis_iter(Axis(0)).into_par_iter())
            .map(|(phase, row)| {
                Ok(ChannelDiagnostic {
                    phase,
                    radio: radio_balance(row, diag.radio_mean_threshold)?,
                    spectrum: channel_spectrum(row, sampling_frequency, diag.spectre.nfft)?,
                })
            })
            .collect::<Result<Vec<_>, ControllerError>>()?;

        let report = DiagnosticReport {
            timestamp,
            sample_delay,
            channels,
        };
        self.status.update(|v| {
            for (channel, d) in v.channels.iter_mut().zip(report.channels.iter()) {
                channel.phase = Some(d.phase);
                channel.radio = Some(d.radio);
                channel.spectrum = Some(d.spectrum.clone());
            }
            v.diagnostic_timestamp = Some(report.timestamp);
            v.sample_delay = Some(report.sample_delay);
            v.hardware = Some(hardware_status);
            v.acquisition = AcquisitionState::Idle;
        });
        Ok(report)
    }
}
