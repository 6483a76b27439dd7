// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Clock-phase and radio-balance diagnostics.
//!
//! Each front end's sampling clock phase is measured by the correlator in
//! twelve 30° steps. Readings from one antenna are combined with a circular
//! mean, so that readings either side of step 0 don't average out to step 6.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::{
    c64,
    config::ConfigError,
    constants::{FRAC_PI_6, NUM_PHASE_STEPS, TAU},
};

/// Summary of the phase readings of one antenna.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    /// The circular mean, rounded to the nearest step (0..12).
    pub measured: u8,
    /// The mean resultant length; 1 means every reading agreed.
    pub stability: f64,
    pub threshold: f64,
    pub n_samples: usize,
    pub ok: bool,
}

/// Circular statistics of phase readings given in steps of 30°.
pub fn phase_stats(steps: &[u8], stable_threshold: f64) -> Result<PhaseStats, ConfigError> {
    if steps.is_empty() {
        return Err(ConfigError::NoPhaseSamples);
    }

    let sum: c64 = steps
        .iter()
        .map(|&s| c64::from_polar(1.0, s as f64 * FRAC_PI_6))
        .sum();
    let n = steps.len() as f64;
    let mut mean_angle = (sum / n).arg();
    if mean_angle < 0.0 {
        mean_angle += TAU;
    }
    let measured =
        ((mean_angle / TAU * NUM_PHASE_STEPS as f64).round() as u8) % NUM_PHASE_STEPS;
    let stability = sum.norm() / n;

    Ok(PhaseStats {
        measured,
        stability,
        threshold: stable_threshold,
        n_samples: steps.len(),
        ok: stability > stable_threshold,
    })
}

/// Whether a radio's bit stream spends about as long high as low. A stuck or
/// saturated front end fails this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioBalance {
    pub mean: f64,
    pub threshold: f64,
    pub ok: bool,
}

/// The mean of a stream of 0/1 bits, and whether it lies within `threshold`
/// of 0.5.
pub fn radio_balance(bits: ArrayView1<u8>, threshold: f64) -> Result<RadioBalance, ConfigError> {
    let mean = match bits.mapv(f64::from).mean() {
        Some(m) => m,
        None => return Err(ConfigError::ZeroSamples),
    };
    Ok(RadioBalance {
        mean,
        threshold,
        ok: (mean - 0.5).abs() < threshold,
    })
}

/// The median of some values. `None` if there aren't any.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// The sample delay that centres sampling between clock edges, given every
/// antenna's measured phase step: half a clock cycle (6 steps) past the
/// median phase.
pub fn sample_delay_from_phases(measured: &[u8]) -> Option<f64> {
    let phases = measured.iter().map(|&m| m as f64).collect::<Vec<_>>();
    median(&phases).map(|m| (m + 6.0) % NUM_PHASE_STEPS as f64)
}
