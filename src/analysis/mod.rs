// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spectral and diagnostic analysis of antenna sample streams. Only the
//! diagnostic mode uses these.

mod phase;
mod psd;
#[cfg(test)]
mod tests;

pub use phase::{
    median, phase_stats, radio_balance, sample_delay_from_phases, PhaseStats, RadioBalance,
};
pub use psd::{check_nfft, get_psd, hann_window, power_to_db, rebin_spectrum, welch_psd, Psd};
