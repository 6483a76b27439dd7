// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Power spectral density estimates of antenna sample streams.

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::{
    c64,
    config::ConfigError,
    constants::{PSD_DB_FLOOR, PSD_NUM_BINS, TAU},
};

/// A power spectrum re-binned into [`PSD_NUM_BINS`] bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    /// The maximum power in each bin.
    pub power: Vec<f64>,
    /// The mean frequency of each bin \[Hz\].
    pub freq: Vec<f64>,
}

/// An FFT of size `nfft` must provide at least one one-sided frequency bin
/// per output bin.
pub fn check_nfft(nfft: usize) -> Result<(), ConfigError> {
    let bins = nfft / 2 + 1;
    if bins < PSD_NUM_BINS {
        return Err(ConfigError::NfftTooSmall {
            nfft,
            bins,
            required: PSD_NUM_BINS,
        });
    }
    Ok(())
}

/// A symmetric Hann window, the same as numpy's `hanning`.
pub fn hann_window(n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| 0.5 - 0.5 * (TAU * i as f64 / (n - 1) as f64).cos())
            .collect(),
    }
}

/// One-sided power spectral density by Welch's method with non-overlapping,
/// Hann-windowed segments of length `nfft`. Signals shorter than `nfft` are
/// zero-padded; any trailing partial segment is ignored.
///
/// Returns the `nfft / 2 + 1` powers and their frequencies.
pub fn welch_psd(
    signal: &[f64],
    fs: f64,
    nfft: usize,
) -> Result<(Vec<f64>, Vec<f64>), ConfigError> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(ConfigError::BadSamplingFrequency(fs));
    }
    check_nfft(nfft)?;

    let num_freqs = nfft / 2 + 1;
    let window = hann_window(nfft);
    let window_norm: f64 = window.iter().map(|w| w * w).sum();
    let fft = FftPlanner::<f64>::new().plan_fft_forward(nfft);
    let mut buffer = vec![c64::default(); nfft];

    // A short signal is one zero-padded segment.
    let num_segments = (signal.len() / nfft).max(1);
    let mut power = vec![0.0; num_freqs];
    for i_segment in 0..num_segments {
        let start = i_segment * nfft;
        let segment = signal.get(start..).unwrap_or(&[]);
        for (i, (b, w)) in buffer.iter_mut().zip(window.iter()).enumerate() {
            let s = segment.get(i).copied().unwrap_or(0.0);
            *b = c64::new(s * w, 0.0);
        }
        fft.process(&mut buffer);

        for (i_freq, (p, x)) in power.iter_mut().zip(buffer.iter()).enumerate() {
            let mut segment_power = x.norm_sqr() / (fs * window_norm);
            // Fold the negative frequencies in; DC and (for even sizes) the
            // Nyquist bin have no partner.
            let is_nyquist = nfft % 2 == 0 && i_freq == num_freqs - 1;
            if i_freq != 0 && !is_nyquist {
                segment_power *= 2.0;
            }
            *p += segment_power;
        }
    }
    power.iter_mut().for_each(|p| *p /= num_segments as f64);

    let freq = (0..num_freqs)
        .map(|i| i as f64 * fs / nfft as f64)
        .collect();
    Ok((power, freq))
}

/// Re-bin a spectrum into `num_bins` bins, keeping the maximum power and the
/// mean frequency of each slice. Bins past the end of the spectrum are
/// zero-padded, repeating the last frequency.
pub fn rebin_spectrum(power: &[f64], freq: &[f64], num_bins: usize) -> Psd {
    let width = power.len() / num_bins;
    let last_freq = freq.last().copied().unwrap_or(0.0);

    let mut out = Psd {
        power: Vec::with_capacity(num_bins),
        freq: Vec::with_capacity(num_bins),
    };
    if width == 0 {
        out.power.extend(power.iter().copied());
        out.freq.extend(freq.iter().copied());
        out.power.resize(num_bins, 0.0);
        out.freq.resize(num_bins, last_freq);
        return out;
    }

    for i_bin in 0..num_bins {
        let start = i_bin * width;
        let stop = (start + width).min(power.len());
        if start < power.len() {
            let slice = &power[start..stop];
            out.power
                .push(slice.iter().copied().fold(f64::NEG_INFINITY, f64::max));
            let freqs = &freq[start..stop];
            out.freq.push(freqs.iter().sum::<f64>() / freqs.len() as f64);
        } else {
            out.power.push(0.0);
            out.freq.push(last_freq);
        }
    }
    out
}

/// The power spectral density of `signal`, re-binned into [`PSD_NUM_BINS`]
/// bins.
pub fn get_psd(signal: &[f64], fs: f64, nfft: usize) -> Result<Psd, ConfigError> {
    let (power, freq) = welch_psd(signal, fs, nfft)?;
    Ok(rebin_spectrum(&power, &freq, PSD_NUM_BINS))
}

/// Convert a power to decibels, truncated to three decimal places.
pub fn power_to_db(power: f64) -> f64 {
    let db = 10.0 * (power + PSD_DB_FLOOR).log10();
    if db.is_finite() {
        (db * 1000.0).trunc() / 1000.0
    } else {
        0.0
    }
}
