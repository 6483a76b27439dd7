// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use crate::{
    config::ConfigError,
    constants::{PSD_NUM_BINS, TAU},
};

const FS: f64 = 16.368e6;
const NFFT: usize = 256;

fn tone(len: usize, freq: f64) -> Vec<f64> {
    (0..len)
        .map(|i| (TAU * freq * i as f64 / FS).sin())
        .collect()
}

fn assert_psd_shape(psd: &Psd) {
    assert_eq!(psd.power.len(), PSD_NUM_BINS);
    assert_eq!(psd.freq.len(), PSD_NUM_BINS);
    assert_abs_diff_eq!(psd.freq[0], 0.0);
    for pair in psd.freq.windows(2) {
        assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
    }
    assert!(psd.power.iter().all(|p| p.is_finite() && *p >= 0.0));
}

#[test]
fn test_psd_shape_for_any_signal_length() {
    for len in [10, NFFT - 1, NFFT, 3 * NFFT, 3 * NFFT + 17] {
        let psd = get_psd(&tone(len, 1.0e6), FS, NFFT).unwrap();
        assert_psd_shape(&psd);
    }
    // Empty signals are zero-padded too.
    let psd = get_psd(&[], FS, NFFT).unwrap();
    assert_psd_shape(&psd);
}

#[test]
fn test_psd_of_zero_signal_is_zero() {
    let psd = get_psd(&vec![0.0; 4 * NFFT], FS, NFFT).unwrap();
    assert!(psd.power.iter().all(|&p| p == 0.0));
}

#[test]
fn test_psd_peaks_at_tone() {
    // Put the tone exactly on FFT bin 32.
    let freq = 32.0 * FS / NFFT as f64;
    let psd = get_psd(&tone(8 * NFFT, freq), FS, NFFT).unwrap();
    let (i_max, _) = psd
        .power
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
    assert_eq!(i_max, 32);
    assert_abs_diff_eq!(psd.freq[i_max], freq, epsilon = 1e-6);
}

#[test]
fn test_psd_integrates_to_mean_square() {
    // A +-1 sequence has a mean square of exactly 1. With the one-sided
    // scaling, summing over the whole spectrum recovers it.
    let signal = (0..8 * NFFT)
        .map(|i| if (i * 7919 + i / 3) % 5 < 2 { 1.0 } else { -1.0 })
        .collect::<Vec<f64>>();
    let (power, _) = welch_psd(&signal, FS, NFFT).unwrap();
    let total = power.iter().sum::<f64>() * FS / NFFT as f64;
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
}

#[test]
fn test_psd_rejects_small_nfft() {
    match get_psd(&[0.0; 100], FS, 128) {
        Err(ConfigError::NfftTooSmall { nfft, bins, .. }) => {
            assert_eq!(nfft, 128);
            assert_eq!(bins, 65);
        }
        other => panic!("expected an nfft error, got {other:?}"),
    }
    assert!(check_nfft(254).is_ok());
    assert!(check_nfft(253).is_err());
    assert!(matches!(
        get_psd(&[0.0; 100], 0.0, NFFT),
        Err(ConfigError::BadSamplingFrequency(_))
    ));
}

#[test]
fn test_rebin_pads_short_spectra() {
    let psd = rebin_spectrum(&[1.0, 2.0, 3.0], &[0.0, 1.0, 2.0], 8);
    assert_eq!(psd.power, vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(psd.freq, vec![0.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0]);

    let psd = rebin_spectrum(&[1.0, 5.0, 3.0, 2.0], &[0.0, 1.0, 2.0, 3.0], 2);
    assert_eq!(psd.power, vec![5.0, 3.0]);
    assert_eq!(psd.freq, vec![0.5, 2.5]);
}

#[test]
fn test_hann_window() {
    let w = hann_window(5);
    for (a, b) in w.iter().zip([0.0, 0.5, 1.0, 0.5, 0.0]) {
        assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
    }
    assert_eq!(hann_window(1), vec![1.0]);
}

#[test]
fn test_power_to_db() {
    assert_abs_diff_eq!(power_to_db(1.0), 0.0);
    assert_abs_diff_eq!(power_to_db(0.5), -3.01);
    assert_abs_diff_eq!(power_to_db(0.0), -320.0, epsilon = 1e-9);
}

#[test]
fn test_identical_phases_are_perfectly_stable() {
    for k in 0..12 {
        let stats = phase_stats(&[k; 15], 0.95).unwrap();
        assert_eq!(stats.measured, k);
        assert_abs_diff_eq!(stats.stability, 1.0, epsilon = 1e-12);
        assert!(stats.ok);
        assert_eq!(stats.n_samples, 15);
    }
}

#[test]
fn test_phase_mean_wraps_around() {
    // 11 and 1 are either side of 0; a linear mean would say 6.
    let stats = phase_stats(&[11, 1, 11, 1], 0.95).unwrap();
    assert_eq!(stats.measured, 0);
    assert_abs_diff_eq!(stats.stability, (TAU / 12.0).cos(), epsilon = 1e-12);
    assert!(!stats.ok);

    let stats = phase_stats(&[11, 11, 11, 0], 0.5).unwrap();
    assert_eq!(stats.measured, 11);
}

#[test]
fn test_opposite_phases_are_unstable() {
    let stats = phase_stats(&[0, 6, 0, 6], 0.5).unwrap();
    assert_abs_diff_eq!(stats.stability, 0.0, epsilon = 1e-12);
    assert!(!stats.ok);
}

#[test]
fn test_phase_stats_needs_samples() {
    assert_eq!(phase_stats(&[], 0.9), Err(ConfigError::NoPhaseSamples));
}

#[test]
fn test_radio_balance() {
    let bits = array![0u8, 1, 0, 1, 1, 0, 1, 0];
    let balance = radio_balance(bits.view(), 0.2).unwrap();
    assert_abs_diff_eq!(balance.mean, 0.5);
    assert!(balance.ok);

    let stuck = Array1::<u8>::ones(64);
    let balance = radio_balance(stuck.view(), 0.2).unwrap();
    assert_abs_diff_eq!(balance.mean, 1.0);
    assert!(!balance.ok);

    let empty = Array1::<u8>::zeros(0);
    assert!(radio_balance(empty.view(), 0.2).is_err());
}

#[test]
fn test_median_and_sample_delay() {
    assert_eq!(median(&[]), None);
    assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));

    assert_eq!(sample_delay_from_phases(&[3, 3, 3]), Some(9.0));
    assert_eq!(sample_delay_from_phases(&[7, 8, 9]), Some(2.0));
    assert_eq!(sample_delay_from_phases(&[]), None);
}
