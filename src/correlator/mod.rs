// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Decoding of XNOR-correlator frames into complex visibilities.
//!
//! A frame holds an interleaved (cos, sin) pair of agreement counts for every
//! baseline, followed by one mean-accumulator count per antenna. Each count
//! is the number of samples (out of `n_samples`) on which two one-bit streams
//! agreed. Counts are mapped onto [-1, 1] correlations, the product of the
//! antenna means is subtracted, and the two-level quantisation is undone with
//! the Van Vleck correction.
//!
//! https://arxiv.org/pdf/1608.04367.pdf

mod error;

pub use error::DecodeError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{c64, config::ConfigError, constants::FRAC_PI_2};

/// The number of cross-correlation baselines for an array.
pub fn num_baselines(num_antenna: usize) -> usize {
    num_antenna * num_antenna.saturating_sub(1) / 2
}

/// The number of words in a raw correlator frame for an array.
pub fn frame_len(num_antenna: usize) -> usize {
    2 * num_baselines(num_antenna) + num_antenna
}

/// All of the baselines of an array in canonical order; i ascending, then j
/// ascending, with i < j. The correlator emits its words in this order, so
/// this ordering must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baselines {
    num_antenna: usize,
    pairs: Vec<(usize, usize)>,
}

impl Baselines {
    pub fn new(num_antenna: usize) -> Baselines {
        let mut pairs = Vec::with_capacity(num_baselines(num_antenna));
        for i in 0..num_antenna {
            for j in i + 1..num_antenna {
                pairs.push((i, j));
            }
        }
        Baselines { num_antenna, pairs }
    }

    pub fn num_antenna(&self) -> usize {
        self.num_antenna
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// The antenna pair of a baseline index.
    ///
    /// # Panics
    ///
    /// Panics if `index` isn't a valid baseline index. Asking for one is a
    /// bug, not bad input.
    pub fn pair(&self, index: usize) -> (usize, usize) {
        assert!(
            index < self.pairs.len(),
            "baseline index {index} out of range for {} baselines",
            self.pairs.len()
        );
        self.pairs[index]
    }

    /// The canonical index of the baseline between antennas `i` and `j`, in
    /// either order. `None` for autos and out-of-range antennas.
    pub fn index(&self, i: usize, j: usize) -> Option<usize> {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        if i == j || j >= self.num_antenna {
            return None;
        }
        let n = self.num_antenna;
        Some(i * (2 * n - i - 1) / 2 + (j - i - 1))
    }
}

/// A raw correlator frame. It is consumed exactly once by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub words: Vec<i64>,
}

impl RawFrame {
    /// The cosine-channel agreement count of baseline `k`.
    pub fn cos_count(&self, k: usize) -> i64 {
        self.words[2 * k]
    }

    /// The sine-channel agreement count of baseline `k`.
    pub fn sin_count(&self, k: usize) -> i64 {
        self.words[2 * k + 1]
    }

    /// The trailing mean-accumulator counts, one per antenna.
    pub fn mean_counts(&self, num_antenna: usize) -> &[i64] {
        &self.words[self.words.len() - num_antenna..]
    }
}

/// Map an XNOR agreement count onto a signed correlation in [-1, 1].
#[inline]
pub fn get_corr(xnor_sum: f64, n_samples: u64) -> f64 {
    2.0 * xnor_sum / n_samples as f64 - 1.0
}

/// Undo the compression of a correlation coefficient caused by two-level
/// quantisation.
///
/// # Examples
///
/// `assert_abs_diff_eq!(van_vleck_correction(1.0), 1.0);`
#[inline]
pub fn van_vleck_correction(x: f64) -> f64 {
    (FRAC_PI_2 * x).sin()
}

/// Visibilities from a single frame, with the antenna means used to get
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// One per baseline, in canonical order.
    pub vis: Vec<c64>,
    pub means: Vec<f64>,
}

/// The visibilities of every baseline at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilitySet {
    pub timestamp: DateTime<Utc>,
    pub vis: Vec<c64>,
}

/// Turns raw frames into visibilities for a fixed array and accumulation
/// length.
#[derive(Debug, Clone)]
pub struct Decoder {
    baselines: Baselines,
    n_samples: u64,
}

impl Decoder {
    pub fn new(num_antenna: usize, n_samples: u64) -> Result<Decoder, ConfigError> {
        if n_samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        Ok(Decoder {
            baselines: Baselines::new(num_antenna),
            n_samples,
        })
    }

    pub fn baselines(&self) -> &Baselines {
        &self.baselines
    }

    pub fn n_samples(&self) -> u64 {
        self.n_samples
    }

    pub fn decode(&self, frame: &RawFrame) -> Result<DecodedFrame, DecodeError> {
        let num_antenna = self.baselines.num_antenna();
        let expected = frame_len(num_antenna);
        if frame.words.len() != expected {
            return Err(DecodeError::FrameLength {
                expected,
                got: frame.words.len(),
                num_antenna,
            });
        }

        let means = frame
            .mean_counts(num_antenna)
            .iter()
            .enumerate()
            .map(|(antenna, &count)| {
                let mean = get_corr(count as f64, self.n_samples);
                if mean.is_finite() {
                    Ok(mean)
                } else {
                    Err(DecodeError::NonFiniteMean { antenna })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut vis = Vec::with_capacity(self.baselines.len());
        for k in 0..self.baselines.len() {
            let (i, j) = self.baselines.pair(k);
            let mean_product = means[i] * means[j];
            let corr_cos = get_corr(frame.cos_count(k) as f64, self.n_samples);
            let corr_sin = get_corr(frame.sin_count(k) as f64, self.n_samples);
            let re = van_vleck_correction(corr_cos - mean_product);
            let im = van_vleck_correction(corr_sin - mean_product);
            // The hardware's sine channel is wired such that the imaginary
            // part is negated.
            let v = c64::new(re, -im);
            if !(v.re.is_finite() && v.im.is_finite()) {
                return Err(DecodeError::NonFiniteVisibility { baseline: k, i, j });
            }
            vis.push(v);
        }

        Ok(DecodedFrame { vis, means })
    }
}

/// Decode a single frame without keeping a [`Decoder`] around.
pub fn decode_frame(
    frame: &RawFrame,
    num_antenna: usize,
    n_samples: u64,
) -> Result<DecodedFrame, DecodeError> {
    Decoder::new(num_antenna, n_samples)?.decode(frame)
}
